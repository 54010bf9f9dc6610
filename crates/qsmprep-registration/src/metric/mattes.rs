//! Mattes-style mutual information.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::histogram::ParzenJointHistogram;
use super::trait_::{MetricSamples, SimilarityMetric};

pub const DEFAULT_HISTOGRAM_BINS: usize = 50;

/// Negative mutual information from a Parzen-windowed joint histogram.
///
/// Each image's histogram spans its own intensity range, so the metric
/// works across modalities. Samples outside the moving image contribute
/// nothing.
#[derive(Debug, Clone)]
pub struct MattesMutualInformation {
    histogram: ParzenJointHistogram,
}

impl MattesMutualInformation {
    pub fn new(num_bins: usize) -> Self {
        Self {
            histogram: ParzenJointHistogram::new(num_bins, 1.0),
        }
    }

    pub fn num_bins(&self) -> usize {
        self.histogram.num_bins
    }
}

impl Default for MattesMutualInformation {
    fn default() -> Self {
        Self::new(DEFAULT_HISTOGRAM_BINS)
    }
}

impl<B: Backend> SimilarityMetric<B> for MattesMutualInformation {
    fn loss(&self, samples: &MetricSamples<B>) -> Tensor<B, 1> {
        let joint = self.histogram.joint(
            samples.fixed.clone(),
            samples.moving.clone(),
            samples.valid.clone(),
            samples.fixed_range,
            samples.moving_range,
        );
        ParzenJointHistogram::mutual_information(joint).neg()
    }

    fn name(&self) -> &'static str {
        "MattesMutualInformation"
    }
}
