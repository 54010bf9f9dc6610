//! Metric trait for image similarity measurement.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

use super::mattes::{MattesMutualInformation, DEFAULT_HISTOGRAM_BINS};
use super::mean_squares::MeanSquares;

/// Paired intensities at the sample positions.
#[derive(Debug, Clone)]
pub struct MetricSamples<B: Backend> {
    /// Fixed intensities `[N]`.
    pub fixed: Tensor<B, 1>,
    /// Moving intensities at the mapped positions `[N]`.
    pub moving: Tensor<B, 1>,
    /// `1.0` where the mapped position lies inside the moving image `[N]`.
    pub valid: Tensor<B, 1>,
    /// Intensity range of the fixed image.
    pub fixed_range: (f32, f32),
    /// Intensity range of the moving image.
    pub moving_range: (f32, f32),
}

/// Measures dissimilarity between paired samples. Lower is better.
///
/// The returned loss must be differentiable with respect to
/// `MetricSamples::moving` so parameter derivatives can flow back through
/// the interpolator.
pub trait SimilarityMetric<B: Backend>: Send + Sync {
    /// Scalar loss `[1]` over the valid samples.
    fn loss(&self, samples: &MetricSamples<B>) -> Tensor<B, 1>;

    fn name(&self) -> &'static str;
}

/// Serializable metric selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum MetricKind {
    MattesMutualInformation { bins: usize },
    MeanSquares,
}

impl Default for MetricKind {
    fn default() -> Self {
        Self::MattesMutualInformation {
            bins: DEFAULT_HISTOGRAM_BINS,
        }
    }
}

impl MetricKind {
    pub fn build<B: Backend>(&self) -> Box<dyn SimilarityMetric<B>> {
        match *self {
            Self::MattesMutualInformation { bins } => Box::new(MattesMutualInformation::new(bins)),
            Self::MeanSquares => Box::new(MeanSquares),
        }
    }
}
