//! Mean squared intensity difference.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::trait_::{MetricSamples, SimilarityMetric};

/// Mean of `(fixed - moving)^2` over the valid samples. Only meaningful for
/// images of the same modality and intensity scale.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanSquares;

impl<B: Backend> SimilarityMetric<B> for MeanSquares {
    fn loss(&self, samples: &MetricSamples<B>) -> Tensor<B, 1> {
        let diff = samples.fixed.clone() - samples.moving.clone();
        let weighted = diff.powf_scalar(2.0) * samples.valid.clone();
        weighted.sum() / samples.valid.clone().sum().clamp_min(1.0)
    }

    fn name(&self) -> &'static str {
        "MeanSquares"
    }
}
