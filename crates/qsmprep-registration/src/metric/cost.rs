//! The registration objective: metric of fixed samples against the moving
//! image seen through a parametrised transform, differentiated with burn
//! autodiff.

use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{ElementConversion, Tensor, TensorData};

use qsmprep_core::interpolation::{Interpolator, LinearInterpolator};
use qsmprep_core::transform::rotation_matrix_tensor;
use qsmprep_core::volume::tensor_to_vec;
use qsmprep_core::{TransformKind, Volume};

use super::trait_::{MetricSamples, SimilarityMetric};
use crate::error::{RegistrationError, Result};
use crate::optimizer::{CostFunction, CostValue};
use crate::sampling::FixedSamples;

/// Fewest samples that must land inside the moving image.
pub const MIN_VALID_SAMPLES: usize = 16;

/// Cost of the fixed-to-moving transform `S(x) = A (x - c) + c + t` with
/// parameters laid out as in [`qsmprep_core::Transform`].
pub struct MetricCost<'a, B: AutodiffBackend> {
    metric: &'a dyn SimilarityMetric<B>,
    fixed: &'a FixedSamples<B>,
    moving: &'a Volume<B>,
    moving_range: (f32, f32),
    kind: TransformKind,
    interpolator: LinearInterpolator,
}

impl<'a, B: AutodiffBackend> MetricCost<'a, B> {
    pub fn new(
        metric: &'a dyn SimilarityMetric<B>,
        fixed: &'a FixedSamples<B>,
        moving: &'a Volume<B>,
        moving_range: (f32, f32),
        kind: TransformKind,
    ) -> Self {
        Self {
            metric,
            fixed,
            moving,
            moving_range,
            kind,
            interpolator: LinearInterpolator::new(),
        }
    }

    /// Linear part `[3, 3]` and translation `[3]` of the transform.
    fn split(&self, parameters: Tensor<B, 1>) -> (Tensor<B, 2>, Tensor<B, 1>) {
        match self.kind {
            TransformKind::Rigid => (
                rotation_matrix_tensor(parameters.clone().slice([0..3])),
                parameters.slice([3..6]),
            ),
            TransformKind::Affine => (
                parameters.clone().slice([0..9]).reshape([3, 3]),
                parameters.slice([9..12]),
            ),
        }
    }
}

impl<B: AutodiffBackend> CostFunction for MetricCost<'_, B> {
    fn parameter_count(&self) -> usize {
        self.kind.parameter_count()
    }

    fn evaluate(&self, parameters: &[f64]) -> Result<CostValue> {
        let device = self.moving.device();
        let n = self.parameter_count();
        let values: Vec<f32> = parameters.iter().map(|&p| p as f32).collect();
        let theta = Tensor::<B, 1>::from_data(TensorData::new(values, [n]), &device).require_grad();

        let (linear, translation) = self.split(theta.clone());
        let c = self.fixed.center;
        let center = Tensor::<B, 1>::from_data(TensorData::new(vec![c[0] as f32, c[1] as f32, c[2] as f32], [3]), &device);
        let shift = (translation + center).reshape([1, 3]);
        let mapped = self.fixed.offsets.clone().matmul(linear.transpose()) + shift;

        let indices = self.moving.world_to_index_tensor(mapped);
        let valid = self.interpolator.inside(self.moving.shape(), indices.clone());
        let valid_count = valid.clone().sum().into_scalar().elem::<f64>() as usize;
        if valid_count < MIN_VALID_SAMPLES {
            return Err(RegistrationError::degenerate(format!(
                "only {} of {} samples map inside the moving image",
                valid_count, self.fixed.count
            )));
        }
        let moving_values = self.interpolator.interpolate(self.moving.data(), indices);

        let samples = MetricSamples {
            fixed: self.fixed.values.clone(),
            moving: moving_values,
            valid,
            fixed_range: self.fixed.range,
            moving_range: self.moving_range,
        };
        let loss = self.metric.loss(&samples);
        let value = loss.clone().into_scalar().elem::<f64>();

        let gradients = loss.backward();
        let derivative = match theta.grad(&gradients) {
            Some(g) => tensor_to_vec(g)?.into_iter().map(f64::from).collect(),
            None => vec![0.0; n],
        };
        Ok(CostValue { value, derivative })
    }
}
