use burn::tensor::backend::Backend;
use burn::tensor::ElementConversion;
use serde::{Deserialize, Serialize};

use super::{otsu_mask, BiasFieldEstimator, GRID_TOLERANCE};
use crate::error::{CoreError, Result};
use crate::filter::{resample, DownsampleFilter, GaussianFilter};
use crate::interpolation::InterpolationPolicy;
use crate::transform::{Transform, TransformKind};
use crate::volume::{PixelType, Volume};

/// Log bias field from heavily smoothed foreground intensity.
///
/// The log intensity inside the mask is smoothed with a wide Gaussian on a
/// shrunk grid (normalised by the smoothed mask so background does not
/// leak in), centred to zero mean inside the mask, and interpolated back to
/// full resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmoothedLogBiasEstimator {
    /// Smoothing sigma in mm.
    pub sigma_mm: f64,
    /// Shrink factor of the working grid.
    pub shrink_factor: usize,
    /// Intensities at or below this value are treated as background.
    pub intensity_floor: f64,
}

impl Default for SmoothedLogBiasEstimator {
    fn default() -> Self {
        Self {
            sigma_mm: 15.0,
            shrink_factor: 4,
            intensity_floor: 1e-6,
        }
    }
}

impl SmoothedLogBiasEstimator {
    pub fn new(sigma_mm: f64, shrink_factor: usize) -> Self {
        Self {
            sigma_mm,
            shrink_factor,
            ..Self::default()
        }
    }
}

impl<B: Backend> BiasFieldEstimator<B> for SmoothedLogBiasEstimator {
    fn estimate_log_bias_field(&self, volume: &Volume<B>, mask: Option<&Volume<B>>) -> Result<Volume<B>> {
        if self.sigma_mm <= 0.0 || self.shrink_factor == 0 {
            return Err(CoreError::invalid(format!("invalid bias estimator settings {:?}", self)));
        }
        let mask = match mask {
            Some(m) if m.grid().is_close(volume.grid(), GRID_TOLERANCE) => m.clone(),
            Some(_) => return Err(CoreError::shape_mismatch("bias mask grid differs from the volume grid")),
            None => otsu_mask(volume)?,
        };

        let foreground = mask.data().clone().greater_elem(0.5).float()
            * volume.data().clone().greater_elem(self.intensity_floor).float();
        let weight = volume.with_data(foreground)?;

        let shrink = DownsampleFilter::new(self.shrink_factor);
        let small = shrink.apply(volume)?;
        let small_weight = shrink.apply(&weight)?;
        let w = small_weight.data().clone();
        let coverage = w.clone().sum().into_scalar().elem::<f64>();
        if coverage < 1.0 {
            return Err(CoreError::degenerate("bias mask selects no voxels"));
        }

        let log_intensity = small.data().clone().clamp_min(self.intensity_floor).log() * w.clone();
        let radius = (3.0 * self.sigma_mm / small.spacing().min()).ceil() as usize;
        let gaussian = GaussianFilter::new(self.sigma_mm).with_max_kernel_width(2 * radius + 1);
        let numerator = gaussian.apply_tensor(log_intensity, small.spacing());
        let denominator = gaussian.apply_tensor(w.clone(), small.spacing());
        let field = numerator / denominator.clamp_min(1e-6);

        let mean = (field.clone() * w).sum().into_scalar().elem::<f64>() / coverage;
        let field = small.with_data(field - mean)?;

        tracing::debug!(
            sigma_mm = self.sigma_mm,
            shrink = self.shrink_factor,
            coverage,
            "estimated log bias field"
        );

        let identity = Transform::identity(TransformKind::Rigid, volume.grid().center());
        let full = resample(&field, volume.grid(), &identity, InterpolationPolicy::Linear, 0.0)?;
        Ok(full.with_pixel_type(PixelType::Continuous))
    }
}
