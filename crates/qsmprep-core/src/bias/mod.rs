//! Intensity bias-field estimation and correction.
//!
//! Scanner receive fields multiply the true intensity by a smooth positive
//! field. Estimators return that field in log space on the input grid;
//! [`apply_bias_field`] divides it back out.

pub mod otsu;
pub mod smoothed;

use burn::tensor::backend::Backend;

use crate::error::{CoreError, Result};
use crate::volume::{PixelType, Volume};

pub use otsu::{otsu_mask, otsu_threshold};
pub use smoothed::SmoothedLogBiasEstimator;

/// Grid agreement required between a volume and its field or mask.
pub(crate) const GRID_TOLERANCE: f64 = 1e-4;

/// Estimates a log bias field for a volume.
pub trait BiasFieldEstimator<B: Backend> {
    /// Log bias field on `volume`'s grid. When `mask` is `None` the
    /// estimator picks its own foreground.
    fn estimate_log_bias_field(&self, volume: &Volume<B>, mask: Option<&Volume<B>>) -> Result<Volume<B>>;
}

/// Remove a log bias field: `corrected = volume / exp(log_field)`.
pub fn apply_bias_field<B: Backend>(volume: &Volume<B>, log_field: &Volume<B>) -> Result<Volume<B>> {
    if volume.pixel_type() != PixelType::Continuous {
        return Err(CoreError::invalid("bias correction applies to continuous volumes only"));
    }
    if !volume.grid().is_close(log_field.grid(), GRID_TOLERANCE) {
        return Err(CoreError::shape_mismatch(format!(
            "bias field grid {:?} does not match volume grid {:?}",
            log_field.size(),
            volume.size()
        )));
    }
    let corrected = volume.data().clone() / log_field.data().clone().exp();
    volume.with_data(corrected)
}

/// Estimate and remove the bias field in one step. Returns the corrected
/// volume and the log field.
pub fn correct_bias<B: Backend, E: BiasFieldEstimator<B>>(
    estimator: &E,
    volume: &Volume<B>,
    mask: Option<&Volume<B>>,
) -> Result<(Volume<B>, Volume<B>)> {
    let field = estimator.estimate_log_bias_field(volume, mask)?;
    let corrected = apply_bias_field(volume, &field)?;
    Ok((corrected, field))
}
