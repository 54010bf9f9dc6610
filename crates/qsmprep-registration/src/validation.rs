//! Input and output checks around a registration run.

use burn::tensor::backend::Backend;

use qsmprep_core::{PixelType, Transform, Volume, VolumeStatistics};

use crate::error::{RegistrationError, Result};

/// Standard deviation below which an image is considered constant.
pub const MIN_INTENSITY_STD: f64 = 1e-12;

/// Reject volumes the metric cannot work with: too few voxels, constant
/// intensity or non-finite values.
pub fn validate_volume<B: Backend>(volume: &Volume<B>, role: &str, min_voxel_count: usize) -> Result<VolumeStatistics> {
    if volume.voxel_count() < min_voxel_count {
        return Err(RegistrationError::degenerate(format!(
            "{} volume has {} voxels, need at least {}",
            role,
            volume.voxel_count(),
            min_voxel_count
        )));
    }
    if volume.pixel_type() == PixelType::Categorical {
        tracing::warn!(role, "registering a categorical volume");
    }
    let stats = volume.statistics()?;
    if !stats.std.is_finite() || stats.std <= MIN_INTENSITY_STD {
        return Err(RegistrationError::degenerate(format!(
            "{} volume has zero intensity variance (std {:.3e})",
            role, stats.std
        )));
    }
    Ok(stats)
}

/// Reject transforms whose linear part is (nearly) singular.
pub fn check_determinant(transform: &Transform, floor: f64) -> Result<f64> {
    let det = transform.determinant();
    if !det.is_finite() || det.abs() < floor {
        return Err(RegistrationError::non_invertible(format!(
            "{} transform has determinant {:.3e} (floor {:.1e})",
            transform.kind(),
            det,
            floor
        )));
    }
    Ok(det)
}
