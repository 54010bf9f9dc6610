//! Centred transform initialisation.

use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};

use qsmprep_core::{Point3, Transform, TransformKind, Vector3, Volume};

use crate::error::{RegistrationError, Result};

/// What "centre" means when aligning the two volumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitializerMode {
    /// Centres of the physical bounding boxes.
    #[default]
    Geometry,
    /// Intensity-weighted centroids.
    Moments,
}

/// Builds the starting fixed-to-moving transform: identity linear part,
/// translation taking the fixed centre onto the moving centre, rotating
/// about the fixed centre.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CenteredInitializer {
    pub mode: InitializerMode,
}

impl CenteredInitializer {
    pub fn new(mode: InitializerMode) -> Self {
        Self { mode }
    }

    pub fn initialize<B: Backend>(
        &self,
        fixed: &Volume<B>,
        moving: &Volume<B>,
        kind: TransformKind,
    ) -> Result<Transform> {
        let (fixed_center, moving_center) = match self.mode {
            InitializerMode::Geometry => (fixed.grid().center(), moving.grid().center()),
            InitializerMode::Moments => (intensity_centroid(fixed)?, intensity_centroid(moving)?),
        };
        let translation = moving_center - fixed_center;
        tracing::debug!(
            mode = ?self.mode,
            translation = ?translation.as_slice(),
            "initialised transform"
        );
        let identity = Transform::identity(kind, fixed_center);
        let mut parameters = identity.parameters().to_vec();
        let n = parameters.len();
        parameters[n - 3..].copy_from_slice(translation.as_slice());
        Ok(Transform::from_parameters(kind, &parameters, fixed_center)?)
    }
}

/// Physical centroid weighted by intensity above the volume minimum.
pub fn intensity_centroid<B: Backend>(volume: &Volume<B>) -> Result<Point3> {
    let values = volume.to_vec()?;
    let floor = values.iter().copied().fold(f32::INFINITY, f32::min);
    let [nx, ny, _] = volume.size();

    let mut weight_sum = 0.0f64;
    let mut index_sum = Vector3::zeros();
    for (i, v) in values.iter().enumerate() {
        let w = (*v - floor) as f64;
        if w <= 0.0 {
            continue;
        }
        weight_sum += w;
        index_sum += Vector3::new((i % nx) as f64, ((i / nx) % ny) as f64, (i / (nx * ny)) as f64) * w;
    }
    if !(weight_sum > 0.0 && weight_sum.is_finite()) {
        return Err(RegistrationError::degenerate("volume has no intensity mass to centre on"));
    }
    Ok(volume.index_to_physical(&Point3::from(index_sum / weight_sum)))
}
