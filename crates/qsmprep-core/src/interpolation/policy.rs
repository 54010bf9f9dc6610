//! Interpolation policy selection.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::volume::PixelType;

/// How a volume is sampled at non-grid positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterpolationPolicy {
    Linear,
    #[serde(alias = "nearest")]
    NearestNeighbor,
}

impl InterpolationPolicy {
    /// Mandatory policy for a pixel type: labels are never blended.
    pub fn for_pixel_type(pixel_type: PixelType) -> Self {
        match pixel_type {
            PixelType::Continuous => InterpolationPolicy::Linear,
            PixelType::Categorical => InterpolationPolicy::NearestNeighbor,
        }
    }

    /// Whether sampling data of `pixel_type` with this policy keeps its
    /// meaning. Linear interpolation of labels produces fractional labels.
    pub fn is_permitted_for(self, pixel_type: PixelType) -> bool {
        !(pixel_type == PixelType::Categorical && self == InterpolationPolicy::Linear)
    }

    /// The policy actually used for `pixel_type` when `requested` was asked
    /// for. The pixel type always wins: labels are sampled with nearest
    /// neighbour and intensities with linear, whatever the request.
    pub fn resolve(pixel_type: PixelType, requested: Option<InterpolationPolicy>) -> Self {
        let policy = Self::for_pixel_type(pixel_type);
        if let Some(asked) = requested.filter(|&asked| asked != policy) {
            tracing::debug!(%asked, used = %policy, %pixel_type, "interpolation request overridden by pixel type");
        }
        policy
    }

    pub fn name(self) -> &'static str {
        match self {
            InterpolationPolicy::Linear => "linear",
            InterpolationPolicy::NearestNeighbor => "nearest",
        }
    }
}

impl std::fmt::Display for InterpolationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for InterpolationPolicy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "linear" | "trilinear" => Ok(InterpolationPolicy::Linear),
            "nearest" | "nearest_neighbor" | "nearestneighbor" | "nn" => Ok(InterpolationPolicy::NearestNeighbor),
            other => Err(CoreError::invalid(format!("unknown interpolation policy '{}'", other))),
        }
    }
}
