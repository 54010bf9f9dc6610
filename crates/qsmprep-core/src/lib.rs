//! Core data model for the qsmprep registration pipeline.
//!
//! Volumes carry tensor data together with the physical grid that places
//! every voxel in scanner space. Transforms map physical points between
//! spaces, and the [`filter::Resampler`] ties both together by sampling a
//! volume onto another grid through a transform.

pub mod error;
pub mod spatial;
pub mod volume;
pub mod transform;
pub mod interpolation;
pub mod filter;
pub mod bias;

pub use error::{CoreError, Result};
pub use volume::{GridSpec, PixelType, Volume, VolumeStatistics};
pub use transform::{Transform, TransformKind};
pub use interpolation::InterpolationPolicy;
pub use filter::{resample, Resampler};
pub use spatial::{Direction3, Point3, Spacing3, Vector3};
