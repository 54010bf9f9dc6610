//! Volumes and the voxel grids they live on.

pub mod grid;
#[allow(clippy::module_inception)]
pub mod volume;

pub use grid::{index_block, indices_of, GridSpec};
pub use volume::{tensor_to_vec, PixelType, Volume, VolumeStatistics};
