//! Persistence for volumes and transforms.
//!
//! Volumes are read and written as NIfTI-1 (`.nii` / `.nii.gz`). The
//! voxel-to-physical affine is carried in the sform so that a
//! load/save/load cycle reproduces it exactly. Transforms are stored as a
//! small line-oriented text file holding the kind, the full parameter vector
//! and the centre of rotation.

pub mod error;
pub mod nifti_io;
pub mod transform_io;

pub use error::{IoError, Result};
pub use nifti_io::{load_volume, save_volume};
pub use nifti_io::load_volume_as;
pub use transform_io::{format_transform, load_transform, parse_transform, save_transform, TRANSFORM_HEADER};
