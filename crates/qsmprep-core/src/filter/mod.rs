//! Image filters: smoothing, shrinking, resampling and reorientation.

pub mod gaussian;
pub mod downsample;
pub mod pyramid;
pub mod resample;
pub mod reorient;

pub use gaussian::GaussianFilter;
pub use downsample::DownsampleFilter;
pub use pyramid::{MultiResolutionPyramid, PyramidLevel};
pub use resample::{resample, Resampler};
pub use reorient::{reorient_to_canonical, AxisOrientation};
