//! Interpolation types and operations.
//!
//! This module provides interpolation traits and implementations
//! for sampling values at continuous voxel coordinates, and the policy
//! deciding which interpolator a volume may be sampled with.

pub mod trait_;
pub mod linear;
pub mod nearest;
pub mod policy;

pub use trait_::Interpolator;
pub use linear::LinearInterpolator;
pub use nearest::NearestNeighborInterpolator;
pub use policy::InterpolationPolicy;
