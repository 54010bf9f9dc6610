//! Geometric transforms of physical space.
//!
//! [`Transform`] is a plain `f64` value type that can be inverted, composed
//! and serialized. The registration engine builds differentiable tensor
//! versions of the same parametrisation from [`rigid::rotation_matrix_tensor`].

pub mod affine;
pub mod rigid;

pub use affine::{Transform, TransformKind, INVERTIBILITY_FLOOR};
pub use rigid::{euler_angles, rotation_matrix, rotation_matrix_tensor};
