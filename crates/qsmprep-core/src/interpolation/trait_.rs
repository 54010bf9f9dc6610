//! Interpolator trait for sampling values at continuous coordinates.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Interpolator trait for sampling values at continuous coordinates.
///
/// # Type Parameters
/// * `B` - The Burn backend
pub trait Interpolator<B: Backend> {
    /// Interpolate values from a volume at given continuous indices.
    ///
    /// # Arguments
    /// * `data` - The source tensor `[Z, Y, X]`
    /// * `indices` - Continuous `(x, y, z)` indices `[Batch, 3]`
    ///
    /// # Returns
    /// Tensor of sampled values `[Batch]`. Indices outside the volume are
    /// clamped to the border; use [`Interpolator::inside`] to mask them.
    fn interpolate(&self, data: &Tensor<B, 3>, indices: Tensor<B, 2>) -> Tensor<B, 1>;

    /// `1.0` where an index falls inside the sampling domain of a volume of
    /// tensor shape `dims`, `0.0` elsewhere.
    fn inside(&self, dims: [usize; 3], indices: Tensor<B, 2>) -> Tensor<B, 1>;
}

/// Split `[Batch, 3]` indices into their x, y and z columns.
pub(crate) fn columns<B: Backend>(indices: Tensor<B, 2>) -> [Tensor<B, 1>; 3] {
    let x = indices.clone().narrow(1, 0, 1).squeeze::<1>(1);
    let y = indices.clone().narrow(1, 1, 1).squeeze::<1>(1);
    let z = indices.narrow(1, 2, 1).squeeze::<1>(1);
    [x, y, z]
}
