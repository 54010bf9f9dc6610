//! Nearest neighbour interpolation.

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};
use serde::{Deserialize, Serialize};

use super::trait_::{columns, Interpolator};

/// Nearest neighbour interpolator.
///
/// Rounds each coordinate to the closest integer index; exact ties go to the
/// lower index (`ceil(c - 0.5)`), so label propagation is reproducible.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct NearestNeighborInterpolator;

impl NearestNeighborInterpolator {
    pub fn new() -> Self {
        Self
    }

    fn round_half_down<B: Backend>(c: Tensor<B, 1>) -> Tensor<B, 1> {
        (c - 0.5).ceil()
    }

    fn rounded<B: Backend>(indices: Tensor<B, 2>) -> [Tensor<B, 1>; 3] {
        let [x, y, z] = columns(indices);
        [
            Self::round_half_down(x),
            Self::round_half_down(y),
            Self::round_half_down(z),
        ]
    }
}

impl<B: Backend> Interpolator<B> for NearestNeighborInterpolator {
    fn interpolate(&self, data: &Tensor<B, 3>, indices: Tensor<B, 2>) -> Tensor<B, 1> {
        let [d0, d1, d2] = data.dims(); // Z, Y, X
        let [x, y, z] = Self::rounded(indices);

        let x_i: Tensor<B, 1, Int> = x.clamp(0.0, (d2 - 1) as f64).int();
        let y_i: Tensor<B, 1, Int> = y.clamp(0.0, (d1 - 1) as f64).int();
        let z_i: Tensor<B, 1, Int> = z.clamp(0.0, (d0 - 1) as f64).int();

        let stride_z = (d1 * d2) as i32;
        let stride_y = d2 as i32;

        let idx = z_i * stride_z + y_i * stride_y + x_i;
        let flat = data.clone().reshape([d0 * d1 * d2]);
        flat.gather(0, idx)
    }

    fn inside(&self, dims: [usize; 3], indices: Tensor<B, 2>) -> Tensor<B, 1> {
        let [x, y, z] = Self::rounded(indices.detach());
        let axis = |r: Tensor<B, 1>, n: usize| -> Tensor<B, 1> {
            let lo = r.clone().greater_equal_elem(0.0).float();
            let hi = r.lower_equal_elem((n - 1) as f64).float();
            lo * hi
        };
        axis(x, dims[2]) * axis(y, dims[1]) * axis(z, dims[0])
    }
}
