use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor, TensorData};

use crate::error::Result;
use crate::volume::Volume;

/// Integer shrink filter.
///
/// Keeps every `factor`-th voxel along each axis, starting with the first,
/// so the origin is unchanged and the spacing grows by the factor. Smooth
/// the input first to avoid aliasing.
#[derive(Debug, Clone)]
pub struct DownsampleFilter {
    /// Factor per spatial axis `(x, y, z)`.
    factors: [usize; 3],
}

impl DownsampleFilter {
    pub fn new(factor: usize) -> Self {
        Self::anisotropic([factor; 3])
    }

    pub fn anisotropic(factors: [usize; 3]) -> Self {
        Self { factors }
    }

    pub fn factors(&self) -> [usize; 3] {
        self.factors
    }

    pub fn apply<B: Backend>(&self, volume: &Volume<B>) -> Result<Volume<B>> {
        let grid = volume.grid().shrink(self.factors)?;
        let mut data = volume.data().clone();
        let device = data.device();
        let dims = data.dims();

        for axis in 0..3 {
            let factor = self.factors[axis];
            if factor <= 1 {
                continue;
            }
            let dim = 2 - axis;
            let kept: Vec<i64> = (0..dims[dim]).step_by(factor).map(|i| i as i64).collect();
            let n = kept.len();
            let indices = Tensor::<B, 1, Int>::from_data(TensorData::new(kept, [n]), &device);
            data = data.select(dim, indices);
        }

        Volume::from_grid(data, grid, volume.pixel_type())
    }
}
