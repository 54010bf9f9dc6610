use burn::tensor::backend::Backend;
use burn::tensor::ops::ConvOptions;
use burn::tensor::{Shape, Tensor, TensorData};

use crate::error::Result;
use crate::spatial::Spacing3;
use crate::volume::Volume;

/// Gaussian smoothing filter.
///
/// Separable 1-D convolutions along each axis with a standard deviation
/// given in physical units, so the same sigma smooths equally regardless of
/// voxel size. Near the border the kernel is renormalised over the voxels
/// that exist, which avoids darkening the edges.
#[derive(Debug, Clone)]
pub struct GaussianFilter {
    /// Sigma per spatial axis `(x, y, z)` in mm.
    sigmas: [f64; 3],
    max_kernel_width: usize,
}

impl GaussianFilter {
    /// Isotropic filter with standard deviation `sigma` (mm).
    pub fn new(sigma: f64) -> Self {
        Self::anisotropic([sigma; 3])
    }

    /// Filter with one sigma (mm) per spatial axis.
    pub fn anisotropic(sigmas: [f64; 3]) -> Self {
        Self {
            sigmas,
            max_kernel_width: 32,
        }
    }

    /// Set the maximum kernel width (radius * 2 + 1).
    pub fn with_max_kernel_width(mut self, width: usize) -> Self {
        self.max_kernel_width = width.max(1);
        self
    }

    pub fn sigmas(&self) -> [f64; 3] {
        self.sigmas
    }

    /// Apply the filter to a volume, keeping its geometry.
    pub fn apply<B: Backend>(&self, volume: &Volume<B>) -> Result<Volume<B>> {
        let data = self.apply_tensor(volume.data().clone(), volume.spacing());
        volume.with_data(data)
    }

    /// Apply the filter to a `[Z, Y, X]` tensor with the given `(x, y, z)`
    /// spacing.
    pub fn apply_tensor<B: Backend>(&self, input: Tensor<B, 3>, spacing: &Spacing3) -> Tensor<B, 3> {
        let mut data = input;
        let mut weight: Option<Tensor<B, 3>> = None;
        let device = data.device();

        for axis in 0..3 {
            let sigma = self.sigmas[axis];
            if sigma <= 1e-6 {
                continue;
            }
            let pixel_sigma = sigma / spacing[axis];
            let radius = (3.0 * pixel_sigma).ceil() as usize;
            let width = (2 * radius + 1).min(self.max_kernel_width | 1);
            let kernel = generate_kernel(pixel_sigma, (width - 1) / 2);
            let kernel = Tensor::<B, 1>::from_data(TensorData::new(kernel.clone(), [kernel.len()]), &device);

            // spatial axis x, y, z is tensor dim 2, 1, 0
            let dim = 2 - axis;
            let w = weight.take().unwrap_or_else(|| Tensor::ones(data.shape(), &device));
            weight = Some(convolve_1d(w, kernel.clone(), dim));
            data = convolve_1d(data, kernel, dim);
        }

        match weight {
            Some(w) => data / w.clamp_min(1e-12),
            None => data,
        }
    }
}

fn generate_kernel(sigma: f64, radius: usize) -> Vec<f32> {
    let two_sigma2 = 2.0 * sigma * sigma;
    let raw: Vec<f64> = (0..=(2 * radius))
        .map(|i| {
            let x = i as f64 - radius as f64;
            (-x * x / two_sigma2).exp()
        })
        .collect();
    let sum: f64 = raw.iter().sum();
    raw.into_iter().map(|v| (v / sum) as f32).collect()
}

/// Convolve along tensor dimension `dim` with zero padding.
fn convolve_1d<B: Backend>(input: Tensor<B, 3>, kernel: Tensor<B, 1>, dim: usize) -> Tensor<B, 3> {
    let dims = input.dims();

    // 1. Move the target dimension last
    let mut permute_indices = [0isize; 3];
    let mut idx = 0;
    for i in 0..3 {
        if i != dim {
            permute_indices[idx] = i as isize;
            idx += 1;
        }
    }
    permute_indices[2] = dim as isize;
    let permuted = input.permute(permute_indices);

    // 2. Flatten the other dimensions into the batch: [Batch, 1, Length]
    let length = dims[dim];
    let batch: usize = (0..3).filter(|&i| i != dim).map(|i| dims[i]).product();
    let reshaped = permuted.reshape([batch, 1, length]);

    let kernel_size = kernel.dims()[0];
    let kernel = kernel.reshape([1, 1, kernel_size]);
    let options = ConvOptions::new([1], [kernel_size / 2], [1], 1);
    let output = burn::tensor::module::conv1d(reshaped, kernel, None, options);

    // 3. Restore the permuted shape, then undo the permutation
    let mut permuted_shape = [0usize; 3];
    let mut p = 0;
    for i in 0..3 {
        if i != dim {
            permuted_shape[p] = dims[i];
            p += 1;
        }
    }
    permuted_shape[2] = length;
    let output = output.reshape(Shape::new(permuted_shape));

    let mut inverse = [0isize; 3];
    for (new_pos, &old_pos) in permute_indices.iter().enumerate() {
        inverse[old_pos as usize] = new_pos as isize;
    }
    output.permute(inverse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::Point3;
    use crate::volume::{tensor_to_vec, PixelType};
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_kernel_is_normalised() {
        let k = generate_kernel(1.5, 5);
        assert_eq!(k.len(), 11);
        let sum: f32 = k.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(k[5] > k[4] && (k[4] - k[6]).abs() < 1e-7);
    }

    #[test]
    fn test_constant_volume_is_preserved() {
        let device = Default::default();
        let data = Tensor::<TestBackend, 3>::ones([6, 7, 8], &device) * 3.0;
        let volume = Volume::axis_aligned(data, Point3::origin(), Spacing3::new(1.0, 2.0, 0.5), PixelType::Continuous).unwrap();
        let out = GaussianFilter::new(1.5).apply(&volume).unwrap();
        assert_eq!(out.shape(), [6, 7, 8]);
        for v in tensor_to_vec(out.into_data()).unwrap() {
            assert!((v - 3.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_smoothing_spreads_only_along_smoothed_axis() {
        let device = Default::default();
        // single bright voxel at (x=4, y=2, z=1)
        let mut values = vec![0.0f32; 3 * 5 * 9];
        values[9 * 5 + 2 * 9 + 4] = 1.0;
        let data = Tensor::<TestBackend, 3>::from_data(TensorData::new(values, [3, 5, 9]), &device);
        let out = GaussianFilter::anisotropic([1.0, 0.0, 0.0]).apply_tensor(data, &Spacing3::repeat(1.0));
        let v = tensor_to_vec(out).unwrap();
        assert!(v[9 * 5 + 2 * 9 + 5] > 0.1);
        assert_eq!(v[9 * 5 + 3 * 9 + 4], 0.0);
        assert_eq!(v[2 * 9 + 4], 0.0);
    }
}
