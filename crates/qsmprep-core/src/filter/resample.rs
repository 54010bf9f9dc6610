use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use nalgebra::Matrix3;

use crate::error::{CoreError, Result};
use crate::interpolation::{InterpolationPolicy, Interpolator, LinearInterpolator, NearestNeighborInterpolator};
use crate::spatial::{split_homogeneous, Affine4};
use crate::transform::Transform;
use crate::volume::{index_block, GridSpec, Volume};

/// Voxels processed per batch.
const CHUNK_SIZE: usize = 1 << 18;

/// Samples a volume onto a reference grid through a transform.
///
/// `transform` maps source physical space to reference physical space.
/// For every reference voxel the resampler computes
/// `source_index = source_affine^-1 * transform^-1 * reference_affine * index`
/// (composed once in `f64`), samples the source there and writes
/// `fill_value` wherever the position falls outside the source.
///
/// The output carries the reference grid exactly and the source pixel type.
#[derive(Debug, Clone, Copy, Default)]
pub struct Resampler;

impl Resampler {
    pub fn new() -> Self {
        Self
    }

    pub fn resample<B: Backend>(
        &self,
        source: &Volume<B>,
        reference: &GridSpec,
        transform: &Transform,
        policy: InterpolationPolicy,
        fill_value: f64,
    ) -> Result<Volume<B>> {
        if !policy.is_permitted_for(source.pixel_type()) {
            return Err(CoreError::invalid(format!(
                "{} interpolation is not allowed for {} data",
                policy,
                source.pixel_type()
            )));
        }
        let inverse = transform.inverse()?;
        let mapping = reference_to_source(reference, &inverse, source.grid());
        let (linear, offset) = split_homogeneous(&mapping);

        tracing::debug!(
            size = ?reference.size(),
            %policy,
            kind = %transform.kind(),
            "resampling volume"
        );

        let data = match policy {
            InterpolationPolicy::Linear => sample_grid(&LinearInterpolator::new(), source, reference, &linear, &offset, fill_value),
            InterpolationPolicy::NearestNeighbor => {
                sample_grid(&NearestNeighborInterpolator::new(), source, reference, &linear, &offset, fill_value)
            }
        };
        Volume::from_grid(data, reference.clone(), source.pixel_type())
    }
}

/// Resample `source` into the space of `reference`; see [`Resampler`].
pub fn resample<B: Backend>(
    source: &Volume<B>,
    reference: &GridSpec,
    transform: &Transform,
    policy: InterpolationPolicy,
    fill_value: f64,
) -> Result<Volume<B>> {
    Resampler::new().resample(source, reference, transform, policy, fill_value)
}

/// Reference voxel index to source continuous index.
fn reference_to_source(reference: &GridSpec, inverse: &Transform, source: &GridSpec) -> Affine4 {
    source.inverse_affine() * inverse.to_homogeneous() * reference.physical_affine()
}

fn sample_grid<B: Backend, I: Interpolator<B>>(
    interpolator: &I,
    source: &Volume<B>,
    reference: &GridSpec,
    linear: &Matrix3<f64>,
    offset: &nalgebra::Vector3<f64>,
    fill_value: f64,
) -> Tensor<B, 3> {
    let device = source.device();
    let dims = source.shape();
    let total = reference.voxel_count();
    let size = reference.size();

    // rows @ linear^T
    let mut m = Vec::with_capacity(9);
    for r in 0..3 {
        for c in 0..3 {
            m.push(linear[(c, r)] as f32);
        }
    }
    let m = Tensor::<B, 2>::from_data(TensorData::new(m, [3, 3]), &device);
    let t = Tensor::<B, 2>::from_data(
        TensorData::new(vec![offset[0] as f32, offset[1] as f32, offset[2] as f32], [1, 3]),
        &device,
    );

    let mut chunks = Vec::with_capacity(total.div_ceil(CHUNK_SIZE));
    let mut start = 0;
    while start < total {
        let end = (start + CHUNK_SIZE).min(total);
        let n = end - start;
        let idx = Tensor::<B, 2>::from_data(TensorData::new(index_block(size, start, end), [n, 3]), &device);
        let src = idx.matmul(m.clone()) + t.clone();

        let values = interpolator.interpolate(source.data(), src.clone());
        let outside = interpolator.inside(dims, src).lower_elem(0.5);
        chunks.push(values.mask_fill(outside, fill_value));
        start = end;
    }

    Tensor::cat(chunks, 0).reshape(reference.shape())
}
