//! Spatial subsampling of the fixed image.
//!
//! The metric is evaluated on a fixed set of fixed-image voxels per level.
//! Random draws are seeded from `(seed, level)` so repeated runs see the
//! same samples.

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use qsmprep_core::{Point3, Volume};

use crate::error::{RegistrationError, Result};

pub const DEFAULT_SAMPLING_FRACTION: f64 = 0.01;
pub const DEFAULT_SAMPLING_SEED: u64 = 0x5eed;
/// Lower bound on the number of random samples per level (capped by the
/// voxel count), so coarse levels still fill the joint histogram.
pub const DEFAULT_MIN_SAMPLES: usize = 2048;

/// Which fixed-image voxels the metric sees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingStrategy {
    /// A seeded random subset of `fraction` of the voxels.
    Random {
        fraction: f64,
        seed: u64,
        min_samples: usize,
    },
    /// Every voxel.
    Full,
}

impl Default for SamplingStrategy {
    fn default() -> Self {
        Self::Random {
            fraction: DEFAULT_SAMPLING_FRACTION,
            seed: DEFAULT_SAMPLING_SEED,
            min_samples: DEFAULT_MIN_SAMPLES,
        }
    }
}

impl SamplingStrategy {
    pub fn random(fraction: f64, seed: u64) -> Self {
        Self::Random {
            fraction,
            seed,
            min_samples: DEFAULT_MIN_SAMPLES,
        }
    }

    pub fn seed(&self) -> Option<u64> {
        match self {
            Self::Random { seed, .. } => Some(*seed),
            Self::Full => None,
        }
    }

    /// Number of samples drawn from a grid of `voxel_count` voxels.
    pub fn sample_count(&self, voxel_count: usize) -> usize {
        match *self {
            Self::Random {
                fraction, min_samples, ..
            } => {
                let wanted = (fraction * voxel_count as f64).round() as usize;
                wanted.max(min_samples).max(1).min(voxel_count)
            }
            Self::Full => voxel_count,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Self::Random { fraction, .. } = self {
            if !(*fraction > 0.0 && *fraction <= 1.0) {
                return Err(RegistrationError::invalid_configuration(format!(
                    "sampling fraction must be in (0, 1], got {}",
                    fraction
                )));
            }
        }
        Ok(())
    }

    /// Sorted linear voxel indices for pyramid level `level`.
    pub fn draw(&self, voxel_count: usize, level: usize) -> Vec<usize> {
        match *self {
            Self::Full => (0..voxel_count).collect(),
            Self::Random { seed, .. } => {
                let count = self.sample_count(voxel_count);
                let mut rng = StdRng::seed_from_u64(seed ^ level as u64);
                let mut picked = rand::seq::index::sample(&mut rng, voxel_count, count).into_vec();
                picked.sort_unstable();
                picked
            }
        }
    }
}

/// Fixed-image samples for one pyramid level, held as constant tensors.
#[derive(Debug, Clone)]
pub struct FixedSamples<B: Backend> {
    /// Physical positions relative to the centre of rotation, `[N, 3]`.
    pub offsets: Tensor<B, 2>,
    /// Fixed intensities, `[N]`.
    pub values: Tensor<B, 1>,
    /// Intensity range of the fixed level.
    pub range: (f32, f32),
    pub center: Point3,
    pub count: usize,
}

impl<B: Backend> FixedSamples<B> {
    pub fn draw(fixed: &Volume<B>, strategy: &SamplingStrategy, level: usize, center: Point3) -> Result<Self> {
        let device = fixed.device();
        let [nx, ny, _] = fixed.size();
        let values = fixed.to_vec()?;
        let picked = strategy.draw(values.len(), level);
        let count = picked.len();

        let mut offsets = Vec::with_capacity(count * 3);
        let mut sampled = Vec::with_capacity(count);
        let (mut lo, mut hi) = (f32::INFINITY, f32::NEG_INFINITY);
        for &i in &picked {
            let index = Point3::new((i % nx) as f64, ((i / nx) % ny) as f64, (i / (nx * ny)) as f64);
            let p = fixed.index_to_physical(&index) - center;
            offsets.extend([p[0] as f32, p[1] as f32, p[2] as f32]);
            sampled.push(values[i]);
        }
        for &v in &values {
            lo = lo.min(v);
            hi = hi.max(v);
        }
        if !(hi - lo > 1e-12) {
            return Err(RegistrationError::degenerate(format!(
                "fixed level {} has no intensity range",
                level
            )));
        }

        Ok(Self {
            offsets: Tensor::from_data(TensorData::new(offsets, [count, 3]), &device),
            values: Tensor::from_data(TensorData::new(sampled, [count]), &device),
            range: (lo, hi),
            center,
            count,
        })
    }
}
