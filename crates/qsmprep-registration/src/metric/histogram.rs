//! Differentiable joint histogram using Parzen windowing.

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};

/// Samples per matmul chunk.
const CHUNK_SIZE: usize = 32768;

/// Joint histogram calculator using Gaussian Parzen windows.
#[derive(Clone, Debug)]
pub struct ParzenJointHistogram {
    /// Number of bins per axis.
    pub num_bins: usize,
    /// Parzen window sigma, in bins.
    pub parzen_sigma: f32,
}

impl ParzenJointHistogram {
    pub fn new(num_bins: usize, parzen_sigma: f32) -> Self {
        Self { num_bins, parzen_sigma }
    }

    /// Map intensities in `range` onto `[0, num_bins - 1]`.
    fn normalize<B: Backend>(&self, values: Tensor<B, 1>, range: (f32, f32)) -> Tensor<B, 1> {
        let top = self.num_bins as f32 - 1.0;
        let width = (range.1 - range.0).max(f32::EPSILON);
        ((values - range.0) * (top / width)).clamp(0.0, top)
    }

    /// Parzen weights `[N, Bins]` of already normalised values.
    fn weights<B: Backend>(&self, values: Tensor<B, 1>) -> Tensor<B, 2> {
        let device = values.device();
        let [n] = values.dims();
        let bins = Tensor::<B, 1, Int>::arange(0..self.num_bins as i64, &device)
            .float()
            .reshape([1, self.num_bins]);
        let diff = values.reshape([n, 1]) - bins;
        (diff.powf_scalar(2.0) * (-0.5 / (self.parzen_sigma * self.parzen_sigma))).exp()
    }

    /// Soft joint histogram `[Bins, Bins]` (fixed rows, moving columns).
    /// Each sample contributes with weight `sample_weight`.
    pub fn joint<B: Backend>(
        &self,
        fixed: Tensor<B, 1>,
        moving: Tensor<B, 1>,
        sample_weight: Tensor<B, 1>,
        fixed_range: (f32, f32),
        moving_range: (f32, f32),
    ) -> Tensor<B, 2> {
        let device = fixed.device();
        let [n] = fixed.dims();
        let mut joint = Tensor::<B, 2>::zeros([self.num_bins, self.num_bins], &device);
        let mut start = 0;
        while start < n {
            let end = (start + CHUNK_SIZE).min(n);
            let len = end - start;
            let f = self.normalize(fixed.clone().slice([start..end]), fixed_range);
            let m = self.normalize(moving.clone().slice([start..end]), moving_range);
            let w = sample_weight.clone().slice([start..end]).reshape([len, 1]);
            let wf = self.weights(f) * w;
            let wm = self.weights(m);
            joint = joint + wf.transpose().matmul(wm);
            start = end;
        }
        joint
    }

    /// Mutual information (nats) of a joint histogram, `[1]`.
    pub fn mutual_information<B: Backend>(joint: Tensor<B, 2>) -> Tensor<B, 1> {
        let eps = 1e-10;
        let total = joint.clone().sum().reshape([1, 1]) + eps;
        let p = joint / total;
        let p_fixed = p.clone().sum_dim(1); // [Bins, 1]
        let p_moving = p.clone().sum_dim(0); // [1, Bins]
        let log_ratio = (p.clone() + eps).log() - (p_fixed + eps).log() - (p_moving + eps).log();
        (p * log_ratio).sum()
    }
}
