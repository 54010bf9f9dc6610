use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};

use super::downsample::DownsampleFilter;
use super::gaussian::GaussianFilter;
use crate::error::{CoreError, Result};
use crate::volume::Volume;

/// One level of a coarse-to-fine schedule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PyramidLevel {
    /// Integer shrink factor applied on every axis.
    pub shrink_factor: usize,
    /// Smoothing sigma in mm applied before shrinking.
    pub smoothing_sigma: f64,
}

impl PyramidLevel {
    /// Shrink factors `[4, 2, 1]` with sigmas `[2, 1, 0]` mm.
    pub fn default_schedule() -> Vec<PyramidLevel> {
        [(4, 2.0), (2, 1.0), (1, 0.0)]
            .into_iter()
            .map(|(shrink_factor, smoothing_sigma)| PyramidLevel {
                shrink_factor,
                smoothing_sigma,
            })
            .collect()
    }

    /// Zip matched shrink and sigma sequences into a schedule.
    pub fn schedule(shrink_factors: &[usize], smoothing_sigmas: &[f64]) -> Result<Vec<PyramidLevel>> {
        if shrink_factors.len() != smoothing_sigmas.len() {
            return Err(CoreError::invalid(format!(
                "{} shrink factors but {} smoothing sigmas",
                shrink_factors.len(),
                smoothing_sigmas.len()
            )));
        }
        Ok(shrink_factors
            .iter()
            .zip(smoothing_sigmas)
            .map(|(&shrink_factor, &smoothing_sigma)| PyramidLevel {
                shrink_factor,
                smoothing_sigma,
            })
            .collect())
    }
}

/// Smoothed and shrunk copies of a volume, coarsest level first.
#[derive(Debug, Clone)]
pub struct MultiResolutionPyramid<B: Backend> {
    levels: Vec<Volume<B>>,
    schedule: Vec<PyramidLevel>,
}

impl<B: Backend> MultiResolutionPyramid<B> {
    pub fn new(input: &Volume<B>, schedule: &[PyramidLevel]) -> Result<Self> {
        if schedule.is_empty() {
            return Err(CoreError::invalid("pyramid schedule is empty"));
        }
        let mut levels = Vec::with_capacity(schedule.len());
        for level in schedule {
            if level.shrink_factor == 0 || level.smoothing_sigma < 0.0 {
                return Err(CoreError::invalid(format!("invalid pyramid level {:?}", level)));
            }
            let identity_shrink = level.shrink_factor == 1;
            let identity_smooth = level.smoothing_sigma <= 1e-6;
            if identity_shrink && identity_smooth {
                levels.push(input.clone());
                continue;
            }

            let smoothed = if identity_smooth {
                input.clone()
            } else {
                GaussianFilter::new(level.smoothing_sigma).apply(input)?
            };
            let shrunk = if identity_shrink {
                smoothed
            } else {
                DownsampleFilter::new(level.shrink_factor).apply(&smoothed)?
            };
            levels.push(shrunk);
        }
        Ok(Self {
            levels,
            schedule: schedule.to_vec(),
        })
    }

    pub fn level(&self, index: usize) -> Option<&Volume<B>> {
        self.levels.get(index)
    }

    pub fn levels(&self) -> usize {
        self.levels.len()
    }

    pub fn schedule(&self) -> &[PyramidLevel] {
        &self.schedule
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PyramidLevel, &Volume<B>)> {
        self.schedule.iter().zip(self.levels.iter())
    }
}
