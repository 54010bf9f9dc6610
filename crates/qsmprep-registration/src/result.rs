use serde::{Deserialize, Serialize};

use qsmprep_core::Transform;

use crate::optimizer::StopCondition;

/// What happened at one pyramid level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelReport {
    pub level: usize,
    pub shrink_factor: usize,
    pub smoothing_sigma: f64,
    pub samples: usize,
    pub iterations: usize,
    pub metric: f64,
    pub stop: StopCondition,
}

/// Outcome of one registration of a (fixed, moving) pair.
///
/// `transform` maps moving physical points onto fixed physical points, so
/// it can be handed straight to the resampler to bring moving-space data
/// into the fixed grid. Its inverse is the fixed-to-moving mapping the
/// optimizer worked on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationResult {
    transform: Transform,
    initial: Transform,
    iterations: usize,
    final_metric: f64,
    converged: bool,
    levels: Vec<LevelReport>,
}

impl RegistrationResult {
    pub(crate) fn new(transform: Transform, initial: Transform, levels: Vec<LevelReport>) -> Self {
        let iterations = levels.iter().map(|l| l.iterations).sum();
        let final_metric = levels.last().map(|l| l.metric).unwrap_or(f64::NAN);
        let converged = levels.last().map(|l| l.stop.is_converged()).unwrap_or(false);
        Self {
            transform,
            initial,
            iterations,
            final_metric,
            converged,
            levels,
        }
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    /// The fixed-to-moving starting point produced by the initializer.
    pub fn initial_transform(&self) -> &Transform {
        &self.initial
    }

    /// Optimizer iterations summed over all levels.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Metric value at the finest level.
    pub fn final_metric(&self) -> f64 {
        self.final_metric
    }

    /// Whether the finest level stopped on a convergence criterion rather
    /// than the iteration cap.
    pub fn converged(&self) -> bool {
        self.converged
    }

    pub fn levels(&self) -> &[LevelReport] {
        &self.levels
    }

    pub fn into_transform(self) -> Transform {
        self.transform
    }
}
