//! Optimizer trait and supporting types.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Value and derivative of a cost at one parameter vector.
#[derive(Debug, Clone, PartialEq)]
pub struct CostValue {
    pub value: f64,
    pub derivative: Vec<f64>,
}

/// A differentiable objective to minimise.
pub trait CostFunction {
    fn parameter_count(&self) -> usize;

    fn evaluate(&self, parameters: &[f64]) -> Result<CostValue>;
}

/// Why an optimizer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopCondition {
    /// The scaled gradient fell below the tolerance.
    GradientMagnitudeTolerance,
    /// The step length was relaxed below its minimum.
    StepTooSmall,
    /// The iteration cap was reached first.
    MaximumIterations,
}

impl StopCondition {
    /// Whether the stop indicates convergence rather than exhaustion.
    pub fn is_converged(self) -> bool {
        !matches!(self, StopCondition::MaximumIterations)
    }
}

impl std::fmt::Display for StopCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StopCondition::GradientMagnitudeTolerance => "gradient magnitude tolerance",
            StopCondition::StepTooSmall => "step too small",
            StopCondition::MaximumIterations => "maximum iterations",
        };
        f.write_str(s)
    }
}

/// Snapshot passed to observers after every evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationState {
    pub iteration: usize,
    pub value: f64,
    pub gradient_magnitude: f64,
    pub step_length: f64,
}

/// Final state of an optimization run.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerOutcome {
    pub parameters: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
    pub stop: StopCondition,
}

/// Minimises a [`CostFunction`].
///
/// `scales` holds one positive weight per parameter expressing how strongly
/// a unit change of that parameter moves the image; the optimizer divides
/// the gradient by it so all parameters progress at comparable physical
/// rates.
pub trait Optimizer: Send + Sync {
    fn optimize(
        &self,
        cost: &dyn CostFunction,
        initial: &[f64],
        scales: &[f64],
        observer: &mut dyn FnMut(&IterationState),
    ) -> Result<OptimizerOutcome>;

    fn name(&self) -> &'static str;
}
