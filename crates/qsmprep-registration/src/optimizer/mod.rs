//! Optimizers over a transform's parameter vector.
//!
//! Optimizers only see a [`CostFunction`]; the metric, the sampling and the
//! transform parametrisation stay behind it, so another optimizer can be
//! dropped in without touching the registration engine.

pub mod trait_;
pub mod regular_step;

pub use trait_::{CostFunction, CostValue, IterationState, Optimizer, OptimizerOutcome, StopCondition};
pub use regular_step::RegularStepGradientDescent;
