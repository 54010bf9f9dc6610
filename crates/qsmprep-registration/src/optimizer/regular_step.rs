//! Regular-step gradient descent.

use serde::{Deserialize, Serialize};

use super::trait_::{CostFunction, IterationState, Optimizer, OptimizerOutcome, StopCondition};
use crate::error::{RegistrationError, Result};

/// Gradient descent taking steps of fixed length along the scaled negative
/// gradient; the step length is multiplied by `relaxation` whenever the
/// gradient direction reverses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegularStepGradientDescent {
    /// Initial step length.
    pub learning_rate: f64,
    pub min_step: f64,
    /// Step multiplier on direction reversal, in `(0, 1)`.
    pub relaxation: f64,
    pub gradient_tolerance: f64,
    pub max_iterations: usize,
}

impl Default for RegularStepGradientDescent {
    fn default() -> Self {
        Self {
            learning_rate: 2.0,
            min_step: 1e-4,
            relaxation: 0.5,
            gradient_tolerance: 1e-8,
            max_iterations: 200,
        }
    }
}

impl RegularStepGradientDescent {
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate > 0.0) {
            return Err(RegistrationError::invalid_configuration(format!(
                "learning rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !(self.relaxation > 0.0 && self.relaxation < 1.0) {
            return Err(RegistrationError::invalid_configuration(format!(
                "relaxation must be in (0, 1), got {}",
                self.relaxation
            )));
        }
        if !(self.min_step > 0.0) || self.gradient_tolerance < 0.0 {
            return Err(RegistrationError::invalid_configuration(
                "min step must be positive and gradient tolerance non-negative",
            ));
        }
        if self.max_iterations == 0 {
            return Err(RegistrationError::invalid_configuration("max iterations must be positive"));
        }
        Ok(())
    }
}

impl Optimizer for RegularStepGradientDescent {
    fn optimize(
        &self,
        cost: &dyn CostFunction,
        initial: &[f64],
        scales: &[f64],
        observer: &mut dyn FnMut(&IterationState),
    ) -> Result<OptimizerOutcome> {
        let n = cost.parameter_count();
        if initial.len() != n || scales.len() != n {
            return Err(RegistrationError::invalid_configuration(format!(
                "optimizer expects {} parameters, got {} values and {} scales",
                n,
                initial.len(),
                scales.len()
            )));
        }

        let mut parameters = initial.to_vec();
        let mut step = self.learning_rate;
        let mut previous: Option<Vec<f64>> = None;
        let mut value = f64::NAN;

        for iteration in 0..self.max_iterations {
            let evaluated = cost.evaluate(&parameters)?;
            value = evaluated.value;
            let scaled: Vec<f64> = evaluated
                .derivative
                .iter()
                .zip(scales)
                .map(|(g, s)| g / s)
                .collect();
            let magnitude = scaled.iter().map(|g| g * g).sum::<f64>().sqrt();
            if !value.is_finite() || !magnitude.is_finite() {
                return Err(RegistrationError::numerical_instability(format!(
                    "metric value {} with gradient magnitude {} at iteration {}",
                    value, magnitude, iteration
                )));
            }

            observer(&IterationState {
                iteration,
                value,
                gradient_magnitude: magnitude,
                step_length: step,
            });

            if magnitude < self.gradient_tolerance {
                return Ok(OptimizerOutcome {
                    parameters,
                    value,
                    iterations: iteration + 1,
                    stop: StopCondition::GradientMagnitudeTolerance,
                });
            }

            if let Some(prev) = &previous {
                let dot: f64 = scaled.iter().zip(prev).map(|(a, b)| a * b).sum();
                if dot < 0.0 {
                    step *= self.relaxation;
                }
            }
            if step < self.min_step {
                return Ok(OptimizerOutcome {
                    parameters,
                    value,
                    iterations: iteration + 1,
                    stop: StopCondition::StepTooSmall,
                });
            }

            let factor = step / magnitude;
            for (p, g) in parameters.iter_mut().zip(&scaled) {
                *p -= factor * g;
            }
            previous = Some(scaled);
        }

        Ok(OptimizerOutcome {
            parameters,
            value,
            iterations: self.max_iterations,
            stop: StopCondition::MaximumIterations,
        })
    }

    fn name(&self) -> &'static str {
        "RegularStepGradientDescent"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::CostValue;

    /// `sum w_i (p_i - target_i)^2`
    struct Quadratic {
        target: Vec<f64>,
        weights: Vec<f64>,
    }

    impl CostFunction for Quadratic {
        fn parameter_count(&self) -> usize {
            self.target.len()
        }

        fn evaluate(&self, p: &[f64]) -> Result<CostValue> {
            let mut value = 0.0;
            let mut derivative = Vec::with_capacity(p.len());
            for ((x, t), w) in p.iter().zip(&self.target).zip(&self.weights) {
                value += w * (x - t).powi(2);
                derivative.push(2.0 * w * (x - t));
            }
            Ok(CostValue { value, derivative })
        }
    }

    #[test]
    fn test_reaches_minimum_of_bowl() {
        let cost = Quadratic {
            target: vec![3.0, -2.0],
            weights: vec![1.0, 1.0],
        };
        let optimizer = RegularStepGradientDescent::default();
        let mut seen = 0;
        let outcome = optimizer
            .optimize(&cost, &[0.0, 0.0], &[1.0, 1.0], &mut |_| seen += 1)
            .unwrap();
        assert!(outcome.stop.is_converged(), "stopped on {}", outcome.stop);
        assert!((outcome.parameters[0] - 3.0).abs() < 1e-3);
        assert!((outcome.parameters[1] + 2.0).abs() < 1e-3);
        assert_eq!(seen, outcome.iterations);
    }

    #[test]
    fn test_iteration_cap_is_reported() {
        let cost = Quadratic {
            target: vec![1000.0],
            weights: vec![1.0],
        };
        let optimizer = RegularStepGradientDescent {
            max_iterations: 5,
            ..Default::default()
        };
        let outcome = optimizer.optimize(&cost, &[0.0], &[1.0], &mut |_| {}).unwrap();
        assert_eq!(outcome.stop, StopCondition::MaximumIterations);
        assert_eq!(outcome.iterations, 5);
        assert!((outcome.parameters[0] - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_scales_balance_parameters() {
        // the second parameter is 100x more sensitive
        let cost = Quadratic {
            target: vec![4.0, 0.04],
            weights: vec![1.0, 10_000.0],
        };
        let optimizer = RegularStepGradientDescent::default();
        let outcome = optimizer
            .optimize(&cost, &[0.0, 0.0], &[1.0, 10_000.0], &mut |_| {})
            .unwrap();
        assert!((outcome.parameters[0] - 4.0).abs() < 1e-3);
        assert!((outcome.parameters[1] - 0.04).abs() < 1e-4);
    }

    #[test]
    fn test_zero_gradient_stops_immediately() {
        let cost = Quadratic {
            target: vec![0.0],
            weights: vec![1.0],
        };
        let outcome = RegularStepGradientDescent::default()
            .optimize(&cost, &[0.0], &[1.0], &mut |_| {})
            .unwrap();
        assert_eq!(outcome.stop, StopCondition::GradientMagnitudeTolerance);
        assert_eq!(outcome.iterations, 1);
    }

    #[test]
    fn test_invalid_settings() {
        let bad = RegularStepGradientDescent {
            relaxation: 1.5,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        assert!(RegularStepGradientDescent::default().validate().is_ok());
    }
}
