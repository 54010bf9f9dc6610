//! Registration settings.

use serde::{Deserialize, Serialize};

use qsmprep_core::filter::PyramidLevel;

use crate::error::{RegistrationError, Result};
use crate::initializer::InitializerMode;
use crate::metric::MetricKind;
use crate::optimizer::RegularStepGradientDescent;
use crate::sampling::SamplingStrategy;
use crate::scales::DEFAULT_PARAMETER_DELTA;

pub const DEFAULT_MIN_VOXEL_COUNT: usize = 64;
pub const DEFAULT_MIN_DETERMINANT: f64 = 1e-3;

/// Complete configuration of a registration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Coarse-to-fine schedule; sigmas are in mm.
    pub levels: Vec<PyramidLevel>,
    pub optimizer: RegularStepGradientDescent,
    pub metric: MetricKind,
    pub sampling: SamplingStrategy,
    pub initializer: InitializerMode,
    /// Smallest accepted voxel count of either input.
    pub min_voxel_count: usize,
    /// Smallest accepted `|det A|` of the estimated transform.
    pub min_determinant: f64,
    /// Parameter nudge used to estimate scales.
    pub parameter_delta: f64,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            levels: PyramidLevel::default_schedule(),
            optimizer: RegularStepGradientDescent::default(),
            metric: MetricKind::default(),
            sampling: SamplingStrategy::default(),
            initializer: InitializerMode::default(),
            min_voxel_count: DEFAULT_MIN_VOXEL_COUNT,
            min_determinant: DEFAULT_MIN_DETERMINANT,
            parameter_delta: DEFAULT_PARAMETER_DELTA,
        }
    }
}

impl RegistrationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the schedule from matched shrink-factor and sigma lists.
    pub fn with_schedule(mut self, shrink_factors: &[usize], smoothing_sigmas: &[f64]) -> Result<Self> {
        self.levels = PyramidLevel::schedule(shrink_factors, smoothing_sigmas)?;
        Ok(self)
    }

    pub fn with_max_iterations(mut self, iterations: usize) -> Self {
        self.optimizer.max_iterations = iterations;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.optimizer.learning_rate = learning_rate;
        self
    }

    pub fn with_metric(mut self, metric: MetricKind) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_sampling(mut self, sampling: SamplingStrategy) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn with_initializer(mut self, initializer: InitializerMode) -> Self {
        self.initializer = initializer;
        self
    }

    pub fn with_min_determinant(mut self, floor: f64) -> Self {
        self.min_determinant = floor;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.levels.is_empty() {
            return Err(RegistrationError::invalid_configuration("schedule has no levels"));
        }
        for level in &self.levels {
            if level.shrink_factor == 0 || !(level.smoothing_sigma >= 0.0) {
                return Err(RegistrationError::invalid_configuration(format!(
                    "invalid schedule level {:?}",
                    level
                )));
            }
        }
        self.optimizer.validate()?;
        self.sampling.validate()?;
        if let MetricKind::MattesMutualInformation { bins } = self.metric {
            if bins < 4 {
                return Err(RegistrationError::invalid_configuration(format!(
                    "histogram needs at least 4 bins, got {}",
                    bins
                )));
            }
        }
        if !(self.min_determinant > 0.0) || !(self.parameter_delta > 0.0) {
            return Err(RegistrationError::invalid_configuration(
                "determinant floor and parameter delta must be positive",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = RegistrationConfig::default();
        config.validate().unwrap();
        assert_eq!(config.levels.len(), 3);
        assert_eq!(config.optimizer.max_iterations, 200);
        assert_eq!(config.sampling.seed(), Some(0x5eed));
    }

    #[test]
    fn test_mismatched_schedule_rejected() {
        assert!(RegistrationConfig::new().with_schedule(&[4, 2, 1], &[2.0, 1.0]).is_err());
        let config = RegistrationConfig::new().with_schedule(&[2, 1], &[1.0, 0.0]).unwrap();
        assert_eq!(config.levels.len(), 2);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(RegistrationConfig::new().with_learning_rate(0.0).validate().is_err());
        assert!(RegistrationConfig::new().with_max_iterations(0).validate().is_err());
        assert!(RegistrationConfig::new()
            .with_metric(MetricKind::MattesMutualInformation { bins: 2 })
            .validate()
            .is_err());
        let mut config = RegistrationConfig::new();
        config.levels.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: RegistrationConfig =
            serde_json::from_str(r#"{"min_voxel_count": 10, "initializer": "moments"}"#).unwrap();
        assert_eq!(config.min_voxel_count, 10);
        assert_eq!(config.initializer, InitializerMode::Moments);
        assert_eq!(config.levels, RegistrationConfig::default().levels);
    }
}
