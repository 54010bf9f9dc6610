//! Multi-resolution registration engine.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

use burn::tensor::backend::AutodiffBackend;

use qsmprep_core::filter::MultiResolutionPyramid;
use qsmprep_core::{Transform, TransformKind, Volume};

use crate::config::RegistrationConfig;
use crate::error::Result;
use crate::initializer::CenteredInitializer;
use crate::metric::MetricCost;
use crate::optimizer::{IterationState, Optimizer};
use crate::progress::{ProgressCallback, ProgressInfo};
use crate::result::{LevelReport, RegistrationResult};
use crate::sampling::FixedSamples;
use crate::scales::physical_shift_scales;
use crate::validation::{check_determinant, validate_volume};

/// Estimates the transform aligning a moving volume to a fixed one.
///
/// The run centres the two volumes, then optimises the fixed-to-moving
/// transform level by level on smoothed, shrunk copies; each level starts
/// from the previous level's estimate. All levels share one set of
/// parameter scales measured on the full-resolution fixed grid.
pub struct RegistrationEngine<B: AutodiffBackend> {
    config: RegistrationConfig,
    optimizer: Box<dyn Optimizer>,
    callbacks: Vec<Arc<dyn ProgressCallback>>,
    _backend: PhantomData<fn() -> B>,
}

impl<B: AutodiffBackend> RegistrationEngine<B> {
    pub fn new(config: RegistrationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            optimizer: Box::new(config.optimizer),
            config,
            callbacks: Vec::new(),
            _backend: PhantomData,
        })
    }

    /// Replace the optimizer built from the configuration.
    pub fn with_optimizer(mut self, optimizer: Box<dyn Optimizer>) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn with_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.callbacks.push(callback);
        self
    }

    pub fn config(&self) -> &RegistrationConfig {
        &self.config
    }

    /// Register `moving` onto `fixed` with a transform of the given kind.
    ///
    /// # Errors
    /// * `DegenerateInput` when either volume is too small or constant, or
    ///   when too few samples land inside the moving image.
    /// * `NonInvertibleTransform` when the estimate's determinant falls
    ///   below the configured floor.
    pub fn estimate_transform(
        &self,
        fixed: &Volume<B>,
        moving: &Volume<B>,
        kind: TransformKind,
    ) -> Result<RegistrationResult> {
        let started = Instant::now();
        let config = &self.config;
        validate_volume(fixed, "fixed", config.min_voxel_count)?;
        validate_volume(moving, "moving", config.min_voxel_count)?;

        let initial = CenteredInitializer::new(config.initializer).initialize(fixed, moving, kind)?;
        let center = *initial.center();
        let scales = physical_shift_scales(&initial, &fixed.grid().corners(), config.parameter_delta)?;

        let fixed_pyramid = MultiResolutionPyramid::new(fixed, &config.levels)?;
        let moving_pyramid = MultiResolutionPyramid::new(moving, &config.levels)?;
        let metric = config.metric.build::<B>();
        let level_count = config.levels.len();

        tracing::info!(
            %kind,
            metric = metric.name(),
            optimizer = self.optimizer.name(),
            levels = level_count,
            "starting registration"
        );

        let mut parameters = initial.parameters().to_vec();
        let mut reports = Vec::with_capacity(level_count);
        for (index, ((level, fixed_level), (_, moving_level))) in
            fixed_pyramid.iter().zip(moving_pyramid.iter()).enumerate()
        {
            let samples = FixedSamples::draw(fixed_level, &config.sampling, index, center)?;
            let moving_stats = moving_level.statistics()?;
            let moving_range = (moving_stats.min as f32, moving_stats.max as f32);
            for callback in &self.callbacks {
                callback.on_level_start(index, level.shrink_factor, samples.count);
            }

            let cost = MetricCost::new(metric.as_ref(), &samples, moving_level, moving_range, kind);
            let max_iterations = config.optimizer.max_iterations;
            let mut observer = |state: &IterationState| {
                let info = ProgressInfo {
                    level: index,
                    levels: level_count,
                    iteration: state.iteration,
                    max_iterations,
                    metric: state.value,
                    gradient_magnitude: state.gradient_magnitude,
                    step_length: state.step_length,
                    elapsed: started.elapsed(),
                };
                for callback in &self.callbacks {
                    callback.on_progress(&info);
                }
            };
            let outcome = self.optimizer.optimize(&cost, &parameters, &scales, &mut observer)?;

            for callback in &self.callbacks {
                callback.on_level_complete(index, outcome.stop, outcome.value);
            }
            tracing::debug!(
                level = index,
                iterations = outcome.iterations,
                metric = outcome.value,
                stop = %outcome.stop,
                "level finished"
            );
            reports.push(LevelReport {
                level: index,
                shrink_factor: level.shrink_factor,
                smoothing_sigma: level.smoothing_sigma,
                samples: samples.count,
                iterations: outcome.iterations,
                metric: outcome.value,
                stop: outcome.stop,
            });
            parameters = outcome.parameters;
        }

        let estimated = Transform::from_parameters(kind, &parameters, center)?;
        check_determinant(&estimated, config.min_determinant)?;
        let result = RegistrationResult::new(estimated.inverse()?, initial, reports);

        if result.converged() {
            tracing::info!(
                iterations = result.iterations(),
                metric = result.final_metric(),
                elapsed_s = started.elapsed().as_secs_f64(),
                "registration converged"
            );
        } else {
            tracing::warn!(
                iterations = result.iterations(),
                metric = result.final_metric(),
                "registration hit the iteration cap without converging"
            );
        }
        Ok(result)
    }
}
