//! The transform propagation state machine.
//!
//! A case moves through `Estimate -> ApplyPrimary -> ApplyDependents` and
//! never back. Estimate and ApplyPrimary failures end the case; dependent
//! failures are recorded one by one and the remaining dependents still run.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

use burn::tensor::backend::AutodiffBackend;

use qsmprep_core::{resample, GridSpec, InterpolationPolicy, Transform, Volume};
use qsmprep_registration::validation::check_determinant;
use qsmprep_registration::{ProgressCallback, RegistrationEngine, RegistrationResult};

use crate::config::PipelineConfig;
use crate::deadline::with_deadline;
use crate::error::{PipelineError, Result, Stage};
use crate::report::{CaseReport, DependentOutcome, RegistrationSummary};
use crate::store::{TransformStore, VolumeSink, VolumeSource};

/// Grid agreement tolerance in mm.
const GRID_TOLERANCE: f64 = 1e-4;

/// Registers a primary modality to a reference and carries the resulting
/// transform, unchanged, to every dependent volume of the case.
pub struct TransformPropagation<B: AutodiffBackend> {
    config: PipelineConfig,
    callbacks: Vec<Arc<dyn ProgressCallback>>,
    _backend: PhantomData<fn() -> B>,
}

impl<B: AutodiffBackend> TransformPropagation<B> {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            callbacks: Vec::new(),
            _backend: PhantomData,
        })
    }

    pub fn with_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.callbacks.push(callback);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Estimate, persist and apply the case transform.
    pub fn run_case<S, K, T>(&self, case_id: &str, source: &S, sink: &K, store: &T) -> CaseReport
    where
        S: VolumeSource<B> + ?Sized,
        K: VolumeSink<B> + ?Sized,
        T: TransformStore + ?Sized,
    {
        let started = Instant::now();
        let mut report = CaseReport::new(case_id);
        let span = tracing::info_span!("case", id = case_id);
        let _guard = span.enter();

        let inputs = self
            .load(source, &self.config.reference_key)
            .and_then(|reference| Ok((reference, self.load(source, &self.config.primary_key)?)));
        let (reference, primary) = match inputs {
            Ok(inputs) => inputs,
            Err(err) => return finish(report, Stage::Load, &err, started),
        };

        tracing::info!(stage = %Stage::Estimate, kind = %self.config.transform_kind, "estimating transform");
        let result = match self.estimate(&reference, &primary) {
            Ok(result) => result,
            Err(err) => return finish(report, Stage::Estimate, &err, started),
        };
        report.registration = Some(RegistrationSummary::from(&result));
        let transform = result.into_transform();

        tracing::info!(stage = %Stage::ApplyPrimary, "applying transform to primary");
        if let Err(err) = store.save(&self.config.transform_key, &transform) {
            return finish(report, Stage::ApplyPrimary, &err, started);
        }
        report.transform = Some(transform.clone());
        match self.apply_one(&self.config.primary_key, &primary, &reference, &transform, sink) {
            Ok(outcome) => report.primary = Some(outcome),
            Err(err) => return finish(report, Stage::ApplyPrimary, &err, started),
        }

        self.apply_dependents(&mut report, source, sink, &reference, Some(primary.grid()), &transform);
        report.elapsed_ms = started.elapsed().as_millis() as u64;
        report.conclude();
        report
    }

    /// Apply a previously persisted transform to the dependents only.
    ///
    /// Used for later visits or separate invocations: no estimation takes
    /// place and the primary is not resampled. When the primary volume is
    /// available its grid is still used to check the dependents.
    pub fn apply_dependents_from_store<S, K, T>(&self, case_id: &str, source: &S, sink: &K, store: &T) -> CaseReport
    where
        S: VolumeSource<B> + ?Sized,
        K: VolumeSink<B> + ?Sized,
        T: TransformStore + ?Sized,
    {
        let started = Instant::now();
        let mut report = CaseReport::new(case_id);
        let span = tracing::info_span!("case", id = case_id);
        let _guard = span.enter();

        let reference = match self.load(source, &self.config.reference_key) {
            Ok(reference) => reference,
            Err(err) => return finish(report, Stage::Load, &err, started),
        };
        let transform = match store.load(&self.config.transform_key) {
            Ok(transform) => transform,
            Err(err) => return finish(report, Stage::Load, &err, started),
        };
        if let Err(err) = check_determinant(&transform, self.config.registration.min_determinant) {
            return finish(report, Stage::ApplyDependents, &PipelineError::from(err), started);
        }
        report.transform = Some(transform.clone());

        let primary_grid = match self.load(source, &self.config.primary_key) {
            Ok(primary) => Some(primary.grid().clone()),
            Err(err) => {
                tracing::debug!(error = %err, "primary unavailable, skipping extent checks against it");
                None
            }
        };
        self.apply_dependents(&mut report, source, sink, &reference, primary_grid.as_ref(), &transform);
        report.elapsed_ms = started.elapsed().as_millis() as u64;
        report.conclude();
        report
    }

    fn load<S: VolumeSource<B> + ?Sized>(&self, source: &S, key: &str) -> Result<Volume<B>> {
        let volume = source.load(key)?;
        Ok(match self.config.pixel_type_of(key) {
            Some(pixel_type) => volume.with_pixel_type(pixel_type),
            None => volume,
        })
    }

    fn estimate(&self, reference: &Volume<B>, primary: &Volume<B>) -> Result<RegistrationResult> {
        let config = self.config.registration.clone();
        let kind = self.config.transform_kind;
        let callbacks = self.callbacks.clone();
        let fixed = reference.clone();
        let moving = primary.clone();
        with_deadline(self.config.estimate_timeout(), move || {
            let mut engine = RegistrationEngine::<B>::new(config)?;
            for callback in callbacks {
                engine = engine.with_callback(callback);
            }
            Ok(engine.estimate_transform(&fixed, &moving, kind)?)
        })
    }

    fn apply_dependents<S, K>(
        &self,
        report: &mut CaseReport,
        source: &S,
        sink: &K,
        reference: &Volume<B>,
        primary_grid: Option<&GridSpec>,
        transform: &Transform,
    ) where
        S: VolumeSource<B> + ?Sized,
        K: VolumeSink<B> + ?Sized,
    {
        tracing::info!(
            stage = %Stage::ApplyDependents,
            count = self.config.dependent_keys.len(),
            "applying transform to dependents"
        );
        for key in &self.config.dependent_keys {
            let outcome = self.load(source, key).and_then(|volume| {
                check_dependent(key, &volume, primary_grid, self.config.require_primary_grid)?;
                self.apply_one(key, &volume, reference, transform, sink)
            });
            let outcome = outcome.unwrap_or_else(|err| {
                tracing::warn!(dependent = %key, error = %err, "dependent failed");
                DependentOutcome::failed(key, self.requested_policy(key), &err)
            });
            report.dependents.push(outcome);
        }
    }

    fn requested_policy(&self, key: &str) -> Option<InterpolationPolicy> {
        self.config.interpolation_overrides.get(key).copied()
    }

    /// Resample one volume into reference space and hand it to the sink.
    fn apply_one<K: VolumeSink<B> + ?Sized>(
        &self,
        key: &str,
        volume: &Volume<B>,
        reference: &Volume<B>,
        transform: &Transform,
        sink: &K,
    ) -> Result<DependentOutcome> {
        let requested = self.requested_policy(key);
        let policy = InterpolationPolicy::resolve(volume.pixel_type(), requested);
        if let Some(asked) = requested.filter(|&asked| asked != policy) {
            tracing::warn!(
                key,
                requested = %asked,
                used = %policy,
                pixel_type = %volume.pixel_type(),
                "interpolation override ignored; pixel type decides"
            );
        }
        let resampled = resample(volume, reference.grid(), transform, policy, self.config.fill_value)?;
        let output_key = self.config.output_key(key);
        sink.store(&output_key, &resampled)?;
        tracing::debug!(key, %policy, output = %output_key, "resampled into reference space");
        Ok(DependentOutcome::applied(key, policy, output_key))
    }
}

fn finish(mut report: CaseReport, stage: Stage, err: &PipelineError, started: Instant) -> CaseReport {
    report.fail(stage, err);
    report.elapsed_ms = started.elapsed().as_millis() as u64;
    report
}

/// Reject dependents whose geometry cannot belong to the primary's space.
fn check_dependent<B: burn::tensor::backend::Backend>(
    key: &str,
    volume: &Volume<B>,
    primary_grid: Option<&GridSpec>,
    require_primary_grid: bool,
) -> Result<()> {
    if volume.handedness() <= 0.0 {
        return Err(PipelineError::shape_mismatch(format!(
            "'{}' has a left-handed grid; reorient it to canonical axes first",
            key
        )));
    }
    let Some(primary) = primary_grid else {
        return Ok(());
    };
    if require_primary_grid && !volume.grid().is_close(primary, GRID_TOLERANCE) {
        return Err(PipelineError::shape_mismatch(format!(
            "'{}' grid {:?} differs from the primary grid {:?}",
            key,
            volume.size(),
            primary.size()
        )));
    }
    if volume.grid().overlap_volume(primary) <= 0.0 {
        return Err(PipelineError::shape_mismatch(format!(
            "'{}' does not overlap the primary volume in physical space",
            key
        )));
    }
    Ok(())
}
