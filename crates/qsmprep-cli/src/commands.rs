use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use burn::backend::Autodiff;
use burn_ndarray::NdArray;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use qsmprep_core::bias::{correct_bias, SmoothedLogBiasEstimator};
use qsmprep_core::filter::reorient_to_canonical;
use qsmprep_core::{resample, InterpolationPolicy, PixelType, TransformKind, Volume};
use qsmprep_io::{load_transform, load_volume, load_volume_as, save_transform, save_volume};
use qsmprep_pipeline::{
    inspect_consistency, BatchRunner, CaseDescriptor, CaseDiscovery, CaseReport, FilePattern, FileStore,
    LayoutConfig, Manifest, PipelineConfig, TransformPropagation, VisitLayout,
};
use qsmprep_registration::validation::check_determinant;
use qsmprep_registration::{ConsoleProgressCallback, RegistrationConfig, RegistrationEngine};

type Backend = Autodiff<NdArray<f32>>;

/// Tag for error messages: which stage of which case failed.
fn at(stage: &str, case: &Path) -> String {
    format!("stage {} failed for case '{}'", stage, case.display())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

pub fn register(
    fixed: &Path,
    moving: &Path,
    output_transform: &Path,
    resampled: Option<&Path>,
    kind: TransformKind,
    config: Option<&Path>,
) -> Result<()> {
    let config: RegistrationConfig = match config {
        Some(path) => read_json(path)?,
        None => RegistrationConfig::default(),
    };
    let device = Default::default();
    let fixed_volume: Volume<Backend> =
        load_volume_as(fixed, PixelType::Continuous, &device).with_context(|| at("load", fixed))?;
    let moving_volume: Volume<Backend> =
        load_volume_as(moving, PixelType::Continuous, &device).with_context(|| at("load", moving))?;

    let engine = RegistrationEngine::<Backend>::new(config)?.with_callback(Arc::new(ConsoleProgressCallback::default()));
    let result = engine
        .estimate_transform(&fixed_volume, &moving_volume, kind)
        .with_context(|| at("estimate", moving))?;
    if !result.converged() {
        warn!(
            iterations = result.iterations(),
            "registration stopped on the iteration cap; check the result before relying on it"
        );
    }

    save_transform(result.transform(), output_transform).with_context(|| at("apply-primary", moving))?;
    info!(path = %output_transform.display(), metric = result.final_metric(), "saved transform");

    if let Some(path) = resampled {
        let out = resample(&moving_volume, fixed_volume.grid(), result.transform(), InterpolationPolicy::Linear, 0.0)
            .with_context(|| at("apply-primary", moving))?;
        save_volume(&out, path).with_context(|| at("apply-primary", moving))?;
        info!(path = %path.display(), "saved resampled volume");
    }
    Ok(())
}

pub fn apply(
    input: &Path,
    reference: &Path,
    transform: &Path,
    output: &Path,
    interpolation: Option<InterpolationPolicy>,
    categorical: bool,
    fill: f64,
) -> Result<()> {
    let device = Default::default();
    let volume: Volume<Backend> = if categorical {
        load_volume_as(input, PixelType::Categorical, &device)
    } else {
        load_volume(input, &device)
    }
    .with_context(|| at("load", input))?;
    let reference: Volume<Backend> = load_volume(reference, &device).with_context(|| at("load", reference))?;
    let transform = load_transform(transform).with_context(|| at("load", transform))?;
    check_determinant(&transform, RegistrationConfig::default().min_determinant).with_context(|| at("apply", input))?;

    let policy = InterpolationPolicy::resolve(volume.pixel_type(), interpolation);
    if interpolation.is_some_and(|asked| asked != policy) {
        warn!(%policy, pixel_type = %volume.pixel_type(), "requested interpolation ignored; pixel type decides");
    }
    let out = resample(&volume, reference.grid(), &transform, policy, fill).with_context(|| at("apply", input))?;
    save_volume(&out, output).with_context(|| at("apply", input))?;
    info!(path = %output.display(), %policy, "saved resampled volume");
    Ok(())
}

fn load_pipeline_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => Ok(PipelineConfig::from_json_file(path)?),
        None => Ok(PipelineConfig::default()),
    }
}

fn load_layout(path: Option<&Path>) -> Result<LayoutConfig> {
    match path {
        Some(path) => read_json(path),
        None => Ok(LayoutConfig::default()),
    }
}

fn run_one(pipeline: &TransformPropagation<Backend>, case: &CaseDescriptor, reuse_transform: bool) -> CaseReport {
    let store = FileStore::<Backend>::for_case(case, Default::default());
    if reuse_transform {
        pipeline.apply_dependents_from_store(&case.id, &store, &store, &store)
    } else {
        pipeline.run_case(&case.id, &store, &store, &store)
    }
}

pub fn run(
    case_dir: &Path,
    config: Option<&Path>,
    layout: Option<&Path>,
    inputs: &[String],
    reuse_transform: bool,
) -> Result<()> {
    let config = load_pipeline_config(config)?;
    let layout = load_layout(layout)?;
    if !case_dir.is_dir() {
        bail!("{}: not a directory", at("load", case_dir));
    }

    let mut files: std::collections::BTreeMap<String, PathBuf> = layout
        .visit_files
        .iter()
        .chain(&layout.patient_files)
        .filter_map(|(key, pattern)| FilePattern::parse(pattern).find_in(case_dir).map(|p| (key.clone(), p)))
        .collect();
    for spec in inputs {
        let (key, path) = spec
            .split_once('=')
            .with_context(|| format!("input '{}' is not KEY=PATH", spec))?;
        files.insert(key.to_string(), PathBuf::from(path));
    }
    let case = CaseDescriptor {
        id: case_dir.display().to_string(),
        patient: String::new(),
        visit: String::new(),
        directory: case_dir.to_path_buf(),
        files,
        outputs: layout
            .outputs
            .iter()
            .map(|(key, name)| (key.clone(), case_dir.join(name)))
            .collect(),
    };

    let pipeline = TransformPropagation::<Backend>::new(config)?.with_callback(Arc::new(ConsoleProgressCallback::default()));
    let report = run_one(&pipeline, &case, reuse_transform);
    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.is_failed() {
        bail!("{}", report.describe());
    }
    if !report.is_success() {
        warn!("{}", report.describe());
    }
    Ok(())
}

pub fn batch(
    roots: Vec<PathBuf>,
    config: Option<&Path>,
    layout: Option<&Path>,
    manifest: &Path,
    reuse_transform: bool,
    threads: Option<usize>,
) -> Result<()> {
    let config = load_pipeline_config(config)?;
    let layout = VisitLayout::new(roots, load_layout(layout)?);
    let cases = layout.discover()?;
    if cases.is_empty() {
        warn!("no cases found");
        return Ok(());
    }

    let pipeline = TransformPropagation::<Backend>::new(config)?;
    let manifest = Manifest::open(manifest)?;
    let mut runner = BatchRunner::new();
    if let Some(threads) = threads {
        runner = runner.with_threads(threads);
    }

    let bar = ProgressBar::new(cases.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );
    let (reports, summary) = runner.run(&cases, Some(&manifest), |case| {
        let report = run_one(&pipeline, case, reuse_transform);
        bar.set_message(case.id.clone());
        bar.inc(1);
        report
    })?;
    bar.finish_and_clear();

    info!(manifest = %manifest.path().display(), "{}", summary);
    println!("{}", summary);
    let failed: Vec<_> = reports.iter().filter(|r| r.is_failed()).collect();
    if !failed.is_empty() {
        for report in &failed {
            eprintln!("{}", report.describe());
        }
        bail!("{} of {} cases failed", failed.len(), summary.total);
    }
    Ok(())
}

pub fn bias_correct(
    input: &Path,
    output: &Path,
    mask: Option<&Path>,
    field: Option<&Path>,
    sigma: f64,
    shrink: usize,
) -> Result<()> {
    let device = Default::default();
    let volume: Volume<NdArray<f32>> = load_volume(input, &device).with_context(|| at("load", input))?;
    let mask: Option<Volume<NdArray<f32>>> = match mask {
        Some(path) => Some(load_volume_as(path, PixelType::Categorical, &device).with_context(|| at("load", path))?),
        None => None,
    };

    let estimator = SmoothedLogBiasEstimator::new(sigma, shrink);
    let (corrected, log_field) =
        correct_bias(&estimator, &volume, mask.as_ref()).with_context(|| at("bias-correct", input))?;
    save_volume(&corrected, output)?;
    info!(path = %output.display(), "saved bias-corrected volume");
    if let Some(path) = field {
        save_volume(&log_field, path)?;
        info!(path = %path.display(), "saved log bias field");
    }
    Ok(())
}

pub fn reorient(input: &Path, output: &Path) -> Result<()> {
    let device = Default::default();
    let volume: Volume<NdArray<f32>> = load_volume(input, &device).with_context(|| at("load", input))?;
    let canonical = reorient_to_canonical(&volume).with_context(|| at("reorient", input))?;
    save_volume(&canonical, output)?;
    info!(path = %output.display(), size = ?canonical.size(), "saved canonical volume");
    Ok(())
}

pub fn inspect(files: &[PathBuf], atol: f64, json: bool) -> Result<()> {
    let device = Default::default();
    let mut volumes = Vec::with_capacity(files.len());
    for path in files {
        let volume: Volume<NdArray<f32>> = load_volume(path, &device).with_context(|| at("load", path))?;
        volumes.push((path.display().to_string(), volume));
    }
    let report = inspect_consistency(&volumes, atol)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    for v in &report.volumes {
        println!(
            "{}: size {:?}, spacing [{:.4}, {:.4}, {:.4}], min {:.4}, max {:.4}, mean {:.4}, std {:.4}",
            v.name, v.size, v.spacing[0], v.spacing[1], v.spacing[2], v.statistics.min, v.statistics.max,
            v.statistics.mean, v.statistics.std
        );
    }
    for pair in &report.pairs {
        println!(
            "{} vs {}: shape {}, spacing {}, affine {} (max diff {:.2e})",
            pair.first,
            pair.second,
            ok(pair.same_shape),
            ok(pair.same_spacing),
            ok(pair.same_affine),
            pair.affine_difference
        );
    }
    Ok(())
}

fn ok(flag: bool) -> &'static str {
    if flag {
        "match"
    } else {
        "DIFFER"
    }
}
