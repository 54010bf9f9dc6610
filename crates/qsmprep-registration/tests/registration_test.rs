use std::sync::Arc;

use burn::backend::Autodiff;
use burn_ndarray::NdArray;

use qsmprep_core::{resample, GridSpec, InterpolationPolicy, PixelType, Point3, Spacing3, TransformKind, Volume};
use qsmprep_registration::optimizer::{CostFunction, IterationState, Optimizer, OptimizerOutcome};
use qsmprep_registration::{
    HistoryCallback, RegistrationConfig, RegistrationEngine, RegistrationError, SamplingStrategy, StopCondition,
};

type B = Autodiff<NdArray<f32>>;

/// Sphere of radius `radius` mm with a one-voxel soft edge.
fn sphere(n: usize, center: [f64; 3], radius: f64) -> Volume<B> {
    let device = Default::default();
    let grid = GridSpec::axis_aligned([n, n, n], Point3::origin(), Spacing3::repeat(1.0)).unwrap();
    let mut values = Vec::with_capacity(n * n * n);
    for z in 0..n {
        for y in 0..n {
            for x in 0..n {
                let d = ((x as f64 - center[0]).powi(2) + (y as f64 - center[1]).powi(2) + (z as f64 - center[2]).powi(2))
                    .sqrt();
                values.push((1.0 / (1.0 + ((d - radius) / 0.7).exp())) as f32);
            }
        }
    }
    Volume::from_values(values, grid, PixelType::Continuous, &device).unwrap()
}

fn dice(a: &[f32], b: &[f32], threshold: f32) -> f64 {
    let mut both = 0usize;
    let mut total = 0usize;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x > threshold, *y > threshold);
        both += (x && y) as usize;
        total += x as usize + y as usize;
    }
    2.0 * both as f64 / total as f64
}

#[test]
fn test_rigid_recovers_sphere_translation() {
    let fixed = sphere(64, [32.0, 32.0, 32.0], 14.0);
    let moving = sphere(64, [37.0, 32.0, 32.0], 14.0);

    let history = Arc::new(HistoryCallback::new());
    let engine = RegistrationEngine::<B>::new(RegistrationConfig::default())
        .unwrap()
        .with_callback(history.clone());
    let result = engine.estimate_transform(&fixed, &moving, TransformKind::Rigid).unwrap();

    assert!(result.converged(), "levels: {:?}", result.levels());
    assert_eq!(result.levels().len(), 3);
    assert!(!history.history().is_empty());

    let fixed_to_moving = result.transform().inverse().unwrap();
    let error = (fixed_to_moving.translation() - qsmprep_core::Vector3::new(5.0, 0.0, 0.0)).norm();
    assert!(error < 0.5, "translation {:?}", fixed_to_moving.translation());

    let aligned = resample(&moving, fixed.grid(), result.transform(), InterpolationPolicy::Linear, 0.0).unwrap();
    let score = dice(&aligned.to_vec().unwrap(), &fixed.to_vec().unwrap(), 0.5);
    assert!(score >= 0.99, "dice {:.4}", score);
}

#[test]
fn test_same_seed_gives_identical_parameters() {
    let fixed = sphere(32, [16.0, 16.0, 16.0], 7.0);
    let moving = sphere(32, [18.0, 15.0, 16.0], 7.0);
    let config = RegistrationConfig::default()
        .with_schedule(&[2, 1], &[1.0, 0.0])
        .unwrap()
        .with_max_iterations(25)
        .with_sampling(SamplingStrategy::random(0.05, 1234));

    let run = || {
        RegistrationEngine::<B>::new(config.clone())
            .unwrap()
            .estimate_transform(&fixed, &moving, TransformKind::Rigid)
            .unwrap()
    };
    let first = run();
    let second = run();
    let a: Vec<u64> = first.transform().parameters().iter().map(|p| p.to_bits()).collect();
    let b: Vec<u64> = second.transform().parameters().iter().map(|p| p.to_bits()).collect();
    assert_eq!(a, b);
    assert_eq!(first.iterations(), second.iterations());
}

#[test]
fn test_constant_volume_is_degenerate() {
    let device = Default::default();
    let grid = GridSpec::axis_aligned([16, 16, 16], Point3::origin(), Spacing3::repeat(1.0)).unwrap();
    let flat = Volume::<B>::from_values(vec![3.0; 16 * 16 * 16], grid, PixelType::Continuous, &device).unwrap();
    let moving = sphere(16, [8.0, 8.0, 8.0], 4.0);

    let engine = RegistrationEngine::<B>::new(RegistrationConfig::default()).unwrap();
    let err = engine.estimate_transform(&flat, &moving, TransformKind::Rigid).unwrap_err();
    assert!(matches!(err, RegistrationError::DegenerateInput(_)), "{:?}", err);
}

#[test]
fn test_tiny_volume_is_degenerate() {
    let tiny = sphere(3, [1.0, 1.0, 1.0], 1.0);
    let moving = sphere(16, [8.0, 8.0, 8.0], 4.0);

    let engine = RegistrationEngine::<B>::new(RegistrationConfig::default()).unwrap();
    let err = engine.estimate_transform(&moving, &tiny, TransformKind::Affine).unwrap_err();
    assert!(matches!(err, RegistrationError::DegenerateInput(_)), "{:?}", err);
}

/// Ignores the cost and collapses the linear part.
struct Collapse;

impl Optimizer for Collapse {
    fn optimize(
        &self,
        _cost: &dyn CostFunction,
        initial: &[f64],
        _scales: &[f64],
        observer: &mut dyn FnMut(&IterationState),
    ) -> qsmprep_registration::Result<OptimizerOutcome> {
        let mut parameters = initial.to_vec();
        for p in parameters.iter_mut().take(9) {
            *p *= 0.01;
        }
        observer(&IterationState {
            iteration: 1,
            value: 0.0,
            gradient_magnitude: 0.0,
            step_length: 0.0,
        });
        Ok(OptimizerOutcome {
            parameters,
            value: 0.0,
            iterations: 1,
            stop: StopCondition::StepTooSmall,
        })
    }

    fn name(&self) -> &'static str {
        "collapse"
    }
}

#[test]
fn test_near_singular_estimate_is_rejected() {
    let fixed = sphere(16, [8.0, 8.0, 8.0], 4.0);
    let moving = sphere(16, [8.5, 8.0, 8.0], 4.0);
    let engine = RegistrationEngine::<B>::new(RegistrationConfig::default())
        .unwrap()
        .with_optimizer(Box::new(Collapse));
    let err = engine.estimate_transform(&fixed, &moving, TransformKind::Affine).unwrap_err();
    assert!(matches!(err, RegistrationError::NonInvertibleTransform(_)), "{:?}", err);
}

#[test]
fn test_iteration_cap_reports_unconverged() {
    let fixed = sphere(24, [12.0, 12.0, 12.0], 6.0);
    let moving = sphere(24, [15.0, 12.0, 12.0], 6.0);
    let config = RegistrationConfig::default()
        .with_schedule(&[1], &[0.0])
        .unwrap()
        .with_max_iterations(2);
    let result = RegistrationEngine::<B>::new(config)
        .unwrap()
        .estimate_transform(&fixed, &moving, TransformKind::Rigid)
        .unwrap();
    assert!(!result.converged());
    assert_eq!(result.levels()[0].stop, StopCondition::MaximumIterations);
    assert_eq!(result.iterations(), 2);
}
