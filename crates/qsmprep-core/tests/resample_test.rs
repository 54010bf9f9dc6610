use burn_ndarray::NdArray;
use qsmprep_core::{
    resample, GridSpec, InterpolationPolicy, PixelType, Point3, Spacing3, Transform, TransformKind, Vector3, Volume,
};

type Backend = NdArray<f32>;

fn blob(grid: &GridSpec, sigma_mm: f64) -> Volume<Backend> {
    let device = Default::default();
    let center = grid.center();
    let [nx, ny, nz] = grid.size();
    let mut values = Vec::with_capacity(grid.voxel_count());
    for z in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                let p = grid.index_to_physical(&Point3::new(x as f64, y as f64, z as f64));
                let r2 = (p - center).norm_squared();
                values.push((-r2 / (2.0 * sigma_mm * sigma_mm)).exp() as f32);
            }
        }
    }
    Volume::from_values(values, grid.clone(), PixelType::Continuous, &device).unwrap()
}

fn labels(grid: &GridSpec) -> Volume<Backend> {
    let device = Default::default();
    let [nx, ny, nz] = grid.size();
    let mut values = Vec::with_capacity(grid.voxel_count());
    for z in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                let label = (x * 2 / nx) + 2 * (y * 2 / ny);
                values.push(if z < nz / 4 { 0.0 } else { label as f32 });
            }
        }
    }
    Volume::from_values(values, grid.clone(), PixelType::Categorical, &device).unwrap()
}

#[test]
fn test_identity_nearest_reproduces_input() {
    let grid = GridSpec::axis_aligned([12, 10, 8], Point3::new(-5.0, 3.0, 0.0), Spacing3::new(1.0, 1.2, 2.0)).unwrap();
    let volume = labels(&grid);
    let identity = Transform::identity(TransformKind::Affine, grid.center());

    let out = resample(&volume, &grid, &identity, InterpolationPolicy::NearestNeighbor, 0.0).unwrap();
    assert_eq!(out.grid(), volume.grid());
    assert_eq!(out.pixel_type(), PixelType::Categorical);
    assert_eq!(out.to_vec().unwrap(), volume.to_vec().unwrap());
}

#[test]
fn test_forward_then_inverse_approximates_input() {
    let grid = GridSpec::axis_aligned([24, 24, 24], Point3::origin(), Spacing3::repeat(1.5)).unwrap();
    let volume = blob(&grid, 6.0);
    let transform = Transform::rigid(Vector3::new(0.05, -0.03, 0.08), Vector3::new(2.0, -1.5, 1.0), grid.center());

    let moved = resample(&volume, &grid, &transform, InterpolationPolicy::Linear, 0.0).unwrap();
    let back = resample(&moved, &grid, &transform.inverse().unwrap(), InterpolationPolicy::Linear, 0.0).unwrap();

    let original = volume.to_vec().unwrap();
    let restored = back.to_vec().unwrap();
    let mut worst = 0.0f32;
    for z in 4..20 {
        for y in 4..20 {
            for x in 4..20 {
                let i = (z * 24 + y) * 24 + x;
                worst = worst.max((original[i] - restored[i]).abs());
            }
        }
    }
    assert!(worst < 0.05, "largest interior deviation {}", worst);
}

#[test]
fn test_nearest_preserves_label_set() {
    let grid = GridSpec::axis_aligned([16, 16, 12], Point3::new(10.0, -20.0, 5.0), Spacing3::new(1.0, 1.0, 2.0)).unwrap();
    let volume = labels(&grid);
    let reference = GridSpec::axis_aligned([20, 18, 15], Point3::new(8.0, -22.0, 4.0), Spacing3::repeat(0.9)).unwrap();
    let transform = Transform::rigid(Vector3::new(0.0, 0.0, 0.3), Vector3::new(1.3, -0.7, 0.4), grid.center());

    let out = resample(&volume, &reference, &transform, InterpolationPolicy::NearestNeighbor, 0.0).unwrap();
    assert_eq!(out.grid(), &reference);
    let values = out.to_vec().unwrap();
    assert!(values.iter().all(|v| [0.0, 1.0, 2.0, 3.0].contains(v)));
    for label in 1..4 {
        assert!(values.contains(&(label as f32)), "label {} vanished", label);
    }
}

#[test]
fn test_categorical_volume_refuses_linear() {
    let grid = GridSpec::axis_aligned([4, 4, 4], Point3::origin(), Spacing3::repeat(1.0)).unwrap();
    let volume = labels(&grid);
    let identity = Transform::identity(TransformKind::Rigid, grid.center());
    assert!(resample(&volume, &grid, &identity, InterpolationPolicy::Linear, 0.0).is_err());
}
