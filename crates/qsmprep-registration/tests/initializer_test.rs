use burn_ndarray::NdArray;

use qsmprep_core::{GridSpec, PixelType, Point3, Spacing3, TransformKind, Vector3, Volume};
use qsmprep_registration::{CenteredInitializer, InitializerMode};

type B = NdArray<f32>;

fn blob(origin: Point3, peak: [usize; 3]) -> Volume<B> {
    let device = Default::default();
    let n = 20;
    let grid = GridSpec::axis_aligned([n, n, n], origin, Spacing3::repeat(2.0)).unwrap();
    let mut values = vec![0.0f32; n * n * n];
    values[(peak[2] * n + peak[1]) * n + peak[0]] = 1.0;
    Volume::from_values(values, grid, PixelType::Continuous, &device).unwrap()
}

#[test]
fn test_geometry_mode_aligns_grid_centres() {
    let fixed = blob(Point3::origin(), [10, 10, 10]);
    let moving = blob(Point3::new(10.0, -4.0, 0.0), [10, 10, 10]);
    let t = CenteredInitializer::new(InitializerMode::Geometry)
        .initialize(&fixed, &moving, TransformKind::Rigid)
        .unwrap();

    assert_eq!(t.center(), &fixed.grid().center());
    assert!((t.translation() - Vector3::new(10.0, -4.0, 0.0)).norm() < 1e-9);
    assert!((t.transform_point(&fixed.grid().center()) - moving.grid().center()).norm() < 1e-9);
}

#[test]
fn test_moments_mode_aligns_intensity_centroids() {
    let fixed = blob(Point3::origin(), [5, 10, 10]);
    let moving = blob(Point3::origin(), [8, 10, 12]);
    let t = CenteredInitializer::new(InitializerMode::Moments)
        .initialize(&fixed, &moving, TransformKind::Affine)
        .unwrap();

    assert_eq!(t.kind(), TransformKind::Affine);
    assert!((t.center() - Point3::new(10.0, 20.0, 20.0)).norm() < 1e-9);
    // 3 and 2 voxels at 2 mm spacing
    assert!((t.translation() - Vector3::new(6.0, 0.0, 4.0)).norm() < 1e-9);
    assert!((t.matrix() - nalgebra::Matrix3::identity()).norm() < 1e-12);
}
