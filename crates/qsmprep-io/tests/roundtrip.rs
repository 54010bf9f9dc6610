use anyhow::Result;
use burn_ndarray::NdArray;
use ndarray::Array3;
use nifti::writer::WriterOptions;
use nifti::NiftiHeader;
use qsmprep_core::transform::rotation_matrix;
use qsmprep_core::{
    resample, GridSpec, InterpolationPolicy, PixelType, Point3, Spacing3, Transform, Vector3, Volume,
};
use qsmprep_io::{load_transform, load_volume, load_volume_as, save_transform, save_volume, IoError};
use tempfile::tempdir;

type Backend = NdArray<f32>;

fn oblique_grid() -> GridSpec {
    GridSpec::new(
        [7, 5, 4],
        Point3::new(-90.5, 12.25, 33.0),
        Spacing3::new(0.9, 1.1, 2.5),
        rotation_matrix(&Vector3::new(0.1, -0.2, 0.3)),
    )
    .unwrap()
}

fn max_abs_diff(a: &GridSpec, b: &GridSpec) -> f64 {
    (a.physical_affine() - b.physical_affine()).abs().max()
}

#[test]
fn test_read_foreign_nifti_axis_order() -> Result<()> {
    let dir = tempdir()?;
    let file_path = dir.path().join("plain.nii");

    // Logical shape (x=3, y=4, z=5), value encodes the index
    let data: Vec<f32> = (0..3 * 4 * 5).map(|v| v as f32).collect();
    let array = Array3::from_shape_vec((3, 4, 5), data)?;
    let header = NiftiHeader {
        sform_code: 0,
        qform_code: 0,
        pixdim: [1.0; 8],
        ..NiftiHeader::default()
    };
    WriterOptions::new(&file_path).reference_header(&header).write_nifti(&array)?;

    let device = Default::default();
    let volume = load_volume::<Backend, _>(&file_path, &device)?;
    assert_eq!(volume.size(), [3, 4, 5]);
    assert_eq!(volume.shape(), [5, 4, 3]);
    assert_eq!(volume.pixel_type(), PixelType::Continuous);

    let values = volume.to_vec()?;
    for z in 0..5 {
        for y in 0..4 {
            for x in 0..3 {
                assert_eq!(values[(z * 4 + y) * 3 + x], (x * 20 + y * 5 + z) as f32);
            }
        }
    }
    Ok(())
}

#[test]
fn test_byte_intensities_load_as_continuous() -> Result<()> {
    let dir = tempdir()?;
    let file_path = dir.path().join("t1_uint8.nii.gz");

    let data: Vec<u8> = (0..4 * 4 * 4).map(|v| (v * 3 % 251) as u8).collect();
    let array = Array3::from_shape_vec((4, 4, 4), data)?;
    let header = NiftiHeader {
        pixdim: [1.0; 8],
        ..NiftiHeader::default()
    };
    WriterOptions::new(&file_path).reference_header(&header).write_nifti(&array)?;

    let volume = load_volume::<Backend, _>(&file_path, &Default::default())?;
    assert_eq!(volume.pixel_type(), PixelType::Continuous);
    // voxel (x=1, y=0, z=0) holds array element 16
    assert_eq!(volume.to_vec()?[1], 48.0);
    Ok(())
}

#[test]
fn test_affine_survives_save_load_cycles() -> Result<()> {
    let dir = tempdir()?;
    let device = Default::default();
    let grid = oblique_grid();
    let values: Vec<f32> = (0..grid.voxel_count()).map(|v| v as f32 * 0.5 - 3.0).collect();
    let volume = Volume::<Backend>::from_values(values.clone(), grid.clone(), PixelType::Continuous, &device)?;

    let first = dir.path().join("first.nii.gz");
    save_volume(&volume, &first)?;
    let loaded = load_volume::<Backend, _>(&first, &device)?;
    // the sform stores f32
    assert!(max_abs_diff(loaded.grid(), &grid) < 1e-4);
    assert_eq!(loaded.to_vec()?, values);

    let second = dir.path().join("nested/second.nii");
    save_volume(&loaded, &second)?;
    let reloaded = load_volume::<Backend, _>(&second, &device)?;
    assert!(max_abs_diff(reloaded.grid(), loaded.grid()) < 1e-12);
    assert_eq!(reloaded.size(), volume.size());
    Ok(())
}

#[test]
fn test_labels_stay_categorical() -> Result<()> {
    let dir = tempdir()?;
    let device = Default::default();
    let grid = oblique_grid();
    let values: Vec<f32> = (0..grid.voxel_count()).map(|v| (v % 4) as f32).collect();
    let mask = Volume::<Backend>::from_values(values.clone(), grid, PixelType::Categorical, &device)?;

    let path = dir.path().join("mask.nii.gz");
    save_volume(&mask, &path)?;
    let loaded = load_volume::<Backend, _>(&path, &device)?;
    assert_eq!(loaded.pixel_type(), PixelType::Categorical);
    assert_eq!(loaded.to_vec()?, values);

    let forced = load_volume_as::<Backend, _>(&path, PixelType::Continuous, &device)?;
    assert_eq!(forced.pixel_type(), PixelType::Continuous);
    Ok(())
}

#[test]
fn test_missing_files_are_reported() {
    let dir = tempdir().unwrap();
    let device = Default::default();
    let err = load_volume::<Backend, _>(dir.path().join("absent.nii"), &device).unwrap_err();
    assert!(matches!(err, IoError::MissingResource(_)));
    assert!(err.is_missing());

    let err = load_transform(dir.path().join("absent.tfm")).unwrap_err();
    assert!(err.is_missing());
}

#[test]
fn test_reloaded_transform_resamples_identically() -> Result<()> {
    let dir = tempdir()?;
    let device = Default::default();
    let grid = oblique_grid();
    let values: Vec<f32> = (0..grid.voxel_count()).map(|v| ((v * 37) % 11) as f32).collect();
    let volume = Volume::<Backend>::from_values(values, grid.clone(), PixelType::Continuous, &device)?;

    let mut m = rotation_matrix(&Vector3::new(0.02, 0.05, -0.1)) * 1.05;
    m[(1, 2)] += 0.03;
    let transform = Transform::affine(m, Vector3::new(0.7, -1.3, 0.25), grid.center());

    let path = dir.path().join("case/primary_to_reference.tfm");
    save_transform(&transform, &path)?;
    let reloaded = load_transform(&path)?;
    assert_eq!(reloaded, transform);

    let a = resample(&volume, &grid, &transform, InterpolationPolicy::Linear, 0.0)?;
    let b = resample(&volume, &grid, &reloaded, InterpolationPolicy::Linear, 0.0)?;
    assert_eq!(a.to_vec()?, b.to_vec()?);
    Ok(())
}
