use std::path::Path;

use burn::tensor::backend::Backend;
use nalgebra::Matrix4;
use ndarray::{Array3, Axis, Ix3};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use qsmprep_core::spatial::Affine4;
use qsmprep_core::{GridSpec, PixelType, Volume};

use crate::error::{require_exists, IoError, Result};

/// `NIFTI_INTENT_LABEL`: voxel values are label indices.
const INTENT_LABEL: i16 = 1002;
/// `NIFTI_XFORM_SCANNER_ANAT`.
const XFORM_SCANNER_ANAT: i16 = 1;

/// Load a NIfTI volume, inferring its pixel type from the header.
///
/// Only volumes flagged with the label intent are categorical; the storage
/// type says nothing, since scanners export intensities as bytes too. Use
/// [`load_volume_as`] when the caller knows better.
pub fn load_volume<B: Backend, P: AsRef<Path>>(path: P, device: &B::Device) -> Result<Volume<B>> {
    load_with(path.as_ref(), None, device)
}

/// Load a NIfTI volume with an explicit pixel type.
pub fn load_volume_as<B: Backend, P: AsRef<Path>>(
    path: P,
    pixel_type: PixelType,
    device: &B::Device,
) -> Result<Volume<B>> {
    load_with(path.as_ref(), Some(pixel_type), device)
}

fn load_with<B: Backend>(path: &Path, pixel_type: Option<PixelType>, device: &B::Device) -> Result<Volume<B>> {
    require_exists(path)?;
    let obj = ReaderOptions::new().read_file(path)?;
    let header = obj.header().clone();
    let affine = header_affine(&header);
    let pixel_type = match pixel_type {
        Some(p) => p,
        None => infer_pixel_type(&header),
    };

    let array = obj.into_volume().into_ndarray::<f32>()?;
    let array = match array.ndim() {
        3 => array,
        4 if array.shape()[3] == 1 => array.index_axis_move(Axis(3), 0),
        n => {
            return Err(IoError::format(
                "volume",
                path,
                format!("expected a 3-D volume, found {} dimensions {:?}", n, array.shape()),
            ))
        }
    };
    let array = array
        .into_dimensionality::<Ix3>()
        .map_err(|e| IoError::format("volume", path, e.to_string()))?;

    let (nx, ny, nz) = array.dim();
    let grid = GridSpec::from_affine([nx, ny, nz], &affine)?;
    // logical [x, y, z] -> row-major [z, y, x]
    let values: Vec<f32> = array.permuted_axes([2, 1, 0]).iter().copied().collect();
    let volume = Volume::from_values(values, grid, pixel_type, device)?;

    tracing::debug!(
        path = %path.display(),
        size = ?volume.size(),
        %pixel_type,
        "loaded volume"
    );
    Ok(volume)
}

/// Write a volume as NIfTI-1. The affine goes into the sform and the
/// spacing into `pixdim`; categorical volumes are written as integer
/// labels.
pub fn save_volume<B: Backend, P: AsRef<Path>>(volume: &Volume<B>, path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let [nx, ny, nz] = volume.size();
    let values = volume.to_vec()?;
    let zyx = Array3::from_shape_vec((nz, ny, nx), values).map_err(|e| IoError::format("volume", path, e.to_string()))?;
    let xyz = zyx.permuted_axes([2, 1, 0]).as_standard_layout().into_owned();

    let mut header = volume_header(volume);
    match volume.pixel_type() {
        PixelType::Continuous => {
            WriterOptions::new(path).reference_header(&header).write_nifti(&xyz)?;
        }
        PixelType::Categorical => {
            header.intent_code = INTENT_LABEL;
            let fits_byte = xyz.iter().all(|&v| (0.0..=255.0).contains(&v));
            if fits_byte {
                let labels = xyz.mapv(|v| v.round() as u8);
                WriterOptions::new(path).reference_header(&header).write_nifti(&labels)?;
            } else {
                let labels = xyz.mapv(|v| v.round() as i32);
                WriterOptions::new(path).reference_header(&header).write_nifti(&labels)?;
            }
        }
    }

    tracing::debug!(path = %path.display(), size = ?volume.size(), "saved volume");
    Ok(())
}

fn volume_header<B: Backend>(volume: &Volume<B>) -> NiftiHeader {
    let affine = volume.physical_affine();
    let spacing = volume.spacing();
    let row = |r: usize| {
        [
            affine[(r, 0)] as f32,
            affine[(r, 1)] as f32,
            affine[(r, 2)] as f32,
            affine[(r, 3)] as f32,
        ]
    };

    NiftiHeader {
        sform_code: XFORM_SCANNER_ANAT,
        qform_code: 0,
        srow_x: row(0),
        srow_y: row(1),
        srow_z: row(2),
        pixdim: [1.0, spacing[0] as f32, spacing[1] as f32, spacing[2] as f32, 1.0, 1.0, 1.0, 1.0],
        scl_slope: 1.0,
        scl_inter: 0.0,
        ..NiftiHeader::default()
    }
}

fn infer_pixel_type(header: &NiftiHeader) -> PixelType {
    if header.intent_code == INTENT_LABEL {
        PixelType::Categorical
    } else {
        PixelType::Continuous
    }
}

/// Voxel-to-physical affine: sform if present, else qform, else plain
/// `pixdim` scaling.
fn header_affine(header: &NiftiHeader) -> Affine4 {
    let rows: [[f32; 4]; 3] = if header.sform_code > 0 {
        [header.srow_x, header.srow_y, header.srow_z]
    } else if header.qform_code > 0 {
        qform_rows(header)
    } else {
        let [_, dx, dy, dz, ..] = header.pixdim;
        [[dx, 0.0, 0.0, 0.0], [0.0, dy, 0.0, 0.0], [0.0, 0.0, dz, 0.0]]
    };

    let mut m = Matrix4::identity();
    for (r, row) in rows.iter().enumerate() {
        for (c, v) in row.iter().enumerate() {
            m[(r, c)] = *v as f64;
        }
    }
    m
}

fn qform_rows(header: &NiftiHeader) -> [[f32; 4]; 3] {
    let (b, c, d) = (header.quatern_b, header.quatern_c, header.quatern_d);
    let a = (1.0 - (b * b + c * c + d * d).min(1.0)).sqrt();
    let qfac = if header.pixdim[0] < 0.0 { -1.0 } else { 1.0 };

    let dx = header.pixdim[1];
    let dy = header.pixdim[2];
    let dz = header.pixdim[3] * qfac;

    [
        [
            (a * a + b * b - c * c - d * d) * dx,
            2.0 * (b * c - a * d) * dy,
            2.0 * (b * d + a * c) * dz,
            header.quatern_x,
        ],
        [
            2.0 * (b * c + a * d) * dx,
            (a * a + c * c - b * b - d * d) * dy,
            2.0 * (c * d - a * b) * dz,
            header.quatern_y,
        ],
        [
            2.0 * (b * d - a * c) * dx,
            2.0 * (c * d + a * b) * dy,
            (a * a + d * d - b * b - c * c) * dz,
            header.quatern_z,
        ],
    ]
}
