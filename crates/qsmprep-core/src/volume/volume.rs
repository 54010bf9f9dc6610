//! Volume type with physical metadata and coordinate transformations.
//!
//! A [`Volume`] pairs tensor data with the [`GridSpec`] describing how voxel
//! indices map to physical coordinates, plus a [`PixelType`] tag that decides
//! how the volume may be interpolated.

use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Tensor, TensorData};
use serde::{Deserialize, Serialize};

use super::grid::GridSpec;
use crate::error::{CoreError, Result};
use crate::spatial::{Affine4, Direction3, Point3, Spacing3};

/// Semantics of the stored samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelType {
    /// Real-valued intensities (T1, FLAIR, magnitude, QSM).
    Continuous,
    /// Integer labels (masks, lesion label maps).
    Categorical,
}

impl std::fmt::Display for PixelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PixelType::Continuous => write!(f, "continuous"),
            PixelType::Categorical => write!(f, "categorical"),
        }
    }
}

impl std::str::FromStr for PixelType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "continuous" | "float" => Ok(PixelType::Continuous),
            "categorical" | "label" | "mask" => Ok(PixelType::Categorical),
            other => Err(CoreError::invalid(format!("unknown pixel type '{}'", other))),
        }
    }
}

/// Summary statistics over all voxels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeStatistics {
    pub voxel_count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std: f64,
}

/// Medical volume with physical metadata.
///
/// # Coordinate Systems
/// * **Index space**: voxel indices `(x, y, z)`; data is stored `[z, y, x]`.
/// * **Physical space**: millimetres in scanner (RAS) coordinates.
///
/// A volume is immutable once built: operations that change data or
/// geometry return a new volume.
///
/// # Examples
/// ```rust
/// use qsmprep_core::{PixelType, Point3, Spacing3, Volume};
/// use burn::tensor::Tensor;
/// use burn_ndarray::NdArray;
///
/// type Backend = NdArray<f32>;
///
/// let device = Default::default();
/// let data = Tensor::<Backend, 3>::zeros([4, 5, 6], &device);
/// let volume = Volume::axis_aligned(data, Point3::origin(), Spacing3::repeat(1.0), PixelType::Continuous).unwrap();
/// assert_eq!(volume.size(), [6, 5, 4]);
/// ```
#[derive(Debug, Clone)]
pub struct Volume<B: Backend> {
    /// Voxel data laid out `[nz, ny, nx]`.
    data: Tensor<B, 3>,
    grid: GridSpec,
    pixel_type: PixelType,
}

impl<B: Backend> Volume<B> {
    /// Create a volume from data and full geometry.
    pub fn new(
        data: Tensor<B, 3>,
        origin: Point3,
        spacing: Spacing3,
        direction: Direction3,
        pixel_type: PixelType,
    ) -> Result<Self> {
        let [nz, ny, nx] = data.dims();
        let grid = GridSpec::new([nx, ny, nz], origin, spacing, direction)?;
        Ok(Self { data, grid, pixel_type })
    }

    /// Create a volume with an identity direction matrix.
    pub fn axis_aligned(data: Tensor<B, 3>, origin: Point3, spacing: Spacing3, pixel_type: PixelType) -> Result<Self> {
        Self::new(data, origin, spacing, Direction3::identity(), pixel_type)
    }

    /// Create a volume on an existing grid. The tensor shape must be the
    /// grid's `[nz, ny, nx]` shape.
    pub fn from_grid(data: Tensor<B, 3>, grid: GridSpec, pixel_type: PixelType) -> Result<Self> {
        let dims = data.dims();
        if dims != grid.shape() {
            return Err(CoreError::shape_mismatch(format!(
                "tensor shape {:?} does not match grid shape {:?}",
                dims,
                grid.shape()
            )));
        }
        Ok(Self { data, grid, pixel_type })
    }

    /// Create a volume from a voxel-to-physical affine.
    pub fn from_affine(data: Tensor<B, 3>, affine: &Affine4, pixel_type: PixelType) -> Result<Self> {
        let [nz, ny, nx] = data.dims();
        let grid = GridSpec::from_affine([nx, ny, nz], affine)?;
        Ok(Self { data, grid, pixel_type })
    }

    /// Create a volume from host values in `[z, y, x]` order.
    pub fn from_values(values: Vec<f32>, grid: GridSpec, pixel_type: PixelType, device: &B::Device) -> Result<Self> {
        if values.len() != grid.voxel_count() {
            return Err(CoreError::shape_mismatch(format!(
                "{} values supplied for a grid of {} voxels",
                values.len(),
                grid.voxel_count()
            )));
        }
        let data = Tensor::<B, 3>::from_data(TensorData::new(values, grid.shape()), device);
        Ok(Self { data, grid, pixel_type })
    }

    pub fn data(&self) -> &Tensor<B, 3> {
        &self.data
    }

    pub fn into_data(self) -> Tensor<B, 3> {
        self.data
    }

    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    pub fn pixel_type(&self) -> PixelType {
        self.pixel_type
    }

    pub fn device(&self) -> B::Device {
        self.data.device()
    }

    /// Grid size `(nx, ny, nz)`.
    pub fn size(&self) -> [usize; 3] {
        self.grid.size()
    }

    /// Tensor shape `[nz, ny, nx]`.
    pub fn shape(&self) -> [usize; 3] {
        self.data.dims()
    }

    pub fn origin(&self) -> &Point3 {
        self.grid.origin()
    }

    pub fn spacing(&self) -> &Spacing3 {
        self.grid.spacing()
    }

    pub fn direction(&self) -> &Direction3 {
        self.grid.direction()
    }

    pub fn voxel_count(&self) -> usize {
        self.grid.voxel_count()
    }

    /// Voxel index to physical affine.
    pub fn physical_affine(&self) -> Affine4 {
        self.grid.physical_affine()
    }

    pub fn handedness(&self) -> f64 {
        self.grid.handedness()
    }

    /// A new volume with the same geometry and different data.
    pub fn with_data(&self, data: Tensor<B, 3>) -> Result<Self> {
        Self::from_grid(data, self.grid.clone(), self.pixel_type)
    }

    /// A copy of this volume tagged with another pixel type.
    pub fn with_pixel_type(&self, pixel_type: PixelType) -> Self {
        Self {
            data: self.data.clone(),
            grid: self.grid.clone(),
            pixel_type,
        }
    }

    pub fn index_to_physical(&self, index: &Point3) -> Point3 {
        self.grid.index_to_physical(index)
    }

    pub fn physical_to_index(&self, point: &Point3) -> Point3 {
        self.grid.physical_to_index(point)
    }

    /// Map physical points `[N, 3]` to continuous indices `[N, 3]`.
    ///
    /// Computes `I = (P - O) @ T` with `T = (S^-1 D^-1)^T`.
    pub fn world_to_index_tensor(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        let (linear, offset) = crate::spatial::split_homogeneous(&self.grid.inverse_affine());
        affine_rows(points, &linear, &offset)
    }

    /// Map continuous indices `[N, 3]` to physical points `[N, 3]`.
    pub fn index_to_world_tensor(&self, indices: Tensor<B, 2>) -> Tensor<B, 2> {
        let linear = self.grid.index_to_physical_matrix();
        affine_rows(indices, &linear, &self.grid.origin().coords)
    }

    /// Host copy of the voxel values in `[z, y, x]` order.
    pub fn to_vec(&self) -> Result<Vec<f32>> {
        tensor_to_vec(self.data.clone())
    }

    /// Minimum, maximum, mean and standard deviation of all voxels.
    pub fn statistics(&self) -> Result<VolumeStatistics> {
        let n = self.voxel_count();
        let flat = self.data.clone().reshape([n]);
        let min = flat.clone().min().into_scalar().elem::<f64>();
        let max = flat.clone().max().into_scalar().elem::<f64>();
        let mean = flat.clone().mean().into_scalar().elem::<f64>();
        let var = (flat - mean).powf_scalar(2.0).mean().into_scalar().elem::<f64>();
        if !(min.is_finite() && max.is_finite() && mean.is_finite()) {
            return Err(CoreError::degenerate("volume contains non-finite values"));
        }
        Ok(VolumeStatistics {
            voxel_count: n,
            min,
            max,
            mean,
            std: var.max(0.0).sqrt(),
        })
    }
}

/// Apply `p -> linear * p + offset` to every row of an `[N, 3]` tensor.
pub(crate) fn affine_rows<B: Backend>(
    rows: Tensor<B, 2>,
    linear: &nalgebra::Matrix3<f64>,
    offset: &nalgebra::Vector3<f64>,
) -> Tensor<B, 2> {
    let device = rows.device();
    // rows @ linear^T, so element [r, c] of the right operand is linear[c, r]
    let mut m = Vec::with_capacity(9);
    for r in 0..3 {
        for c in 0..3 {
            m.push(linear[(c, r)] as f32);
        }
    }
    let m = Tensor::<B, 2>::from_data(TensorData::new(m, [3, 3]), &device);
    let t = Tensor::<B, 2>::from_data(
        TensorData::new(vec![offset[0] as f32, offset[1] as f32, offset[2] as f32], [1, 3]),
        &device,
    );
    rows.matmul(m) + t
}

/// Read a tensor back to the host as `f32` values.
pub fn tensor_to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| CoreError::tensor_data(format!("{:?}", e)))
}
