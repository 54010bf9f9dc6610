//! Voxel grid geometry.
//!
//! A [`GridSpec`] describes where a voxel lattice sits in physical space:
//! `physical = origin + direction * diag(spacing) * index`. Sizes, spacing
//! and indices are ordered `(x, y, z)`; tensors holding the voxels of a grid
//! use the reversed `[z, y, x]` layout.

use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::spatial::{homogeneous, split_homogeneous, Affine4, Direction3, Point3, Spacing3, Vector3};

/// Smallest accepted |det(direction)|.
const DIRECTION_DETERMINANT_FLOOR: f64 = 1e-6;

/// Geometry of a 3-D voxel grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    size: [usize; 3],
    origin: Point3,
    spacing: Spacing3,
    direction: Direction3,
}

impl GridSpec {
    /// Create a grid, rejecting empty sizes, non-positive spacing and
    /// singular direction matrices.
    pub fn new(size: [usize; 3], origin: Point3, spacing: Spacing3, direction: Direction3) -> Result<Self> {
        if size.iter().any(|&s| s == 0) {
            return Err(CoreError::degenerate(format!("grid size must be non-zero, got {:?}", size)));
        }
        if spacing.iter().any(|&s| !(s.is_finite() && s > 0.0)) {
            return Err(CoreError::invalid(format!(
                "spacing must be positive and finite, got [{}, {}, {}]",
                spacing[0], spacing[1], spacing[2]
            )));
        }
        let det = direction.determinant();
        if !det.is_finite() || det.abs() < DIRECTION_DETERMINANT_FLOOR {
            return Err(CoreError::non_invertible(format!(
                "direction matrix determinant {:.3e} is singular",
                det
            )));
        }
        Ok(Self { size, origin, spacing, direction })
    }

    /// Axis-aligned grid with unit direction.
    pub fn axis_aligned(size: [usize; 3], origin: Point3, spacing: Spacing3) -> Result<Self> {
        Self::new(size, origin, spacing, Direction3::identity())
    }

    /// Decompose a voxel-to-physical affine into origin, spacing and
    /// direction. Spacing is the norm of each column of the linear part.
    pub fn from_affine(size: [usize; 3], affine: &Affine4) -> Result<Self> {
        let (linear, offset) = split_homogeneous(affine);
        let mut spacing = Spacing3::zeros();
        let mut direction = Matrix3::zeros();
        for c in 0..3 {
            let column = linear.column(c);
            let norm = column.norm();
            if !(norm.is_finite() && norm > 1e-12) {
                return Err(CoreError::degenerate(format!("affine column {} has zero length", c)));
            }
            spacing[c] = norm;
            direction.set_column(c, &(column / norm));
        }
        Self::new(size, Point3::from(offset), spacing, direction)
    }

    pub fn size(&self) -> [usize; 3] {
        self.size
    }

    /// Tensor shape `[nz, ny, nx]` of data living on this grid.
    pub fn shape(&self) -> [usize; 3] {
        [self.size[2], self.size[1], self.size[0]]
    }

    pub fn origin(&self) -> &Point3 {
        &self.origin
    }

    pub fn spacing(&self) -> &Spacing3 {
        &self.spacing
    }

    pub fn direction(&self) -> &Direction3 {
        &self.direction
    }

    pub fn voxel_count(&self) -> usize {
        self.size.iter().product()
    }

    /// Linear part `direction * diag(spacing)` of the voxel-to-physical map.
    pub fn index_to_physical_matrix(&self) -> Matrix3<f64> {
        self.direction * Matrix3::from_diagonal(&self.spacing)
    }

    /// The 4x4 voxel-to-physical affine.
    pub fn physical_affine(&self) -> Affine4 {
        homogeneous(&self.index_to_physical_matrix(), &self.origin.coords)
    }

    /// The 4x4 physical-to-voxel affine.
    pub fn inverse_affine(&self) -> Affine4 {
        let inv_spacing = Vector3::new(1.0 / self.spacing[0], 1.0 / self.spacing[1], 1.0 / self.spacing[2]);
        // det(direction) was checked at construction
        let inv_direction = self
            .direction
            .try_inverse()
            .unwrap_or_else(|| self.direction.transpose());
        let linear = Matrix3::from_diagonal(&inv_spacing) * inv_direction;
        let offset = -(linear * self.origin.coords);
        homogeneous(&linear, &offset)
    }

    pub fn index_to_physical(&self, index: &Point3) -> Point3 {
        self.origin + self.index_to_physical_matrix() * index.coords
    }

    pub fn physical_to_index(&self, point: &Point3) -> Point3 {
        self.inverse_affine().transform_point(point)
    }

    /// Physical positions of the eight corner voxel centres.
    pub fn corners(&self) -> [Point3; 8] {
        let hi = [
            (self.size[0] - 1) as f64,
            (self.size[1] - 1) as f64,
            (self.size[2] - 1) as f64,
        ];
        let mut corners = [Point3::origin(); 8];
        for (n, corner) in corners.iter_mut().enumerate() {
            let index = Point3::new(
                if n & 1 == 0 { 0.0 } else { hi[0] },
                if n & 2 == 0 { 0.0 } else { hi[1] },
                if n & 4 == 0 { 0.0 } else { hi[2] },
            );
            *corner = self.index_to_physical(&index);
        }
        corners
    }

    /// Axis-aligned physical bounding box `(min, max)` of the voxel centres.
    pub fn bounding_box(&self) -> (Point3, Point3) {
        let corners = self.corners();
        let mut lo = corners[0];
        let mut hi = corners[0];
        for c in &corners[1..] {
            for a in 0..3 {
                lo[a] = lo[a].min(c[a]);
                hi[a] = hi[a].max(c[a]);
            }
        }
        (lo, hi)
    }

    /// Geometric centre of the grid in physical space.
    pub fn center(&self) -> Point3 {
        let mid = Point3::new(
            (self.size[0] - 1) as f64 / 2.0,
            (self.size[1] - 1) as f64 / 2.0,
            (self.size[2] - 1) as f64 / 2.0,
        );
        self.index_to_physical(&mid)
    }

    /// Sign of det(direction): +1 for right-handed grids.
    pub fn handedness(&self) -> f64 {
        self.direction.determinant().signum()
    }

    /// Same size and an affine equal within `tol` element-wise.
    pub fn is_close(&self, other: &GridSpec, tol: f64) -> bool {
        self.size == other.size
            && (self.physical_affine() - other.physical_affine()).abs().max() <= tol
    }

    /// Volume of the intersection of both bounding boxes, in mm^3.
    pub fn overlap_volume(&self, other: &GridSpec) -> f64 {
        let (a_lo, a_hi) = self.bounding_box();
        let (b_lo, b_hi) = other.bounding_box();
        let mut volume = 1.0;
        for a in 0..3 {
            // Voxel centres span a zero-width box along singleton axes.
            let half = 0.5 * self.spacing[a].min(other.spacing[a]);
            let lo = a_lo[a].max(b_lo[a]) - half;
            let hi = a_hi[a].min(b_hi[a]) + half;
            if hi <= lo {
                return 0.0;
            }
            volume *= hi - lo;
        }
        volume
    }

    /// Grid sampled every `factors[a]` voxels along axis `a`, keeping the
    /// first voxel in place.
    pub fn shrink(&self, factors: [usize; 3]) -> Result<Self> {
        if factors.iter().any(|&f| f == 0) {
            return Err(CoreError::invalid("shrink factors must be >= 1"));
        }
        let mut size = self.size;
        let mut spacing = self.spacing;
        for a in 0..3 {
            size[a] = self.size[a].div_ceil(factors[a]);
            spacing[a] *= factors[a] as f64;
        }
        Self::new(size, self.origin, spacing, self.direction)
    }
}

/// Continuous `(x, y, z)` indices of voxels `start..end` of a grid, in the
/// order of the flattened `[z, y, x]` tensor.
pub fn index_block(size: [usize; 3], start: usize, end: usize) -> Vec<f32> {
    let [nx, ny, _] = size;
    let mut out = Vec::with_capacity((end - start) * 3);
    for linear in start..end {
        let x = linear % nx;
        let y = (linear / nx) % ny;
        let z = linear / (nx * ny);
        out.push(x as f32);
        out.push(y as f32);
        out.push(z as f32);
    }
    out
}

/// Continuous `(x, y, z)` indices for an arbitrary list of linear voxel ids.
pub fn indices_of(size: [usize; 3], linear_ids: &[usize]) -> Vec<f32> {
    let [nx, ny, _] = size;
    let mut out = Vec::with_capacity(linear_ids.len() * 3);
    for &linear in linear_ids {
        out.push((linear % nx) as f32);
        out.push(((linear / nx) % ny) as f32);
        out.push((linear / (nx * ny)) as f32);
    }
    out
}
