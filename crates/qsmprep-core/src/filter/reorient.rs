//! Reorientation to the closest canonical (RAS+) voxel ordering.
//!
//! Only the voxel order and the header change: axes are permuted and
//! flipped so that voxel axis `i` points along physical axis `i` with a
//! positive direction cosine. No interpolation takes place.

use burn::tensor::backend::Backend;
use nalgebra::Matrix3;

use crate::error::Result;
use crate::spatial::{Point3, Spacing3};
use crate::volume::{GridSpec, Volume};

/// Voxel-axis permutation and flips that bring a direction matrix closest
/// to the identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisOrientation {
    /// `source_axis[j]` is the input voxel axis that becomes output axis `j`.
    pub source_axis: [usize; 3],
    /// Whether output axis `j` runs opposite to its source axis.
    pub flipped: [bool; 3],
}

impl AxisOrientation {
    /// Match each voxel axis to the physical axis it is most aligned with.
    pub fn of(direction: &Matrix3<f64>) -> Self {
        let mut source_axis = [usize::MAX; 3];
        let mut flipped = [false; 3];
        let mut used_voxel = [false; 3];
        let mut used_physical = [false; 3];

        // Greedy assignment by largest |cosine| keeps oblique grids stable.
        for _ in 0..3 {
            let mut best = (0.0f64, 0usize, 0usize);
            for phys in 0..3 {
                if used_physical[phys] {
                    continue;
                }
                for vox in 0..3 {
                    if used_voxel[vox] {
                        continue;
                    }
                    let v = direction[(phys, vox)].abs();
                    if v >= best.0 {
                        best = (v, phys, vox);
                    }
                }
            }
            let (_, phys, vox) = best;
            used_physical[phys] = true;
            used_voxel[vox] = true;
            source_axis[phys] = vox;
            flipped[phys] = direction[(phys, vox)] < 0.0;
        }
        Self { source_axis, flipped }
    }

    pub fn is_identity(&self) -> bool {
        self.source_axis == [0, 1, 2] && self.flipped == [false; 3]
    }
}

/// Reorder a volume's voxels so its grid is as close to RAS+ as possible.
pub fn reorient_to_canonical<B: Backend>(volume: &Volume<B>) -> Result<Volume<B>> {
    let grid = volume.grid();
    let orientation = AxisOrientation::of(grid.direction());
    if orientation.is_identity() {
        return Ok(volume.clone());
    }

    let size = grid.size();
    let mut new_size = [0usize; 3];
    let mut new_spacing = Spacing3::zeros();
    let mut new_direction = Matrix3::zeros();
    let mut first_voxel = Point3::origin();
    for j in 0..3 {
        let i = orientation.source_axis[j];
        new_size[j] = size[i];
        new_spacing[j] = grid.spacing()[i];
        let column = grid.direction().column(i);
        if orientation.flipped[j] {
            new_direction.set_column(j, &(-column));
            first_voxel[i] = (size[i] - 1) as f64;
        } else {
            new_direction.set_column(j, &column);
        }
    }
    let origin = grid.index_to_physical(&first_voxel);
    let new_grid = GridSpec::new(new_size, origin, new_spacing, new_direction)?;

    // Output tensor dim k holds spatial axis 2 - k.
    let mut permutation = [0isize; 3];
    for (k, p) in permutation.iter_mut().enumerate() {
        let source_spatial = orientation.source_axis[2 - k];
        *p = (2 - source_spatial) as isize;
    }
    let mut data = volume.data().clone().permute(permutation);
    let flips: Vec<isize> = (0..3)
        .filter(|&k| orientation.flipped[2 - k])
        .map(|k| k as isize)
        .collect();
    data = match flips.as_slice() {
        [] => data,
        [a] => data.flip([*a]),
        [a, b] => data.flip([*a, *b]),
        _ => data.flip([0, 1, 2]),
    };

    tracing::debug!(?orientation, "reoriented volume to canonical axes");
    Volume::from_grid(data, new_grid, volume.pixel_type())
}
