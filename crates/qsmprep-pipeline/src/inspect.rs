//! Geometry and intensity agreement between volumes that should share a
//! space, e.g. every modality of a case after propagation.

use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};

use qsmprep_core::{Volume, VolumeStatistics};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeSummary {
    pub name: String,
    pub size: [usize; 3],
    pub spacing: [f64; 3],
    pub statistics: VolumeStatistics,
}

/// Agreement of one pair of volumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairCheck {
    pub first: String,
    pub second: String,
    pub same_shape: bool,
    pub same_spacing: bool,
    pub same_affine: bool,
    /// Largest element-wise affine difference.
    pub affine_difference: f64,
}

impl PairCheck {
    pub fn agrees(&self) -> bool {
        self.same_shape && self.same_spacing && self.same_affine
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub volumes: Vec<VolumeSummary>,
    pub pairs: Vec<PairCheck>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.pairs.iter().all(PairCheck::agrees)
    }
}

/// Compare every pair of `volumes`; spacing and affines agree when they
/// differ by at most `atol`.
pub fn inspect_consistency<B: Backend>(volumes: &[(String, Volume<B>)], atol: f64) -> Result<ConsistencyReport> {
    let mut summaries = Vec::with_capacity(volumes.len());
    for (name, volume) in volumes {
        let spacing = volume.spacing();
        summaries.push(VolumeSummary {
            name: name.clone(),
            size: volume.size(),
            spacing: [spacing[0], spacing[1], spacing[2]],
            statistics: volume.statistics()?,
        });
    }

    let mut pairs = Vec::new();
    for (i, (first, a)) in volumes.iter().enumerate() {
        for (second, b) in &volumes[i + 1..] {
            let affine_difference = (a.physical_affine() - b.physical_affine()).abs().max();
            let same_spacing = (a.spacing() - b.spacing()).abs().max() <= atol;
            let check = PairCheck {
                first: first.clone(),
                second: second.clone(),
                same_shape: a.size() == b.size(),
                same_spacing,
                same_affine: affine_difference <= atol,
                affine_difference,
            };
            if !check.agrees() {
                tracing::warn!(
                    first = %check.first,
                    second = %check.second,
                    same_shape = check.same_shape,
                    same_spacing = check.same_spacing,
                    affine_difference,
                    "volumes disagree"
                );
            }
            pairs.push(check);
        }
    }
    Ok(ConsistencyReport {
        volumes: summaries,
        pairs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use qsmprep_core::{GridSpec, PixelType, Point3, Spacing3};

    type TestBackend = NdArray<f32>;

    fn volume(origin: Point3, spacing: f64) -> Volume<TestBackend> {
        let grid = GridSpec::axis_aligned([4, 3, 2], origin, Spacing3::repeat(spacing)).unwrap();
        let values = (0..24).map(|v| v as f32).collect();
        Volume::from_values(values, grid, PixelType::Continuous, &Default::default()).unwrap()
    }

    #[test]
    fn test_identical_grids_are_consistent() {
        let volumes = vec![
            ("t1".to_string(), volume(Point3::origin(), 1.0)),
            ("flair".to_string(), volume(Point3::origin(), 1.0)),
            ("mask".to_string(), volume(Point3::new(0.0, 0.0, 1e-7), 1.0)),
        ];
        let report = inspect_consistency(&volumes, 1e-5).unwrap();
        assert_eq!(report.pairs.len(), 3);
        assert!(report.is_consistent());
        assert_eq!(report.volumes[0].statistics.max, 23.0);
    }

    #[test]
    fn test_shifted_affine_is_flagged() {
        let volumes = vec![
            ("t1".to_string(), volume(Point3::origin(), 1.0)),
            ("mask".to_string(), volume(Point3::new(0.5, 0.0, 0.0), 1.0)),
        ];
        let report = inspect_consistency(&volumes, 1e-5).unwrap();
        assert!(!report.is_consistent());
        let pair = &report.pairs[0];
        assert!(pair.same_shape && pair.same_spacing && !pair.same_affine);
        assert!((pair.affine_difference - 0.5).abs() < 1e-12);
    }
}
