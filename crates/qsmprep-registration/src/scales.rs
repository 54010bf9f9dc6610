//! Parameter scales from physical shift.
//!
//! Each parameter is nudged by a small amount and the largest resulting
//! displacement of the fixed-domain corners is measured; the scale is the
//! squared displacement per unit parameter change. Translations come out
//! at 1, rotations at roughly the squared radius of the image.

use qsmprep_core::{Point3, Transform};

use crate::error::Result;

pub const DEFAULT_PARAMETER_DELTA: f64 = 0.01;

/// Scales for every parameter of `transform`, probed at `points`.
pub fn physical_shift_scales(transform: &Transform, points: &[Point3], delta: f64) -> Result<Vec<f64>> {
    let base: Vec<Point3> = points.iter().map(|p| transform.transform_point(p)).collect();
    let mut scales = Vec::with_capacity(transform.parameters().len());
    for i in 0..transform.parameters().len() {
        let mut nudged = transform.parameters().to_vec();
        nudged[i] += delta;
        let probe = Transform::from_parameters(transform.kind(), &nudged, *transform.center())?;
        let shift = points
            .iter()
            .zip(&base)
            .map(|(p, b)| (probe.transform_point(p) - b).norm())
            .fold(0.0, f64::max);
        let scale = (shift / delta).powi(2);
        scales.push(if scale > f64::EPSILON { scale } else { 1.0 });
    }
    tracing::debug!(?scales, "estimated parameter scales");
    Ok(scales)
}
