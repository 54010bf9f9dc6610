//! Centered rigid and affine transforms of physical space.
//!
//! Every transform has the form `T(x) = A (x - c) + c + t` where `c` is a
//! fixed centre of rotation, `A` the linear part and `t` the translation.
//! Rigid transforms parametrise `A` with Euler angles; affine transforms
//! store its nine entries directly.

use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};

use super::rigid::{euler_angles, rotation_matrix};
use crate::error::{CoreError, Result};
use crate::spatial::{homogeneous, Affine4, Point3, Vector3};

/// |det(A)| below which a transform is treated as singular.
pub const INVERTIBILITY_FLOOR: f64 = 1e-8;

/// Family a transform belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    /// Rotation and translation, 6 parameters `[ax, ay, az, tx, ty, tz]`.
    Rigid,
    /// General linear map and translation, 12 parameters
    /// `[a00, a01, a02, a10, .., a22, tx, ty, tz]`.
    Affine,
}

impl TransformKind {
    pub fn parameter_count(self) -> usize {
        match self {
            TransformKind::Rigid => 6,
            TransformKind::Affine => 12,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TransformKind::Rigid => "rigid",
            TransformKind::Affine => "affine",
        }
    }
}

impl std::fmt::Display for TransformKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for TransformKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "rigid" | "euler" => Ok(TransformKind::Rigid),
            "affine" => Ok(TransformKind::Affine),
            other => Err(CoreError::invalid(format!("unknown transform kind '{}'", other))),
        }
    }
}

/// A parametrised mapping between physical spaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    kind: TransformKind,
    parameters: Vec<f64>,
    center: Point3,
}

impl Transform {
    /// The identity of the given kind about `center`.
    pub fn identity(kind: TransformKind, center: Point3) -> Self {
        let parameters = match kind {
            TransformKind::Rigid => vec![0.0; 6],
            TransformKind::Affine => vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0],
        };
        Self { kind, parameters, center }
    }

    /// Rigid transform from Euler angles (radians) and a translation.
    pub fn rigid(angles: Vector3, translation: Vector3, center: Point3) -> Self {
        Self {
            kind: TransformKind::Rigid,
            parameters: vec![
                angles[0],
                angles[1],
                angles[2],
                translation[0],
                translation[1],
                translation[2],
            ],
            center,
        }
    }

    /// Affine transform from a linear part and a translation.
    pub fn affine(matrix: Matrix3<f64>, translation: Vector3, center: Point3) -> Self {
        let mut parameters = Vec::with_capacity(12);
        for r in 0..3 {
            for c in 0..3 {
                parameters.push(matrix[(r, c)]);
            }
        }
        parameters.extend_from_slice(translation.as_slice());
        Self {
            kind: TransformKind::Affine,
            parameters,
            center,
        }
    }

    /// Translation-only rigid transform.
    pub fn translation_only(translation: Vector3) -> Self {
        Self::rigid(Vector3::zeros(), translation, Point3::origin())
    }

    /// Rebuild a transform from its serialized parts.
    pub fn from_parameters(kind: TransformKind, parameters: &[f64], center: Point3) -> Result<Self> {
        if parameters.len() != kind.parameter_count() {
            return Err(CoreError::invalid(format!(
                "{} transform takes {} parameters, got {}",
                kind,
                kind.parameter_count(),
                parameters.len()
            )));
        }
        if parameters.iter().chain(center.iter()).any(|p| !p.is_finite()) {
            return Err(CoreError::invalid("transform parameters must be finite"));
        }
        Ok(Self {
            kind,
            parameters: parameters.to_vec(),
            center,
        })
    }

    pub fn kind(&self) -> TransformKind {
        self.kind
    }

    pub fn parameters(&self) -> &[f64] {
        &self.parameters
    }

    pub fn center(&self) -> &Point3 {
        &self.center
    }

    /// Euler angles of a rigid transform, `None` for affine ones.
    pub fn angles(&self) -> Option<Vector3> {
        match self.kind {
            TransformKind::Rigid => Some(Vector3::new(self.parameters[0], self.parameters[1], self.parameters[2])),
            TransformKind::Affine => None,
        }
    }

    /// Linear part `A`.
    pub fn matrix(&self) -> Matrix3<f64> {
        match self.kind {
            TransformKind::Rigid => rotation_matrix(&Vector3::new(
                self.parameters[0],
                self.parameters[1],
                self.parameters[2],
            )),
            TransformKind::Affine => Matrix3::from_row_slice(&self.parameters[..9]),
        }
    }

    /// Translation `t`.
    pub fn translation(&self) -> Vector3 {
        let n = self.parameters.len();
        Vector3::new(self.parameters[n - 3], self.parameters[n - 2], self.parameters[n - 1])
    }

    /// Offset `c + t - A c`, so that `T(x) = A x + offset`.
    pub fn offset(&self) -> Vector3 {
        self.center.coords + self.translation() - self.matrix() * self.center.coords
    }

    pub fn determinant(&self) -> f64 {
        self.matrix().determinant()
    }

    /// Homogeneous 4x4 matrix of the mapping.
    pub fn to_homogeneous(&self) -> Affine4 {
        homogeneous(&self.matrix(), &self.offset())
    }

    pub fn transform_point(&self, point: &Point3) -> Point3 {
        let a = self.matrix();
        Point3::from(a * (point - self.center) + self.center.coords + self.translation())
    }

    /// The inverse mapping, about the same centre.
    ///
    /// Fails with [`CoreError::NonInvertibleTransform`] when
    /// `|det(A)| < INVERTIBILITY_FLOOR`.
    pub fn inverse(&self) -> Result<Transform> {
        let a = self.matrix();
        let det = a.determinant();
        if !det.is_finite() || det.abs() < INVERTIBILITY_FLOOR {
            return Err(CoreError::non_invertible(format!(
                "{} transform has determinant {:.3e}",
                self.kind, det
            )));
        }
        match self.kind {
            TransformKind::Rigid => {
                let r_inv = a.transpose();
                let t_inv = -(r_inv * self.translation());
                Ok(Self::rigid(euler_angles(&r_inv), t_inv, self.center))
            }
            TransformKind::Affine => {
                let a_inv = a
                    .try_inverse()
                    .ok_or_else(|| CoreError::non_invertible("affine matrix inversion failed"))?;
                let t_inv = -(a_inv * self.translation());
                Ok(Self::affine(a_inv, t_inv, self.center))
            }
        }
    }

    /// `self ∘ other`: apply `other` first, then `self`.
    ///
    /// The result is rigid only if both operands are rigid, and is centred
    /// on `other`'s centre.
    pub fn compose(&self, other: &Transform) -> Transform {
        let a1 = self.matrix();
        let a2 = other.matrix();
        let c1 = self.center.coords;
        let c2 = other.center.coords;
        let linear = a1 * a2;
        let translation = a1 * (c2 + other.translation() - c1) + c1 + self.translation() - c2;
        match (self.kind, other.kind) {
            (TransformKind::Rigid, TransformKind::Rigid) => {
                Transform::rigid(euler_angles(&linear), translation, other.center)
            }
            _ => Transform::affine(linear, translation, other.center),
        }
    }

    /// The same mapping expressed with affine parameters.
    pub fn to_affine(&self) -> Transform {
        match self.kind {
            TransformKind::Affine => self.clone(),
            TransformKind::Rigid => Transform::affine(self.matrix(), self.translation(), self.center),
        }
    }

    /// Whether the mapping moves no point of a box of half-width `extent`
    /// around the centre by more than `tol`.
    pub fn is_identity(&self, tol: f64) -> bool {
        let extent = 100.0;
        let linear_dev = (self.matrix() - Matrix3::identity()).abs().max() * extent;
        linear_dev + self.translation().abs().max() <= tol
    }

    /// Largest displacement of any of `points` under the mapping.
    pub fn max_displacement(&self, points: &[Point3]) -> f64 {
        points
            .iter()
            .map(|p| (self.transform_point(p) - p).norm())
            .fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_points() -> Vec<Point3> {
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(100.0, -40.0, 20.0),
            Point3::new(-64.0, 32.0, 90.0),
            Point3::new(12.5, 7.25, -3.0),
        ]
    }

    fn sample_affine() -> Transform {
        let m = Matrix3::new(1.1, 0.05, -0.02, 0.03, 0.95, 0.1, -0.04, 0.02, 1.05);
        Transform::affine(m, Vector3::new(3.0, -2.0, 7.5), Point3::new(10.0, 20.0, -5.0))
    }

    #[test]
    fn test_identity_maps_points_to_themselves() {
        for kind in [TransformKind::Rigid, TransformKind::Affine] {
            let t = Transform::identity(kind, Point3::new(1.0, 2.0, 3.0));
            for p in sample_points() {
                assert_eq!(t.transform_point(&p), p);
            }
            assert!(t.is_identity(1e-12));
        }
    }

    #[test]
    fn test_rigid_inverse_roundtrip() {
        let t = Transform::rigid(Vector3::new(0.1, -0.2, 0.3), Vector3::new(5.0, -3.0, 1.0), Point3::new(30.0, 40.0, 50.0));
        let inv = t.inverse().unwrap();
        assert_eq!(inv.kind(), TransformKind::Rigid);
        for p in sample_points() {
            let q = inv.transform_point(&t.transform_point(&p));
            assert!((q - p).norm() < 1e-9);
        }
        assert!(t.compose(&inv).is_identity(1e-4));
    }

    #[test]
    fn test_affine_inverse_roundtrip() {
        let t = sample_affine();
        let inv = t.inverse().unwrap();
        for p in sample_points() {
            let q = t.transform_point(&inv.transform_point(&p));
            assert!((q - p).norm() < 1e-9);
        }
        assert!(inv.compose(&t).is_identity(1e-4));
    }

    #[test]
    fn test_singular_inverse_fails() {
        let m = Matrix3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1e-12);
        let t = Transform::affine(m, Vector3::zeros(), Point3::origin());
        assert!(matches!(t.inverse(), Err(CoreError::NonInvertibleTransform(_))));
    }

    #[test]
    fn test_compose_applies_right_operand_first() {
        let a = sample_affine();
        let b = Transform::rigid(Vector3::new(0.0, 0.0, 0.5), Vector3::new(1.0, 2.0, 3.0), Point3::new(-4.0, 0.0, 2.0));
        let ab = a.compose(&b);
        assert_eq!(ab.kind(), TransformKind::Affine);
        for p in sample_points() {
            let expected = a.transform_point(&b.transform_point(&p));
            assert!((ab.transform_point(&p) - expected).norm() < 1e-9);
        }
    }

    #[test]
    fn test_rigid_compose_stays_rigid() {
        let a = Transform::rigid(Vector3::new(0.1, 0.0, 0.0), Vector3::new(1.0, 0.0, 0.0), Point3::origin());
        let b = Transform::rigid(Vector3::new(0.0, 0.2, 0.0), Vector3::new(0.0, 1.0, 0.0), Point3::new(1.0, 1.0, 1.0));
        assert_eq!(a.compose(&b).kind(), TransformKind::Rigid);
    }

    #[test]
    fn test_homogeneous_matches_point_mapping() {
        let t = sample_affine();
        let h = t.to_homogeneous();
        for p in sample_points() {
            let q = h.transform_point(&p);
            assert!((q - t.transform_point(&p)).norm() < 1e-9);
        }
    }

    #[test]
    fn test_from_parameters_validates_length() {
        assert!(Transform::from_parameters(TransformKind::Rigid, &[0.0; 12], Point3::origin()).is_err());
        assert!(Transform::from_parameters(TransformKind::Affine, &[f64::NAN; 12], Point3::origin()).is_err());
        let t = sample_affine();
        let rebuilt = Transform::from_parameters(t.kind(), t.parameters(), *t.center()).unwrap();
        assert_eq!(rebuilt, t);
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!("Rigid".parse::<TransformKind>().unwrap(), TransformKind::Rigid);
        assert_eq!("affine".parse::<TransformKind>().unwrap(), TransformKind::Affine);
        assert!("bspline".parse::<TransformKind>().is_err());
    }
}
