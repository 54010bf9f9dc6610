//! Fixed-size geometry aliases.
//!
//! All physical quantities are kept in `f64`; tensors only ever see `f32`
//! copies produced at the last moment.

use nalgebra::{Matrix3, Matrix4, Point3 as NaPoint3, Vector3 as NaVector3};

pub type Point3 = NaPoint3<f64>;
pub type Vector3 = NaVector3<f64>;
pub type Spacing3 = NaVector3<f64>;
pub type Direction3 = Matrix3<f64>;
pub type Affine4 = Matrix4<f64>;

/// Build a homogeneous 4x4 matrix from a linear part and an offset.
pub fn homogeneous(linear: &Matrix3<f64>, offset: &NaVector3<f64>) -> Affine4 {
    let mut m = Affine4::identity();
    m.fixed_view_mut::<3, 3>(0, 0).copy_from(linear);
    m.fixed_view_mut::<3, 1>(0, 3).copy_from(offset);
    m
}

/// Split a homogeneous matrix into its linear part and offset.
pub fn split_homogeneous(m: &Affine4) -> (Matrix3<f64>, NaVector3<f64>) {
    let linear: Matrix3<f64> = m.fixed_view::<3, 3>(0, 0).into_owned();
    let offset: NaVector3<f64> = m.fixed_view::<3, 1>(0, 3).into_owned();
    (linear, offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_homogeneous_roundtrip() {
        let linear = Matrix3::new(1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 10.0);
        let offset = NaVector3::new(-1.0, 0.5, 2.0);
        let m = homogeneous(&linear, &offset);
        assert_eq!(m[(3, 3)], 1.0);
        assert_eq!(m[(0, 3)], -1.0);
        let (l, o) = split_homogeneous(&m);
        assert_eq!(l, linear);
        assert_eq!(o, offset);
    }
}
