//! Euler-angle rotation helpers.
//!
//! Rotations use the `Z * Y * X` composition: a point is rotated about x
//! first, then y, then z. Angles are radians stored `[ax, ay, az]`.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use nalgebra::Matrix3;

use crate::spatial::Vector3;

/// Below this |cos(ay)| the x and z rotations are no longer separable.
const GIMBAL_EPSILON: f64 = 1e-9;

/// Rotation matrix `Rz(az) * Ry(ay) * Rx(ax)`.
pub fn rotation_matrix(angles: &Vector3) -> Matrix3<f64> {
    let (sx, cx) = angles[0].sin_cos();
    let (sy, cy) = angles[1].sin_cos();
    let (sz, cz) = angles[2].sin_cos();
    Matrix3::new(
        cz * cy,
        cz * sy * sx - sz * cx,
        cz * sy * cx + sz * sx,
        sz * cy,
        sz * sy * sx + cz * cx,
        sz * sy * cx - cz * sx,
        -sy,
        cy * sx,
        cy * cx,
    )
}

/// Recover `[ax, ay, az]` from a rotation matrix built by [`rotation_matrix`].
///
/// At gimbal lock (`ay = +-pi/2`) the z angle is set to zero and the whole
/// residual rotation is assigned to x.
pub fn euler_angles(r: &Matrix3<f64>) -> Vector3 {
    let sy = (-r[(2, 0)]).clamp(-1.0, 1.0);
    let ay = sy.asin();
    let cy = (r[(2, 1)].powi(2) + r[(2, 2)].powi(2)).sqrt();
    if cy > GIMBAL_EPSILON {
        let ax = r[(2, 1)].atan2(r[(2, 2)]);
        let az = r[(1, 0)].atan2(r[(0, 0)]);
        Vector3::new(ax, ay, az)
    } else if sy > 0.0 {
        Vector3::new(r[(0, 1)].atan2(r[(0, 2)]), ay, 0.0)
    } else {
        Vector3::new((-r[(0, 1)]).atan2(-r[(0, 2)]), ay, 0.0)
    }
}

/// Differentiable rotation matrix `[3, 3]` from an angle tensor `[3]`.
pub fn rotation_matrix_tensor<B: Backend>(angles: Tensor<B, 1>) -> Tensor<B, 2> {
    let alpha = angles.clone().slice([0..1]); // x
    let beta = angles.clone().slice([1..2]); // y
    let gamma = angles.slice([2..3]); // z

    let cx = alpha.clone().cos();
    let sx = alpha.sin();
    let cy = beta.clone().cos();
    let sy = beta.sin();
    let cz = gamma.clone().cos();
    let sz = gamma.sin();

    let r11 = cz.clone().mul(cy.clone());
    let r12 = cz.clone().mul(sy.clone()).mul(sx.clone()).sub(sz.clone().mul(cx.clone()));
    let r13 = cz.clone().mul(sy.clone()).mul(cx.clone()).add(sz.clone().mul(sx.clone()));

    let r21 = sz.clone().mul(cy.clone());
    let r22 = sz.clone().mul(sy.clone()).mul(sx.clone()).add(cz.clone().mul(cx.clone()));
    let r23 = sz.mul(sy.clone()).mul(cx.clone()).sub(cz.mul(sx.clone()));

    let r31 = sy.neg();
    let r32 = cy.clone().mul(sx);
    let r33 = cy.mul(cx);

    let row1 = Tensor::cat(vec![r11, r12, r13], 0).reshape([1, 3]);
    let row2 = Tensor::cat(vec![r21, r22, r23], 0).reshape([1, 3]);
    let row3 = Tensor::cat(vec![r31, r32, r33], 0).reshape([1, 3]);

    Tensor::cat(vec![row1, row2, row3], 0)
}
