//! Gradient of the raw quaternion -> rotation matrix conversion.
//!
//! Rotations arrive as unconstrained 4-vectors (w, x, y, z) and are
//! normalized inside `core::math::quaternion_to_matrix`, so the gradient
//! includes the normalization:
//!
//!   dL/dq_raw = (I - q qᵀ) / ||q_raw|| · dL/dq

use nalgebra::{Matrix3, Vector4};

/// dL/dq_raw given dL/dR (3×3). Returns (w, x, y, z).
///
/// A zero quaternion renders as the identity and receives no gradient.
pub fn quaternion_raw_to_matrix_grad(q_raw: &Vector4<f32>, d_r: &Matrix3<f32>) -> Vector4<f32> {
    let n = q_raw.norm();
    if n <= f32::EPSILON {
        return Vector4::zeros();
    }
    let q = q_raw / n;
    let (w, x, y, z) = (q[0], q[1], q[2], q[3]);
    let g = |i: usize, j: usize| d_r[(i, j)];

    // Antisymmetric and symmetric parts of the off-diagonal gradient.
    let a21 = g(2, 1) - g(1, 2);
    let a02 = g(0, 2) - g(2, 0);
    let a10 = g(1, 0) - g(0, 1);
    let s01 = g(0, 1) + g(1, 0);
    let s02 = g(0, 2) + g(2, 0);
    let s12 = g(1, 2) + g(2, 1);

    let grad_unit = 2.0
        * Vector4::new(
            x * a21 + y * a02 + z * a10,
            w * a21 + y * s01 + z * s02 - 2.0 * x * (g(1, 1) + g(2, 2)),
            w * a02 + x * s01 + z * s12 - 2.0 * y * (g(0, 0) + g(2, 2)),
            w * a10 + x * s02 + y * s12 - 2.0 * z * (g(0, 0) + g(1, 1)),
        );

    (grad_unit - q * q.dot(&grad_unit)) / n
}
