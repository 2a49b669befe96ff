//! Gradients for covariance reconstruction and projection.
//!
//! Forward chain (see `render::preprocess`):
//!   scale + rotation -> Σ = (R S)(R S)ᵀ -> Σ₂d = J W Σ Wᵀ Jᵀ + low_pass·I
//!   -> conic = Σ₂d⁻¹
//!
//! Symmetric 2×2 quantities are passed around as scalar triples (a, b, c)
//! for [[a, b], [b, c]], with b counted once.

use nalgebra::{Matrix2, Matrix3, Vector3, Vector4};

use crate::core::math::quaternion_to_matrix;
use crate::diff::quaternion_grad::quaternion_raw_to_matrix_grad;
use crate::render::preprocess::CovarianceProjection;

/// Gradient of the conic (A, B, C) = inverse of (a, b, c) w.r.t. (a, b, c).
///
/// A = c / det,  B = -b / det,  C = a / det,  det = a c - b²
pub fn conic_grad_to_cov2d(cov: &Vector3<f32>, d_conic: &Vector3<f32>) -> Vector3<f32> {
    let (a, b, c) = (cov.x, cov.y, cov.z);
    let det = a * c - b * b;
    let det2 = det * det;

    // Partial derivatives of the inverse entries w.r.t (a, b, c).
    let d_ia_d_a = -(c * c) / det2;
    let d_ia_d_b = (2.0 * b * c) / det2;
    let d_ia_d_c = -(b * b) / det2;

    let d_ib_d_a = (b * c) / det2;
    let d_ib_d_b = -1.0 / det - (2.0 * b * b) / det2;
    let d_ib_d_c = (a * b) / det2;

    let d_ic_d_a = -(b * b) / det2;
    let d_ic_d_b = (2.0 * a * b) / det2;
    let d_ic_d_c = -(a * a) / det2;

    Vector3::new(
        d_conic.x * d_ia_d_a + d_conic.y * d_ib_d_a + d_conic.z * d_ic_d_a,
        d_conic.x * d_ia_d_b + d_conic.y * d_ib_d_b + d_conic.z * d_ic_d_b,
        d_conic.x * d_ia_d_c + d_conic.y * d_ib_d_c + d_conic.z * d_ic_d_c,
    )
}

/// Symmetric matrix gradient G with L = <G, Σ₂d> for a triple gradient.
#[inline]
fn triple_to_matrix(d_cov2d: &Vector3<f32>) -> Matrix2<f32> {
    Matrix2::new(d_cov2d.x, 0.5 * d_cov2d.y, 0.5 * d_cov2d.y, d_cov2d.z)
}

/// dL/dΣ (world space) from dL/d(a, b, c) of the projected covariance.
///
/// Σ₂d = T Σ Tᵀ with T = J W, so dL/dΣ = Tᵀ G T.
pub fn cov2d_grad_to_cov3d(proj: &CovarianceProjection, d_cov2d: &Vector3<f32>) -> Matrix3<f32> {
    let t = proj.j * proj.w;
    t.transpose() * triple_to_matrix(d_cov2d) * t
}

/// dL/dp_view through the Jacobian's dependence on the camera-space mean.
///
/// J = | fx/tz   0      -fx·tx/tz² |
///     |  0     fy/tz   -fy·ty/tz² |
///
/// When x/z (or y/z) hit the guard band, tx = ±lim·tz: the x derivative
/// vanishes and J02 depends on tz through the clamped ratio only.
pub fn cov2d_grad_to_mean(
    proj: &CovarianceProjection,
    cov3d: &Matrix3<f32>,
    d_cov2d: &Vector3<f32>,
    fx: f32,
    fy: f32,
) -> Vector3<f32> {
    let cov_cam = proj.w * cov3d * proj.w.transpose();
    // Σ₂d = J Σc Jᵀ  =>  dL/dJ = 2 G J Σc
    let d_j = 2.0 * triple_to_matrix(d_cov2d) * proj.j * cov_cam;

    let t = &proj.t;
    let tz_inv = 1.0 / t.z;
    let tz_inv2 = tz_inv * tz_inv;
    let tz_inv3 = tz_inv2 * tz_inv;

    let (dtx, j02_dtz) = if proj.clamped_x {
        (0.0, fx * t.x * tz_inv3)
    } else {
        (-fx * tz_inv2 * d_j[(0, 2)], 2.0 * fx * t.x * tz_inv3)
    };
    let (dty, j12_dtz) = if proj.clamped_y {
        (0.0, fy * t.y * tz_inv3)
    } else {
        (-fy * tz_inv2 * d_j[(1, 2)], 2.0 * fy * t.y * tz_inv3)
    };
    let dtz = -fx * tz_inv2 * d_j[(0, 0)]
        - fy * tz_inv2 * d_j[(1, 1)]
        + j02_dtz * d_j[(0, 2)]
        + j12_dtz * d_j[(1, 2)];

    Vector3::new(dtx, dty, dtz)
}

/// Gradient w.r.t. the packed (xx, xy, xz, yy, yz, zz) covariance.
///
/// Off-diagonal entries appear twice in Σ.
pub fn cov3d_grad_to_packed(d_sigma: &Matrix3<f32>) -> [f32; 6] {
    [
        d_sigma[(0, 0)],
        d_sigma[(0, 1)] + d_sigma[(1, 0)],
        d_sigma[(0, 2)] + d_sigma[(2, 0)],
        d_sigma[(1, 1)],
        d_sigma[(1, 2)] + d_sigma[(2, 1)],
        d_sigma[(2, 2)],
    ]
}

/// Gradients of Σ = (R S)(R S)ᵀ w.r.t. the raw scale and raw quaternion.
///
/// With M = R S and S = diag(modifier · s):
///   dL/dM = (G + Gᵀ) M
///   dL/ds_j = modifier · Σ_i dM_ij R_ij
///   dL/dR_ij = dM_ij · modifier · s_j
pub fn cov3d_grad_to_scale_rotation(
    scale: &Vector3<f32>,
    scale_modifier: f32,
    rotation: &Vector4<f32>,
    d_sigma: &Matrix3<f32>,
) -> (Vector3<f32>, Vector4<f32>) {
    let r = quaternion_to_matrix(rotation);
    let s = scale * scale_modifier;
    let m = r * Matrix3::from_diagonal(&s);
    let d_m = (d_sigma + d_sigma.transpose()) * m;

    let mut d_scale = Vector3::zeros();
    let mut d_r = Matrix3::zeros();
    for j in 0..3 {
        d_scale[j] = scale_modifier * d_m.column(j).dot(&r.column(j));
        for i in 0..3 {
            d_r[(i, j)] = d_m[(i, j)] * s[j];
        }
    }

    (d_scale, quaternion_raw_to_matrix_grad(rotation, &d_r))
}
