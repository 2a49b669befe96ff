//! Spherical harmonics evaluation for view-dependent color.
//!
//! Each primitive stores K RGB coefficients; degree d uses the first (d+1)²
//! of them. The color seen from the camera is
//!
//!   rgb = Σ_k Y_k(dir) · c_k + 0.5,   dir = normalize(mean - campos)
//!
//! with negative channels clamped to zero. Clamped channels pass no gradient.
//!
//! The basis is the real SH basis in the sign convention used by splatting
//! renderers (Y_1 = -C1·y, C1·z, -C1·x, ...), so coefficients trained by
//! other tools render identically here.

use nalgebra::Vector3;

pub const SH_C0: f32 = 0.282_094_8;
pub const SH_C1: f32 = 0.488_602_5;
pub const SH_C2: [f32; 5] = [
    1.092_548_4,
    -1.092_548_4,
    0.315_391_57,
    -1.092_548_4,
    0.546_274_2,
];
pub const SH_C3: [f32; 7] = [
    -0.590_043_6,
    2.890_611_4,
    -0.457_045_8,
    0.373_176_33,
    -0.457_045_8,
    1.445_305_7,
    -0.590_043_6,
];

/// Highest supported SH degree.
pub const MAX_SH_DEGREE: u32 = 3;

/// Number of coefficients used by SH degree `degree`.
#[inline]
pub fn coeffs_for_degree(degree: u32) -> usize {
    ((degree + 1) * (degree + 1)) as usize
}

/// Evaluate the SH basis functions up to `degree` for a unit direction.
///
/// Entries beyond `coeffs_for_degree(degree)` are zero.
///
/// Ordering:
/// - Degree 0 (1 function): Y_0^0
/// - Degree 1 (3 functions): Y_1^{-1}, Y_1^0, Y_1^1
/// - Degree 2 (5 functions): Y_2^{-2} .. Y_2^2
/// - Degree 3 (7 functions): Y_3^{-3} .. Y_3^3
pub fn sh_basis(dir: &Vector3<f32>, degree: u32) -> [f32; 16] {
    let mut b = [0.0f32; 16];
    b[0] = SH_C0;
    if degree < 1 {
        return b;
    }

    let (x, y, z) = (dir.x, dir.y, dir.z);
    b[1] = -SH_C1 * y;
    b[2] = SH_C1 * z;
    b[3] = -SH_C1 * x;
    if degree < 2 {
        return b;
    }

    let (xx, yy, zz) = (x * x, y * y, z * z);
    let (xy, yz, xz) = (x * y, y * z, x * z);
    b[4] = SH_C2[0] * xy;
    b[5] = SH_C2[1] * yz;
    b[6] = SH_C2[2] * (2.0 * zz - xx - yy);
    b[7] = SH_C2[3] * xz;
    b[8] = SH_C2[4] * (xx - yy);
    if degree < 3 {
        return b;
    }

    b[9] = SH_C3[0] * y * (3.0 * xx - yy);
    b[10] = SH_C3[1] * xy * z;
    b[11] = SH_C3[2] * y * (4.0 * zz - xx - yy);
    b[12] = SH_C3[3] * z * (2.0 * zz - 3.0 * xx - 3.0 * yy);
    b[13] = SH_C3[4] * x * (4.0 * zz - xx - yy);
    b[14] = SH_C3[5] * z * (xx - yy);
    b[15] = SH_C3[6] * x * (xx - 3.0 * yy);
    b
}

/// Derivatives of each basis function w.r.t. the (unit) direction components.
///
/// The direction is treated as a free 3-vector here; the normalization is
/// differentiated separately in `sh_to_rgb_backward`.
pub fn sh_basis_grad(dir: &Vector3<f32>, degree: u32) -> [Vector3<f32>; 16] {
    let mut g = [Vector3::zeros(); 16];
    if degree < 1 {
        return g;
    }

    let (x, y, z) = (dir.x, dir.y, dir.z);
    g[1] = Vector3::new(0.0, -SH_C1, 0.0);
    g[2] = Vector3::new(0.0, 0.0, SH_C1);
    g[3] = Vector3::new(-SH_C1, 0.0, 0.0);
    if degree < 2 {
        return g;
    }

    let (xx, yy, zz) = (x * x, y * y, z * z);
    let (xy, yz, xz) = (x * y, y * z, x * z);
    g[4] = SH_C2[0] * Vector3::new(y, x, 0.0);
    g[5] = SH_C2[1] * Vector3::new(0.0, z, y);
    g[6] = SH_C2[2] * Vector3::new(-2.0 * x, -2.0 * y, 4.0 * z);
    g[7] = SH_C2[3] * Vector3::new(z, 0.0, x);
    g[8] = SH_C2[4] * Vector3::new(2.0 * x, -2.0 * y, 0.0);
    if degree < 3 {
        return g;
    }

    g[9] = SH_C3[0] * Vector3::new(6.0 * xy, 3.0 * xx - 3.0 * yy, 0.0);
    g[10] = SH_C3[1] * Vector3::new(yz, xz, xy);
    g[11] = SH_C3[2] * Vector3::new(-2.0 * xy, 4.0 * zz - xx - 3.0 * yy, 8.0 * yz);
    g[12] = SH_C3[3] * Vector3::new(-6.0 * xz, -6.0 * yz, 6.0 * zz - 3.0 * xx - 3.0 * yy);
    g[13] = SH_C3[4] * Vector3::new(4.0 * zz - 3.0 * xx - yy, -2.0 * xy, 8.0 * xz);
    g[14] = SH_C3[5] * Vector3::new(2.0 * xz, -2.0 * yz, xx - yy);
    g[15] = SH_C3[6] * Vector3::new(3.0 * xx - 3.0 * yy, -6.0 * xy, 0.0);
    g
}

/// Raw SH expansion Σ_k Y_k(dir) · c_k (no offset, no clamp).
pub fn evaluate_sh(coeffs: &[Vector3<f32>], degree: u32, dir: &Vector3<f32>) -> Vector3<f32> {
    let basis = sh_basis(dir, degree);
    coeffs
        .iter()
        .zip(basis.iter())
        .take(coeffs_for_degree(degree))
        .fold(Vector3::zeros(), |acc, (c, &b)| acc + c * b)
}

/// View-dependent RGB of a primitive at `mean` seen from `campos`.
///
/// Returns the color and, per channel, whether it was clamped at zero.
pub fn sh_to_rgb(
    coeffs: &[Vector3<f32>],
    degree: u32,
    mean: &Vector3<f32>,
    campos: &Vector3<f32>,
) -> (Vector3<f32>, [bool; 3]) {
    let dir = view_direction(mean, campos);
    let raw = evaluate_sh(coeffs, degree, &dir).add_scalar(0.5);

    let clamped = [raw.x < 0.0, raw.y < 0.0, raw.z < 0.0];
    (raw.map(|c| c.max(0.0)), clamped)
}

/// Backpropagate dL/drgb through `sh_to_rgb`.
///
/// Writes dL/dc_k into `grad_coeffs` (same length as `coeffs`, entries past
/// the active degree stay zero) and returns the contribution to dL/dmean
/// through the view direction.
pub fn sh_to_rgb_backward(
    coeffs: &[Vector3<f32>],
    degree: u32,
    mean: &Vector3<f32>,
    campos: &Vector3<f32>,
    clamped: [bool; 3],
    dl_drgb: &Vector3<f32>,
    grad_coeffs: &mut [Vector3<f32>],
) -> Vector3<f32> {
    let v = mean - campos;
    let len = v.norm();
    if len <= f32::EPSILON {
        return Vector3::zeros();
    }
    let dir = v / len;

    let mut g = *dl_drgb;
    for (ch, &is_clamped) in clamped.iter().enumerate() {
        if is_clamped {
            g[ch] = 0.0;
        }
    }

    let used = coeffs_for_degree(degree).min(coeffs.len());
    let basis = sh_basis(&dir, degree);
    for k in 0..used {
        grad_coeffs[k] = g * basis[k];
    }

    if degree == 0 {
        return Vector3::zeros();
    }

    let basis_grad = sh_basis_grad(&dir, degree);
    let dl_ddir = (0..used).fold(Vector3::zeros(), |acc, k| {
        acc + basis_grad[k] * coeffs[k].dot(&g)
    });

    // d(v/|v|)/dv = (I - dir·dirᵀ) / |v|
    (dl_ddir - dir * dir.dot(&dl_ddir)) / len
}

fn view_direction(mean: &Vector3<f32>, campos: &Vector3<f32>) -> Vector3<f32> {
    let v = mean - campos;
    let len = v.norm();
    if len <= f32::EPSILON {
        Vector3::zeros()
    } else {
        v / len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sh_basis_dc_component() {
        let b1 = sh_basis(&Vector3::new(1.0, 0.0, 0.0), 3);
        let b2 = sh_basis(&Vector3::new(0.0, 1.0, 0.0), 3);
        assert_relative_eq!(b1[0], b2[0], epsilon = 1e-6);
        assert_relative_eq!(b1[0], 0.28209479, epsilon = 1e-6);
    }

    #[test]
    fn test_sh_basis_respects_degree() {
        let dir = Vector3::new(0.48, 0.6, 0.64);
        let b1 = sh_basis(&dir, 1);
        assert!(b1[4..].iter().all(|&v| v == 0.0));
        let b2 = sh_basis(&dir, 2);
        assert!(b2[9..].iter().all(|&v| v == 0.0));
        assert!(b2[4] != 0.0);
    }

    #[test]
    fn test_dc_only_is_view_independent() {
        let coeffs = [Vector3::new(1.0, 0.5, 0.2)];
        let campos = Vector3::zeros();
        let (c1, _) = sh_to_rgb(&coeffs, 0, &Vector3::new(1.0, 0.0, 0.0), &campos);
        let (c2, _) = sh_to_rgb(&coeffs, 0, &Vector3::new(0.0, 0.0, 5.0), &campos);
        assert_relative_eq!(c1, c2, epsilon = 1e-6);
        assert_relative_eq!(c1.x, SH_C0 + 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_negative_channel_is_clamped() {
        let coeffs = [Vector3::new(-5.0, 0.0, 1.0)];
        let (rgb, clamped) = sh_to_rgb(&coeffs, 0, &Vector3::z(), &Vector3::zeros());
        assert_eq!(rgb.x, 0.0);
        assert_eq!(clamped, [true, false, false]);
    }

    #[test]
    fn test_basis_grad_matches_finite_difference() {
        let dir = Vector3::new(0.3f32, -0.5, 0.81);
        let grads = sh_basis_grad(&dir, 3);
        let eps = 1e-3;
        for axis in 0..3 {
            let mut plus = dir;
            let mut minus = dir;
            plus[axis] += eps;
            minus[axis] -= eps;
            let bp = sh_basis(&plus, 3);
            let bm = sh_basis(&minus, 3);
            for k in 0..16 {
                let numeric = (bp[k] - bm[k]) / (2.0 * eps);
                assert_relative_eq!(grads[k][axis], numeric, epsilon = 2e-3);
            }
        }
    }

    #[test]
    fn test_backward_mean_gradient_matches_finite_difference() {
        let coeffs: Vec<Vector3<f32>> = (0..16)
            .map(|k| Vector3::new(0.3 - 0.05 * k as f32, 0.1 * (k % 3) as f32, 0.2))
            .collect();
        let campos = Vector3::new(0.1, -0.2, -3.0);
        let mean = Vector3::new(0.4, 0.3, 0.5);
        let w = Vector3::new(1.0, -0.5, 0.25);

        let (_, clamped) = sh_to_rgb(&coeffs, 3, &mean, &campos);
        let mut grad_coeffs = vec![Vector3::zeros(); 16];
        let dmean = sh_to_rgb_backward(&coeffs, 3, &mean, &campos, clamped, &w, &mut grad_coeffs);

        let loss = |m: &Vector3<f32>| sh_to_rgb(&coeffs, 3, m, &campos).0.dot(&w) as f64;
        let eps = 1e-3;
        for axis in 0..3 {
            let mut plus = mean;
            let mut minus = mean;
            plus[axis] += eps;
            minus[axis] -= eps;
            let numeric = (loss(&plus) - loss(&minus)) / (2.0 * eps as f64);
            assert_relative_eq!(dmean[axis] as f64, numeric, epsilon = 5e-3);
        }

        // Coefficient gradient is the basis weighted by the upstream gradient.
        let dir = (mean - campos).normalize();
        let basis = sh_basis(&dir, 3);
        assert_relative_eq!(grad_coeffs[5], w * basis[5], epsilon = 1e-6);
    }

    #[test]
    fn test_clamped_channel_has_no_gradient() {
        let coeffs = [Vector3::new(-5.0, 1.0, 1.0)];
        let mean = Vector3::new(0.0, 0.0, 2.0);
        let (_, clamped) = sh_to_rgb(&coeffs, 0, &mean, &Vector3::zeros());
        let mut grad = [Vector3::zeros()];
        sh_to_rgb_backward(
            &coeffs,
            0,
            &mean,
            &Vector3::zeros(),
            clamped,
            &Vector3::repeat(1.0),
            &mut grad,
        );
        assert_eq!(grad[0].x, 0.0);
        assert_relative_eq!(grad[0].y, SH_C0, epsilon = 1e-6);
    }
}
