//! Gradients for projecting a primitive's mean.
//!
//! Forward:
//!   h = P · [p, 1],  ndc = h.xy / (h.w + ε),  pixel = ((ndc + 1) · size - 1) / 2
//!   depth = (V · [p, 1]).z

use nalgebra::{Matrix4, Vector2, Vector3};

/// Convert a pixel-space gradient to NDC units (d pixel / d ndc = size / 2).
pub fn pixel_grad_to_ndc(d_pixel: &Vector2<f32>, width: u32, height: u32) -> Vector2<f32> {
    Vector2::new(d_pixel.x * 0.5 * width as f32, d_pixel.y * 0.5 * height as f32)
}

/// dL/dp from dL/dndc through the perspective divide.
///
/// d ndc_k / dp = P[k,:3] · m_w - h_k · m_w² · P[3,:3],  m_w = 1 / (h.w + ε)
pub fn ndc_grad_to_mean(
    proj_matrix: &Matrix4<f32>,
    p: &Vector3<f32>,
    d_ndc: &Vector2<f32>,
) -> Vector3<f32> {
    let h = proj_matrix * p.push(1.0);
    let m_w = 1.0 / (h.w + 1e-7);
    let row = |k: usize| -> Vector3<f32> { proj_matrix.fixed_view::<1, 3>(k, 0).transpose() };

    let w_row = row(3);
    (row(0) * m_w - w_row * (h.x * m_w * m_w)) * d_ndc.x
        + (row(1) * m_w - w_row * (h.y * m_w * m_w)) * d_ndc.y
}

/// dL/dp from dL/d(camera-space depth).
pub fn depth_grad_to_mean(view_matrix: &Matrix4<f32>, d_depth: f32) -> Vector3<f32> {
    view_matrix.fixed_view::<1, 3>(2, 0).transpose() * d_depth
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RasterCamera;
    use approx::assert_relative_eq;

    fn camera() -> RasterCamera {
        let mut view = Matrix4::identity();
        let (s, c) = (0.3f32.sin(), 0.3f32.cos());
        view[(1, 1)] = c;
        view[(1, 2)] = -s;
        view[(2, 1)] = s;
        view[(2, 2)] = c;
        view[(0, 3)] = 0.2;
        view[(2, 3)] = 2.5;
        RasterCamera::perspective(view, 1.1, 0.8, 64, 48, 0.01, 100.0)
    }

    #[test]
    fn test_pixel_grad_matches_finite_difference() {
        let cam = camera();
        let p = Vector3::new(0.3, -0.4, 1.0);
        let w = Vector2::new(0.7, -1.3);

        let d_ndc = pixel_grad_to_ndc(&w, cam.width, cam.height);
        let grad = ndc_grad_to_mean(&cam.proj_matrix, &p, &d_ndc);

        let loss = |q: &Vector3<f32>| {
            let (u, v) = cam.world_to_pixel(q);
            u as f64 * w.x as f64 + v as f64 * w.y as f64
        };
        let eps = 1e-3;
        for k in 0..3 {
            let mut plus = p;
            let mut minus = p;
            plus[k] += eps;
            minus[k] -= eps;
            let numeric = (loss(&plus) - loss(&minus)) / (2.0 * eps as f64);
            assert_relative_eq!(grad[k] as f64, numeric, epsilon = 5e-2, max_relative = 1e-2);
        }
    }

    #[test]
    fn test_depth_grad_is_view_row() {
        let cam = camera();
        let grad = depth_grad_to_mean(&cam.view_matrix, 2.0);
        let p = Vector3::new(0.1, 0.2, 0.3);
        let moved = p + Vector3::new(0.0, 0.5, 0.0);
        let dz = cam.world_to_camera(&moved).z - cam.world_to_camera(&p).z;
        assert_relative_eq!(grad.y, 2.0 * dz / 0.5, epsilon = 1e-5);
    }
}
