//! Backward projection: screen-space gradients to primitive parameters.
//!
//! Reverses `render::preprocess` per primitive (in parallel). The 2D
//! covariance chain is recomputed from the stored 3D covariance rather than
//! read back, so only the screen-space state has to survive in the
//! geometry buffer.

use nalgebra::{Vector2, Vector3, Vector4};
use rayon::prelude::*;

use crate::core::math::unpack_covariance;
use crate::core::sh::sh_to_rgb_backward;
use crate::core::{ColorSource, CovarianceSource, RasterConfig, RasterSettings, ResolvedGaussians};
use crate::diff::backward::Gradients;
use crate::diff::composite_grad::ScreenGrads;
use crate::diff::covariance_grad::{
    conic_grad_to_cov2d, cov2d_grad_to_cov3d, cov2d_grad_to_mean, cov3d_grad_to_packed,
    cov3d_grad_to_scale_rotation,
};
use crate::diff::project_grad::{depth_grad_to_mean, ndc_grad_to_mean, pixel_grad_to_ndc};
use crate::render::buffers::GeometryBuffer;
use crate::render::preprocess::project_covariance;

#[derive(Clone, Copy, Debug, Default)]
struct PrimitiveGrads {
    mean2d: Vector2<f32>,
    mean3d: Vector3<f32>,
    color: Vector3<f32>,
    opacity: f32,
    cov3d: [f32; 6],
    scale: Vector3<f32>,
    rotation: Vector4<f32>,
}

/// Propagate screen-space gradients of every visible primitive back to its
/// inputs. Culled primitives get zeros everywhere.
pub fn preprocess_backward(
    gaussians: &ResolvedGaussians<'_>,
    geometry: &GeometryBuffer,
    screen: &ScreenGrads,
    settings: &RasterSettings,
    config: &RasterConfig,
) -> Gradients {
    let n = gaussians.means3d.len();
    let _span = tracing::debug_span!("preprocess_backward", primitives = n).entered();
    let camera = &settings.camera;

    // SH first: it owns a K-sized slice per primitive.
    let (grad_shs, sh_mean_grads) = match gaussians.color {
        ColorSource::Precomputed(_) => (Vec::new(), vec![Vector3::zeros(); n]),
        ColorSource::SphericalHarmonics {
            coeffs,
            coeffs_per_point,
            degree,
        } => {
            let mut grad_shs = vec![Vector3::zeros(); coeffs.len()];
            let mean_grads = grad_shs
                .par_chunks_mut(coeffs_per_point)
                .enumerate()
                .map(|(i, grad_coeffs)| {
                    let g = &geometry.primitives[i];
                    if g.radius <= 0 {
                        return Vector3::zeros();
                    }
                    sh_to_rgb_backward(
                        gaussians.color.coeffs_of(i),
                        degree,
                        &gaussians.means3d[i],
                        &camera.campos,
                        g.clamped,
                        &screen.color[i],
                        grad_coeffs,
                    )
                })
                .collect();
            (grad_shs, mean_grads)
        }
    };

    let per_primitive: Vec<PrimitiveGrads> = (0..n)
        .into_par_iter()
        .map(|i| {
            let g = &geometry.primitives[i];
            if g.radius <= 0 {
                return PrimitiveGrads::default();
            }
            let p = gaussians.means3d[i];

            let mean2d = pixel_grad_to_ndc(&screen.mean2d[i], camera.width, camera.height);
            let mut mean3d = ndc_grad_to_mean(&camera.proj_matrix, &p, &mean2d)
                + depth_grad_to_mean(&camera.view_matrix, screen.depth[i])
                + sh_mean_grads[i];

            let cov3d = unpack_covariance(&g.cov3d);
            let p_view = camera.world_to_camera(&p);
            let proj = project_covariance(&p_view, &cov3d, camera, config);
            let cov2d = Vector3::new(
                proj.cov2d[(0, 0)] + config.low_pass,
                proj.cov2d[(0, 1)],
                proj.cov2d[(1, 1)] + config.low_pass,
            );
            let d_cov2d = conic_grad_to_cov2d(&cov2d, &screen.conic[i]);

            let d_p_view =
                cov2d_grad_to_mean(&proj, &cov3d, &d_cov2d, camera.focal_x(), camera.focal_y());
            mean3d += proj.w.transpose() * d_p_view;

            let d_sigma = cov2d_grad_to_cov3d(&proj, &d_cov2d);
            let mut out = PrimitiveGrads {
                mean2d,
                mean3d,
                opacity: screen.opacity[i],
                ..Default::default()
            };
            match gaussians.covariance {
                CovarianceSource::Precomputed(_) => out.cov3d = cov3d_grad_to_packed(&d_sigma),
                CovarianceSource::FromScaleRotation { scales, rotations } => {
                    let (d_scale, d_rot) = cov3d_grad_to_scale_rotation(
                        &scales[i],
                        settings.scale_modifier,
                        &rotations[i],
                        &d_sigma,
                    );
                    out.scale = d_scale;
                    out.rotation = d_rot;
                }
            }
            if gaussians.color.is_precomputed() {
                out.color = screen.color[i];
            }
            out
        })
        .collect();

    let mut grads = Gradients::zeros(n, 0);
    for (i, g) in per_primitive.into_iter().enumerate() {
        grads.means2d[i] = g.mean2d;
        grads.means3d[i] = g.mean3d;
        grads.colors[i] = g.color;
        grads.opacities[i] = g.opacity;
        grads.cov3d[i] = g.cov3d;
        grads.scales[i] = g.scale;
        grads.rotations[i] = g.rotation;
    }
    grads.shs = grad_shs;
    grads
}
