//! Projection and visibility: 3D Gaussians to screen-space splats.
//!
//! For each primitive (in parallel):
//! 1. Near-plane test on the camera-space depth
//! 2. 3D covariance from scale/rotation or the precomputed tensor
//! 3. 2D covariance J·W·Σ·Wᵀ·Jᵀ plus the low-pass floor, then its inverse
//! 4. Bounding radius from the largest eigenvalue
//! 5. Mean projected through the full projection matrix
//! 6. Tile count of the bounding circle (0 means culled)
//! 7. Color from SH or the precomputed tensor

use nalgebra::{Matrix2, Matrix2x3, Matrix3, Vector2, Vector3, Vector4};
use rayon::prelude::*;

use crate::core::math::{max_eigenvalue_2x2, ndc_to_pixel, pack_covariance, perspective_jacobian};
use crate::core::sh::sh_to_rgb;
use crate::core::{
    ColorSource, RasterCamera, RasterConfig, RasterError, RasterSettings, ResolvedGaussians,
};
use crate::render::buffers::{ProjectedGaussian, TileGrid};

/// Largest screen-space radius in pixels. Exact in both f32 and i32, so the
/// stored radius reproduces the tile count binning sees.
pub const MAX_RADIUS: f32 = (1u32 << 24) as f32;

/// Intermediate values of the 2D covariance projection.
///
/// The backward pass recomputes these instead of storing them.
#[derive(Clone, Copy, Debug)]
pub struct CovarianceProjection {
    /// Camera-space mean with x/z and y/z clamped to the guard band.
    pub t: Vector3<f32>,
    /// Whether x/z (resp. y/z) hit the guard band.
    pub clamped_x: bool,
    pub clamped_y: bool,
    /// Projection Jacobian at `t`.
    pub j: Matrix2x3<f32>,
    /// Rotation part of the view matrix.
    pub w: Matrix3<f32>,
    /// J·W·Σ·Wᵀ·Jᵀ before the low-pass floor.
    pub cov2d: Matrix2<f32>,
}

/// Project a world-space covariance to the image plane at camera-space `p_view`.
pub fn project_covariance(
    p_view: &Vector3<f32>,
    cov3d: &Matrix3<f32>,
    camera: &RasterCamera,
    config: &RasterConfig,
) -> CovarianceProjection {
    let lim_x = config.frustum_guard * camera.tan_fovx;
    let lim_y = config.frustum_guard * camera.tan_fovy;
    let txtz = p_view.x / p_view.z;
    let tytz = p_view.y / p_view.z;

    let t = Vector3::new(
        txtz.clamp(-lim_x, lim_x) * p_view.z,
        tytz.clamp(-lim_y, lim_y) * p_view.z,
        p_view.z,
    );

    let j = perspective_jacobian(&t, camera.focal_x(), camera.focal_y());
    let w: Matrix3<f32> = camera.view_matrix.fixed_view::<3, 3>(0, 0).into_owned();
    let m = j * w;
    let cov2d = m * cov3d * m.transpose();

    CovarianceProjection {
        t,
        clamped_x: txtz < -lim_x || txtz > lim_x,
        clamped_y: tytz < -lim_y || tytz > lim_y,
        j,
        w,
        cov2d,
    }
}

/// Near-plane visibility test on a camera-space depth.
#[inline]
pub fn in_frustum(depth: f32, config: &RasterConfig) -> bool {
    depth > config.near_plane
}

/// Near-plane mask for a set of world-space means.
pub fn mark_visible(
    means3d: &[Vector3<f32>],
    camera: &RasterCamera,
    config: &RasterConfig,
) -> Vec<bool> {
    means3d
        .par_iter()
        .map(|p| {
            let depth = camera.world_to_camera(p).z;
            depth.is_finite() && in_frustum(depth, config)
        })
        .collect()
}

struct Preprocessor<'a> {
    gaussians: &'a ResolvedGaussians<'a>,
    settings: &'a RasterSettings,
    config: &'a RasterConfig,
    grid: TileGrid,
}

impl<'a> Preprocessor<'a> {
    fn project(&self, idx: usize) -> Result<ProjectedGaussian, RasterError> {
        let culled = ProjectedGaussian::default();
        let camera = &self.settings.camera;
        let debug = self.settings.debug;

        let p_orig = self.gaussians.means3d[idx];
        if !p_orig.iter().all(|v| v.is_finite()) {
            if debug {
                return Err(RasterError::NonFinite { stage: "means3d", index: idx });
            }
            tracing::warn!(index = idx, "non-finite mean, primitive culled");
            return Ok(culled);
        }

        let p_view = camera.world_to_camera(&p_orig);
        if !in_frustum(p_view.z, self.config) {
            if !self.settings.prefiltered || p_view.z <= 0.0 {
                return Ok(culled);
            }
            if debug {
                return Err(RasterError::PrefilterViolation { index: idx });
            }
        }

        let cov3d = self.gaussians.covariance.covariance(idx, self.settings.scale_modifier);
        let proj = project_covariance(&p_view, &cov3d, camera, self.config);

        let a = proj.cov2d[(0, 0)] + self.config.low_pass;
        let b = proj.cov2d[(0, 1)];
        let c = proj.cov2d[(1, 1)] + self.config.low_pass;
        let det = a * c - b * b;
        if det == 0.0 || !det.is_finite() {
            if debug && !det.is_finite() {
                return Err(RasterError::NonFinite { stage: "cov2d", index: idx });
            }
            return Ok(culled);
        }
        let det_inv = 1.0 / det;
        let conic = Vector3::new(c * det_inv, -b * det_inv, a * det_inv);

        let lambda = max_eigenvalue_2x2(a, b, c);
        let radius = (self.config.extent_sigma * lambda.sqrt()).ceil().min(MAX_RADIUS);
        if !(radius >= 1.0) {
            return Ok(culled);
        }

        let p_hom = camera.world_to_clip(&p_orig);
        let w_inv = 1.0 / (p_hom.w + 1e-7);
        let mean2d = Vector2::new(
            ndc_to_pixel(p_hom.x * w_inv, camera.width),
            ndc_to_pixel(p_hom.y * w_inv, camera.height),
        );
        if !mean2d.iter().all(|v| v.is_finite()) {
            return Ok(culled);
        }

        let tiles_touched = self.grid.tiles_hit(mean2d, radius).count() as u32;
        if tiles_touched == 0 {
            return Ok(culled);
        }

        let (rgb, clamped) = match self.gaussians.color {
            ColorSource::Precomputed(colors) => (colors[idx], [false; 3]),
            ColorSource::SphericalHarmonics { degree, .. } => sh_to_rgb(
                self.gaussians.color.coeffs_of(idx),
                degree,
                &p_orig,
                &camera.campos,
            ),
        };

        let opacity = self.gaussians.opacities[idx];
        if debug && !(opacity.is_finite() && rgb.iter().all(|v| v.is_finite())) {
            return Err(RasterError::NonFinite { stage: "color/opacity", index: idx });
        }

        Ok(ProjectedGaussian {
            depth: p_view.z,
            radius: radius as i32,
            mean2d,
            conic_opacity: Vector4::new(conic.x, conic.y, conic.z, opacity),
            rgb,
            clamped,
            cov3d: pack_covariance(&cov3d),
            tiles_touched,
        })
    }
}

/// Project every primitive. Index i of the result is primitive i.
pub fn preprocess(
    gaussians: &ResolvedGaussians<'_>,
    settings: &RasterSettings,
    config: &RasterConfig,
) -> Result<Vec<ProjectedGaussian>, RasterError> {
    let n = gaussians.means3d.len();
    let _span = tracing::debug_span!("preprocess", primitives = n).entered();

    let pre = Preprocessor {
        gaussians,
        settings,
        config,
        grid: TileGrid::new(settings.camera.width, settings.camera.height, config.tile_size),
    };

    let projected = (0..n)
        .into_par_iter()
        .map(|idx| pre.project(idx))
        .collect::<Result<Vec<_>, _>>()?;

    let visible = projected.iter().filter(|g| g.is_visible()).count();
    tracing::debug!(visible, culled = n - visible, "projected primitives");
    Ok(projected)
}
