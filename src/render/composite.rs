//! Front-to-back alpha compositing, one tile per rayon task.
//!
//! Every pixel walks its tile's sorted list:
//!
//!   α = min(max_alpha, o · exp(-½ dᵀ Σ⁻¹ d))
//!   C += c · α · T,  D += depth · α · T,  T *= (1 - α)
//!
//! A pixel stops before the splat that would push T below the threshold;
//! that splat and everything behind it are not blended.

use nalgebra::{Vector2, Vector3};
use rayon::prelude::*;

use crate::core::{try_alloc, RasterConfig, RasterError};
use crate::render::buffers::{BinningBuffer, ProjectedGaussian, TileGrid};

/// Density of one splat at one pixel.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SplatSample {
    /// mean - pixel
    pub d: Vector2<f32>,
    /// exp(power), the unscaled Gaussian
    pub gaussian: f32,
    /// Blending weight after the clamp.
    pub alpha: f32,
    /// Whether `max_alpha` capped the weight.
    pub saturated: bool,
}

/// Evaluate a splat at pixel `pix`, or `None` when it does not contribute.
#[inline]
pub(crate) fn sample_splat(
    g: &ProjectedGaussian,
    pix: &Vector2<f32>,
    config: &RasterConfig,
) -> Option<SplatSample> {
    let d = g.mean2d - pix;
    let r = g.radius as f32;
    if d.norm_squared() > r * r {
        return None;
    }

    let con = &g.conic_opacity;
    let power = -0.5 * (con.x * d.x * d.x + con.z * d.y * d.y) - con.y * d.x * d.y;
    if power > 0.0 {
        return None;
    }

    let gaussian = power.exp();
    let raw = con.w * gaussian;
    let alpha = raw.min(config.max_alpha);
    if alpha < config.min_alpha {
        return None;
    }

    Some(SplatSample {
        d,
        gaussian,
        alpha,
        saturated: raw > config.max_alpha,
    })
}

#[derive(Clone, Copy, Debug, Default)]
struct PixelState {
    color: Vector3<f32>,
    depth: f32,
    transmittance: f32,
    n_contrib: u32,
}

/// Composited images plus the per-pixel resume state.
#[derive(Clone, Debug)]
pub struct CompositeOutput {
    /// 3×H×W
    pub color: Vec<f32>,
    /// H×W, 1 - final transmittance
    pub alpha: Vec<f32>,
    /// H×W, Σ depth · α · T
    pub depth: Vec<f32>,
    pub final_transmittance: Vec<f32>,
    pub n_contrib: Vec<u32>,
}

fn composite_pixel(
    pix: Vector2<f32>,
    list: &[u32],
    primitives: &[ProjectedGaussian],
    config: &RasterConfig,
) -> PixelState {
    let mut state = PixelState {
        transmittance: 1.0,
        ..Default::default()
    };

    for (pos, &idx) in list.iter().enumerate() {
        let g = &primitives[idx as usize];
        let Some(s) = sample_splat(g, &pix, config) else {
            continue;
        };

        let test_t = state.transmittance * (1.0 - s.alpha);
        if test_t < config.transmittance_threshold {
            break;
        }

        let weight = s.alpha * state.transmittance;
        state.color += g.rgb * weight;
        state.depth += g.depth * weight;
        state.transmittance = test_t;
        state.n_contrib = pos as u32 + 1;
    }
    state
}

/// Composite every tile and assemble planar images.
pub fn composite(
    primitives: &[ProjectedGaussian],
    binning: &BinningBuffer,
    ranges: &[(u32, u32)],
    grid: &TileGrid,
    background: &Vector3<f32>,
    config: &RasterConfig,
) -> Result<CompositeOutput, RasterError> {
    let _span = tracing::debug_span!("composite", tiles = grid.num_tiles()).entered();

    let plane = grid.width as usize * grid.height as usize;
    let mut out = CompositeOutput {
        color: try_alloc("color image", 3 * plane, 0.0)?,
        alpha: try_alloc("alpha image", plane, 0.0)?,
        depth: try_alloc("depth image", plane, 0.0)?,
        final_transmittance: try_alloc("transmittance", plane, 1.0)?,
        n_contrib: try_alloc("contributor counts", plane, 0)?,
    };

    let tiles: Vec<(u32, Vec<PixelState>)> = (0..grid.num_tiles() as u32)
        .into_par_iter()
        .map(|tile| {
            let (start, end) = ranges[tile as usize];
            let list = &binning.point_list[start as usize..end as usize];
            let (x0, y0, x1, y1) = grid.pixel_bounds(tile);

            let pixels = (y0..y1)
                .flat_map(|py| (x0..x1).map(move |px| (px, py)))
                .map(|(px, py)| {
                    composite_pixel(Vector2::new(px as f32, py as f32), list, primitives, config)
                })
                .collect();
            (tile, pixels)
        })
        .collect();

    let width = grid.width as usize;
    for (tile, pixels) in tiles {
        let (x0, y0, x1, _) = grid.pixel_bounds(tile);
        let tile_w = (x1 - x0) as usize;
        for (k, state) in pixels.into_iter().enumerate() {
            let px = x0 as usize + k % tile_w;
            let py = y0 as usize + k / tile_w;
            let i = py * width + px;

            let rgb = state.color + background * state.transmittance;
            out.color[i] = rgb.x;
            out.color[plane + i] = rgb.y;
            out.color[2 * plane + i] = rgb.z;
            out.alpha[i] = 1.0 - state.transmittance;
            out.depth[i] = state.depth;
            out.final_transmittance[i] = state.transmittance;
            out.n_contrib[i] = state.n_contrib;
        }
    }

    Ok(out)
}
