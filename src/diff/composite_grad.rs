//! Gradients for front-to-back compositing.
//!
//! Forward (per pixel, contributors i = 1..n in depth order):
//!   C = Σ c_i α_i T_i + T_n+1 · bg
//!   D = Σ d_i α_i T_i
//!   A = 1 - T_n+1,          T_i+1 = T_i (1 - α_i)
//!
//! Backward replays a pixel's list from its last contributor towards the
//! front. T_i is recovered exactly by dividing the stored final
//! transmittance by (1 - α); the colors, depths and alphas of the splats
//! behind i are folded into running "recursive" accumulators so each step
//! is O(1):
//!
//!   dC/dα_i = T_i (c_i - C_behind) - T_n+1 / (1 - α_i) · bg
//!
//! Per-primitive sums are race-free: each rayon worker folds into its own
//! gradient vectors and the vectors are added at the end.

use nalgebra::{Vector2, Vector3};
use rayon::prelude::*;

use crate::core::RasterConfig;
use crate::render::buffers::{BinningBuffer, ImageBuffer, ProjectedGaussian, TileGrid};
use crate::render::composite::sample_splat;

/// Upstream gradients on the three forward images.
#[derive(Clone, Copy, Debug)]
pub struct PixelGrads<'a> {
    /// 3×H×W
    pub color: &'a [f32],
    /// H×W
    pub depth: &'a [f32],
    /// H×W
    pub alpha: &'a [f32],
}

/// Per-primitive gradients on the screen-space quantities.
#[derive(Clone, Debug)]
pub struct ScreenGrads {
    /// dL/dmean2d in pixels.
    pub mean2d: Vec<Vector2<f32>>,
    /// dL/d(A, B, C) for power = -½(A dx² + C dy²) - B dx dy.
    pub conic: Vec<Vector3<f32>>,
    pub opacity: Vec<f32>,
    pub color: Vec<Vector3<f32>>,
    pub depth: Vec<f32>,
}

impl ScreenGrads {
    pub fn zeros(n: usize) -> Self {
        Self {
            mean2d: vec![Vector2::zeros(); n],
            conic: vec![Vector3::zeros(); n],
            opacity: vec![0.0; n],
            color: vec![Vector3::zeros(); n],
            depth: vec![0.0; n],
        }
    }

    fn merge(mut self, other: Self) -> Self {
        fn add<T: std::ops::AddAssign + Copy>(dst: &mut [T], src: &[T]) {
            dst.iter_mut().zip(src).for_each(|(d, &s)| *d += s);
        }
        add(&mut self.mean2d, &other.mean2d);
        add(&mut self.conic, &other.conic);
        add(&mut self.opacity, &other.opacity);
        add(&mut self.color, &other.color);
        add(&mut self.depth, &other.depth);
        self
    }
}

struct PixelContext<'a> {
    primitives: &'a [ProjectedGaussian],
    config: &'a RasterConfig,
    background: &'a Vector3<f32>,
}

impl PixelContext<'_> {
    /// Replay one pixel back to front and accumulate into `grads`.
    fn backward_pixel(
        &self,
        pix: Vector2<f32>,
        list: &[u32],
        final_t: f32,
        dl_dpix: Vector3<f32>,
        dl_ddepth: f32,
        dl_dalpha: f32,
        grads: &mut ScreenGrads,
    ) {
        let mut t = final_t;

        let mut accum_color = Vector3::<f32>::zeros();
        let mut accum_depth = 0.0f32;
        let mut accum_alpha = 0.0f32;
        let mut last_alpha = 0.0f32;
        let mut last_color = Vector3::<f32>::zeros();
        let mut last_depth = 0.0f32;

        let bg_dot = self.background.dot(&dl_dpix);

        for &idx in list.iter().rev() {
            let g = &self.primitives[idx as usize];
            let Some(s) = sample_splat(g, &pix, self.config) else {
                continue;
            };
            let idx = idx as usize;
            let alpha = s.alpha;
            let one_minus = 1.0 - alpha;

            t /= one_minus;
            let weight = alpha * t;

            grads.color[idx] += dl_dpix * weight;
            grads.depth[idx] += dl_ddepth * weight;

            accum_color = last_color * last_alpha + accum_color * (1.0 - last_alpha);
            accum_depth = last_depth * last_alpha + accum_depth * (1.0 - last_alpha);
            accum_alpha = last_alpha + (1.0 - last_alpha) * accum_alpha;
            last_alpha = alpha;
            last_color = g.rgb;
            last_depth = g.depth;

            let mut dl_da = (g.rgb - accum_color).dot(&dl_dpix)
                + (g.depth - accum_depth) * dl_ddepth
                + (1.0 - accum_alpha) * dl_dalpha;
            dl_da *= t;
            dl_da += -final_t / one_minus * bg_dot;

            if s.saturated {
                continue;
            }

            let opacity = g.opacity();
            grads.opacity[idx] += s.gaussian * dl_da;

            let dl_dpower = s.gaussian * opacity * dl_da;
            let con = &g.conic_opacity;
            let d = s.d;
            grads.mean2d[idx] += dl_dpower
                * Vector2::new(-(con.x * d.x + con.y * d.y), -(con.y * d.x + con.z * d.y));
            grads.conic[idx] += dl_dpower
                * Vector3::new(-0.5 * d.x * d.x, -d.x * d.y, -0.5 * d.y * d.y);
        }
    }
}

/// Distribute the image gradients to every splat that contributed.
pub fn composite_backward(
    primitives: &[ProjectedGaussian],
    binning: &BinningBuffer,
    image: &ImageBuffer,
    background: &Vector3<f32>,
    pixel_grads: &PixelGrads<'_>,
    config: &RasterConfig,
) -> ScreenGrads {
    let grid = TileGrid::new(image.width, image.height, image.tile_size);
    let _span = tracing::debug_span!("composite_backward", tiles = grid.num_tiles()).entered();

    let n = primitives.len();
    let plane = image.width as usize * image.height as usize;
    let width = image.width as usize;
    let ctx = PixelContext {
        primitives,
        config,
        background,
    };

    (0..grid.num_tiles() as u32)
        .into_par_iter()
        .fold(
            || ScreenGrads::zeros(n),
            |mut grads, tile| {
                let (start, end) = image.ranges[tile as usize];
                let list = &binning.point_list[start as usize..end as usize];
                let (x0, y0, x1, y1) = grid.pixel_bounds(tile);

                for py in y0..y1 {
                    for px in x0..x1 {
                        let i = py as usize * width + px as usize;
                        let n_contrib = image.n_contrib[i] as usize;
                        if n_contrib == 0 {
                            continue;
                        }
                        let dl_dpix = Vector3::new(
                            pixel_grads.color[i],
                            pixel_grads.color[plane + i],
                            pixel_grads.color[2 * plane + i],
                        );
                        ctx.backward_pixel(
                            Vector2::new(px as f32, py as f32),
                            &list[..n_contrib],
                            image.final_transmittance[i],
                            dl_dpix,
                            pixel_grads.depth[i],
                            pixel_grads.alpha[i],
                            &mut grads,
                        );
                    }
                }
                grads
            },
        )
        .reduce(|| ScreenGrads::zeros(n), ScreenGrads::merge)
}
