//! The three buffers a forward call hands to its matching backward call.
//!
//! They are plain values owned by the caller. Backward only reads them and
//! checks that they were produced for the same primitive count, image size
//! and tile size before replaying anything.
//!
//! Layout:
//! - `GeometryBuffer`: one `ProjectedGaussian` per input primitive (index i
//!   is primitive i) plus the inclusive prefix sum of `tiles_touched`.
//! - `BinningBuffer`: `num_rendered` sorted `(tile << 32 | depth bits)` keys
//!   and the primitive index stored alongside each key.
//! - `ImageBuffer`: per-tile `[start, end)` ranges into the binning buffer,
//!   per-pixel final transmittance and per-pixel resume point (one past the
//!   position in the tile list of the last primitive that contributed).

use nalgebra::{Vector2, Vector3, Vector4};

/// Screen-space state of one primitive.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ProjectedGaussian {
    /// Camera-space depth.
    pub depth: f32,

    /// Bounding-circle radius in pixels, 0 when culled.
    pub radius: i32,

    /// Projected mean in pixels.
    pub mean2d: Vector2<f32>,

    /// Inverse 2D covariance (a, b, c) = [[a, b], [b, c]] and the opacity in w.
    pub conic_opacity: Vector4<f32>,

    /// Evaluated RGB.
    pub rgb: Vector3<f32>,

    /// SH color channels clamped at zero.
    pub clamped: [bool; 3],

    /// World-space 3D covariance (xx, xy, xz, yy, yz, zz).
    pub cov3d: [f32; 6],

    /// Number of tiles the bounding circle intersects.
    pub tiles_touched: u32,
}

impl ProjectedGaussian {
    pub fn is_visible(&self) -> bool {
        self.radius > 0 && self.tiles_touched > 0
    }

    pub fn opacity(&self) -> f32 {
        self.conic_opacity.w
    }
}

#[derive(Clone, Debug, Default)]
pub struct GeometryBuffer {
    pub primitives: Vec<ProjectedGaussian>,
    /// Inclusive prefix sum of `tiles_touched`; the last entry is `num_rendered`.
    pub point_offsets: Vec<usize>,
}

impl GeometryBuffer {
    pub fn len(&self) -> usize {
        self.primitives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }

    /// Range of binning slots written for primitive `idx`.
    pub fn slots(&self, idx: usize) -> std::ops::Range<usize> {
        let start = if idx == 0 { 0 } else { self.point_offsets[idx - 1] };
        start..self.point_offsets[idx]
    }

    pub fn num_rendered(&self) -> usize {
        self.point_offsets.last().copied().unwrap_or(0)
    }
}

#[derive(Clone, Debug, Default)]
pub struct BinningBuffer {
    /// Sorted `(tile_id << 32) | depth.to_bits()` keys.
    pub keys: Vec<u64>,
    /// Primitive index for each sorted key.
    pub point_list: Vec<u32>,
}

impl BinningBuffer {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[derive(Clone, Debug, Default)]
pub struct ImageBuffer {
    pub width: u32,
    pub height: u32,
    pub tile_size: u32,
    /// `[start, end)` into the binning buffer, one entry per tile.
    pub ranges: Vec<(u32, u32)>,
    /// Transmittance left after compositing, per pixel.
    pub final_transmittance: Vec<f32>,
    /// Number of tile-list entries the pixel walked through up to and
    /// including its last contributor.
    pub n_contrib: Vec<u32>,
}

/// Square tiles covering the image, row-major.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileGrid {
    pub tile_size: u32,
    pub width: u32,
    pub height: u32,
    pub tiles_x: u32,
    pub tiles_y: u32,
}

impl TileGrid {
    pub fn new(width: u32, height: u32, tile_size: u32) -> Self {
        Self {
            tile_size,
            width,
            height,
            tiles_x: width.div_ceil(tile_size),
            tiles_y: height.div_ceil(tile_size),
        }
    }

    pub fn num_tiles(&self) -> usize {
        self.tiles_x as usize * self.tiles_y as usize
    }

    pub fn tile_id(&self, tx: u32, ty: u32) -> u32 {
        ty * self.tiles_x + tx
    }

    /// Pixel rectangle of tile `id`: `(x0, y0, x1, y1)`, max exclusive and
    /// clipped to the image.
    pub fn pixel_bounds(&self, id: u32) -> (u32, u32, u32, u32) {
        let tx = id % self.tiles_x;
        let ty = id / self.tiles_x;
        let x0 = tx * self.tile_size;
        let y0 = ty * self.tile_size;
        (
            x0,
            y0,
            (x0 + self.tile_size).min(self.width),
            (y0 + self.tile_size).min(self.height),
        )
    }

    /// Tile-space bounding box of a circle, `(min, max)` with max exclusive,
    /// clamped to the grid. Empty when the circle misses the image.
    pub fn rect(&self, center: &Vector2<f32>, radius: f32) -> ((u32, u32), (u32, u32)) {
        let ts = self.tile_size as f32;
        let clamp = |v: f32, hi: u32| -> u32 { v.max(0.0).min(hi as f32) as u32 };
        let min = (
            clamp(((center.x - radius) / ts).floor(), self.tiles_x),
            clamp(((center.y - radius) / ts).floor(), self.tiles_y),
        );
        let max = (
            clamp(((center.x + radius) / ts).floor() + 1.0, self.tiles_x),
            clamp(((center.y + radius) / ts).floor() + 1.0, self.tiles_y),
        );
        (min, max)
    }

    /// Whether a circle reaches any pixel center of tile (tx, ty).
    ///
    /// Uses the closest point of the tile's pixel-center rectangle, so every
    /// pixel inside the circle belongs to a tile that passes this test.
    pub fn circle_hits_tile(&self, center: &Vector2<f32>, radius: f32, tx: u32, ty: u32) -> bool {
        let (x0, y0, x1, y1) = self.pixel_bounds(self.tile_id(tx, ty));
        let cx = center.x.clamp(x0 as f32, (x1 - 1) as f32);
        let cy = center.y.clamp(y0 as f32, (y1 - 1) as f32);
        let dx = center.x - cx;
        let dy = center.y - cy;
        dx * dx + dy * dy <= radius * radius
    }

    /// Iterate the ids of the tiles a circle intersects, row-major.
    pub fn tiles_hit<'g>(
        &'g self,
        center: Vector2<f32>,
        radius: f32,
    ) -> impl Iterator<Item = u32> + 'g {
        let ((x0, y0), (x1, y1)) = self.rect(&center, radius);
        (y0..y1).flat_map(move |ty| {
            (x0..x1)
                .filter(move |&tx| self.circle_hits_tile(&center, radius, tx, ty))
                .map(move |tx| self.tile_id(tx, ty))
        })
    }
}
