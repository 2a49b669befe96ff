//! Forward entry point: project, bin, composite.

use image::RgbImage;

use crate::core::color::planar_to_rgb_image;
use crate::core::{GaussianInputs, RasterConfig, RasterError, RasterSettings, Transfer};
use crate::render::binning::{bin_primitives, identify_tile_ranges, point_offsets};
use crate::render::buffers::{BinningBuffer, GeometryBuffer, ImageBuffer, TileGrid};
use crate::render::composite::composite;
use crate::render::preprocess::preprocess;

/// Everything a forward call produces.
///
/// Images are planar and row-major: `color` is 3×H×W, `alpha` and `depth`
/// are H×W. `geometry`, `binning` and `image` are only meant to be handed
/// back to the matching backward call.
#[derive(Clone, Debug)]
pub struct ForwardOutput {
    /// Total number of (tile, primitive) entries.
    pub num_rendered: usize,
    pub color: Vec<f32>,
    /// Screen-space radius per primitive, 0 if culled.
    pub radii: Vec<i32>,
    pub geometry: GeometryBuffer,
    pub binning: BinningBuffer,
    pub image: ImageBuffer,
    pub alpha: Vec<f32>,
    pub depth: Vec<f32>,
}

impl ForwardOutput {
    pub fn width(&self) -> u32 {
        self.image.width
    }

    pub fn height(&self) -> u32 {
        self.image.height
    }

    /// Quantize the color image to 8-bit RGB.
    pub fn to_rgb_image(&self, transfer: Transfer) -> Option<RgbImage> {
        planar_to_rgb_image(&self.color, self.width(), self.height(), transfer)
    }
}

/// Render N Gaussians with the given camera and settings.
pub fn rasterize_forward(
    inputs: &GaussianInputs<'_>,
    settings: &RasterSettings,
    config: &RasterConfig,
) -> Result<ForwardOutput, RasterError> {
    config.validate()?;
    settings.camera.validate()?;
    let gaussians = inputs.resolve(settings.sh_degree, true)?;

    let camera = &settings.camera;
    let _span = tracing::debug_span!(
        "forward",
        primitives = inputs.len(),
        width = camera.width,
        height = camera.height
    )
    .entered();

    let primitives = preprocess(&gaussians, settings, config)?;
    let offsets = point_offsets(&primitives);
    let num_rendered = offsets.last().copied().unwrap_or(0);

    let grid = TileGrid::new(camera.width, camera.height, config.tile_size);
    let binning = bin_primitives(&primitives, num_rendered, &grid)?;
    let ranges = identify_tile_ranges(&binning.keys, grid.num_tiles());

    let out = composite(&primitives, &binning, &ranges, &grid, &settings.background, config)?;
    tracing::debug!(num_rendered, "forward pass done");

    if settings.debug {
        if let Some(i) = out.color.iter().position(|v| !v.is_finite()) {
            return Err(RasterError::NonFinite { stage: "color image", index: i });
        }
        if let Some(i) = out.depth.iter().position(|v| !v.is_finite()) {
            return Err(RasterError::NonFinite { stage: "depth image", index: i });
        }
        let covered: usize = ranges.iter().map(|&(s, e)| (e - s) as usize).sum();
        if covered != num_rendered {
            return Err(RasterError::BufferMismatch(format!(
                "tile ranges cover {covered} entries, expected {num_rendered}"
            )));
        }
    }

    let radii = primitives.iter().map(|g| g.radius).collect();

    Ok(ForwardOutput {
        num_rendered,
        color: out.color,
        radii,
        geometry: GeometryBuffer {
            primitives,
            point_offsets: offsets,
        },
        binning,
        image: ImageBuffer {
            width: camera.width,
            height: camera.height,
            tile_size: config.tile_size,
            ranges,
            final_transmittance: out.final_transmittance,
            n_contrib: out.n_contrib,
        },
        alpha: out.alpha,
        depth: out.depth,
    })
}
