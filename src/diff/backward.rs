//! Backward entry point: image gradients to per-primitive gradients.

use nalgebra::{Vector2, Vector3, Vector4};

use crate::core::{GaussianInputs, RasterConfig, RasterError, RasterSettings};
use crate::diff::composite_grad::{composite_backward, PixelGrads};
use crate::diff::preprocess_grad::preprocess_backward;
use crate::render::ForwardOutput;

/// Gradients on every differentiable input.
///
/// Each vector has one entry per primitive; `shs` has the length of the
/// `shs` input. The branch that was not used for a call (precomputed colors
/// vs SH, precomputed covariance vs scale/rotation) is all zeros (`shs` is
/// empty when colors were precomputed).
#[derive(Clone, Debug, PartialEq)]
pub struct Gradients {
    /// Screen-space mean gradient in NDC units (pixel gradient × size / 2).
    pub means2d: Vec<Vector2<f32>>,
    pub colors: Vec<Vector3<f32>>,
    pub opacities: Vec<f32>,
    pub means3d: Vec<Vector3<f32>>,
    pub cov3d: Vec<[f32; 6]>,
    pub shs: Vec<Vector3<f32>>,
    pub scales: Vec<Vector3<f32>>,
    pub rotations: Vec<Vector4<f32>>,
}

impl Gradients {
    pub fn zeros(n: usize, num_sh: usize) -> Self {
        Self {
            means2d: vec![Vector2::zeros(); n],
            colors: vec![Vector3::zeros(); n],
            opacities: vec![0.0; n],
            means3d: vec![Vector3::zeros(); n],
            cov3d: vec![[0.0; 6]; n],
            shs: vec![Vector3::zeros(); num_sh],
            scales: vec![Vector3::zeros(); n],
            rotations: vec![Vector4::zeros(); n],
        }
    }

    fn first_non_finite(&self) -> Option<(&'static str, usize)> {
        fn find<'a, I: IntoIterator<Item = &'a f32>>(it: I) -> Option<usize> {
            it.into_iter().position(|v| !v.is_finite())
        }
        let per_point = |name, stride: usize, pos: Option<usize>| pos.map(|p| (name, p / stride));

        per_point("grad_means3d", 3, find(self.means3d.iter().flat_map(|v| v.iter())))
            .or_else(|| per_point("grad_opacities", 1, find(&self.opacities)))
            .or_else(|| per_point("grad_colors", 3, find(self.colors.iter().flatten())))
            .or_else(|| per_point("grad_cov3d", 6, find(self.cov3d.iter().flatten())))
            .or_else(|| per_point("grad_scales", 3, find(self.scales.iter().flatten())))
            .or_else(|| per_point("grad_rotations", 4, find(self.rotations.iter().flatten())))
            .or_else(|| per_point("grad_shs", 3, find(self.shs.iter().flat_map(|v| v.iter()))))
    }
}

/// Check that `forward` was produced for this call's primitives, camera and
/// tile size.
fn check_forward_buffers(
    n: usize,
    settings: &RasterSettings,
    config: &RasterConfig,
    forward: &ForwardOutput,
) -> Result<(), RasterError> {
    let camera = &settings.camera;
    let image = &forward.image;
    let plane = camera.num_pixels();

    let mismatch = |msg: String| Err(RasterError::BufferMismatch(msg));

    if forward.geometry.len() != n || forward.radii.len() != n {
        return mismatch(format!(
            "geometry holds {} primitives, radii {}, call has {n}",
            forward.geometry.len(),
            forward.radii.len()
        ));
    }
    if forward.geometry.point_offsets.len() != n {
        return mismatch(format!(
            "geometry holds {} tile offsets, call has {n} primitives",
            forward.geometry.point_offsets.len()
        ));
    }
    if image.width != camera.width || image.height != camera.height {
        return mismatch(format!(
            "image buffer is {}x{}, camera is {}x{}",
            image.width, image.height, camera.width, camera.height
        ));
    }
    if image.tile_size != config.tile_size {
        return mismatch(format!(
            "image buffer uses tile size {}, config has {}",
            image.tile_size, config.tile_size
        ));
    }
    if forward.binning.len() != forward.num_rendered
        || forward.binning.point_list.len() != forward.num_rendered
        || forward.geometry.num_rendered() != forward.num_rendered
    {
        return mismatch(format!(
            "binning buffer holds {} entries, num_rendered is {}",
            forward.binning.len(),
            forward.num_rendered
        ));
    }
    if image.final_transmittance.len() != plane || image.n_contrib.len() != plane {
        return mismatch(format!("per-pixel state does not cover {plane} pixels"));
    }
    let num_tiles = camera.width.div_ceil(config.tile_size) as usize
        * camera.height.div_ceil(config.tile_size) as usize;
    if image.ranges.len() != num_tiles {
        return mismatch(format!(
            "image buffer has {} tile ranges, grid has {num_tiles}",
            image.ranges.len()
        ));
    }
    if image
        .ranges
        .iter()
        .any(|&(s, e)| s > e || e as usize > forward.num_rendered)
    {
        return mismatch("tile range outside the binning buffer".into());
    }
    if forward.binning.point_list.iter().any(|&i| i as usize >= n) {
        return mismatch("binning buffer references an unknown primitive".into());
    }
    Ok(())
}

/// Backpropagate image gradients through a forward call.
///
/// `inputs` and `settings` must be the ones the forward call received
/// (opacities may be omitted; they are read back from the geometry buffer).
pub fn rasterize_backward(
    inputs: &GaussianInputs<'_>,
    settings: &RasterSettings,
    config: &RasterConfig,
    forward: &ForwardOutput,
    pixel_grads: &PixelGrads<'_>,
) -> Result<Gradients, RasterError> {
    config.validate()?;
    settings.camera.validate()?;
    let gaussians = inputs.resolve(settings.sh_degree, false)?;
    let n = inputs.len();

    let plane = settings.camera.num_pixels();
    RasterError::check_len("grad_color", 3 * plane, pixel_grads.color.len())?;
    RasterError::check_len("grad_depth", plane, pixel_grads.depth.len())?;
    RasterError::check_len("grad_alpha", plane, pixel_grads.alpha.len())?;
    check_forward_buffers(n, settings, config, forward)?;

    let _span =
        tracing::debug_span!("backward", primitives = n, num_rendered = forward.num_rendered)
            .entered();

    if settings.debug {
        let radius_mismatch = forward
            .radii
            .iter()
            .zip(&forward.geometry.primitives)
            .position(|(&r, g)| r != g.radius);
        if let Some(i) = radius_mismatch {
            return Err(RasterError::BufferMismatch(format!(
                "radius of primitive {i} differs from the geometry buffer"
            )));
        }
    }

    let screen = composite_backward(
        &forward.geometry.primitives,
        &forward.binning,
        &forward.image,
        &settings.background,
        pixel_grads,
        config,
    );
    let grads = preprocess_backward(&gaussians, &forward.geometry, &screen, settings, config);

    if settings.debug {
        if let Some((stage, index)) = grads.first_non_finite() {
            return Err(RasterError::NonFinite { stage, index });
        }
    }
    tracing::debug!("backward pass done");
    Ok(grads)
}
