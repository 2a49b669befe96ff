//! Owner-facing facade over the forward and backward passes.

use nalgebra::Vector3;

use crate::core::{GaussianInputs, RasterCamera, RasterConfig, RasterError, RasterSettings};
use crate::diff::{rasterize_backward, Gradients, PixelGrads};
use crate::render::{mark_visible, rasterize_forward, ForwardOutput};

/// A rasterizer bound to one set of tunable constants.
///
/// Holds no per-call state: every `forward` returns its buffers to the
/// caller, who hands them back to the matching `backward`.
#[derive(Clone, Debug, Default)]
pub struct GaussianRasterizer {
    config: RasterConfig,
}

impl GaussianRasterizer {
    pub fn new(config: RasterConfig) -> Result<Self, RasterError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RasterConfig {
        &self.config
    }

    /// Render the primitives and keep what backward needs.
    pub fn forward(
        &self,
        inputs: &GaussianInputs<'_>,
        settings: &RasterSettings,
    ) -> Result<ForwardOutput, RasterError> {
        rasterize_forward(inputs, settings, &self.config)
    }

    /// Gradients of a scalar loss w.r.t. every differentiable input, given
    /// the loss gradients on the forward images.
    pub fn backward(
        &self,
        inputs: &GaussianInputs<'_>,
        settings: &RasterSettings,
        forward: &ForwardOutput,
        pixel_grads: &PixelGrads<'_>,
    ) -> Result<Gradients, RasterError> {
        rasterize_backward(inputs, settings, &self.config, forward, pixel_grads)
    }

    /// Near-plane inclusion mask, for callers that cull ahead of a
    /// `prefiltered` call.
    pub fn mark_visible(&self, means3d: &[Vector3<f32>], camera: &RasterCamera) -> Vec<bool> {
        mark_visible(means3d, camera, &self.config)
    }
}
