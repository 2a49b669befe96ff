//! Tunable rasterizer constants.
//!
//! These bound antialiasing and early-termination behaviour. Setting
//! `min_alpha` and `transmittance_threshold` to zero makes the forward pass
//! smooth in every input, which finite-difference checks rely on.

use serde::{Deserialize, Serialize};

use crate::core::RasterError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterConfig {
    /// Tile edge length in pixels (tiles are square).
    pub tile_size: u32,

    /// Added to the diagonal of every 2D covariance (antialiasing floor,
    /// guarantees invertibility and roughly a one-pixel footprint).
    pub low_pass: f32,

    /// Primitives with camera-space depth at or below this are culled.
    pub near_plane: f32,

    /// Bounding-circle radius in standard deviations of the major axis.
    pub extent_sigma: f32,

    /// Per-pixel alpha below which a primitive is skipped for that pixel.
    pub min_alpha: f32,

    /// Per-pixel alpha clamp.
    pub max_alpha: f32,

    /// A pixel stops accepting primitives once its transmittance would
    /// fall below this value.
    pub transmittance_threshold: f32,

    /// Multiplier on tan(fov/2) bounding x/z and y/z when evaluating the
    /// projection Jacobian (keeps off-screen splats from exploding).
    pub frustum_guard: f32,
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self {
            tile_size: 16,
            low_pass: 0.3,
            near_plane: 0.2,
            extent_sigma: 3.0,
            min_alpha: 1.0 / 255.0,
            max_alpha: 0.99,
            transmittance_threshold: 1e-4,
            frustum_guard: 1.3,
        }
    }
}

impl RasterConfig {
    /// Reject configurations the pipeline cannot honour.
    pub fn validate(&self) -> Result<(), RasterError> {
        let invalid = |msg: String| Err(RasterError::InvalidConfig(msg));

        if self.tile_size == 0 {
            return invalid("tile_size must be positive".into());
        }
        if !(self.low_pass >= 0.0) || !self.low_pass.is_finite() {
            return invalid(format!("low_pass must be finite and >= 0, got {}", self.low_pass));
        }
        if !(self.extent_sigma > 0.0) || !self.extent_sigma.is_finite() {
            return invalid(format!(
                "extent_sigma must be finite and > 0, got {}",
                self.extent_sigma
            ));
        }
        if !(0.0..1.0).contains(&self.min_alpha) {
            return invalid(format!("min_alpha must lie in [0, 1), got {}", self.min_alpha));
        }
        if !(self.max_alpha > self.min_alpha && self.max_alpha < 1.0) {
            return invalid(format!(
                "max_alpha must lie in (min_alpha, 1), got {}",
                self.max_alpha
            ));
        }
        if !(0.0..1.0).contains(&self.transmittance_threshold) {
            return invalid(format!(
                "transmittance_threshold must lie in [0, 1), got {}",
                self.transmittance_threshold
            ));
        }
        if !(self.frustum_guard > 0.0) {
            return invalid(format!("frustum_guard must be > 0, got {}", self.frustum_guard));
        }
        // Depth keys sort by bit pattern, which is only monotonic for depth > 0.
        if !(self.near_plane >= 0.0) || !self.near_plane.is_finite() {
            return invalid(format!(
                "near_plane must be finite and >= 0, got {}",
                self.near_plane
            ));
        }
        Ok(())
    }
}
