//! # splat-raster: differentiable tile-based Gaussian splat rasterizer
//!
//! Renders N anisotropic 3D Gaussians into color, alpha and depth images and
//! backpropagates image gradients to every primitive parameter (means,
//! scales, rotations or precomputed covariances, opacities, precomputed
//! colors or spherical-harmonics coefficients).
//!
//! ## Architecture
//!
//! - `core`: inputs, camera, configuration, math, spherical harmonics, errors
//! - `render`: forward pipeline (projection, tile binning, compositing)
//! - `diff`: backward pipeline (reverse compositing, reverse projection)
//! - `GaussianRasterizer`: facade tying a `RasterConfig` to both passes
//!
//! A forward call returns its intermediate buffers to the caller; passing
//! them back to `backward` lets the gradient pass replay compositing
//! without recomputing projection or sorting.
//!
//! ```no_run
//! use nalgebra::{Matrix4, Vector3, Vector4};
//! use splat_raster::{
//!     GaussianInputs, GaussianRasterizer, PixelGrads, RasterCamera, RasterSettings,
//! };
//!
//! let camera = RasterCamera::perspective(Matrix4::identity(), 1.0, 1.0, 64, 64, 0.01, 100.0);
//! let settings = RasterSettings::new(camera);
//!
//! let means = [Vector3::new(0.0, 0.0, 3.0)];
//! let inputs = GaussianInputs {
//!     means3d: &means,
//!     opacities: &[0.8],
//!     scales: &[Vector3::repeat(0.1)],
//!     rotations: &[Vector4::new(1.0, 0.0, 0.0, 0.0)],
//!     colors_precomp: &[Vector3::new(1.0, 0.5, 0.2)],
//!     ..Default::default()
//! };
//!
//! let rasterizer = GaussianRasterizer::default();
//! let out = rasterizer.forward(&inputs, &settings)?;
//!
//! let grad_color = vec![1.0; out.color.len()];
//! let zeros = vec![0.0; out.alpha.len()];
//! let grads = rasterizer.backward(
//!     &inputs,
//!     &settings,
//!     &out,
//!     &PixelGrads { color: &grad_color, depth: &zeros, alpha: &zeros },
//! )?;
//! println!("dL/dmean = {:?}", grads.means3d[0]);
//! # Ok::<(), splat_raster::RasterError>(())
//! ```

// Core data structures and math
pub mod core;

// Forward rendering pipeline
pub mod render;

// Differentiable operations (backward passes)
pub mod diff;

mod rasterizer;

pub use crate::core::{
    ColorSource, CovarianceSource, GaussianInputs, RasterCamera, RasterConfig, RasterError,
    RasterSettings, Transfer,
};
pub use diff::{Gradients, PixelGrads};
pub use rasterizer::GaussianRasterizer;
pub use render::ForwardOutput;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
