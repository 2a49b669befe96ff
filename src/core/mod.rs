//! Core data structures and mathematical operations.
//!
//! This module contains the fundamental types used throughout the crate:
//! - `RasterCamera` / `RasterSettings`: per-call camera and options
//! - `GaussianInputs`: borrowed per-primitive inputs and their modes
//! - `RasterConfig`: tunable constants
//! - Math utilities: quaternions, covariance packing, projections, SH
//!
//! All types here are "pure data" - no rendering logic.

mod camera;
pub mod color;
mod config;
mod error;
mod gaussian;
pub mod math;
pub mod sh;

pub use camera::{RasterCamera, RasterSettings};
pub use color::Transfer;
pub use config::RasterConfig;
pub use error::RasterError;
pub(crate) use error::try_alloc;
pub use gaussian::{
    covariance_from_scale_rotation, ColorSource, CovarianceSource, GaussianInputs,
    ResolvedGaussians,
};
pub use math::quaternion_to_matrix;
pub use sh::{coeffs_for_degree, evaluate_sh, sh_basis};
