//! Forward rendering pipeline (CPU implementation).
//!
//! This module implements the forward pass of Gaussian Splatting:
//! - Project 3D Gaussians to 2D splats and cull invisible ones
//! - Bin splats into tiles, sorted front to back
//! - Alpha blending per tile
//!
//! No gradients computed here - see `diff` module for backward passes.

pub mod binning;
pub mod buffers;
pub mod composite;
pub mod forward;
pub mod preprocess;

pub use buffers::{BinningBuffer, GeometryBuffer, ImageBuffer, ProjectedGaussian, TileGrid};
pub use forward::{rasterize_forward, ForwardOutput};
pub use preprocess::mark_visible;
