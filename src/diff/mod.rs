//! Differentiable operations (backward passes).
//!
//! Each submodule reverses one stage of the forward pipeline in `render`:
//! - `composite_grad`: compositing, replayed back to front per pixel
//! - `preprocess_grad`: projection, chaining through the pieces below
//! - `covariance_grad`, `project_grad`, `quaternion_grad`: local adjoints

pub mod backward;
pub mod composite_grad;
pub mod covariance_grad;
pub mod preprocess_grad;
pub mod project_grad;
pub mod quaternion_grad;

pub use backward::{rasterize_backward, Gradients};
pub use composite_grad::PixelGrads;
