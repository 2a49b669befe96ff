//! Camera model and per-call render settings.
//!
//! The rasterizer takes its camera the way splatting trainers hand it over:
//! a world->camera view matrix, a full world->clip projection matrix, the
//! tangents of the half fields of view and the image size. Cameras look down
//! +z; image y grows downwards.

use nalgebra::{Matrix4, Vector3, Vector4};
use serde::{Deserialize, Serialize};

use crate::core::math::{ndc_to_pixel, transform_point_4x3, transform_point_4x4};
use crate::core::RasterError;

/// Camera used for one forward/backward call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RasterCamera {
    /// World to camera transform.
    pub view_matrix: Matrix4<f32>,

    /// World to clip transform (projection · view).
    pub proj_matrix: Matrix4<f32>,

    /// tan(fov_x / 2)
    pub tan_fovx: f32,

    /// tan(fov_y / 2)
    pub tan_fovy: f32,

    /// Output image width (pixels)
    pub width: u32,

    /// Output image height (pixels)
    pub height: u32,

    /// Camera center in world coordinates (view direction for SH colors).
    pub campos: Vector3<f32>,
}

impl RasterCamera {
    /// Create a camera from explicit matrices.
    pub fn new(
        view_matrix: Matrix4<f32>,
        proj_matrix: Matrix4<f32>,
        tan_fovx: f32,
        tan_fovy: f32,
        width: u32,
        height: u32,
        campos: Vector3<f32>,
    ) -> Self {
        Self {
            view_matrix,
            proj_matrix,
            tan_fovx,
            tan_fovy,
            width,
            height,
            campos,
        }
    }

    /// Build a camera from a rigid view matrix and full fields of view (radians).
    ///
    /// The projection maps camera depth `znear..zfar` to clip z in `0..1` and
    /// keeps the camera-space depth in clip w.
    pub fn perspective(
        view_matrix: Matrix4<f32>,
        fovx: f32,
        fovy: f32,
        width: u32,
        height: u32,
        znear: f32,
        zfar: f32,
    ) -> Self {
        let tan_fovx = (0.5 * fovx).tan();
        let tan_fovy = (0.5 * fovy).tan();

        let top = tan_fovy * znear;
        let right = tan_fovx * znear;
        let (bottom, left) = (-top, -right);

        let mut projection = Matrix4::zeros();
        projection[(0, 0)] = 2.0 * znear / (right - left);
        projection[(1, 1)] = 2.0 * znear / (top - bottom);
        projection[(0, 2)] = (right + left) / (right - left);
        projection[(1, 2)] = (top + bottom) / (top - bottom);
        projection[(3, 2)] = 1.0;
        projection[(2, 2)] = zfar / (zfar - znear);
        projection[(2, 3)] = -(zfar * znear) / (zfar - znear);

        // Camera center C = -Rᵀ t for a rigid [R | t].
        let rotation = view_matrix.fixed_view::<3, 3>(0, 0);
        let translation = view_matrix.fixed_view::<3, 1>(0, 3);
        let campos = -(rotation.transpose() * translation);

        Self {
            view_matrix,
            proj_matrix: projection * view_matrix,
            tan_fovx,
            tan_fovy,
            width,
            height,
            campos,
        }
    }

    /// Focal length in X (pixels)
    pub fn focal_x(&self) -> f32 {
        crate::core::math::focal_length(self.width, self.tan_fovx)
    }

    /// Focal length in Y (pixels)
    pub fn focal_y(&self) -> f32 {
        crate::core::math::focal_length(self.height, self.tan_fovy)
    }

    /// Transform a point from world coordinates to camera coordinates.
    pub fn world_to_camera(&self, point_world: &Vector3<f32>) -> Vector3<f32> {
        transform_point_4x3(&self.view_matrix, point_world)
    }

    /// Transform a point from world coordinates to homogeneous clip coordinates.
    pub fn world_to_clip(&self, point_world: &Vector3<f32>) -> Vector4<f32> {
        transform_point_4x4(&self.proj_matrix, point_world)
    }

    /// Project a world point to pixel coordinates (no culling).
    pub fn world_to_pixel(&self, point_world: &Vector3<f32>) -> (f32, f32) {
        let hom = self.world_to_clip(point_world);
        let w_inv = 1.0 / (hom.w + 1e-7);
        (
            ndc_to_pixel(hom.x * w_inv, self.width),
            ndc_to_pixel(hom.y * w_inv, self.height),
        )
    }

    /// Number of pixels in the output image.
    pub fn num_pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub(crate) fn validate(&self) -> Result<(), RasterError> {
        if self.width == 0 || self.height == 0 {
            return Err(RasterError::InvalidImageSize {
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }
}

/// Per-call rasterization settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RasterSettings {
    pub camera: RasterCamera,

    /// Color used where transmittance remains after compositing.
    pub background: Vector3<f32>,

    /// Uniform multiplier on every primitive scale.
    pub scale_modifier: f32,

    /// Highest SH degree to evaluate (0..=3).
    pub sh_degree: u32,

    /// Caller already culled primitives (e.g. with `mark_visible`); skip the
    /// near-plane test.
    pub prefiltered: bool,

    /// Run extra consistency checks (buffer sizes, finite values). Never
    /// changes results when the checks pass.
    pub debug: bool,
}

impl RasterSettings {
    /// Settings with a black background, unit scale modifier and SH degree 0.
    pub fn new(camera: RasterCamera) -> Self {
        Self {
            camera,
            background: Vector3::zeros(),
            scale_modifier: 1.0,
            sh_degree: 0,
            prefiltered: false,
            debug: false,
        }
    }
}
