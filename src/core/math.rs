//! Small geometric helpers shared by the forward and backward passes.

use nalgebra::{Matrix2x3, Matrix3, Matrix4, Vector3, Vector4};

/// Convert a raw quaternion (w, x, y, z) to a rotation matrix, normalizing it first.
///
/// The quaternion is stored with w in `q[0]` and the vector part in `q[1..4]`.
/// A zero quaternion maps to the identity so a degenerate input cannot poison
/// the covariance with NaNs.
///
/// R = | 1-2(y²+z²)   2(xy-wz)    2(xz+wy)  |
///     | 2(xy+wz)     1-2(x²+z²)  2(yz-wx)  |
///     | 2(xz-wy)     2(yz+wx)    1-2(x²+y²)|
pub fn quaternion_to_matrix(q_raw: &Vector4<f32>) -> Matrix3<f32> {
    let n = q_raw.norm();
    if n <= f32::EPSILON {
        return Matrix3::identity();
    }
    let q = q_raw / n;
    let (w, x, y, z) = (q[0], q[1], q[2], q[3]);

    Matrix3::new(
        1.0 - 2.0 * (y * y + z * z),
        2.0 * (x * y - w * z),
        2.0 * (x * z + w * y),
        2.0 * (x * y + w * z),
        1.0 - 2.0 * (x * x + z * z),
        2.0 * (y * z - w * x),
        2.0 * (x * z - w * y),
        2.0 * (y * z + w * x),
        1.0 - 2.0 * (x * x + y * y),
    )
}

/// Unpack a symmetric 3×3 covariance stored as (xx, xy, xz, yy, yz, zz).
pub fn unpack_covariance(c: &[f32; 6]) -> Matrix3<f32> {
    Matrix3::new(c[0], c[1], c[2], c[1], c[3], c[4], c[2], c[4], c[5])
}

/// Pack the upper triangle of a symmetric 3×3 matrix as (xx, xy, xz, yy, yz, zz).
pub fn pack_covariance(m: &Matrix3<f32>) -> [f32; 6] {
    [
        m[(0, 0)],
        m[(0, 1)],
        m[(0, 2)],
        m[(1, 1)],
        m[(1, 2)],
        m[(2, 2)],
    ]
}

/// Apply the affine (upper 3×4) part of `m` to a point.
pub fn transform_point_4x3(m: &Matrix4<f32>, p: &Vector3<f32>) -> Vector3<f32> {
    m.fixed_view::<3, 3>(0, 0) * p + m.fixed_view::<3, 1>(0, 3)
}

/// Apply a full homogeneous transform to a point (w = 1).
pub fn transform_point_4x4(m: &Matrix4<f32>, p: &Vector3<f32>) -> Vector4<f32> {
    m * p.push(1.0)
}

/// Map a normalized device coordinate in [-1, 1] to a pixel coordinate
/// (pixel centers at integer positions).
#[inline]
pub fn ndc_to_pixel(v: f32, size: u32) -> f32 {
    ((v + 1.0) * size as f32 - 1.0) * 0.5
}

/// Focal length in pixels for an image dimension and tan(fov/2).
#[inline]
pub fn focal_length(size: u32, tan_half_fov: f32) -> f32 {
    size as f32 / (2.0 * tan_half_fov)
}

/// Compute the Jacobian of perspective projection.
///
/// For a point p_cam = [x, y, z] in camera space,
/// the projected point is [u, v] = [fx*x/z + cx, fy*y/z + cy]
///
/// J = | fx/z    0      -fx*x/z² |
///     |  0     fy/z    -fy*y/z² |
pub fn perspective_jacobian(point_camera: &Vector3<f32>, fx: f32, fy: f32) -> Matrix2x3<f32> {
    let x = point_camera.x;
    let y = point_camera.y;
    let z_inv = 1.0 / point_camera.z;
    let z_inv_sq = z_inv * z_inv;

    Matrix2x3::new(
        fx * z_inv,
        0.0,
        -fx * x * z_inv_sq,
        0.0,
        fy * z_inv,
        -fy * y * z_inv_sq,
    )
}

/// Largest eigenvalue of the symmetric 2×2 matrix [[a, b], [b, c]].
///
/// The discriminant is floored at 0.1 so nearly isotropic splats still get
/// a stable, slightly conservative extent.
pub fn max_eigenvalue_2x2(a: f32, b: f32, c: f32) -> f32 {
    let det = a * c - b * b;
    let mid = 0.5 * (a + c);
    let disc = (mid * mid - det).max(0.1).sqrt();
    (mid + disc).max(mid - disc)
}
