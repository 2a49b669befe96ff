//! Input validation and error reporting of the public entry points.

mod common;

use common::{random_scene, settings, test_camera, Scene};
use nalgebra::{Vector3, Vector4};
use splat_raster::{GaussianRasterizer, PixelGrads, RasterConfig, RasterError};

fn zero_grads(out: &splat_raster::ForwardOutput) -> (Vec<f32>, Vec<f32>) {
    (vec![0.0; out.color.len()], vec![0.0; out.alpha.len()])
}

#[test]
fn test_shape_mismatch_is_reported() {
    let rasterizer = GaussianRasterizer::default();
    let settings = settings(test_camera(16, 16));
    let mut scene = random_scene(1, 4);
    scene.opacities.pop();

    let err = rasterizer.forward(&scene.inputs(), &settings).unwrap_err();
    assert!(matches!(err, RasterError::ShapeMismatch { .. }), "{err}");

    // Opacities are required by the forward pass.
    let mut scene = random_scene(1, 4);
    scene.opacities.clear();
    let err = rasterizer.forward(&scene.inputs(), &settings).unwrap_err();
    assert!(matches!(err, RasterError::ShapeMismatch { name: "opacities", .. }), "{err}");
}

#[test]
fn test_conflicting_inputs_are_rejected() {
    let rasterizer = GaussianRasterizer::default();
    let settings = settings(test_camera(16, 16));

    let mut scene = random_scene(2, 3);
    scene.cov3d = vec![[0.01, 0.0, 0.0, 0.01, 0.0, 0.01]; 3];
    let err = rasterizer.forward(&scene.inputs(), &settings).unwrap_err();
    assert!(matches!(err, RasterError::ConflictingInputs { .. }), "{err}");

    let mut scene = random_scene(2, 3);
    scene.shs = vec![Vector3::zeros(); 3];
    let err = rasterizer.forward(&scene.inputs(), &settings).unwrap_err();
    assert!(matches!(err, RasterError::ConflictingInputs { .. }), "{err}");
}

#[test]
fn test_missing_inputs_are_rejected() {
    let rasterizer = GaussianRasterizer::default();
    let settings = settings(test_camera(16, 16));

    let mut scene = random_scene(3, 3);
    scene.colors.clear();
    let err = rasterizer.forward(&scene.inputs(), &settings).unwrap_err();
    assert!(matches!(err, RasterError::MissingInput { .. }), "{err}");

    let mut scene = random_scene(3, 3);
    scene.scales.clear();
    scene.rotations.clear();
    let err = rasterizer.forward(&scene.inputs(), &settings).unwrap_err();
    assert!(matches!(err, RasterError::MissingInput { .. }), "{err}");
}

#[test]
fn test_sh_degree_beyond_coefficients_is_rejected() {
    let rasterizer = GaussianRasterizer::default();
    let mut settings = settings(test_camera(16, 16));
    let mut scene = random_scene(4, 2);
    scene.colors.clear();
    scene.shs = vec![Vector3::new(0.5, 0.5, 0.5); 2 * 4];

    settings.sh_degree = 1;
    assert!(rasterizer.forward(&scene.inputs(), &settings).is_ok());

    settings.sh_degree = 2;
    let err = rasterizer.forward(&scene.inputs(), &settings).unwrap_err();
    assert!(
        matches!(err, RasterError::InvalidShDegree { degree: 2, available: 4 }),
        "{err}"
    );

    settings.sh_degree = 4;
    scene.shs = vec![Vector3::zeros(); 2 * 25];
    let err = rasterizer.forward(&scene.inputs(), &settings).unwrap_err();
    assert!(matches!(err, RasterError::InvalidShDegree { .. }), "{err}");
}

#[test]
fn test_huge_sh_degree_is_rejected() {
    let rasterizer = GaussianRasterizer::default();
    let mut settings = settings(test_camera(16, 16));
    let mut scene = random_scene(8, 3);
    scene.colors.clear();
    scene.shs = vec![Vector3::zeros(); 4];

    settings.sh_degree = 70_000;
    let err = rasterizer.forward(&scene.inputs(), &settings).unwrap_err();
    assert!(matches!(err, RasterError::InvalidShDegree { degree: 70_000, .. }), "{err}");

    scene.shs = vec![Vector3::zeros(); 3 * 16];
    settings.sh_degree = u32::MAX;
    let err = rasterizer.forward(&scene.inputs(), &settings).unwrap_err();
    assert!(matches!(err, RasterError::InvalidShDegree { available: 16, .. }), "{err}");
}

#[test]
fn test_empty_image_is_rejected() {
    let rasterizer = GaussianRasterizer::default();
    let settings = settings(test_camera(0, 16));
    let err = rasterizer.forward(&Scene::default().inputs(), &settings).unwrap_err();
    assert!(matches!(err, RasterError::InvalidImageSize { width: 0, height: 16 }), "{err}");
}

#[test]
fn test_invalid_config_is_rejected() {
    let bad = [
        RasterConfig { tile_size: 0, ..RasterConfig::default() },
        RasterConfig { max_alpha: 1.0, ..RasterConfig::default() },
        RasterConfig { min_alpha: 0.5, max_alpha: 0.4, ..RasterConfig::default() },
        RasterConfig { extent_sigma: 0.0, ..RasterConfig::default() },
        RasterConfig { low_pass: f32::NAN, ..RasterConfig::default() },
        RasterConfig { near_plane: -1.0, ..RasterConfig::default() },
        RasterConfig { near_plane: f32::NAN, ..RasterConfig::default() },
    ];
    for config in bad {
        let err = GaussianRasterizer::new(config.clone()).unwrap_err();
        assert!(matches!(err, RasterError::InvalidConfig(_)), "{config:?}");
    }
}

#[test]
fn test_primitives_behind_camera_are_never_drawn() {
    let config = RasterConfig { near_plane: 0.0, ..RasterConfig::default() };
    let rasterizer = GaussianRasterizer::new(config).unwrap();
    let settings = settings(test_camera(16, 16));
    let mut scene = Scene::default();
    scene.push(Vector3::new(0.0, 0.0, -0.5), Vector3::repeat(0.3), 0.9, Vector3::repeat(1.0));
    scene.push(Vector3::new(0.0, 0.0, 0.0), Vector3::repeat(0.3), 0.9, Vector3::repeat(1.0));

    let out = rasterizer.forward(&scene.inputs(), &settings).unwrap();
    assert_eq!(out.radii, vec![0, 0]);
    assert_eq!(out.num_rendered, 0);
    assert!(out.alpha.iter().all(|&a| a == 0.0));
}

#[test]
fn test_config_from_partial_json_keeps_defaults() {
    let config: RasterConfig =
        serde_json::from_str(r#"{ "tile_size": 8, "low_pass": 0.5 }"#).unwrap();
    let defaults = RasterConfig::default();
    assert_eq!(config.tile_size, 8);
    assert_eq!(config.low_pass, 0.5);
    assert_eq!(config.near_plane, defaults.near_plane);
    assert_eq!(config.max_alpha, defaults.max_alpha);
    assert!(GaussianRasterizer::new(config).is_ok());

    let text = serde_json::to_string(&defaults).unwrap();
    let back: RasterConfig = serde_json::from_str(&text).unwrap();
    assert_eq!(back.transmittance_threshold, defaults.transmittance_threshold);
}

#[test]
fn test_backward_rejects_wrong_gradient_images() {
    let rasterizer = GaussianRasterizer::default();
    let settings = settings(test_camera(16, 12));
    let scene = random_scene(5, 4);
    let out = rasterizer.forward(&scene.inputs(), &settings).unwrap();
    let (color, plane) = zero_grads(&out);

    let short = vec![0.0; plane.len() - 1];
    let err = rasterizer
        .backward(
            &scene.inputs(),
            &settings,
            &out,
            &PixelGrads { color: &color, depth: &short, alpha: &plane },
        )
        .unwrap_err();
    assert!(matches!(err, RasterError::ShapeMismatch { .. }), "{err}");
}

#[test]
fn test_backward_rejects_foreign_buffers() {
    let settings = settings(test_camera(16, 12));
    let scene = random_scene(6, 4);
    let out = GaussianRasterizer::default().forward(&scene.inputs(), &settings).unwrap();
    let (color, plane) = zero_grads(&out);
    let grads = PixelGrads { color: &color, depth: &plane, alpha: &plane };

    // Different tile size than the one the buffers were built with.
    let config = RasterConfig { tile_size: 8, ..RasterConfig::default() };
    let other = GaussianRasterizer::new(config).unwrap();
    let err = other.backward(&scene.inputs(), &settings, &out, &grads).unwrap_err();
    assert!(matches!(err, RasterError::BufferMismatch(_)), "{err}");

    // Different primitive count.
    let mut more = scene.clone();
    more.push(Vector3::new(0.0, 0.0, 5.0), Vector3::repeat(0.1), 0.5, Vector3::repeat(0.5));
    let err = GaussianRasterizer::default()
        .backward(&more.inputs(), &settings, &out, &grads)
        .unwrap_err();
    assert!(matches!(err, RasterError::BufferMismatch(_)), "{err}");

    // Truncated binning list.
    let mut broken = out.clone();
    broken.binning.point_list.pop();
    broken.binning.keys.pop();
    let err = GaussianRasterizer::default()
        .backward(&scene.inputs(), &settings, &broken, &grads)
        .unwrap_err();
    assert!(matches!(err, RasterError::BufferMismatch(_)), "{err}");
}

#[test]
fn test_debug_mode_reports_non_finite_means() {
    let rasterizer = GaussianRasterizer::default();
    let mut settings = settings(test_camera(16, 16));
    let mut scene = random_scene(7, 3);
    scene.means[1] = Vector3::new(f32::NAN, 0.0, 3.0);

    // Without checks the primitive is dropped.
    let out = rasterizer.forward(&scene.inputs(), &settings).unwrap();
    assert_eq!(out.radii[1], 0);

    settings.debug = true;
    let err = rasterizer.forward(&scene.inputs(), &settings).unwrap_err();
    assert!(matches!(err, RasterError::NonFinite { index: 1, .. }), "{err}");
}

#[test]
fn test_debug_mode_reports_prefilter_violation() {
    let rasterizer = GaussianRasterizer::default();
    let mut settings = settings(test_camera(16, 16));
    settings.prefiltered = true;
    settings.debug = true;

    let mut scene = Scene::default();
    scene.push(Vector3::new(0.0, 0.0, 3.0), Vector3::repeat(0.1), 0.5, Vector3::repeat(0.5));
    scene.push(Vector3::new(0.0, 0.0, 0.1), Vector3::repeat(0.1), 0.5, Vector3::repeat(0.5));

    let err = rasterizer.forward(&scene.inputs(), &settings).unwrap_err();
    assert!(matches!(err, RasterError::PrefilterViolation { index: 1 }), "{err}");
}

#[test]
fn test_zero_quaternion_renders_as_identity() {
    let rasterizer = GaussianRasterizer::default();
    let settings = settings(test_camera(16, 16));
    let mut a = Scene::default();
    a.push(Vector3::new(0.0, 0.0, 3.0), Vector3::new(0.3, 0.1, 0.1), 0.6, Vector3::repeat(0.7));
    let mut b = a.clone();
    b.rotations[0] = Vector4::zeros();

    let out_a = rasterizer.forward(&a.inputs(), &settings).unwrap();
    let out_b = rasterizer.forward(&b.inputs(), &settings).unwrap();
    assert_eq!(out_a.color, out_b.color);
}
