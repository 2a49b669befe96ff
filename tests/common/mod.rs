//! Shared scene builders for the integration tests.

#![allow(dead_code)]

use nalgebra::{Matrix4, Vector3, Vector4};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use splat_raster::{GaussianInputs, RasterCamera, RasterSettings};

/// Camera at the origin looking down +z.
pub fn test_camera(width: u32, height: u32) -> RasterCamera {
    let tan_fovy = 0.9 * height as f32 / width as f32;
    RasterCamera::perspective(Matrix4::identity(), 0.9, tan_fovy, width, height, 0.01, 100.0)
}

/// Camera slightly rotated and offset, so view and world axes differ.
pub fn tilted_camera(width: u32, height: u32) -> RasterCamera {
    let rot = nalgebra::Rotation3::from_euler_angles(0.05f32, -0.08, 0.03);
    let mut view = Matrix4::identity();
    view.fixed_view_mut::<3, 3>(0, 0).copy_from(rot.matrix());
    view[(0, 3)] = 0.1;
    view[(1, 3)] = -0.05;
    view[(2, 3)] = 0.3;
    let tan_fovy = 0.9 * height as f32 / width as f32;
    RasterCamera::perspective(view, 0.9, tan_fovy, width, height, 0.01, 100.0)
}

/// Owned per-primitive data; `inputs()` borrows it as `GaussianInputs`.
#[derive(Clone, Debug, Default)]
pub struct Scene {
    pub means: Vec<Vector3<f32>>,
    pub opacities: Vec<f32>,
    pub scales: Vec<Vector3<f32>>,
    pub rotations: Vec<Vector4<f32>>,
    pub cov3d: Vec<[f32; 6]>,
    pub colors: Vec<Vector3<f32>>,
    pub shs: Vec<Vector3<f32>>,
}

impl Scene {
    pub fn inputs(&self) -> GaussianInputs<'_> {
        GaussianInputs {
            means3d: &self.means,
            opacities: &self.opacities,
            scales: &self.scales,
            rotations: &self.rotations,
            cov3d_precomp: &self.cov3d,
            colors_precomp: &self.colors,
            shs: &self.shs,
        }
    }

    pub fn len(&self) -> usize {
        self.means.len()
    }

    pub fn push(
        &mut self,
        mean: Vector3<f32>,
        scale: Vector3<f32>,
        opacity: f32,
        color: Vector3<f32>,
    ) {
        self.means.push(mean);
        self.scales.push(scale);
        self.rotations.push(Vector4::new(1.0, 0.0, 0.0, 0.0));
        self.opacities.push(opacity);
        self.colors.push(color);
    }

    /// Reorder every per-primitive array by `perm` (new i = old perm[i]).
    pub fn permuted(&self, perm: &[usize]) -> Scene {
        fn pick<T: Clone>(v: &[T], perm: &[usize]) -> Vec<T> {
            if v.is_empty() {
                Vec::new()
            } else {
                perm.iter().map(|&i| v[i].clone()).collect()
            }
        }
        Scene {
            means: pick(&self.means, perm),
            opacities: pick(&self.opacities, perm),
            scales: pick(&self.scales, perm),
            rotations: pick(&self.rotations, perm),
            cov3d: pick(&self.cov3d, perm),
            colors: pick(&self.colors, perm),
            shs: Vec::new(),
        }
    }
}

/// Random scene in front of `test_camera`, with distinct depths.
pub fn random_scene(seed: u64, n: usize) -> Scene {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut scene = Scene::default();
    for i in 0..n {
        let depth = 2.0 + 0.37 * i as f32;
        let mean = Vector3::new(
            rng.gen_range(-0.25f32..0.25) * depth,
            rng.gen_range(-0.2f32..0.2) * depth,
            depth,
        );
        scene.means.push(mean);
        scene.scales.push(Vector3::new(
            rng.gen_range(0.05f32..0.2),
            rng.gen_range(0.05f32..0.2),
            rng.gen_range(0.05f32..0.2),
        ));
        scene.rotations.push(Vector4::new(
            rng.gen_range(0.5f32..1.0),
            rng.gen_range(-0.5f32..0.5),
            rng.gen_range(-0.5f32..0.5),
            rng.gen_range(-0.5f32..0.5),
        ));
        scene.opacities.push(rng.gen_range(0.3f32..0.85));
        scene.colors.push(Vector3::new(
            rng.gen_range(0.0f32..1.0),
            rng.gen_range(0.0f32..1.0),
            rng.gen_range(0.0f32..1.0),
        ));
    }
    scene
}

pub fn settings(camera: RasterCamera) -> RasterSettings {
    let mut s = RasterSettings::new(camera);
    s.background = Vector3::new(0.1, 0.2, 0.3);
    s
}
