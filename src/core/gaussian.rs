//! Per-primitive inputs and their mutually exclusive modes.
//!
//! A call describes N Gaussians with borrowed slices. Two pairs of inputs are
//! alternatives of each other:
//! - covariance: `scales` + `rotations`, or `cov3d_precomp`
//! - color: `colors_precomp`, or `shs` (spherical-harmonics coefficients)
//!
//! `GaussianInputs::resolve` checks every shape once and turns the pairs into
//! `CovarianceSource` / `ColorSource`, so the per-primitive code never looks
//! at slice emptiness again.

use nalgebra::{Matrix3, Vector3, Vector4};

use crate::core::math::{quaternion_to_matrix, unpack_covariance};
use crate::core::sh::{coeffs_for_degree, MAX_SH_DEGREE};
use crate::core::RasterError;

/// Borrowed per-primitive inputs for one call.
///
/// Layouts:
/// - `rotations`: raw quaternions (w, x, y, z), normalized internally
/// - `cov3d_precomp`: symmetric covariance as (xx, xy, xz, yy, yz, zz)
/// - `shs`: N×K coefficients, coefficient k of primitive i at `i * K + k`
/// - `opacities`: already activated, logically in [0, 1]
#[derive(Clone, Copy, Debug, Default)]
pub struct GaussianInputs<'a> {
    pub means3d: &'a [Vector3<f32>],
    pub opacities: &'a [f32],
    pub scales: &'a [Vector3<f32>],
    pub rotations: &'a [Vector4<f32>],
    pub cov3d_precomp: &'a [[f32; 6]],
    pub colors_precomp: &'a [Vector3<f32>],
    pub shs: &'a [Vector3<f32>],
}

/// How each primitive's 3D covariance is obtained.
#[derive(Clone, Copy, Debug)]
pub enum CovarianceSource<'a> {
    FromScaleRotation {
        scales: &'a [Vector3<f32>],
        rotations: &'a [Vector4<f32>],
    },
    Precomputed(&'a [[f32; 6]]),
}

/// How each primitive's RGB color is obtained.
#[derive(Clone, Copy, Debug)]
pub enum ColorSource<'a> {
    Precomputed(&'a [Vector3<f32>]),
    SphericalHarmonics {
        coeffs: &'a [Vector3<f32>],
        coeffs_per_point: usize,
        degree: u32,
    },
}

/// Inputs after shape validation and mode selection.
#[derive(Clone, Copy, Debug)]
pub struct ResolvedGaussians<'a> {
    pub means3d: &'a [Vector3<f32>],
    pub opacities: &'a [f32],
    pub covariance: CovarianceSource<'a>,
    pub color: ColorSource<'a>,
}

impl<'a> GaussianInputs<'a> {
    /// Number of primitives (the length of `means3d`).
    pub fn len(&self) -> usize {
        self.means3d.len()
    }

    pub fn is_empty(&self) -> bool {
        self.means3d.is_empty()
    }

    /// Validate shapes and select the input modes.
    ///
    /// `require_opacity` is false for the backward pass, which reads the
    /// activated opacities back from the geometry buffer.
    pub fn resolve(
        &self,
        sh_degree: u32,
        require_opacity: bool,
    ) -> Result<ResolvedGaussians<'a>, RasterError> {
        let n = self.len();

        if require_opacity || !self.opacities.is_empty() {
            RasterError::check_len("opacities", n, self.opacities.len())?;
        }

        let covariance = self.resolve_covariance(n)?;
        let color = self.resolve_color(n, sh_degree)?;

        Ok(ResolvedGaussians {
            means3d: self.means3d,
            opacities: self.opacities,
            covariance,
            color,
        })
    }

    fn resolve_covariance(&self, n: usize) -> Result<CovarianceSource<'a>, RasterError> {
        let has_precomp = !self.cov3d_precomp.is_empty();
        let has_factors = !self.scales.is_empty() || !self.rotations.is_empty();

        match (has_precomp, has_factors) {
            (true, true) => Err(RasterError::ConflictingInputs {
                first: "cov3d_precomp",
                second: "scales/rotations",
            }),
            (true, false) => {
                RasterError::check_len("cov3d_precomp", n, self.cov3d_precomp.len())?;
                Ok(CovarianceSource::Precomputed(self.cov3d_precomp))
            }
            (false, true) => {
                RasterError::check_len("scales", n, self.scales.len())?;
                RasterError::check_len("rotations", n, self.rotations.len())?;
                Ok(CovarianceSource::FromScaleRotation {
                    scales: self.scales,
                    rotations: self.rotations,
                })
            }
            // An empty scene needs neither.
            (false, false) if n == 0 => Ok(CovarianceSource::FromScaleRotation {
                scales: self.scales,
                rotations: self.rotations,
            }),
            (false, false) => Err(RasterError::MissingInput {
                first: "cov3d_precomp",
                second: "scales/rotations",
            }),
        }
    }

    fn resolve_color(&self, n: usize, sh_degree: u32) -> Result<ColorSource<'a>, RasterError> {
        let has_colors = !self.colors_precomp.is_empty();
        let has_shs = !self.shs.is_empty();

        match (has_colors, has_shs) {
            (true, true) => Err(RasterError::ConflictingInputs {
                first: "colors_precomp",
                second: "shs",
            }),
            (true, false) => {
                RasterError::check_len("colors_precomp", n, self.colors_precomp.len())?;
                Ok(ColorSource::Precomputed(self.colors_precomp))
            }
            (false, true) => {
                if sh_degree > MAX_SH_DEGREE {
                    return Err(RasterError::InvalidShDegree {
                        degree: sh_degree,
                        available: if n == 0 { 0 } else { self.shs.len() / n },
                    });
                }
                if n == 0 || self.shs.len() % n != 0 {
                    return Err(RasterError::ShapeMismatch {
                        name: "shs",
                        expected: n * coeffs_for_degree(sh_degree),
                        actual: self.shs.len(),
                    });
                }
                let coeffs_per_point = self.shs.len() / n;
                if coeffs_for_degree(sh_degree) > coeffs_per_point {
                    return Err(RasterError::InvalidShDegree {
                        degree: sh_degree,
                        available: coeffs_per_point,
                    });
                }
                Ok(ColorSource::SphericalHarmonics {
                    coeffs: self.shs,
                    coeffs_per_point,
                    degree: sh_degree,
                })
            }
            (false, false) if n == 0 => Ok(ColorSource::Precomputed(self.colors_precomp)),
            (false, false) => Err(RasterError::MissingInput {
                first: "colors_precomp",
                second: "shs",
            }),
        }
    }
}

impl<'a> CovarianceSource<'a> {
    /// World-space 3D covariance of primitive `idx`.
    ///
    /// Σ = R · S · Sᵀ · Rᵀ with S = diag(scale_modifier · scale)
    pub fn covariance(&self, idx: usize, scale_modifier: f32) -> Matrix3<f32> {
        match self {
            CovarianceSource::Precomputed(cov) => unpack_covariance(&cov[idx]),
            CovarianceSource::FromScaleRotation { scales, rotations } => {
                covariance_from_scale_rotation(&scales[idx], scale_modifier, &rotations[idx])
            }
        }
    }

    pub fn is_precomputed(&self) -> bool {
        matches!(self, CovarianceSource::Precomputed(_))
    }
}

impl<'a> ColorSource<'a> {
    /// SH coefficients of primitive `idx` (empty for precomputed colors).
    pub fn coeffs_of(&self, idx: usize) -> &'a [Vector3<f32>] {
        match *self {
            ColorSource::Precomputed(_) => &[],
            ColorSource::SphericalHarmonics {
                coeffs,
                coeffs_per_point,
                ..
            } => &coeffs[idx * coeffs_per_point..(idx + 1) * coeffs_per_point],
        }
    }

    pub fn is_precomputed(&self) -> bool {
        matches!(self, ColorSource::Precomputed(_))
    }
}

/// Σ = R · S · Sᵀ · Rᵀ
///
/// `R·S` scales the columns of R, so Σ = (R·S)(R·S)ᵀ.
pub fn covariance_from_scale_rotation(
    scale: &Vector3<f32>,
    scale_modifier: f32,
    rotation: &Vector4<f32>,
) -> Matrix3<f32> {
    let r = quaternion_to_matrix(rotation);
    let s = scale * scale_modifier;
    let m = r * Matrix3::from_diagonal(&s);
    m * m.transpose()
}
