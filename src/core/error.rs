//! Errors reported by the rasterizer entry points.
//!
//! Only usage errors, resource exhaustion and (in debug mode) consistency
//! failures are reported. Degenerate primitives (behind the camera, singular
//! covariance, zero footprint) are never errors: they are skipped and receive
//! zero gradient.

use thiserror::Error;

/// Errors that can occur when running a forward or backward pass.
#[derive(Debug, Error)]
pub enum RasterError {
    #[error("shape mismatch for `{name}`: expected {expected} elements, got {actual}")]
    ShapeMismatch {
        name: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("both `{first}` and `{second}` were provided; exactly one must be non-empty")]
    ConflictingInputs {
        first: &'static str,
        second: &'static str,
    },

    #[error("neither `{first}` nor `{second}` was provided; exactly one must be non-empty")]
    MissingInput {
        first: &'static str,
        second: &'static str,
    },

    #[error(
        "SH degree {degree} is unsupported or needs more than {available} coefficients per point"
    )]
    InvalidShDegree { degree: u32, available: usize },

    #[error("invalid image size {width}x{height}")]
    InvalidImageSize { width: u32, height: u32 },

    #[error("invalid rasterizer configuration: {0}")]
    InvalidConfig(String),

    #[error("out of memory allocating {what} ({requested} elements)")]
    OutOfMemory { what: &'static str, requested: usize },

    #[error("forward buffers do not match this call: {0}")]
    BufferMismatch(String),

    #[error("non-finite value in {stage} for primitive {index}")]
    NonFinite { stage: &'static str, index: usize },

    #[error("primitive {index} lies in front of the near plane although `prefiltered` is set")]
    PrefilterViolation { index: usize },
}

impl RasterError {
    /// Check that a per-primitive (or per-pixel) slice has exactly `expected` entries.
    pub(crate) fn check_len(
        name: &'static str,
        expected: usize,
        actual: usize,
    ) -> Result<(), Self> {
        if expected == actual {
            Ok(())
        } else {
            Err(RasterError::ShapeMismatch {
                name,
                expected,
                actual,
            })
        }
    }
}

/// Allocate a zeroed vector of `len` elements, reporting allocation failure
/// instead of aborting.
pub(crate) fn try_alloc<T: Clone>(
    what: &'static str,
    len: usize,
    value: T,
) -> Result<Vec<T>, RasterError> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| RasterError::OutOfMemory { what, requested: len })?;
    v.resize(len, value);
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_len() {
        assert!(RasterError::check_len("opacities", 3, 3).is_ok());
        let err = RasterError::check_len("opacities", 3, 2).unwrap_err();
        assert!(matches!(
            err,
            RasterError::ShapeMismatch {
                name: "opacities",
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_try_alloc_reports_exhaustion() {
        let err = try_alloc::<u64>("binning keys", usize::MAX / 4, 0).unwrap_err();
        assert!(matches!(err, RasterError::OutOfMemory { .. }));
        let ok = try_alloc("binning keys", 4, 7u32).unwrap();
        assert_eq!(ok, vec![7, 7, 7, 7]);
    }
}
