//! Conversion of rendered planar images to 8-bit RGB.
//!
//! Rendered colors are whatever space the caller's colors live in. When they
//! are linear radiance, `Transfer::Srgb` applies the official sRGB transfer
//! function (not a gamma 2.2 approximation):
//!
//! - if linear <= 0.0031308: sRGB = 12.92 * linear
//! - if linear > 0.0031308: sRGB = 1.055 * linear ^ (1/2.4) - 0.055

use image::{Rgb, RgbImage};

/// Transfer applied when quantizing to 8 bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Transfer {
    /// Values are already display-encoded; only clamp and quantize.
    #[default]
    Identity,
    /// Values are linear; encode with the sRGB curve.
    Srgb,
}

/// Convert linear f32 (0.0-1.0) to sRGB u8 (0-255).
pub fn linear_f32_to_srgb_u8(x: f32) -> u8 {
    let x = x.clamp(0.0, 1.0);
    let cs = if x <= 0.0031308 {
        12.92 * x
    } else {
        1.055 * x.powf(1.0 / 2.4) - 0.055
    };
    quantize(cs)
}

#[inline]
fn quantize(x: f32) -> u8 {
    (x.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Pack a planar 3×H×W image into an `RgbImage`.
///
/// Returns `None` when `planar` does not hold exactly 3·width·height values.
pub fn planar_to_rgb_image(
    planar: &[f32],
    width: u32,
    height: u32,
    transfer: Transfer,
) -> Option<RgbImage> {
    let plane = width as usize * height as usize;
    if planar.len() != 3 * plane {
        return None;
    }
    let encode: fn(f32) -> u8 = match transfer {
        Transfer::Identity => quantize,
        Transfer::Srgb => linear_f32_to_srgb_u8,
    };

    Some(RgbImage::from_fn(width, height, |x, y| {
        let i = y as usize * width as usize + x as usize;
        Rgb([
            encode(planar[i]),
            encode(planar[plane + i]),
            encode(planar[2 * plane + i]),
        ])
    }))
}
