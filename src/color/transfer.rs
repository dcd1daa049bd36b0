//! Transfer functions on scalars in `[0, 1]` (spec section 4.1).
//!
//! The teacher only ever needed a bare gamma curve (`transfer_functions.rs`);
//! this generalizes to the piecewise sRGB EOTF required for round-tripping
//! 8-bit sRGB display values, plus the Rec.2020/BT.1886 display curve.

use crate::image::LinearColorSpace;

/// sRGB EOTF^-1: linear -> encoded. IEC 61966-2-1.
#[inline]
pub fn srgb_oetf(linear: f32) -> f32 {
    if linear <= 0.0031308 {
        12.92 * linear
    } else {
        1.055 * linear.powf(1.0 / 2.4) - 0.055
    }
}

/// sRGB EOTF: encoded -> linear.
#[inline]
pub fn srgb_eotf(encoded: f32) -> f32 {
    if encoded <= 0.04045 {
        encoded / 12.92
    } else {
        ((encoded + 0.055) / 1.055).powf(2.4)
    }
}

/// Rec.2020/BT.1886 display transfer: same piecewise form as sRGB, but a
/// bare gamma of 2.4 rather than the sRGB offset curve.
#[inline]
pub fn bt1886_oetf(linear: f32) -> f32 {
    if linear <= 0.0 {
        0.0
    } else {
        linear.powf(1.0 / 2.4)
    }
}

#[inline]
pub fn bt1886_eotf(encoded: f32) -> f32 {
    if encoded <= 0.0 {
        0.0
    } else {
        encoded.powf(2.4)
    }
}

/// Applies the transfer function per channel for the given color space.
pub fn linear_to_display(r: f32, g: f32, b: f32, space: LinearColorSpace) -> (f32, f32, f32) {
    match space {
        LinearColorSpace::Rec709 | LinearColorSpace::P3 => {
            (srgb_oetf(r), srgb_oetf(g), srgb_oetf(b))
        }
        LinearColorSpace::Rec2020 => (bt1886_oetf(r), bt1886_oetf(g), bt1886_oetf(b)),
    }
}

pub fn display_to_linear(r: f32, g: f32, b: f32, space: LinearColorSpace) -> (f32, f32, f32) {
    match space {
        LinearColorSpace::Rec709 | LinearColorSpace::P3 => {
            (srgb_eotf(r), srgb_eotf(g), srgb_eotf(b))
        }
        LinearColorSpace::Rec2020 => (bt1886_eotf(r), bt1886_eotf(g), bt1886_eotf(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn srgb_round_trips_every_byte_value() {
        for byte in 0u16..=255 {
            let x = byte as f32 / 255.0;
            let back = srgb_oetf(srgb_eotf(x));
            let back_byte = (back * 255.0).round() as i32;
            assert!((back_byte - byte as i32).abs() <= 1, "byte {byte} -> {back_byte}");
        }
    }

    #[test]
    fn srgb_linear_segment_matches_slope() {
        assert!((srgb_oetf(0.001) - 0.001 * 12.92).abs() < 1e-6);
    }
}
