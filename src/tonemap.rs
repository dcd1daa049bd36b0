//! Tone mapping operators and the linear-to-display pipeline (spec
//! section 4.11).

use crate::color::chroma::convert_linear;
use crate::color::transfer::srgb_oetf;
use crate::error::Result;
use crate::image::{FloatImage, LinearColorSpace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToneMapper {
    Reinhard,
    Aces,
    Neutral,
    AgX,
}

/// `x / (1 + x)` per channel.
pub fn reinhard(rgb: [f32; 3]) -> [f32; 3] {
    rgb.map(|x| (x / (1.0 + x)).clamp(0.0, 1.0))
}

/// Narkowicz's fit of the ACES RRT+ODT, the published coefficients spec
/// section 4.11 references.
fn rrt_and_odt_fit(v: f32) -> f32 {
    const A1: f32 = 0.0245786;
    const A2: f32 = -0.000090537;
    const B1: f32 = 0.983729;
    const B2: f32 = 0.432951;
    const B3: f32 = 0.238081;
    (v * (v + A1) + A2) / (v * (B1 * v + B2) + B3)
}

const ACES_INPUT: [[f32; 3]; 3] = [
    [0.59719, 0.35458, 0.04823],
    [0.07600, 0.90834, 0.01566],
    [0.02840, 0.13383, 0.83777],
];

const ACES_OUTPUT: [[f32; 3]; 3] = [
    [1.60475, -0.53108, -0.07367],
    [-0.10208, 1.10813, -0.00605],
    [-0.00327, -0.07276, 1.07602],
];

fn mat_mul(m: &[[f32; 3]; 3], v: [f32; 3]) -> [f32; 3] {
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}

pub fn aces(rgb: [f32; 3]) -> [f32; 3] {
    let v = mat_mul(&ACES_INPUT, rgb);
    let v = v.map(rrt_and_odt_fit);
    mat_mul(&ACES_OUTPUT, v).map(|x| x.clamp(0.0, 1.0))
}

/// Khronos glTF sample viewer's neutral tone mapper: linear below a knee,
/// a compressive curve above it to a fixed white point.
pub fn neutral(rgb: [f32; 3]) -> [f32; 3] {
    const START_COMPRESSION: f32 = 0.8 - 0.04;
    const DESATURATION: f32 = 0.15;

    let peak = rgb[0].max(rgb[1]).max(rgb[2]);
    if peak < START_COMPRESSION {
        return rgb;
    }

    let d = 1.0 - START_COMPRESSION;
    let new_peak = 1.0 - d * d / (peak + d - START_COMPRESSION);
    let scaled = rgb.map(|x| x * (new_peak / peak));

    let g = 1.0 - 1.0 / (DESATURATION * (peak - new_peak) + 1.0);
    let out = scaled.map(|x| lerp(x, new_peak, g));
    out.map(|x| x.clamp(0.0, 1.0))
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a * (1.0 - t) + b * t
}

const AGX_INPUT: [[f32; 3]; 3] = [
    [0.842_479, 0.0784335, 0.0792237],
    [0.0423046, 0.878_468, 0.0791661],
    [0.0423966, 0.0784335, 0.879_142],
];

const AGX_OUTPUT: [[f32; 3]; 3] = [
    [1.196_878, -0.0980209, -0.0990297],
    [-0.0528055, 1.151_773, -0.0989610],
    [-0.0529677, -0.0980209, 1.150_998],
];

const AGX_MIN_EV: f32 = -12.47393;
const AGX_MAX_EV: f32 = 4.026069;

/// AgX sigmoid approximation: a cubic fit to the published look-up curve
/// over log2 scene-referred values, per spec section 4.11's "1D log2
/// shaping through the published lookup".
fn agx_sigmoid(x: f32) -> f32 {
    let x = x.clamp(0.0, 1.0);
    // Third-order polynomial approximation of the AgX default contrast curve.
    let x2 = x * x;
    let x4 = x2 * x2;
    let x6 = x4 * x2;
    15.5 * x6 - 40.14 * x4 * x + 31.96 * x4 - 6.868 * x2 * x + 0.4298 * x2 + 0.1191 * x - 0.00232
}

pub fn agx(rgb: [f32; 3]) -> [f32; 3] {
    let v = mat_mul(&AGX_INPUT, rgb.map(|c| c.max(1e-10)));
    let log2_v = v.map(|c| {
        let l = c.max(1e-10).log2();
        ((l - AGX_MIN_EV) / (AGX_MAX_EV - AGX_MIN_EV)).clamp(0.0, 1.0)
    });
    let shaped = log2_v.map(agx_sigmoid);
    mat_mul(&AGX_OUTPUT, shaped).map(|x| x.clamp(0.0, 1.0))
}

pub fn apply(mapper: ToneMapper, rgb: [f32; 3]) -> [f32; 3] {
    match mapper {
        ToneMapper::Reinhard => reinhard(rgb),
        ToneMapper::Aces => aces(rgb),
        ToneMapper::Neutral => neutral(rgb),
        ToneMapper::AgX => agx(rgb),
    }
}

/// Sanitizes, optionally gamut-converts to linear-Rec.709, applies
/// `exposure` and `mapper`, and returns the display-linear RGBA still in
/// `[0, 1]` float form (alpha passed through unchanged). This is the
/// shared core of [`apply_tone_mapping`] and of the gain-map encoder's
/// unquantized round-trip path.
pub fn tone_mapped_linear(image: &FloatImage, mapper: ToneMapper, exposure: f32) -> Result<FloatImage> {
    let mut image = image.clone();
    image.sanitize();
    if image.linear_color_space != LinearColorSpace::Rec709 {
        convert_linear(&mut image, LinearColorSpace::Rec709)?;
    }

    for y in 0..image.height {
        for x in 0..image.width {
            let rgba = image.pixel(x, y);
            let exposed = [rgba[0] * exposure, rgba[1] * exposure, rgba[2] * exposure];
            let mapped = apply(mapper, exposed);
            image.set_pixel(x, y, [mapped[0], mapped[1], mapped[2], rgba[3]]);
        }
    }
    Ok(image)
}

/// Full display pipeline (spec section 4.11): sanitize, optionally convert
/// to linear-Rec.709, multiply by `exposure`, tone-map, `linearToSRGB`,
/// round to 8-bit.
pub fn apply_tone_mapping(image: &FloatImage, mapper: ToneMapper, exposure: f32) -> Result<Vec<u8>> {
    let mapped = tone_mapped_linear(image, mapper, exposure)?;

    let mut out = Vec::with_capacity(mapped.width * mapped.height * 4);
    for y in 0..mapped.height {
        for x in 0..mapped.width {
            let rgba = mapped.pixel(x, y);
            for c in &rgba[..3] {
                out.push((srgb_oetf(*c).clamp(0.0, 1.0) * 255.0).round() as u8);
            }
            out.push((rgba[3].clamp(0.0, 1.0) * 255.0).round() as u8);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aces_reinhard_neutral_are_neutral_on_gray() {
        for v in [0.1f32, 0.5, 1.0, 2.0, 8.0] {
            for mapper in [ToneMapper::Reinhard, ToneMapper::Aces, ToneMapper::Neutral] {
                let out = apply(mapper, [v, v, v]);
                let spread = out[0].max(out[1]).max(out[2]) - out[0].min(out[1]).min(out[2]);
                assert!(spread <= 0.01, "{mapper:?} spread={spread} at v={v}");
            }
        }
    }

    #[test]
    fn agx_stays_within_design_tolerance_on_white() {
        let out = agx([1.0, 1.0, 1.0]);
        let spread = out[0].max(out[1]).max(out[2]) - out[0].min(out[1]).min(out[2]);
        assert!(spread <= 0.65, "agx spread={spread}");
    }

    #[test]
    fn gradient_is_continuous_under_reinhard() {
        let mut prev = 0u8;
        for i in 0..256u32 {
            let v = i as f32 / 255.0;
            let mapped = reinhard([v, v, v]);
            let byte = (srgb_oetf(mapped[0]) * 255.0).round() as u8;
            if i > 0 {
                let diff = (byte as i32 - prev as i32).abs();
                assert!(diff <= 60, "discontinuity at i={i}: {prev} -> {byte}");
            }
            prev = byte;
        }
    }

    #[test]
    fn pipeline_produces_correct_buffer_size() {
        let image = FloatImage::new(4, 3, LinearColorSpace::Rec709);
        let out = apply_tone_mapping(&image, ToneMapper::Aces, 1.0).unwrap();
        assert_eq!(out.len(), 4 * 3 * 4);
    }

    #[test]
    fn reinhard_saturates_toward_white_for_large_input() {
        let out = reinhard([1000.0, 1000.0, 1000.0]);
        for c in out {
            assert!(c > 0.99);
        }
    }
}
