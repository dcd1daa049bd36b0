//! Gain-map decoder (spec section 4.13). Tone-map-agnostic: only the
//! stored ratio and metadata are needed, never the mapper used to
//! produce the SDR base.

use crate::color::transfer::srgb_eotf;
use crate::error::{CoreError, Result};
use crate::gainmap::GainMapMetadata;
use crate::image::{FloatImage, LinearColorSpace};

/// Reconstructs a linear-Rec.709 HDR [`FloatImage`] from an SDR base plane
/// and a gain-map plane, both 8-bit RGBA, `width * height * 4` bytes each.
pub fn decode_gain_map(
    sdr_rgba: &[u8],
    gain_map_rgba: &[u8],
    width: usize,
    height: usize,
    metadata: &GainMapMetadata,
) -> Result<FloatImage> {
    let expected = width * height * 4;
    if sdr_rgba.len() != expected || gain_map_rgba.len() != expected {
        return Err(CoreError::DimensionMismatch {
            expected: (width, height),
            actual: (sdr_rgba.len() / 4, gain_map_rgba.len() / 4),
        });
    }

    let mut image = FloatImage::new(width, height, LinearColorSpace::Rec709);
    for i in 0..width * height {
        let mut rgba = [0.0f32; 4];
        for c in 0..3 {
            let gain_byte = gain_map_rgba[i * 4 + c] as f32 / 255.0;
            let gamma = metadata.gamma[c];
            let t = if gamma.abs() < 1e-12 { 0.0 } else { gain_byte.max(0.0).powf(1.0 / gamma) };
            let log_ratio = metadata.gain_map_min[c] + t * (metadata.gain_map_max[c] - metadata.gain_map_min[c]);
            let gain = 2f32.powf(log_ratio);
            let sdr_byte = sdr_rgba[i * 4 + c];
            let sdr_linear = srgb_eotf(sdr_byte as f32 / 255.0);
            rgba[c] = (sdr_linear + metadata.offset_sdr[c]) * gain - metadata.offset_hdr[c];
        }
        rgba[3] = sdr_rgba[i * 4 + 3] as f32 / 255.0;
        image.set_pixel(i % width, i / width, rgba);
    }
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gainmap::{encode_gain_map, encode_gain_map_float, GainMapEncodingOptions};

    #[test]
    fn quantized_round_trip_stays_within_tolerance() {
        let mut image = FloatImage::new(8, 8, LinearColorSpace::Rec709);
        for y in 0..8 {
            for x in 0..8 {
                let v = 0.1 + (x * 8 + y) as f32 * 0.03;
                image.set_pixel(x, y, [v, v * 0.8, v * 1.1, 1.0]);
            }
        }
        let opts = GainMapEncodingOptions::default();
        let encoded = encode_gain_map(&image, &opts, None).unwrap();
        let decoded = decode_gain_map(
            &encoded.sdr_rgba,
            &encoded.gain_map_rgba,
            encoded.width,
            encoded.height,
            &encoded.metadata,
        )
        .unwrap();

        for y in 0..8 {
            for x in 0..8 {
                let original = image.pixel(x, y);
                let back = decoded.pixel(x, y);
                for c in 0..3 {
                    let rel_err = (back[c] - original[c]).abs() / original[c].max(1e-6);
                    assert!(rel_err < 0.02, "pixel ({x},{y}) channel {c}: {original:?} -> {back:?}");
                }
            }
        }
    }

    #[test]
    fn float_only_round_trip_is_tighter_than_quantized() {
        let mut image = FloatImage::new(4, 4, LinearColorSpace::Rec709);
        for y in 0..4 {
            for x in 0..4 {
                let v = 0.3 + (x + y) as f32 * 0.1;
                image.set_pixel(x, y, [v, v, v, 1.0]);
            }
        }
        let opts = GainMapEncodingOptions::default();
        let encoded = encode_gain_map_float(&image, &opts, None).unwrap();

        for i in 0..16 {
            let gain = 2f32.powf(encoded.log_ratio[i * 3]);
            let reconstructed = (encoded.sdr_linear[i * 3] + opts.offset_sdr[0]) * gain - opts.offset_hdr[0];
            let original = image.pixels[i * 4];
            let rel_err = (reconstructed - original).abs() / original.max(1e-6);
            assert!(rel_err < 0.005, "index {i}: {original} -> {reconstructed}");
        }
    }

    #[test]
    fn rejects_mismatched_dimensions() {
        let metadata = GainMapMetadata {
            gain_map_min: [0.0; 3],
            gain_map_max: [1.0; 3],
            gamma: [1.0; 3],
            offset_sdr: [1.0 / 64.0; 3],
            offset_hdr: [1.0 / 64.0; 3],
            hdr_capacity_min: 0.0,
            hdr_capacity_max: 1.0,
        };
        let err = decode_gain_map(&[0u8; 4], &[0u8; 4], 2, 2, &metadata).unwrap_err();
        assert!(matches!(err, CoreError::DimensionMismatch { .. }));
    }
}
