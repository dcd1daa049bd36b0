//! Gain-map encoder (spec section 4.12).

use crate::color::chroma::convert_linear;
use crate::color::transfer::srgb_eotf;
use crate::error::{CoreError, Result};
use crate::gainmap::{EncodingResult, FloatEncodingResult, GainMapEncodingOptions, GainMapMetadata};
use crate::image::{FloatImage, LinearColorSpace, MetadataValue};
use crate::tonemap::{apply_tone_mapping, tone_mapped_linear};

/// Rejects images whose embedded chromaticities are wide-gamut and match
/// no known primary set, per spec section 4.12's pre-flight check.
fn ensure_known_gamut(image: &FloatImage) -> Result<()> {
    if let Some(MetadataValue::Chromaticities(c)) = image.metadata.get("chromaticities") {
        if c.known_space().is_none() {
            return Err(CoreError::WideColorSpaceUnsupported);
        }
    }
    Ok(())
}

/// Converts `image` to linear-Rec.709 if it isn't already, cloning only
/// when a conversion is actually needed.
fn to_rec709(image: &FloatImage) -> Result<FloatImage> {
    ensure_known_gamut(image)?;
    if image.linear_color_space == LinearColorSpace::Rec709 {
        return Ok(image.clone());
    }
    let mut converted = image.clone();
    convert_linear(&mut converted, LinearColorSpace::Rec709)?;
    Ok(converted)
}

struct Channels {
    log_ratio: Vec<[f32; 3]>,
    gain_map_min: [f32; 3],
    gain_map_max: [f32; 3],
}

fn compute_log_ratios(
    hdr: &FloatImage,
    sdr_rgba: &[u8],
    opts: &GainMapEncodingOptions,
) -> Channels {
    let n = hdr.width * hdr.height;
    let mut log_ratio = Vec::with_capacity(n);
    let mut gain_map_min = [f32::INFINITY; 3];
    let mut gain_map_max = [f32::NEG_INFINITY; 3];

    for i in 0..n {
        let hdr_px = [hdr.pixels[i * 4], hdr.pixels[i * 4 + 1], hdr.pixels[i * 4 + 2]];
        let mut lr = [0.0f32; 3];
        for c in 0..3 {
            let sdr_byte = sdr_rgba[i * 4 + c];
            let sdr_linear = srgb_eotf(sdr_byte as f32 / 255.0);
            let ratio = (hdr_px[c] + opts.offset_hdr[c]) / (sdr_linear + opts.offset_sdr[c]);
            let v = ratio.max(f32::MIN_POSITIVE).log2();
            lr[c] = v;
            gain_map_min[c] = gain_map_min[c].min(v);
            gain_map_max[c] = gain_map_max[c].max(v);
        }
        log_ratio.push(lr);
    }

    Channels {
        log_ratio,
        gain_map_min,
        gain_map_max,
    }
}

fn resolve_bounds(
    computed: &Channels,
    opts: &GainMapEncodingOptions,
    reuse_metadata: Option<&GainMapMetadata>,
) -> ([f32; 3], [f32; 3]) {
    if let Some(reuse) = reuse_metadata {
        return (reuse.gain_map_min, reuse.gain_map_max);
    }
    let min = if opts.min_content_boost != 1.0 {
        [opts.min_content_boost.log2(); 3]
    } else {
        computed.gain_map_min
    };
    let max = match opts.max_content_boost {
        Some(max_boost) => [max_boost.log2(); 3],
        None => computed.gain_map_max,
    };
    (min, max)
}

/// Quantized encoder. Produces SDR and gain-map 8-bit RGBA planes plus the
/// metadata an accompanying decoder needs.
pub fn encode_gain_map(
    image: &FloatImage,
    opts: &GainMapEncodingOptions,
    reuse_metadata: Option<&GainMapMetadata>,
) -> Result<EncodingResult> {
    let hdr = to_rec709(image)?;
    let sdr_rgba = apply_tone_mapping(&hdr, opts.tone_mapping, opts.exposure)?;

    let computed = compute_log_ratios(&hdr, &sdr_rgba, opts);
    let (gain_map_min, gain_map_max) = resolve_bounds(&computed, opts, reuse_metadata);

    let n = hdr.width * hdr.height;
    let mut gain_map_rgba = Vec::with_capacity(n * 4);
    for lr in &computed.log_ratio {
        for c in 0..3 {
            let span = gain_map_max[c] - gain_map_min[c];
            let t = if span.abs() < 1e-12 {
                0.0
            } else {
                ((lr[c] - gain_map_min[c]) / span).clamp(0.0, 1.0)
            };
            let stored = t.powf(opts.gamma[c]);
            gain_map_rgba.push((stored * 255.0).round() as u8);
        }
        gain_map_rgba.push(255);
    }

    let hdr_capacity_min = gain_map_min.iter().copied().fold(f32::INFINITY, f32::min).max(0.0);
    let hdr_capacity_max = gain_map_max.iter().copied().fold(f32::NEG_INFINITY, f32::max);

    let metadata = GainMapMetadata {
        gain_map_min,
        gain_map_max,
        gamma: opts.gamma,
        offset_sdr: opts.offset_sdr,
        offset_hdr: opts.offset_hdr,
        hdr_capacity_min,
        hdr_capacity_max,
    };

    Ok(EncodingResult {
        width: hdr.width,
        height: hdr.height,
        sdr_rgba,
        gain_map_rgba,
        metadata,
    })
}

/// Unquantized variant for round-trip testing: returns SDR-linear values
/// and unquantized `log_ratio` instead of 8-bit planes, so the decoder can
/// be exercised without 8-bit quantization noise (spec section 4.12).
pub fn encode_gain_map_float(
    image: &FloatImage,
    opts: &GainMapEncodingOptions,
    reuse_metadata: Option<&GainMapMetadata>,
) -> Result<FloatEncodingResult> {
    let hdr = to_rec709(image)?;
    let mapped = tone_mapped_linear(&hdr, opts.tone_mapping, opts.exposure)?;

    let n = hdr.width * hdr.height;
    let mut log_ratio = Vec::with_capacity(n * 3);
    let mut gain_map_min = [f32::INFINITY; 3];
    let mut gain_map_max = [f32::NEG_INFINITY; 3];
    for i in 0..n {
        for c in 0..3 {
            let hdr_v = hdr.pixels[i * 4 + c];
            let sdr_v = mapped.pixels[i * 4 + c];
            let ratio = (hdr_v + opts.offset_hdr[c]) / (sdr_v + opts.offset_sdr[c]);
            let v = ratio.max(f32::MIN_POSITIVE).log2();
            log_ratio.push(v);
            gain_map_min[c] = gain_map_min[c].min(v);
            gain_map_max[c] = gain_map_max[c].max(v);
        }
    }
    let computed = Channels {
        log_ratio: log_ratio.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect(),
        gain_map_min,
        gain_map_max,
    };
    let (gain_map_min, gain_map_max) = resolve_bounds(&computed, opts, reuse_metadata);

    let sdr_linear = mapped.pixels.chunks_exact(4).flat_map(|px| [px[0], px[1], px[2]]).collect();

    let hdr_capacity_min = gain_map_min.iter().copied().fold(f32::INFINITY, f32::min).max(0.0);
    let hdr_capacity_max = gain_map_max.iter().copied().fold(f32::NEG_INFINITY, f32::max);

    let metadata = GainMapMetadata {
        gain_map_min,
        gain_map_max,
        gamma: opts.gamma,
        offset_sdr: opts.offset_sdr,
        offset_hdr: opts.offset_hdr,
        hdr_capacity_min,
        hdr_capacity_max,
    };

    Ok(FloatEncodingResult {
        width: hdr.width,
        height: hdr.height,
        sdr_linear,
        log_ratio,
        metadata,
    })
}
