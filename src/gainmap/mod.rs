//! Adobe/Ultra HDR gain-map encoding and decoding (spec sections 4.12,
//! 4.13).

pub mod decode;
pub mod encode;

pub use decode::decode_gain_map;
pub use encode::{encode_gain_map, encode_gain_map_float};

use crate::tonemap::ToneMapper;

/// Per-channel gain-map parameters, carried in `hdrgm` XMP as either a
/// scalar (broadcast to all three channels) or an `rdf:Seq` triple.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainMapMetadata {
    pub gain_map_min: [f32; 3],
    pub gain_map_max: [f32; 3],
    pub gamma: [f32; 3],
    pub offset_sdr: [f32; 3],
    pub offset_hdr: [f32; 3],
    pub hdr_capacity_min: f32,
    pub hdr_capacity_max: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainMapEncodingOptions {
    pub max_content_boost: Option<f32>,
    pub min_content_boost: f32,
    pub offset_sdr: [f32; 3],
    pub offset_hdr: [f32; 3],
    pub gamma: [f32; 3],
    pub exposure: f32,
    pub tone_mapping: ToneMapper,
}

impl Default for GainMapEncodingOptions {
    fn default() -> Self {
        const DEFAULT_OFFSET: f32 = 1.0 / 64.0;
        Self {
            max_content_boost: None,
            min_content_boost: 1.0,
            offset_sdr: [DEFAULT_OFFSET; 3],
            offset_hdr: [DEFAULT_OFFSET; 3],
            gamma: [1.0; 3],
            exposure: 1.0,
            tone_mapping: ToneMapper::Aces,
        }
    }
}

/// Output of [`encode_gain_map`]: quantized SDR base image, quantized
/// gain map, and the metadata needed to invert it.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodingResult {
    pub width: usize,
    pub height: usize,
    pub sdr_rgba: Vec<u8>,
    pub gain_map_rgba: Vec<u8>,
    pub metadata: GainMapMetadata,
}

/// Float-only encoding result for round-trip testing without 8-bit
/// quantization noise (spec section 4.12's "float-only variant").
#[derive(Debug, Clone, PartialEq)]
pub struct FloatEncodingResult {
    pub width: usize,
    pub height: usize,
    pub sdr_linear: Vec<f32>,
    pub log_ratio: Vec<f32>,
    pub metadata: GainMapMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_match_spec() {
        let opts = GainMapEncodingOptions::default();
        assert_eq!(opts.min_content_boost, 1.0);
        assert_eq!(opts.gamma, [1.0; 3]);
        assert_eq!(opts.exposure, 1.0);
        assert!((opts.offset_sdr[0] - 1.0 / 64.0).abs() < 1e-6);
    }
}
