//! PXR24 codec (spec section 4.7). Per spec section 1's non-goals, writing
//! `FLOAT` channels with PXR24 is unsupported; this crate only ever writes
//! HALF channels through PXR24, so this module is scoped to the 16-bit
//! delta word OpenEXR uses for HALF samples. `internal_pxr24.c`'s 24-bit
//! (FLOAT) and 32-bit (UINT) variants are not implemented, consistent with
//! that restriction.

use crate::error::{CoreError, Result};
use crate::exr::zip::{compress_zip, decompress_zip};

/// Encodes `channels` (each a row-major `width * block_height` array of
/// half-float bit patterns) into a compressed PXR24 block.
///
/// Per channel, per scanline: delta-code against the previous sample in
/// that line (previous initialized to 0 at the start of each segment),
/// then transpose so all high bytes precede all low bytes. Concatenate
/// every (scanline, channel) segment, in that nesting order, and DEFLATE.
pub fn pxr24_compress_block(channels: &[Vec<u16>], width: usize, block_height: usize) -> Vec<u8> {
    let mut raw = Vec::with_capacity(channels.len() * width * block_height * 2);
    for ly in 0..block_height {
        for plane in channels {
            let mut segment = vec![0u8; width * 2];
            let mut prev: u16 = 0;
            for x in 0..width {
                let v = plane[ly * width + x];
                let delta = v.wrapping_sub(prev);
                prev = v;
                let be = delta.to_be_bytes();
                segment[x] = be[0];
                segment[width + x] = be[1];
            }
            raw.extend_from_slice(&segment);
        }
    }
    compress_zip(&raw)
}

/// Inverse of [`pxr24_compress_block`].
pub fn pxr24_decompress_block(
    input: &[u8],
    num_channels: usize,
    width: usize,
    block_height: usize,
) -> Result<Vec<Vec<u16>>> {
    let raw = decompress_zip(input)?;
    let segment_len = width * 2;
    let expected = segment_len * num_channels * block_height;
    if raw.len() != expected {
        return Err(CoreError::Pxr24ShortStream);
    }

    let mut channels: Vec<Vec<u16>> = vec![vec![0u16; width * block_height]; num_channels];
    let mut cursor = 0usize;
    for ly in 0..block_height {
        for plane in channels.iter_mut() {
            let segment = &raw[cursor..cursor + segment_len];
            cursor += segment_len;
            let mut prev: u16 = 0;
            for x in 0..width {
                let hi = segment[x];
                let lo = segment[width + x];
                let delta = u16::from_be_bytes([hi, lo]);
                let v = prev.wrapping_add(delta);
                prev = v;
                plane[ly * width + x] = v;
            }
        }
    }
    Ok(channels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_multi_channel_block() {
        let width = 9;
        let height = 4;
        let r: Vec<u16> = (0..width * height).map(|i| (i * 37 % 65535) as u16).collect();
        let g: Vec<u16> = (0..width * height).map(|i| (i * 91 % 65535) as u16).collect();
        let channels = vec![r.clone(), g.clone()];

        let compressed = pxr24_compress_block(&channels, width, height);
        let decoded = pxr24_decompress_block(&compressed, 2, width, height).unwrap();
        assert_eq!(decoded, channels);
    }

    #[test]
    fn single_pixel_block_round_trips() {
        let channels = vec![vec![0xBEEFu16]];
        let compressed = pxr24_compress_block(&channels, 1, 1);
        let decoded = pxr24_decompress_block(&compressed, 1, 1, 1).unwrap();
        assert_eq!(decoded, channels);
    }
}
