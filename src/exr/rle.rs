//! OpenEXR-dialect byte RLE (spec section 4.4) plus the DSP-wrapped block
//! codec used by scanline compression `RLE`.

use crate::error::{CoreError, Result};
use crate::exr::dsp::{predictor_decode, predictor_encode, reorder_decode, reorder_encode};

const MAX_RUN: usize = 128;
const MAX_LITERAL: usize = 127;

/// Encodes `raw` into the shortest valid sequence of signed-i8 run headers,
/// capping runs at 128 repeats and 127 literal bytes per header.
pub fn rle_encode(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        // Measure a run of identical bytes starting at i.
        let mut run_len = 1;
        while run_len < MAX_RUN && i + run_len < raw.len() && raw[i + run_len] == raw[i] {
            run_len += 1;
        }
        if run_len >= 3 {
            out.push((run_len - 1) as i8 as u8);
            out.push(raw[i]);
            i += run_len;
            continue;
        }
        // Otherwise accumulate a literal run until we hit a run of >=3
        // identical bytes or run out of input / header capacity.
        let lit_start = i;
        let mut lit_len = 0usize;
        while i < raw.len() && lit_len < MAX_LITERAL {
            let mut next_run = 1;
            while next_run < MAX_RUN && i + next_run < raw.len() && raw[i + next_run] == raw[i] {
                next_run += 1;
            }
            if next_run >= 3 {
                break;
            }
            i += 1;
            lit_len += 1;
        }
        out.push((-(lit_len as i32)) as i8 as u8);
        out.extend_from_slice(&raw[lit_start..lit_start + lit_len]);
    }
    out
}

/// Decodes an RLE stream to exactly `expected_len` bytes.
pub fn rle_decode(input: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(expected_len);
    let mut i = 0;
    while i < input.len() {
        let header = input[i] as i8;
        i += 1;
        if header < 0 {
            let count = (-(header as i32)) as usize;
            if i + count > input.len() {
                return Err(CoreError::TruncatedLiteralRun);
            }
            out.extend_from_slice(&input[i..i + count]);
            i += count;
        } else {
            let count = header as usize + 1;
            if i >= input.len() {
                return Err(CoreError::TruncatedRepeatRun);
            }
            let byte = input[i];
            i += 1;
            out.extend(std::iter::repeat(byte).take(count));
        }
    }
    if out.len() != expected_len {
        return Err(CoreError::RleSizeMismatch {
            expected: expected_len,
            actual: out.len(),
        });
    }
    Ok(out)
}

/// `compress_rle_block` = `reorder_encode -> predictor_encode -> rle_encode`.
pub fn compress_rle_block(interleaved: &[u8]) -> Vec<u8> {
    let mut reordered = vec![0u8; interleaved.len()];
    reorder_encode(&mut reordered, interleaved);
    predictor_encode(&mut reordered);
    rle_encode(&reordered)
}

/// `decompress_rle_block` is the inverse in reverse order.
pub fn decompress_rle_block(input: &[u8], raw_len: usize) -> Result<Vec<u8>> {
    let mut reordered = rle_decode(input, raw_len)?;
    predictor_decode(&mut reordered);
    let mut interleaved = vec![0u8; raw_len];
    reorder_decode(&mut interleaved, &reordered);
    Ok(interleaved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_arbitrary_bytes() {
        let original = [0x01u8, 0x02, 0xFF, 0xFF];
        let compressed = rle_encode(&original);
        let decoded = rle_decode(&compressed, original.len()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn decode_accepts_alternative_header_layout() {
        // -2 literal(0x01,0x02), then repeat 0xFF twice (header 1).
        let alt = [0xFEu8, 0x01, 0x02, 0x01, 0xFF];
        let decoded = rle_decode(&alt, 4).unwrap();
        assert_eq!(decoded, [0x01, 0x02, 0xFF, 0xFF]);
    }

    #[test]
    fn decode_detects_truncation() {
        assert!(matches!(
            rle_decode(&[0xFEu8, 0x01], 4),
            Err(CoreError::TruncatedLiteralRun)
        ));
        assert!(matches!(
            rle_decode(&[0x05u8], 4),
            Err(CoreError::TruncatedRepeatRun)
        ));
    }

    #[test]
    fn decode_detects_size_mismatch() {
        assert!(matches!(
            rle_decode(&[0x00u8, 0x07], 4),
            Err(CoreError::RleSizeMismatch { .. })
        ));
    }

    #[test]
    fn block_round_trips_random_bytes() {
        let original: Vec<u8> = (0..257u32).map(|i| (i * 91 + 17) as u8).collect();
        let compressed = compress_rle_block(&original);
        let decoded = decompress_rle_block(&compressed, original.len()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn encode_caps_repeat_runs_at_128() {
        let original = vec![7u8; 300];
        let compressed = rle_encode(&original);
        let decoded = rle_decode(&compressed, original.len()).unwrap();
        assert_eq!(decoded, original);
        // Every repeat header must encode at most 128 repeats.
        let mut i = 0;
        while i < compressed.len() {
            let header = compressed[i] as i8;
            i += 1;
            if header >= 0 {
                assert!(header as usize + 1 <= 128);
                i += 1;
            } else {
                i += (-(header as i32)) as usize;
            }
        }
    }
}
