//! ZIP/ZIPS codec (spec section 4.5): OpenEXR-dialect DEFLATE wrapping via
//! the external `flate2` collaborator.

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

use crate::error::{CoreError, Result};
use crate::exr::dsp::{predictor_decode, predictor_encode, reorder_decode, reorder_encode};

/// `compress_zip(raw) = deflate(raw, level=4)`.
pub fn compress_zip(raw: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(4));
    encoder.write_all(raw).expect("writing to an in-memory encoder cannot fail");
    encoder.finish().expect("finishing an in-memory encoder cannot fail")
}

/// `decompress_zip(buf) = inflate(buf)`.
pub fn decompress_zip(buf: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(buf);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| CoreError::InflateFailed(e.to_string()))?;
    Ok(out)
}

/// Block variant: `reorder_encode -> predictor_encode -> deflate`.
pub fn compress_zip_block(interleaved: &[u8]) -> Vec<u8> {
    let mut reordered = vec![0u8; interleaved.len()];
    reorder_encode(&mut reordered, interleaved);
    predictor_encode(&mut reordered);
    compress_zip(&reordered)
}

/// Inverse of [`compress_zip_block`].
pub fn decompress_zip_block(input: &[u8], raw_len: usize) -> Result<Vec<u8>> {
    let mut reordered = decompress_zip(input)?;
    if reordered.len() != raw_len {
        return Err(CoreError::RleSizeMismatch {
            expected: raw_len,
            actual: reordered.len(),
        });
    }
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
        let original: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        let compressed = compress_zip(&original);
        let decoded = decompress_zip(&compressed).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn block_round_trips() {
        let original: Vec<u8> = (0..513u32).map(|i| ((i * 7) % 255) as u8).collect();
        let compressed = compress_zip_block(&original);
        let decoded = decompress_zip_block(&compressed, original.len()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn decompress_rejects_garbage() {
        let garbage = [0xDEu8, 0xAD, 0xBE, 0xEF];
        assert!(decompress_zip(&garbage).is_err());
    }
}
