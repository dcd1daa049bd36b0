//! Error taxonomy for the HDR core, per spec section 7.
//!
//! Every fallible public function returns `Result<T, CoreError>`. Format
//! errors carry the byte offset at which the violation was detected when
//! one is known; codec and semantics errors do not have a meaningful offset.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    // ----- Format errors -----
    #[error("bad magic number at offset {offset}")]
    BadMagic { offset: usize },
    #[error("unsupported file kind (tiled, deep, or multi-part EXR)")]
    UnsupportedFileKind,
    #[error("missing required attribute `{name}`")]
    MissingRequiredAttribute { name: &'static str },
    #[error("unsupported compression id {id}")]
    UnsupportedCompression { id: i32 },
    #[error("XYZ pixel format is not supported")]
    XyzUnsupported,
    #[error("unsupported resolution line orientation")]
    UnsupportedResolutionFormat,
    #[error("channel list attribute truncated at offset {offset}")]
    ChlistTruncated { offset: usize },

    // ----- Codec errors -----
    #[error("RLE literal run truncated")]
    TruncatedLiteralRun,
    #[error("RLE repeat run truncated")]
    TruncatedRepeatRun,
    #[error("RLE decoded size mismatch: expected {expected}, got {actual}")]
    RleSizeMismatch { expected: usize, actual: usize },
    #[error("PIZ bitmap index out of range")]
    PizBitmapOutOfRange,
    #[error("Huffman encoded table size out of range")]
    HufEncsizeOutOfRange,
    #[error("Huffman bitstream exhausted before decode completed")]
    HufNotEnoughBits,
    #[error("DEFLATE stream could not be inflated: {0}")]
    InflateFailed(String),
    #[error("PXR24 stream shorter than declared")]
    Pxr24ShortStream,

    // ----- Semantics errors -----
    #[error("dimension mismatch: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },
    #[error("unsupported combination of pixel type and compression: {0}")]
    UnsupportedInputFormat(String),
    #[error("wide color space cannot be reconciled with a known primary set")]
    WideColorSpaceUnsupported,
    #[error("both an embedded and an externally supplied EXIF segment were provided")]
    DuplicateExif,

    // ----- Container structural errors (JPEG gain-map, not in the taxonomy's four buckets but format-shaped) -----
    #[error("malformed JPEG container: {0}")]
    MalformedContainer(String),
    #[error("gain map metadata missing or malformed: {0}")]
    MalformedMetadata(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
