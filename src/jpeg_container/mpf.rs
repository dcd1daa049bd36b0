//! MPF (Multi-Picture Format, CIPA DC-007) APP2 segment assembly.
//!
//! Adapted from the teacher's `BOGUS_MPF_HEADER` (`ultra_hdr_stuff.rs`),
//! which hard-codes a fixed-looking-but-wrong two-entry directory because
//! the teacher never knew the final image offsets at encode time. Here the
//! offsets and sizes are computed from the real assembled byte layout, so
//! the directory is valid rather than a known-wrong placeholder.

const TAG_VERSION: u16 = 0xB000;
const TAG_NUMBER_OF_IMAGES: u16 = 0xB001;
const TAG_MP_ENTRY: u16 = 0xB002;
const MP_ENTRY_SIZE: u32 = 16;
const NUM_IFD_ENTRIES: u16 = 3;

fn push_u16_le(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn push_u32_le(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

/// Byte offset, measured from the TIFF endian marker, at which the MP Entry
/// array begins: the 8-byte TIFF header, the entry count, the fixed-size
/// IFD entries, and the next-IFD pointer.
fn ifd_byte_length() -> u32 {
    8 // "II", magic, offset-to-first-IFD
        + 2 // entry count
        + u32::from(NUM_IFD_ENTRIES) * 12
        + 4 // next IFD offset
}

/// Total byte length of an MPF payload (the `MPF\0` signature, TIFF
/// header, fixed three-entry IFD, and the two 16-byte MP Entries), for
/// callers that need to compute an MP Entry's `gain_map_offset` before
/// the payload itself is built.
pub const fn mpf_payload_len() -> u32 {
    4 // "MPF\0"
        + 8 // TIFF header
        + 2 // entry count
        + NUM_IFD_ENTRIES as u32 * 12
        + 4 // next IFD offset
        + MP_ENTRY_SIZE * 2
}

/// Builds an MPF APP2 payload (without the `0xFF 0xE2 len-hi len-lo`
/// marker framing) describing a two-image Ultra HDR container: the
/// primary image first, then the gain map.
///
/// `primary_size` and `gain_map_size` are each image's byte length from
/// its own SOI through its own EOI; `gain_map_offset` is the gain map
/// SOI's byte offset measured from the MPF endian marker (the convention
/// CIPA DC-007 specifies for all entries but the first).
pub fn build_mpf_segment(primary_size: u32, gain_map_size: u32, gain_map_offset: u32) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"MPF\0");

    // TIFF header: little-endian, magic 42, offset to first IFD.
    out.extend_from_slice(b"II");
    push_u16_le(&mut out, 42);
    push_u32_le(&mut out, 8);

    push_u16_le(&mut out, NUM_IFD_ENTRIES);

    push_u16_le(&mut out, TAG_VERSION);
    push_u16_le(&mut out, 7); // UNDEFINED
    push_u32_le(&mut out, 4);
    out.extend_from_slice(b"0100");

    push_u16_le(&mut out, TAG_NUMBER_OF_IMAGES);
    push_u16_le(&mut out, 4); // LONG
    push_u32_le(&mut out, 1);
    push_u32_le(&mut out, 2);

    push_u16_le(&mut out, TAG_MP_ENTRY);
    push_u16_le(&mut out, 7); // UNDEFINED
    push_u32_le(&mut out, MP_ENTRY_SIZE * 2);
    push_u32_le(&mut out, ifd_byte_length());

    push_u32_le(&mut out, 0); // next IFD offset (none)

    debug_assert_eq!(out.len() as u32, 4 + ifd_byte_length());

    // MP Entry 1: primary image, representative + baseline flags, offset 0.
    push_u32_le(&mut out, 0x0003_0000);
    push_u32_le(&mut out, primary_size);
    push_u32_le(&mut out, 0);
    push_u16_le(&mut out, 0);
    push_u16_le(&mut out, 0);

    // MP Entry 2: the gain map, no special attributes.
    push_u32_le(&mut out, 0);
    push_u32_le(&mut out, gain_map_size);
    push_u32_le(&mut out, gain_map_offset);
    push_u16_le(&mut out, 0);
    push_u16_le(&mut out, 0);

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_starts_with_mpf_magic_and_tiff_header() {
        let seg = build_mpf_segment(1000, 500, 1000);
        assert_eq!(&seg[0..4], b"MPF\0");
        assert_eq!(&seg[4..6], b"II");
        assert_eq!(u16::from_le_bytes([seg[6], seg[7]]), 42);
    }

    #[test]
    fn payload_len_matches_actual_segment_size() {
        let seg = build_mpf_segment(1000, 500, 1000);
        assert_eq!(seg.len() as u32, mpf_payload_len());
    }

    #[test]
    fn entry_offset_points_past_the_fixed_ifd_header() {
        let seg = build_mpf_segment(1000, 500, 1000);
        let mp_entry_offset_field = u32::from_le_bytes([seg[34], seg[35], seg[36], seg[37]]);
        assert_eq!(mp_entry_offset_field, ifd_byte_length());
        // the MP Entry array itself starts right after the fixed IFD header.
        let entries_start = 4 + ifd_byte_length() as usize;
        assert_eq!(seg.len(), entries_start + 2 * MP_ENTRY_SIZE as usize);
    }

    #[test]
    fn encodes_declared_sizes_in_mp_entries() {
        let seg = build_mpf_segment(12345, 6789, 54321);
        let entries_start = 4 + ifd_byte_length() as usize;
        let entry1_size = u32::from_le_bytes([
            seg[entries_start + 4],
            seg[entries_start + 5],
            seg[entries_start + 6],
            seg[entries_start + 7],
        ]);
        assert_eq!(entry1_size, 12345);

        let entry2_offset = u32::from_le_bytes([
            seg[entries_start + MP_ENTRY_SIZE as usize + 8],
            seg[entries_start + MP_ENTRY_SIZE as usize + 9],
            seg[entries_start + MP_ENTRY_SIZE as usize + 10],
            seg[entries_start + MP_ENTRY_SIZE as usize + 11],
        ]);
        assert_eq!(entry2_offset, 54321);
    }
}
