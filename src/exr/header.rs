//! OpenEXR single-part scanline header: magic/version, attribute table,
//! channel list, and offset table (spec sections 4.1, 4.8, 4.9).

use std::collections::HashMap;
use std::convert::TryInto;

use crate::color::chroma::{CIExy, Chromaticities};
use crate::error::{CoreError, Result};
use crate::image::{Metadata, MetadataValue};

pub const MAGIC: u32 = 0x0131_2F76;

const VERSION_MASK: u32 = 0xFF;
const FLAG_TILED: u32 = 0x200;
const FLAG_LONG_NAMES: u32 = 0x400;
const FLAG_NON_IMAGE_OR_DEEP: u32 = 0x800;
const FLAG_MULTI_PART: u32 = 0x1000;

/// One channel record from the `channels` attribute's `chlist` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDesc {
    pub name: String,
    /// 0 = UINT, 1 = HALF, 2 = FLOAT.
    pub pixel_type: i32,
    pub p_linear: u8,
    pub x_sampling: i32,
    pub y_sampling: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Rle,
    Zips,
    Zip,
    Piz,
    Pxr24,
}

impl Compression {
    pub fn from_id(id: u8) -> Result<Self> {
        match id {
            0 => Ok(Compression::None),
            1 => Ok(Compression::Rle),
            2 => Ok(Compression::Zips),
            3 => Ok(Compression::Zip),
            4 => Ok(Compression::Piz),
            5 => Ok(Compression::Pxr24),
            other => Err(CoreError::UnsupportedCompression { id: other as i32 }),
        }
    }

    pub fn to_id(self) -> u8 {
        match self {
            Compression::None => 0,
            Compression::Rle => 1,
            Compression::Zips => 2,
            Compression::Zip => 3,
            Compression::Piz => 4,
            Compression::Pxr24 => 5,
        }
    }

    /// Scanlines per block: 1 for ZIPS, 16 for ZIP/PXR24, 32 for PIZ, else 1.
    pub fn block_height(self) -> usize {
        match self {
            Compression::None | Compression::Rle | Compression::Zips => 1,
            Compression::Zip | Compression::Pxr24 => 16,
            Compression::Piz => 32,
        }
    }
}

/// A parsed single-part scanline header.
#[derive(Debug, Clone)]
pub struct Header {
    pub width: usize,
    pub height: usize,
    pub compression: Compression,
    pub channels: Vec<ChannelDesc>,
    pub line_order_increasing: bool,
    pub metadata: Metadata,
}

/// Verifies the magic number and version flags, rejecting tiled, deep, and
/// multi-part files (spec section 1's non-goals).
pub fn parse_magic_and_version(buf: &[u8]) -> Result<usize> {
    if buf.len() < 8 {
        return Err(CoreError::BadMagic { offset: 0 });
    }
    let magic = u32::from_le_bytes(buf[0..4].try_into().unwrap());
    if magic != MAGIC {
        return Err(CoreError::BadMagic { offset: 0 });
    }
    let version_word = u32::from_le_bytes(buf[4..8].try_into().unwrap());
    let version = version_word & VERSION_MASK;
    if version != 2 {
        return Err(CoreError::UnsupportedFileKind);
    }
    let flags = version_word & !VERSION_MASK;
    if flags & (FLAG_TILED | FLAG_NON_IMAGE_OR_DEEP | FLAG_MULTI_PART) != 0 {
        return Err(CoreError::UnsupportedFileKind);
    }
    let _long_names = flags & FLAG_LONG_NAMES != 0;
    Ok(8)
}

fn read_cstr(buf: &[u8], pos: &mut usize) -> Result<String> {
    let start = *pos;
    let end = buf[start..]
        .iter()
        .position(|&b| b == 0)
        .ok_or(CoreError::ChlistTruncated { offset: start })?;
    let s = String::from_utf8_lossy(&buf[start..start + end]).into_owned();
    *pos = start + end + 1;
    Ok(s)
}

fn read_i32(buf: &[u8], pos: &mut usize) -> Result<i32> {
    if *pos + 4 > buf.len() {
        return Err(CoreError::ChlistTruncated { offset: *pos });
    }
    let v = i32::from_le_bytes(buf[*pos..*pos + 4].try_into().unwrap());
    *pos += 4;
    Ok(v)
}

fn read_f32(buf: &[u8], pos: &mut usize) -> Result<f32> {
    if *pos + 4 > buf.len() {
        return Err(CoreError::ChlistTruncated { offset: *pos });
    }
    let v = f32::from_le_bytes(buf[*pos..*pos + 4].try_into().unwrap());
    *pos += 4;
    Ok(v)
}

fn parse_chlist(bytes: &[u8]) -> Result<Vec<ChannelDesc>> {
    let mut pos = 0;
    let mut channels = Vec::new();
    while pos < bytes.len() {
        if bytes[pos] == 0 {
            break;
        }
        let name = read_cstr(bytes, &mut pos)?;
        let pixel_type = read_i32(bytes, &mut pos)?;
        if pos >= bytes.len() {
            return Err(CoreError::ChlistTruncated { offset: pos });
        }
        let p_linear = bytes[pos];
        pos += 1;
        pos += 3; // reserved
        let x_sampling = read_i32(bytes, &mut pos)?;
        let y_sampling = read_i32(bytes, &mut pos)?;
        channels.push(ChannelDesc {
            name,
            pixel_type,
            p_linear,
            x_sampling,
            y_sampling,
        });
    }
    Ok(channels)
}

fn write_chlist(channels: &[ChannelDesc]) -> Vec<u8> {
    let mut out = Vec::new();
    for c in channels {
        out.extend_from_slice(c.name.as_bytes());
        out.push(0);
        out.extend_from_slice(&c.pixel_type.to_le_bytes());
        out.push(c.p_linear);
        out.extend_from_slice(&[0u8; 3]);
        out.extend_from_slice(&c.x_sampling.to_le_bytes());
        out.extend_from_slice(&c.y_sampling.to_le_bytes());
    }
    out.push(0);
    out
}

fn parse_chromaticities(bytes: &[u8]) -> Result<Chromaticities> {
    if bytes.len() < 32 {
        return Err(CoreError::ChlistTruncated { offset: 0 });
    }
    let f = |i: usize| f32::from_le_bytes(bytes[i * 4..i * 4 + 4].try_into().unwrap());
    Ok(Chromaticities {
        red: CIExy { x: f(0), y: f(1) },
        green: CIExy { x: f(2), y: f(3) },
        blue: CIExy { x: f(4), y: f(5) },
        white: CIExy { x: f(6), y: f(7) },
    })
}

fn write_chromaticities(c: &Chromaticities) -> Vec<u8> {
    let mut out = Vec::with_capacity(32);
    for v in [
        c.red.x, c.red.y, c.green.x, c.green.y, c.blue.x, c.blue.y, c.white.x, c.white.y,
    ] {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// Parses the attribute table that follows the magic/version, stopping at
/// the single `\0` terminator byte. Returns the new cursor position.
pub fn parse_attributes(buf: &[u8], mut pos: usize) -> Result<(HashMap<String, (String, Vec<u8>)>, usize)> {
    let mut raw_attrs = HashMap::new();
    loop {
        if pos >= buf.len() {
            return Err(CoreError::ChlistTruncated { offset: pos });
        }
        if buf[pos] == 0 {
            pos += 1;
            break;
        }
        let name = read_cstr(buf, &mut pos)?;
        let type_name = read_cstr(buf, &mut pos)?;
        let size = read_i32(buf, &mut pos)? as usize;
        if pos + size > buf.len() {
            return Err(CoreError::ChlistTruncated { offset: pos });
        }
        let value = buf[pos..pos + size].to_vec();
        pos += size;
        raw_attrs.insert(name, (type_name, value));
    }
    Ok((raw_attrs, pos))
}

/// Writes the attribute table in the canonical order this crate always
/// produces: `channels`, `compression`, `dataWindow`, `displayWindow`,
/// `lineOrder`, `pixelAspectRatio`, `screenWindowCenter`,
/// `screenWindowWidth`, then any remaining (chromaticities and
/// passthrough) attributes in sorted-name order, terminated by `\0`.
pub fn write_attributes(header: &Header) -> Vec<u8> {
    let mut out = Vec::new();
    let mut push_attr = |out: &mut Vec<u8>, name: &str, type_name: &str, value: &[u8]| {
        out.extend_from_slice(name.as_bytes());
        out.push(0);
        out.extend_from_slice(type_name.as_bytes());
        out.push(0);
        out.extend_from_slice(&(value.len() as i32).to_le_bytes());
        out.extend_from_slice(value);
    };

    push_attr(&mut out, "channels", "chlist", &write_chlist(&header.channels));
    push_attr(&mut out, "compression", "compression", &[header.compression.to_id()]);

    let data_window = {
        let mut v = Vec::with_capacity(16);
        v.extend_from_slice(&0i32.to_le_bytes());
        v.extend_from_slice(&0i32.to_le_bytes());
        v.extend_from_slice(&((header.width as i32) - 1).to_le_bytes());
        v.extend_from_slice(&((header.height as i32) - 1).to_le_bytes());
        v
    };
    push_attr(&mut out, "dataWindow", "box2i", &data_window);
    push_attr(&mut out, "displayWindow", "box2i", &data_window);
    push_attr(&mut out, "lineOrder", "lineOrder", &[if header.line_order_increasing { 0 } else { 1 }]);
    push_attr(&mut out, "pixelAspectRatio", "float", &1.0f32.to_le_bytes());
    push_attr(&mut out, "screenWindowCenter", "v2f", &{
        let mut v = Vec::with_capacity(8);
        v.extend_from_slice(&0.0f32.to_le_bytes());
        v.extend_from_slice(&0.0f32.to_le_bytes());
        v
    });
    push_attr(&mut out, "screenWindowWidth", "float", &1.0f32.to_le_bytes());

    let mut extra: Vec<(&String, &MetadataValue)> = header.metadata.iter().collect();
    extra.sort_by_key(|(name, _)| name.as_str());
    for (name, value) in extra {
        match value {
            MetadataValue::Int(v) => push_attr(&mut out, name, "int", &v.to_le_bytes()),
            MetadataValue::Float(v) => push_attr(&mut out, name, "float", &v.to_le_bytes()),
            MetadataValue::String(v) => push_attr(&mut out, name, "string", v.as_bytes()),
            MetadataValue::FloatTriple(v) => {
                let mut bytes = Vec::with_capacity(12);
                for c in v {
                    bytes.extend_from_slice(&c.to_le_bytes());
                }
                push_attr(&mut out, name, "v3f", &bytes);
            }
            MetadataValue::Chromaticities(c) => {
                push_attr(&mut out, name, "chromaticities", &write_chromaticities(c));
            }
            MetadataValue::RawBytes(type_name, bytes) => {
                push_attr(&mut out, name, type_name, bytes);
            }
        }
    }
    out.push(0);
    out
}

/// Decodes the raw attribute map into a [`Header`], validating the
/// required attributes spec section 4.8 names.
pub fn header_from_raw_attributes(raw: &HashMap<String, (String, Vec<u8>)>) -> Result<Header> {
    let (chlist_type, chlist_bytes) = raw
        .get("channels")
        .ok_or(CoreError::MissingRequiredAttribute { name: "channels" })?;
    if chlist_type != "chlist" {
        return Err(CoreError::MissingRequiredAttribute { name: "channels" });
    }
    let channels = parse_chlist(chlist_bytes)?;

    let (_, compression_bytes) = raw
        .get("compression")
        .ok_or(CoreError::MissingRequiredAttribute { name: "compression" })?;
    let compression = Compression::from_id(
        *compression_bytes
            .first()
            .ok_or(CoreError::MissingRequiredAttribute { name: "compression" })?,
    )?;

    let (_, data_window_bytes) = raw
        .get("dataWindow")
        .ok_or(CoreError::MissingRequiredAttribute { name: "dataWindow" })?;
    if data_window_bytes.len() < 16 {
        return Err(CoreError::MissingRequiredAttribute { name: "dataWindow" });
    }
    let x_min = i32::from_le_bytes(data_window_bytes[0..4].try_into().unwrap());
    let y_min = i32::from_le_bytes(data_window_bytes[4..8].try_into().unwrap());
    let x_max = i32::from_le_bytes(data_window_bytes[8..12].try_into().unwrap());
    let y_max = i32::from_le_bytes(data_window_bytes[12..16].try_into().unwrap());
    let width = (x_max - x_min + 1).max(0) as usize;
    let height = (y_max - y_min + 1).max(0) as usize;

    let line_order_increasing = match raw.get("lineOrder") {
        Some((_, bytes)) => bytes.first().copied().unwrap_or(0) == 0,
        None => true,
    };

    let mut metadata = Metadata::new();
    for (name, (type_name, bytes)) in raw.iter() {
        match name.as_str() {
            "channels" | "compression" | "dataWindow" | "displayWindow" | "lineOrder"
            | "pixelAspectRatio" | "screenWindowCenter" | "screenWindowWidth" => continue,
            _ => {}
        }
        let value = match type_name.as_str() {
            "int" if bytes.len() == 4 => {
                MetadataValue::Int(i32::from_le_bytes(bytes[..4].try_into().unwrap()))
            }
            "float" if bytes.len() == 4 => {
                MetadataValue::Float(f32::from_le_bytes(bytes[..4].try_into().unwrap()))
            }
            "string" => MetadataValue::String(String::from_utf8_lossy(bytes).into_owned()),
            "v3f" if bytes.len() == 12 => {
                let mut pos = 0usize;
                let mut v = [0.0f32; 3];
                for slot in v.iter_mut() {
                    *slot = read_f32(bytes, &mut pos)?;
                }
                MetadataValue::FloatTriple(v)
            }
            "chromaticities" => MetadataValue::Chromaticities(parse_chromaticities(bytes)?),
            _ => MetadataValue::RawBytes(type_name.clone(), bytes.clone()),
        };
        metadata.insert(name.clone(), value);
    }

    Ok(Header {
        width,
        height,
        compression,
        channels,
        line_order_increasing,
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> Header {
        Header {
            width: 4,
            height: 3,
            compression: Compression::Zip,
            channels: vec![
                ChannelDesc { name: "R".into(), pixel_type: 1, p_linear: 0, x_sampling: 1, y_sampling: 1 },
                ChannelDesc { name: "G".into(), pixel_type: 1, p_linear: 0, x_sampling: 1, y_sampling: 1 },
                ChannelDesc { name: "B".into(), pixel_type: 1, p_linear: 0, x_sampling: 1, y_sampling: 1 },
            ],
            line_order_increasing: true,
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn magic_and_version_round_trip() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&MAGIC.to_le_bytes());
        buf.extend_from_slice(&2u32.to_le_bytes());
        assert_eq!(parse_magic_and_version(&buf).unwrap(), 8);
    }

    #[test]
    fn rejects_tiled_flag() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&MAGIC.to_le_bytes());
        buf.extend_from_slice(&(2u32 | FLAG_TILED).to_le_bytes());
        assert!(matches!(parse_magic_and_version(&buf), Err(CoreError::UnsupportedFileKind)));
    }

    #[test]
    fn rejects_bad_magic() {
        let buf = [0u8; 8];
        assert!(matches!(parse_magic_and_version(&buf), Err(CoreError::BadMagic { .. })));
    }

    #[test]
    fn attribute_table_round_trips() {
        let header = sample_header();
        let bytes = write_attributes(&header);
        let (raw, pos) = parse_attributes(&bytes, 0).unwrap();
        assert_eq!(pos, bytes.len());
        let parsed = header_from_raw_attributes(&raw).unwrap();
        assert_eq!(parsed.width, header.width);
        assert_eq!(parsed.height, header.height);
        assert_eq!(parsed.compression, header.compression);
        assert_eq!(parsed.channels, header.channels);
    }

    #[test]
    fn missing_channels_attribute_errors() {
        let raw = HashMap::new();
        assert!(matches!(
            header_from_raw_attributes(&raw),
            Err(CoreError::MissingRequiredAttribute { name: "channels" })
        ));
    }

    #[test]
    fn unsupported_compression_id_errors() {
        assert!(matches!(
            Compression::from_id(200),
            Err(CoreError::UnsupportedCompression { id: 200 })
        ));
    }
}
