//! Single-part scanline OpenEXR reader/writer (spec sections 4.1-4.9),
//! orchestrating the header, codec, and DSP submodules into the public
//! `read_exr`/`write_exr` API.

pub mod dsp;
pub mod header;
pub mod huffman;
pub mod piz;
pub mod pxr24;
pub mod rle;
pub mod wavelet;
pub mod zip;

use std::convert::TryInto;

pub use header::Compression;
use header::{ChannelDesc, Header};

use crate::color::chroma::chromaticities_for;
use crate::error::{CoreError, Result};
use crate::half::{decode_half, encode_half};
use crate::image::{FloatImage, LinearColorSpace, MetadataValue};

const RGBA_ORDER: [&str; 4] = ["A", "B", "G", "R"];

fn sample_byte_width(pixel_type: i32) -> usize {
    match pixel_type {
        1 => 2,
        _ => 4,
    }
}

fn sample_to_f32(bytes: &[u8], pixel_type: i32) -> f32 {
    match pixel_type {
        0 => u32::from_le_bytes(bytes.try_into().unwrap()) as f32,
        1 => decode_half(u16::from_le_bytes(bytes.try_into().unwrap())),
        _ => f32::from_le_bytes(bytes.try_into().unwrap()),
    }
}

fn raw_channel_bytes(channels: &[ChannelDesc], width: usize, block_height: usize) -> usize {
    channels.iter().map(|c| sample_byte_width(c.pixel_type) * width * block_height).sum()
}

/// Splits a channel-major raw block buffer (each channel's full
/// `block_height * width` row-major samples, concatenated in `channels`
/// order) into one byte slice per channel.
fn split_channel_major<'a>(raw: &'a [u8], channels: &[ChannelDesc], width: usize, block_height: usize) -> Vec<&'a [u8]> {
    let mut out = Vec::with_capacity(channels.len());
    let mut cursor = 0usize;
    for c in channels {
        let len = sample_byte_width(c.pixel_type) * width * block_height;
        out.push(&raw[cursor..cursor + len]);
        cursor += len;
    }
    out
}

/// NO_COMPRESSION's wire layout (spec section 4.9): pixel-interleaved,
/// row-major — for each pixel, each channel's sample in chlist order —
/// rather than the channel-planar layout every other compression uses.
/// Splits that layout back into one byte plane per channel.
fn deinterleave_pixels(
    payload: &[u8],
    channels: &[ChannelDesc],
    width: usize,
    block_height: usize,
) -> Result<Vec<Vec<u8>>> {
    let pixel_stride: usize = channels.iter().map(|c| sample_byte_width(c.pixel_type)).sum();
    let expected = pixel_stride * width * block_height;
    if payload.len() != expected {
        return Err(CoreError::DimensionMismatch {
            expected: (expected, 0),
            actual: (payload.len(), 0),
        });
    }
    let mut planes: Vec<Vec<u8>> = channels
        .iter()
        .map(|c| Vec::with_capacity(sample_byte_width(c.pixel_type) * width * block_height))
        .collect();
    let mut cursor = 0usize;
    for _ in 0..(width * block_height) {
        for (ci, c) in channels.iter().enumerate() {
            let sw = sample_byte_width(c.pixel_type);
            planes[ci].extend_from_slice(&payload[cursor..cursor + sw]);
            cursor += sw;
        }
    }
    Ok(planes)
}

/// Inverse of [`deinterleave_pixels`], over FLOAT (`f32`) channel planes.
fn interleave_pixels_f32(channel_planes: &[Vec<f32>], width: usize, block_height: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(channel_planes.len() * width * block_height * 4);
    for i in 0..(width * block_height) {
        for plane in channel_planes {
            out.extend_from_slice(&plane[i].to_le_bytes());
        }
    }
    out
}

fn decompress_block(
    compression: Compression,
    payload: &[u8],
    channels: &[ChannelDesc],
    width: usize,
    block_height: usize,
) -> Result<Vec<Vec<u8>>> {
    match compression {
        Compression::None => deinterleave_pixels(payload, channels, width, block_height),
        Compression::Rle => {
            let expected = raw_channel_bytes(channels, width, block_height);
            let raw = rle::decompress_rle_block(payload, expected)?;
            Ok(split_channel_major(&raw, channels, width, block_height)
                .into_iter()
                .map(|s| s.to_vec())
                .collect())
        }
        Compression::Zip | Compression::Zips => {
            let expected = raw_channel_bytes(channels, width, block_height);
            let raw = zip::decompress_zip_block(payload, expected)?;
            Ok(split_channel_major(&raw, channels, width, block_height)
                .into_iter()
                .map(|s| s.to_vec())
                .collect())
        }
        Compression::Pxr24 => {
            require_all_half(channels)?;
            let planes = pxr24::pxr24_decompress_block(payload, channels.len(), width, block_height)?;
            Ok(planes.into_iter().map(u16_plane_to_le_bytes).collect())
        }
        Compression::Piz => {
            require_all_half(channels)?;
            let planes = piz::piz_decompress_block(payload, channels.len(), width, block_height)?;
            Ok(planes.into_iter().map(u16_plane_to_le_bytes).collect())
        }
    }
}

fn require_all_half(channels: &[ChannelDesc]) -> Result<()> {
    if channels.iter().all(|c| c.pixel_type == 1) {
        Ok(())
    } else {
        Err(CoreError::UnsupportedInputFormat(
            "PIZ and PXR24 are only supported for HALF channels".to_string(),
        ))
    }
}

fn u16_plane_to_le_bytes(plane: Vec<u16>) -> Vec<u8> {
    let mut out = Vec::with_capacity(plane.len() * 2);
    for v in plane {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// Reads a single-part scanline OpenEXR image into a [`FloatImage`].
pub fn read_exr(buf: &[u8]) -> Result<FloatImage> {
    let mut pos = header::parse_magic_and_version(buf)?;
    let (raw_attrs, attrs_end) = header::parse_attributes(buf, pos)?;
    pos = attrs_end;
    let header = header::header_from_raw_attributes(&raw_attrs)?;

    for c in &header.channels {
        if !RGBA_ORDER.contains(&c.name.as_str()) {
            return Err(CoreError::UnsupportedInputFormat(format!(
                "non-RGBA channel `{}` is not supported",
                c.name
            )));
        }
    }
    let has_r = header.channels.iter().any(|c| c.name == "R");
    let has_g = header.channels.iter().any(|c| c.name == "G");
    let has_b = header.channels.iter().any(|c| c.name == "B");
    if !(has_r && has_g && has_b) {
        return Err(CoreError::UnsupportedInputFormat("missing R, G, or B channel".to_string()));
    }

    let block_height = header.compression.block_height();
    let num_blocks = header.height.div_ceil(block_height).max(1);
    let offsets_len = num_blocks * 8;
    if pos + offsets_len > buf.len() {
        return Err(CoreError::ChlistTruncated { offset: pos });
    }
    let mut offsets = Vec::with_capacity(num_blocks);
    for i in 0..num_blocks {
        let start = pos + i * 8;
        offsets.push(i64::from_le_bytes(buf[start..start + 8].try_into().unwrap()));
    }

    let color_space = chromaticities_color_space(&header);
    let mut image = FloatImage::new(header.width, header.height, color_space);

    for &offset in &offsets {
        if offset < 0 || offset as usize + 8 > buf.len() {
            return Err(CoreError::ChlistTruncated { offset: offset.max(0) as usize });
        }
        let mut p = offset as usize;
        let y_coord = i32::from_le_bytes(buf[p..p + 4].try_into().unwrap());
        let data_size = u32::from_le_bytes(buf[p + 4..p + 8].try_into().unwrap()) as usize;
        p += 8;
        if p + data_size > buf.len() {
            return Err(CoreError::ChlistTruncated { offset: p });
        }
        let payload = &buf[p..p + data_size];

        let rows_in_block = block_height.min(header.height.saturating_sub(y_coord.max(0) as usize));
        if rows_in_block == 0 {
            continue;
        }
        let planes = decompress_block(header.compression, payload, &header.channels, header.width, rows_in_block)?;

        for (channel, plane) in header.channels.iter().zip(planes.iter()) {
            let width = header.width;
            let sw = sample_byte_width(channel.pixel_type);
            for row in 0..rows_in_block {
                let y = y_coord as usize + row;
                if y >= header.height {
                    continue;
                }
                for x in 0..width {
                    let s = plane[(row * width + x) * sw..(row * width + x) * sw + sw].to_vec();
                    let value = sample_to_f32(&s, channel.pixel_type);
                    let mut rgba = image.pixel(x, y);
                    match channel.name.as_str() {
                        "R" => rgba[0] = value,
                        "G" => rgba[1] = value,
                        "B" => rgba[2] = value,
                        "A" => rgba[3] = value,
                        _ => unreachable!(),
                    }
                    image.set_pixel(x, y, rgba);
                }
            }
        }
    }

    Ok(image)
}

fn chromaticities_color_space(header: &Header) -> LinearColorSpace {
    if let Some(MetadataValue::Chromaticities(c)) = header.metadata.get("chromaticities") {
        if let Some(space) = c.known_space() {
            return space;
        }
    }
    LinearColorSpace::Rec709
}

/// Writes a [`FloatImage`] as a single-part scanline OpenEXR file.
/// `Compression::None` stores FLOAT channels, pixel-interleaved
/// row-major, for an exact round-trip of every finite sample; every
/// other compression stores HALF channels, channel-planar, through its
/// codec.
pub fn write_exr(image: &FloatImage, compression: Compression) -> Result<Vec<u8>> {
    let mut image = image.clone();
    image.sanitize();

    let channel_pixel_type = if compression == Compression::None { 2 } else { 1 };
    let channels: Vec<ChannelDesc> = RGBA_ORDER
        .iter()
        .map(|&name| ChannelDesc {
            name: name.to_string(),
            pixel_type: channel_pixel_type,
            p_linear: 0,
            x_sampling: 1,
            y_sampling: 1,
        })
        .collect();

    let mut metadata = image.metadata.clone();
    if !metadata.contains_key("chromaticities") {
        let c = chromaticities_for(image.linear_color_space);
        metadata.insert("chromaticities".to_string(), MetadataValue::Chromaticities(c));
    }

    let header = Header {
        width: image.width,
        height: image.height,
        compression,
        channels: channels.clone(),
        line_order_increasing: true,
        metadata,
    };

    let mut out = Vec::new();
    out.extend_from_slice(&header::MAGIC.to_le_bytes());
    out.extend_from_slice(&2u32.to_le_bytes());
    out.extend_from_slice(&header::write_attributes(&header));

    let block_height = compression.block_height();
    let num_blocks = header.height.div_ceil(block_height).max(1);
    let offset_table_pos = out.len();
    out.extend(std::iter::repeat(0u8).take(num_blocks * 8));

    let mut offsets = Vec::with_capacity(num_blocks);
    let mut y = 0usize;
    while y < header.height || (header.height == 0 && offsets.is_empty()) {
        offsets.push(out.len() as i64);
        let rows = block_height.min(header.height.saturating_sub(y));

        let payload = if compression == Compression::None {
            let mut channel_f32_planes: Vec<Vec<f32>> = Vec::with_capacity(channels.len());
            for _ in &channels {
                channel_f32_planes.push(vec![0.0f32; image.width * rows]);
            }
            for row in 0..rows {
                for x in 0..image.width {
                    let rgba = image.pixel(x, y + row);
                    for (ci, name) in RGBA_ORDER.iter().enumerate() {
                        let v = match *name {
                            "A" => rgba[3],
                            "B" => rgba[2],
                            "G" => rgba[1],
                            "R" => rgba[0],
                            _ => unreachable!(),
                        };
                        channel_f32_planes[ci][row * image.width + x] = v;
                    }
                }
            }
            interleave_pixels_f32(&channel_f32_planes, image.width, rows)
        } else {
            let mut channel_u16_planes: Vec<Vec<u16>> = Vec::with_capacity(channels.len());
            for _ in &channels {
                channel_u16_planes.push(vec![0u16; image.width * rows]);
            }
            for row in 0..rows {
                for x in 0..image.width {
                    let rgba = image.pixel(x, y + row);
                    for (ci, name) in RGBA_ORDER.iter().enumerate() {
                        let v = match *name {
                            "A" => rgba[3],
                            "B" => rgba[2],
                            "G" => rgba[1],
                            "R" => rgba[0],
                            _ => unreachable!(),
                        };
                        channel_u16_planes[ci][row * image.width + x] = encode_half(v);
                    }
                }
            }

            let raw: Vec<u8> = channel_u16_planes
                .iter()
                .flat_map(|p| p.iter().flat_map(|v| v.to_le_bytes()))
                .collect();

            match compression {
                Compression::None => unreachable!(),
                Compression::Rle => rle::compress_rle_block(&raw),
                Compression::Zip | Compression::Zips => zip::compress_zip_block(&raw),
                Compression::Pxr24 => pxr24::pxr24_compress_block(&channel_u16_planes, image.width, rows),
                Compression::Piz => piz::piz_compress_block(&channel_u16_planes, image.width, rows),
            }
        };

        out.extend_from_slice(&(y as i32).to_le_bytes());
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&payload);

        if rows == 0 {
            break;
        }
        y += rows;
    }

    for (i, offset) in offsets.iter().enumerate() {
        let start = offset_table_pos + i * 8;
        out[start..start + 8].copy_from_slice(&offset.to_le_bytes());
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_uncompressed() {
        // NO_COMPRESSION stores FLOAT samples, so this must be pixel-exact,
        // not just close — unlike every other compression, which quantizes
        // through HALF.
        let mut image = FloatImage::new(3, 2, LinearColorSpace::Rec709);
        for y in 0..2 {
            for x in 0..3 {
                image.set_pixel(x, y, [0.1 * x as f32, 0.2 * y as f32, 0.123456789, 1.0]);
            }
        }
        let bytes = write_exr(&image, Compression::None).unwrap();
        let decoded = read_exr(&bytes).unwrap();
        assert_eq!(decoded.width, image.width);
        assert_eq!(decoded.height, image.height);
        for y in 0..2 {
            for x in 0..3 {
                assert_eq!(decoded.pixel(x, y), image.pixel(x, y), "mismatch at {x},{y}");
            }
        }
    }

    #[test]
    fn round_trips_every_compression() {
        let mut image = FloatImage::new(17, 5, LinearColorSpace::Rec709);
        for y in 0..5 {
            for x in 0..17 {
                let v = (x * 7 + y * 3) as f32 / 100.0;
                image.set_pixel(x, y, [v, v * 0.5, v * 0.25, 1.0]);
            }
        }
        for compression in [
            Compression::None,
            Compression::Rle,
            Compression::Zips,
            Compression::Zip,
            Compression::Pxr24,
            Compression::Piz,
        ] {
            let bytes = write_exr(&image, compression).unwrap();
            let decoded = read_exr(&bytes).unwrap();
            for y in 0..5 {
                for x in 0..17 {
                    let actual = decoded.pixel(x, y);
                    let expected = image.pixel(x, y);
                    if compression == Compression::None {
                        assert_eq!(actual, expected, "{compression:?} mismatch at {x},{y}");
                        continue;
                    }
                    for i in 0..3 {
                        assert!(
                            (actual[i] - expected[i]).abs() < 1e-2,
                            "{compression:?} channel {i} mismatch at {x},{y}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn rejects_non_rgba_channel_name() {
        let mut channels = vec![ChannelDesc {
            name: "Z".to_string(),
            pixel_type: 1,
            p_linear: 0,
            x_sampling: 1,
            y_sampling: 1,
        }];
        channels.extend(RGBA_ORDER.iter().map(|&name| ChannelDesc {
            name: name.to_string(),
            pixel_type: 1,
            p_linear: 0,
            x_sampling: 1,
            y_sampling: 1,
        }));
        let header = Header {
            width: 1,
            height: 1,
            compression: Compression::None,
            channels,
            line_order_increasing: true,
            metadata: crate::image::Metadata::new(),
        };
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&header::MAGIC.to_le_bytes());
        bytes.extend_from_slice(&2u32.to_le_bytes());
        bytes.extend_from_slice(&header::write_attributes(&header));
        bytes.extend(std::iter::repeat(0u8).take(8));
        assert!(matches!(read_exr(&bytes), Err(CoreError::UnsupportedInputFormat(_))));
    }
}
