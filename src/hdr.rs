//! Radiance HDR (RGBE) reader and writer (spec section 4.10).

use crate::error::{CoreError, Result};
use crate::image::FloatImage;

/// Whether [`read_hdr`] should undo `EXPOSURE`/`GAMMA` scaling to recover
/// physical radiance, or return the stored values unscaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Raw,
    PhysicalRadiance,
}

#[derive(Debug, Clone, Copy)]
pub struct HdrReadOptions {
    /// Require the signature line to read exactly `#?RADIANCE`.
    pub strict: bool,
    pub output_mode: OutputMode,
}

impl Default for HdrReadOptions {
    fn default() -> Self {
        Self {
            strict: true,
            output_mode: OutputMode::PhysicalRadiance,
        }
    }
}

fn midpoint_decode(r: u8, g: u8, b: u8, e: u8) -> [f32; 3] {
    if e == 0 {
        return [0.0, 0.0, 0.0];
    }
    // value = ((byte + 0.5) / 256) * 2^(E-128) = (byte + 0.5) * 2^(E-128-8)
    let factor = 2f32.powi(e as i32 - 128 - 8);
    [
        (r as f32 + 0.5) * factor,
        (g as f32 + 0.5) * factor,
        (b as f32 + 0.5) * factor,
    ]
}

fn quantize_pixel(r: f32, g: f32, b: f32) -> [u8; 4] {
    let m = r.max(g).max(b);
    if m < 1e-32 {
        return [0, 0, 0, 0];
    }
    let mut e = ((m.log2().ceil() as i32) + 128).clamp(128, 255);
    loop {
        let factor = 2f32.powi(e - 128);
        let enc = |c: f32| -> i32 { ((c / factor) * 255.0 - 0.5).round() as i32 };
        let (rr, gg, bb) = (enc(r), enc(g), enc(b));
        if (rr > 255 || gg > 255 || bb > 255) && e < 255 {
            e += 1;
            continue;
        }
        return [rr.clamp(0, 255) as u8, gg.clamp(0, 255) as u8, bb.clamp(0, 255) as u8, e as u8];
    }
}

fn decode_new_rle_channel(data: &[u8], pos: &mut usize, width: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(width);
    while out.len() < width {
        if *pos >= data.len() {
            return Err(CoreError::TruncatedLiteralRun);
        }
        let n = data[*pos];
        *pos += 1;
        if n > 128 {
            let count = (n - 128) as usize;
            if *pos >= data.len() {
                return Err(CoreError::TruncatedRepeatRun);
            }
            let byte = data[*pos];
            *pos += 1;
            out.extend(std::iter::repeat(byte).take(count));
        } else {
            let count = n as usize;
            if *pos + count > data.len() {
                return Err(CoreError::TruncatedLiteralRun);
            }
            out.extend_from_slice(&data[*pos..*pos + count]);
            *pos += count;
        }
    }
    if out.len() != width {
        return Err(CoreError::RleSizeMismatch {
            expected: width,
            actual: out.len(),
        });
    }
    Ok(out)
}

/// Decodes one scanline of `width` RGBE pixels, dispatching to new-RLE
/// (four separate channel runs) when the row is prefixed with the
/// `{0x02, 0x02, hi, lo}` marker and `width` is in `[8, 32767]`, otherwise
/// falling back to the old format: a flat sequence of 4-byte pixels where
/// `(1, 1, 1, count)` repeats the previous pixel `count` times.
fn decode_row(data: &[u8], pos: &mut usize, width: usize) -> Result<Vec<[u8; 4]>> {
    let is_new_rle = (8..=32767).contains(&width)
        && *pos + 4 <= data.len()
        && data[*pos] == 2
        && data[*pos + 1] == 2
        && data[*pos + 2] as usize == (width >> 8) & 0x7F
        && data[*pos + 3] as usize == width & 0xFF;

    if is_new_rle {
        *pos += 4;
        let r = decode_new_rle_channel(data, pos, width)?;
        let g = decode_new_rle_channel(data, pos, width)?;
        let b = decode_new_rle_channel(data, pos, width)?;
        let e = decode_new_rle_channel(data, pos, width)?;
        Ok((0..width).map(|i| [r[i], g[i], b[i], e[i]]).collect())
    } else {
        let mut pixels = Vec::with_capacity(width);
        let mut prev: Option<[u8; 4]> = None;
        while pixels.len() < width {
            if *pos + 4 > data.len() {
                return Err(CoreError::TruncatedLiteralRun);
            }
            let px = [data[*pos], data[*pos + 1], data[*pos + 2], data[*pos + 3]];
            *pos += 4;
            if px[0] == 1 && px[1] == 1 && px[2] == 1 {
                let count = px[3] as usize;
                let prev_px = prev.ok_or(CoreError::TruncatedRepeatRun)?;
                for _ in 0..count {
                    if pixels.len() >= width {
                        break;
                    }
                    pixels.push(prev_px);
                }
            } else {
                pixels.push(px);
                prev = Some(px);
            }
        }
        Ok(pixels)
    }
}

fn find_newline(data: &[u8], start: usize) -> Result<usize> {
    data[start..]
        .iter()
        .position(|&b| b == b'\n')
        .map(|i| start + i)
        .ok_or(CoreError::BadMagic { offset: start })
}

/// Reads a Radiance `.hdr`/`.pic` file into a [`FloatImage`].
pub fn read_hdr(buf: &[u8], options: &HdrReadOptions) -> Result<FloatImage> {
    let first_nl = find_newline(buf, 0)?;
    let sig = String::from_utf8_lossy(&buf[..first_nl]);
    let sig = sig.trim_end_matches('\r');
    if !sig.starts_with("#?") {
        return Err(CoreError::BadMagic { offset: 0 });
    }
    if options.strict && sig != "#?RADIANCE" {
        return Err(CoreError::BadMagic { offset: 0 });
    }

    let mut pos = first_nl + 1;
    let mut format_seen = false;
    let mut exposure: Option<f32> = None;
    let mut gamma: Option<f32> = None;
    loop {
        let nl = find_newline(buf, pos)?;
        let line = String::from_utf8_lossy(&buf[pos..nl]).trim_end_matches('\r').to_string();
        pos = nl + 1;
        if line.is_empty() {
            break;
        }
        if let Some((key, value)) = line.split_once('=') {
            match key {
                "FORMAT" => {
                    format_seen = true;
                    match value {
                        "32-bit_rle_rgbe" => {}
                        "32-bit_rle_xyze" => return Err(CoreError::XyzUnsupported),
                        _ => return Err(CoreError::UnsupportedResolutionFormat),
                    }
                }
                "EXPOSURE" => {
                    if let Ok(v) = value.parse::<f32>() {
                        exposure = Some(exposure.unwrap_or(1.0) * v);
                    }
                }
                "GAMMA" => {
                    gamma = value.parse::<f32>().ok();
                }
                _ => {}
            }
        }
    }
    if !format_seen {
        return Err(CoreError::MissingRequiredAttribute { name: "FORMAT" });
    }

    let res_nl = find_newline(buf, pos)?;
    let res_line = String::from_utf8_lossy(&buf[pos..res_nl]).trim_end_matches('\r').to_string();
    pos = res_nl + 1;
    let tokens: Vec<&str> = res_line.split_whitespace().collect();
    if tokens.len() != 4 || tokens[0] != "-Y" || tokens[2] != "+X" {
        return Err(CoreError::UnsupportedResolutionFormat);
    }
    let height: usize = tokens[1].parse().map_err(|_| CoreError::UnsupportedResolutionFormat)?;
    let width: usize = tokens[3].parse().map_err(|_| CoreError::UnsupportedResolutionFormat)?;

    let mut image = FloatImage::new(width, height, crate::image::LinearColorSpace::Rec709);
    for y in 0..height {
        let row = decode_row(buf, &mut pos, width)?;
        for (x, px) in row.iter().enumerate() {
            let mut rgb = midpoint_decode(px[0], px[1], px[2], px[3]);
            if options.output_mode == OutputMode::PhysicalRadiance {
                if let Some(exp) = exposure {
                    if exp != 0.0 {
                        for c in rgb.iter_mut() {
                            *c /= exp;
                        }
                    }
                }
                if let Some(g) = gamma {
                    if g != 1.0 && g != 0.0 {
                        for c in rgb.iter_mut() {
                            *c = c.powf(g);
                        }
                    }
                }
            }
            image.set_pixel(x, y, [rgb[0], rgb[1], rgb[2], 1.0]);
        }
    }
    Ok(image)
}

/// Writes a [`FloatImage`] as a Radiance `.hdr` file: shared-exponent,
/// quantization-aware encode, non-RLE pixel stream (spec section 4.10;
/// readers following this spec also accept RLE, but this writer always
/// emits the simpler flat form).
pub fn write_hdr(image: &FloatImage) -> Vec<u8> {
    let mut image = image.clone();
    image.sanitize();

    let mut out = Vec::new();
    out.extend_from_slice(b"#?RADIANCE\n");
    out.extend_from_slice(b"# written by hdr_core\n");
    out.extend_from_slice(b"FORMAT=32-bit_rle_rgbe\n");
    out.push(b'\n');
    out.extend_from_slice(format!("-Y {} +X {}\n", image.height, image.width).as_bytes());

    for y in 0..image.height {
        for x in 0..image.width {
            let rgba = image.pixel(x, y);
            let px = quantize_pixel(rgba[0], rgba[1], rgba[2]);
            out.extend_from_slice(&px);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::LinearColorSpace;

    #[test]
    fn round_trips_flat_image() {
        let mut image = FloatImage::new(5, 3, LinearColorSpace::Rec709);
        for y in 0..3 {
            for x in 0..5 {
                image.set_pixel(x, y, [0.5 + x as f32 * 0.05, 0.4 + y as f32 * 0.05, 0.6, 1.0]);
            }
        }
        let bytes = write_hdr(&image);
        let decoded = read_hdr(&bytes, &HdrReadOptions::default()).unwrap();
        assert_eq!(decoded.width, 5);
        assert_eq!(decoded.height, 3);
        for y in 0..3 {
            for x in 0..5 {
                let actual = decoded.pixel(x, y);
                let expected = image.pixel(x, y);
                for c in 0..3 {
                    let rel_err = (actual[c] - expected[c]).abs() / expected[c].max(1e-6);
                    assert!(rel_err < 0.02, "x={x} y={y} c={c} actual={actual:?} expected={expected:?}");
                }
            }
        }
    }

    #[test]
    fn rejects_xyze_format() {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"#?RADIANCE\nFORMAT=32-bit_rle_xyze\n\n-Y 1 +X 1\n");
        buf.extend_from_slice(&[0, 0, 0, 0]);
        assert!(matches!(read_hdr(&buf, &HdrReadOptions::default()), Err(CoreError::XyzUnsupported)));
    }

    #[test]
    fn rejects_plus_y_orientation() {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"#?RADIANCE\nFORMAT=32-bit_rle_rgbe\n\n+Y 1 +X 1\n");
        buf.extend_from_slice(&[0, 0, 0, 0]);
        assert!(matches!(
            read_hdr(&buf, &HdrReadOptions::default()),
            Err(CoreError::UnsupportedResolutionFormat)
        ));
    }

    #[test]
    fn decodes_old_style_run_marker() {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"#?RADIANCE\nFORMAT=32-bit_rle_rgbe\n\n-Y 1 +X 4\n");
        // One literal pixel, then a run marker repeating it 3 more times.
        buf.extend_from_slice(&[10, 20, 30, 140]);
        buf.extend_from_slice(&[1, 1, 1, 3]);
        let decoded = read_hdr(&buf, &HdrReadOptions { strict: true, output_mode: OutputMode::Raw }).unwrap();
        let first = decoded.pixel(0, 0);
        for x in 1..4 {
            assert_eq!(decoded.pixel(x, 0), first);
        }
    }

    #[test]
    fn decodes_new_rle_row() {
        let width = 8usize;
        let mut buf = Vec::new();
        buf.extend_from_slice(b"#?RADIANCE\nFORMAT=32-bit_rle_rgbe\n\n-Y 1 +X 8\n");
        buf.extend_from_slice(&[2, 2, ((width >> 8) & 0x7F) as u8, (width & 0xFF) as u8]);
        // R plane: one repeat run of value 5, 8 times.
        buf.extend_from_slice(&[128 + 8, 5]);
        // G plane: literal run of 8 distinct bytes.
        buf.push(8);
        buf.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        // B plane: repeat run of value 9, 8 times.
        buf.extend_from_slice(&[128 + 8, 9]);
        // E plane: repeat run of value 136, 8 times.
        buf.extend_from_slice(&[128 + 8, 136]);

        let decoded = read_hdr(&buf, &HdrReadOptions { strict: true, output_mode: OutputMode::Raw }).unwrap();
        assert_eq!(decoded.width, width);
        let px2 = decoded.pixel(2, 0);
        assert!(px2[1] > 0.0);
    }
}
