//! `hdrgm` gain-map metadata and Google `Container:Directory` XMP, read and
//! written with the same `quick-xml` dependency (spec section 4.14).
//!
//! Adapted from the teacher's askama XMP templates (`ultra_hdr_stuff.rs`):
//! those rendered a fixed-shape template from scalar floats. This module
//! generalizes to per-channel triples and supports both representations
//! spec section 6 says a reader must accept: a scalar attribute broadcast
//! to all three channels, or an explicit `rdf:Seq` of three values.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::io::Cursor;

use crate::error::{CoreError, Result};
use crate::gainmap::GainMapMetadata;

pub const HDRGM_NAMESPACE: &str = "http://ns.adobe.com/hdr-gain-map/1.0/";
pub const CONTAINER_NAMESPACE: &str = "http://ns.google.com/photos/1.0/container/";
pub const CONTAINER_ITEM_NAMESPACE: &str = "http://ns.google.com/photos/1.0/container/item/";

const PER_CHANNEL_FIELDS: [&str; 5] = [
    "GainMapMin",
    "GainMapMax",
    "Gamma",
    "OffsetSDR",
    "OffsetHDR",
];

fn format_triple(values: [f32; 3]) -> String {
    format!("{:.6},{:.6},{:.6}", values[0], values[1], values[2])
}

fn write_per_channel_field(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    local_name: &str,
    values: [f32; 3],
) -> Result<()> {
    let tag = format!("hdrgm:{local_name}");
    if values[0] == values[1] && values[1] == values[2] {
        // Scalar form: a plain text element, broadcastable on read.
        writer.write_event(Event::Start(BytesStart::new(tag.as_str())))?;
        writer.write_event(Event::Text(BytesText::new(&format!("{:.6}", values[0]))))?;
        writer.write_event(Event::End(BytesEnd::new(tag.as_str())))?;
    } else {
        writer.write_event(Event::Start(BytesStart::new(tag.as_str())))?;
        writer.write_event(Event::Start(BytesStart::new("rdf:Seq")))?;
        for v in values {
            writer.write_event(Event::Start(BytesStart::new("rdf:li")))?;
            writer.write_event(Event::Text(BytesText::new(&format!("{:.6}", v))))?;
            writer.write_event(Event::End(BytesEnd::new("rdf:li")))?;
        }
        writer.write_event(Event::End(BytesEnd::new("rdf:Seq")))?;
        writer.write_event(Event::End(BytesEnd::new(tag.as_str())))?;
    }
    Ok(())
}

/// Writes the `hdrgm` `rdf:Description`, optionally nested inside a
/// `Container:Directory` listing `Primary` then `GainMap` with
/// `Item:Length` (Ultra HDR layout) when `gain_map_length` is `Some`.
pub fn write_hdrgm_xmp(metadata: &GainMapMetadata, gain_map_length: Option<usize>) -> Result<Vec<u8>> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut xmpmeta = BytesStart::new("x:xmpmeta");
    xmpmeta.push_attribute(("xmlns:x", "adobe:ns:meta/"));
    writer.write_event(Event::Start(xmpmeta))?;

    let mut rdf = BytesStart::new("rdf:RDF");
    rdf.push_attribute(("xmlns:rdf", "http://www.w3.org/1999/02/22-rdf-syntax-ns#"));
    rdf.push_attribute(("xmlns:hdrgm", HDRGM_NAMESPACE));
    if gain_map_length.is_some() {
        rdf.push_attribute(("xmlns:Container", CONTAINER_NAMESPACE));
        rdf.push_attribute(("xmlns:Item", CONTAINER_ITEM_NAMESPACE));
    }
    writer.write_event(Event::Start(rdf))?;

    let mut desc = BytesStart::new("rdf:Description");
    desc.push_attribute(("rdf:about", ""));
    desc.push_attribute(("hdrgm:Version", "1.0"));
    desc.push_attribute((
        "hdrgm:HDRCapacityMin",
        format!("{:.6}", metadata.hdr_capacity_min).as_str(),
    ));
    desc.push_attribute((
        "hdrgm:HDRCapacityMax",
        format!("{:.6}", metadata.hdr_capacity_max).as_str(),
    ));
    writer.write_event(Event::Start(desc))?;

    write_per_channel_field(&mut writer, "GainMapMin", metadata.gain_map_min)?;
    write_per_channel_field(&mut writer, "GainMapMax", metadata.gain_map_max)?;
    write_per_channel_field(&mut writer, "Gamma", metadata.gamma)?;
    write_per_channel_field(&mut writer, "OffsetSDR", metadata.offset_sdr)?;
    write_per_channel_field(&mut writer, "OffsetHDR", metadata.offset_hdr)?;

    if let Some(len) = gain_map_length {
        writer.write_event(Event::Start(BytesStart::new("Container:Directory")))?;
        writer.write_event(Event::Start(BytesStart::new("rdf:Seq")))?;

        writer.write_event(Event::Start(BytesStart::new("rdf:li")))?;
        let mut primary = BytesStart::new("Container:Item");
        primary.push_attribute(("Item:Semantic", "Primary"));
        primary.push_attribute(("Item:Mime", "image/jpeg"));
        writer.write_event(Event::Empty(primary))?;
        writer.write_event(Event::End(BytesEnd::new("rdf:li")))?;

        writer.write_event(Event::Start(BytesStart::new("rdf:li")))?;
        let mut gain_map = BytesStart::new("Container:Item");
        gain_map.push_attribute(("Item:Semantic", "GainMap"));
        gain_map.push_attribute(("Item:Mime", "image/jpeg"));
        gain_map.push_attribute(("Item:Length", len.to_string().as_str()));
        writer.write_event(Event::Empty(gain_map))?;
        writer.write_event(Event::End(BytesEnd::new("rdf:li")))?;

        writer.write_event(Event::End(BytesEnd::new("rdf:Seq")))?;
        writer.write_event(Event::End(BytesEnd::new("Container:Directory")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("rdf:Description")))?;
    writer.write_event(Event::End(BytesEnd::new("rdf:RDF")))?;
    writer.write_event(Event::End(BytesEnd::new("x:xmpmeta")))?;

    Ok(writer.into_inner().into_inner())
}

/// Prefixes an XMP packet with the 29-byte namespace identifier every APP1
/// XMP segment carries (spec section 4.14).
pub fn wrap_app1_xmp(xml: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(29 + xml.len());
    data.extend_from_slice(b"http://ns.adobe.com/xap/1.0/\0");
    data.extend_from_slice(xml);
    data
}

/// `Item:Length` of the `GainMap` entry in a `Container:Directory`, if
/// this XMP payload has one (Ultra HDR layout).
pub fn find_gain_map_item_length(xmp: &[u8]) -> Option<usize> {
    let text = std::str::from_utf8(xmp).ok()?;
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);
    loop {
        match reader.read_event() {
            Ok(Event::Empty(e)) | Ok(Event::Start(e)) => {
                let name = std::str::from_utf8(e.name().as_ref()).ok()?.to_string();
                if name == "Container:Item" {
                    let mut semantic = None;
                    let mut length = None;
                    for attr in e.attributes().flatten() {
                        let key = std::str::from_utf8(attr.key.as_ref()).unwrap_or("");
                        let value = std::str::from_utf8(&attr.value).unwrap_or("").to_string();
                        match key {
                            "Item:Semantic" => semantic = Some(value),
                            "Item:Length" => length = value.parse::<usize>().ok(),
                            _ => {}
                        }
                    }
                    if semantic.as_deref() == Some("GainMap") {
                        if let Some(len) = length {
                            return Some(len);
                        }
                    }
                }
            }
            Ok(Event::Eof) => return None,
            Err(_) => return None,
            _ => {}
        }
    }
}

/// Parses an `hdrgm` `rdf:Description`, accepting both scalar and
/// `rdf:Seq` per-channel forms (spec section 6).
pub fn parse_hdrgm_xmp(xmp: &[u8]) -> Result<GainMapMetadata> {
    let text = std::str::from_utf8(xmp)
        .map_err(|e| CoreError::MalformedMetadata(format!("XMP is not valid UTF-8: {e}")))?;
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut fields: std::collections::HashMap<&'static str, [f32; 3]> = std::collections::HashMap::new();
    let mut hdr_capacity_min = 0.0f32;
    let mut hdr_capacity_max = 1.0f32;

    let mut current_field: Option<&'static str> = None;
    let mut in_seq = false;
    let mut seq_values: Vec<f32> = Vec::new();
    let mut pending_scalar_text = String::new();

    loop {
        match reader
            .read_event()
            .map_err(|e| CoreError::MalformedMetadata(format!("XMP parse error: {e}")))?
        {
            Event::Start(e) | Event::Empty(e) => {
                let name = std::str::from_utf8(e.name().as_ref()).unwrap_or("").to_string();
                for attr in e.attributes().flatten() {
                    let key = std::str::from_utf8(attr.key.as_ref()).unwrap_or("");
                    let value = std::str::from_utf8(&attr.value).unwrap_or("");
                    apply_field(key, value, &mut fields, &mut hdr_capacity_min, &mut hdr_capacity_max);
                }
                if name == "rdf:Seq" {
                    in_seq = true;
                    seq_values.clear();
                } else if name != "rdf:li" {
                    if let Some(field) = PER_CHANNEL_FIELDS.iter().find(|f| name == format!("hdrgm:{f}")) {
                        current_field = Some(field);
                        pending_scalar_text.clear();
                    }
                }
            }
            Event::Text(e) => {
                let text = e.unescape().unwrap_or_default().to_string();
                if in_seq {
                    if let Ok(v) = text.trim().parse::<f32>() {
                        seq_values.push(v);
                    }
                } else if current_field.is_some() {
                    pending_scalar_text = text;
                }
            }
            Event::End(e) => {
                let qname = e.name();
                let name = std::str::from_utf8(qname.as_ref()).unwrap_or("");
                if name == "rdf:Seq" {
                    in_seq = false;
                } else if let Some(field) = current_field {
                    if name == format!("hdrgm:{field}") {
                        if seq_values.len() == 3 {
                            fields.insert(field, [seq_values[0], seq_values[1], seq_values[2]]);
                        } else if let Ok(v) = pending_scalar_text.trim().parse::<f32>() {
                            fields.insert(field, [v; 3]);
                        }
                        current_field = None;
                        seq_values.clear();
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    let get = |name: &str, default: [f32; 3]| *fields.get(name).unwrap_or(&default);

    Ok(GainMapMetadata {
        gain_map_min: get("GainMapMin", [0.0; 3]),
        gain_map_max: get("GainMapMax", [1.0; 3]),
        gamma: get("Gamma", [1.0; 3]),
        offset_sdr: get("OffsetSDR", [1.0 / 64.0; 3]),
        offset_hdr: get("OffsetHDR", [1.0 / 64.0; 3]),
        hdr_capacity_min,
        hdr_capacity_max,
    })
}

fn apply_field(
    key: &str,
    value: &str,
    fields: &mut std::collections::HashMap<&'static str, [f32; 3]>,
    hdr_capacity_min: &mut f32,
    hdr_capacity_max: &mut f32,
) {
    match key {
        "hdrgm:HDRCapacityMin" => {
            if let Ok(v) = value.parse() {
                *hdr_capacity_min = v;
            }
        }
        "hdrgm:HDRCapacityMax" => {
            if let Ok(v) = value.parse() {
                *hdr_capacity_max = v;
            }
        }
        _ => {
            if let Some(local) = key.strip_prefix("hdrgm:") {
                if let Some(field) = PER_CHANNEL_FIELDS.iter().find(|f| **f == local) {
                    if let Some(triple) = parse_triple_attr(value) {
                        fields.insert(field, triple);
                    }
                }
            }
        }
    }
}

fn parse_triple_attr(value: &str) -> Option<[f32; 3]> {
    let parts: Vec<f32> = value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect();
    match parts.len() {
        1 => Some([parts[0]; 3]),
        3 => Some([parts[0], parts[1], parts[2]]),
        _ => None,
    }
}

impl From<quick_xml::Error> for CoreError {
    fn from(e: quick_xml::Error) -> Self {
        CoreError::MalformedMetadata(format!("XMP write error: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_metadata() -> GainMapMetadata {
        GainMapMetadata {
            gain_map_min: [0.0; 3],
            gain_map_max: [3.0, 2.5, 3.5],
            gamma: [1.0; 3],
            offset_sdr: [1.0 / 64.0; 3],
            offset_hdr: [1.0 / 64.0; 3],
            hdr_capacity_min: 0.0,
            hdr_capacity_max: 3.5,
        }
    }

    #[test]
    fn round_trips_scalar_and_seq_fields() {
        let metadata = sample_metadata();
        let xml = write_hdrgm_xmp(&metadata, None).unwrap();
        let parsed = parse_hdrgm_xmp(&xml).unwrap();
        assert_eq!(parsed.gain_map_min, [0.0; 3]);
        for c in 0..3 {
            assert!((parsed.gain_map_max[c] - metadata.gain_map_max[c]).abs() < 1e-4);
        }
        assert!((parsed.hdr_capacity_max - 3.5).abs() < 1e-4);
    }

    #[test]
    fn container_directory_carries_item_length() {
        let metadata = sample_metadata();
        let xml = write_hdrgm_xmp(&metadata, Some(12345)).unwrap();
        assert_eq!(find_gain_map_item_length(&xml), Some(12345));
    }

    #[test]
    fn no_directory_means_no_item_length() {
        let metadata = sample_metadata();
        let xml = write_hdrgm_xmp(&metadata, None).unwrap();
        assert_eq!(find_gain_map_item_length(&xml), None);
    }
}
