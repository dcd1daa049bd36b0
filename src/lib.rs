//! A from-scratch HDR imaging core: a single-part scanline OpenEXR
//! codec, a Radiance HDR reader/writer, Adobe/Ultra HDR gain-map
//! encoding and decoding with their JPEG container framing, a linear
//! color pipeline, and tone mapping.
//!
//! Every public entry point returns [`error::Result`]; there is no
//! panicking API surface.

pub mod color;
pub mod error;
pub mod exr;
pub mod gainmap;
pub mod half;
pub mod hdr;
pub mod image;
pub mod jpeg_container;
pub mod tonemap;

pub use color::chroma::convert_linear as convert_linear_color_space;
pub use error::{CoreError, Result};
pub use exr::{read_exr, write_exr, Compression};
pub use gainmap::{decode_gain_map, encode_gain_map, encode_gain_map_float};
pub use hdr::{read_hdr, write_hdr, HdrReadOptions, OutputMode};
pub use image::{FloatImage, LinearColorSpace, Metadata, MetadataValue};
pub use jpeg_container::{read_jpeg_gain_map, write_jpeg_gain_map, ContainerFormat, JpegGainMapOptions};
pub use tonemap::{apply_tone_mapping, ToneMapper};
