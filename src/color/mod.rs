//! Color model: chromaticities, XYZ matrices, transfer functions, and
//! linear gamut conversion (spec component C1).

pub mod chroma;
pub mod spaces;
pub mod transfer;

pub use chroma::{chromaticities_for, convert_linear, Chromaticities, CIExy, CIEXYZ};
