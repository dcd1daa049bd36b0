//! Canonical chromaticities for the three color spaces the spec names:
//! Rec.709/sRGB, Display P3, and Rec.2020.
//!
//! Adapted from the teacher's `color_spaces.rs`, trimmed to the spaces
//! spec section 3 lists (`linear-rec709`, `linear-p3`, `linear-rec2020`);
//! the teacher's ACES AP0/AP1 constants are dropped since nothing in this
//! crate's `LinearColorSpace` enum names them.

use super::chroma::{CIExy, Chromaticities};

pub const D65_WHITE: CIExy = CIExy { x: 0.3127, y: 0.3290 };

// https://www.itu.int/dms_pubrec/itu-r/rec/bt/R-REC-BT.709-6-201506-I!!PDF-E.pdf
pub const REC_709: Chromaticities = Chromaticities {
    red: CIExy { x: 0.640, y: 0.330 },
    green: CIExy { x: 0.300, y: 0.600 },
    blue: CIExy { x: 0.150, y: 0.060 },
    white: D65_WHITE,
};

// https://www.itu.int/dms_pubrec/itu-r/rec/bt/R-REC-BT.2020-0-201208-S!!PDF-E.pdf
pub const REC_2020: Chromaticities = Chromaticities {
    red: CIExy { x: 0.708, y: 0.292 },
    green: CIExy { x: 0.170, y: 0.797 },
    blue: CIExy { x: 0.131, y: 0.046 },
    white: D65_WHITE,
};

// https://en.wikipedia.org/wiki/DCI-P3
pub const DISPLAY_P3: Chromaticities = Chromaticities {
    red: CIExy { x: 0.680, y: 0.320 },
    green: CIExy { x: 0.265, y: 0.690 },
    blue: CIExy { x: 0.150, y: 0.060 },
    white: D65_WHITE,
};
