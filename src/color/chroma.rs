//! Chromaticities, XYZ matrix derivation (Bruce Lindbloom method), and
//! linear-RGB gamut conversion.
//!
//! Adapted from `color_stuff.rs` in the teacher: the original `Pixel`/
//! `CIExyCoords`/`CIEXYZCoords` trio is generalized so a `Chromaticities`
//! value can drive conversion for a whole [`crate::image::FloatImage`]
//! instead of a single three-component `Pixel`.

use nalgebra::{Matrix3, Vector3};

use crate::error::{CoreError, Result};
use crate::image::{FloatImage, LinearColorSpace};

pub type Mat3 = Matrix3<f32>;
pub type Vec3 = Vector3<f32>;

/// CIE 1931 xy chromaticity coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CIExy {
    pub x: f32,
    pub y: f32,
}

impl CIExy {
    pub fn with_luma(self, luma: f32) -> CIEXYZ {
        // http://www.brucelindbloom.com/index.html?Eqn_xyY_to_XYZ.html
        if self.y.abs() < 1e-6 {
            return CIEXYZ { x: 0.0, y: 0.0, z: 0.0 };
        }
        CIEXYZ {
            x: (self.x * luma) / self.y,
            y: luma,
            z: ((1.0 - self.x - self.y) * luma) / self.y,
        }
    }
}

/// CIE XYZ tristimulus value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CIEXYZ {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// `xyY -> XYZ`, returning black when `y < 1e-6` as required by spec section 4.1.
pub fn xyy_to_xyz(x: f32, y: f32, luma: f32) -> CIEXYZ {
    CIExy { x, y }.with_luma(luma)
}

/// `xy -> linear_rgb` helper for CIE-diagram-style plotting; returns black
/// when `y < 1e-6`.
pub fn xy_to_linear_rgb(x: f32, y: f32, space: &Chromaticities) -> Result<[f32; 3]> {
    if y.abs() < 1e-6 {
        return Ok([0.0, 0.0, 0.0]);
    }
    let xyz = xyy_to_xyz(x, y, 1.0);
    let m = space.xyz_to_rgb_matrix()?;
    let v = m * Vec3::new(xyz.x, xyz.y, xyz.z);
    Ok([v.x, v.y, v.z])
}

/// The four xy pairs (red, green, blue, white) that define a color space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Chromaticities {
    pub red: CIExy,
    pub green: CIExy,
    pub blue: CIExy,
    pub white: CIExy,
}

impl Chromaticities {
    /// Bruce Lindbloom RGB-to-XYZ matrix derivation: solve for primary
    /// luminance weights from xy and the white point, then form
    /// `M = [r*Xr g*Xg b*Xb; ...]`.
    pub fn chromaticities_to_rgb_xyz_matrix(&self) -> Result<Mat3> {
        let red = self.red.with_luma(1.0);
        let green = self.green.with_luma(1.0);
        let blue = self.blue.with_luma(1.0);
        let white = self.white.with_luma(1.0);

        let xyz_primaries = Mat3::new(
            red.x, green.x, blue.x, red.y, green.y, blue.y, red.z, green.z, blue.z,
        );
        let inv = xyz_primaries
            .try_inverse()
            .ok_or_else(|| CoreError::WideColorSpaceUnsupported)?;
        let s = inv * Vec3::new(white.x, white.y, white.z);

        Ok(Mat3::new(
            s.x * red.x,
            s.y * green.x,
            s.z * blue.x,
            s.x * red.y,
            s.y * green.y,
            s.z * blue.y,
            s.x * red.z,
            s.y * green.z,
            s.z * blue.z,
        ))
    }

    pub fn chromaticities_to_xyz_rgb_matrix(&self) -> Result<Mat3> {
        self.chromaticities_to_rgb_xyz_matrix()?
            .try_inverse()
            .ok_or(CoreError::WideColorSpaceUnsupported)
    }

    // Kept as the names the teacher used, aliasing the spec's naming above.
    pub fn rgb_to_xyz_matrix(&self) -> Result<Mat3> {
        self.chromaticities_to_rgb_xyz_matrix()
    }

    pub fn xyz_to_rgb_matrix(&self) -> Result<Mat3> {
        self.chromaticities_to_xyz_rgb_matrix()
    }

    /// Matrix converting linear RGB in `self`'s space to linear RGB in
    /// `target`'s space.
    pub fn conversion_matrix_to(&self, target: &Chromaticities) -> Result<Mat3> {
        Ok(target.xyz_to_rgb_matrix()? * self.rgb_to_xyz_matrix()?)
    }

    /// Whether each of the four xy pairs is within +/-0.01 of `other`'s,
    /// per spec section 3's "matches a known space" rule.
    pub fn matches(&self, other: &Chromaticities) -> bool {
        const TOL: f32 = 0.01;
        let close = |a: CIExy, b: CIExy| (a.x - b.x).abs() <= TOL && (a.y - b.y).abs() <= TOL;
        close(self.red, other.red)
            && close(self.green, other.green)
            && close(self.blue, other.blue)
            && close(self.white, other.white)
    }

    pub fn known_space(&self) -> Option<LinearColorSpace> {
        use crate::color::spaces::{DISPLAY_P3, REC_2020, REC_709};
        if self.matches(&REC_709) {
            Some(LinearColorSpace::Rec709)
        } else if self.matches(&DISPLAY_P3) {
            Some(LinearColorSpace::P3)
        } else if self.matches(&REC_2020) {
            Some(LinearColorSpace::Rec2020)
        } else {
            None
        }
    }
}

pub fn chromaticities_for(space: LinearColorSpace) -> Chromaticities {
    use crate::color::spaces::{DISPLAY_P3, REC_2020, REC_709};
    match space {
        LinearColorSpace::Rec709 => REC_709,
        LinearColorSpace::P3 => DISPLAY_P3,
        LinearColorSpace::Rec2020 => REC_2020,
    }
}

/// `convert_linear(image, target_space)`: applies `M_target^-1 * M_source`
/// pixel-wise to RGB, preserving alpha.
pub fn convert_linear(image: &mut FloatImage, target: LinearColorSpace) -> Result<()> {
    if image.linear_color_space == target {
        return Ok(());
    }
    let source_ch = chromaticities_for(image.linear_color_space);
    let target_ch = chromaticities_for(target);
    let m = source_ch.conversion_matrix_to(&target_ch)?;

    for px in image.pixels.chunks_exact_mut(4) {
        let v = m * Vec3::new(px[0], px[1], px[2]);
        px[0] = v.x;
        px[1] = v.y;
        px[2] = v.z;
    }
    image.linear_color_space = target;
    Ok(())
}
