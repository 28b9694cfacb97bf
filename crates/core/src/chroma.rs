//! Chroma-key background classification and removal.
//!
//! Classification is a fixed per-channel tolerance band around the key
//! colour. Pixels that are already fully transparent also count as
//! background, which makes keying idempotent.

use image::{Rgb, Rgba, RgbaImage};

/// Pure saturated green used as the sheet background.
pub const CHROMA_GREEN: Rgb<u8> = Rgb([0, 255, 0]);

/// Largest per-channel deviation from the key colour that is still
/// classified as background. Absorbs encoder noise around pure green
/// without reaching into saturated foreground greens.
pub const DEFAULT_KEY_TOLERANCE: u8 = 40;

/// Value written over every keyed pixel.
pub const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Background classifier: a key colour plus a per-channel tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChromaKey {
    pub color: Rgb<u8>,
    /// Largest per-channel distance still treated as background.
    pub tolerance: u8,
}

impl Default for ChromaKey {
    fn default() -> Self {
        Self {
            color: CHROMA_GREEN,
            tolerance: DEFAULT_KEY_TOLERANCE,
        }
    }
}

impl ChromaKey {
    /// Green key with a custom tolerance.
    pub fn green(tolerance: u8) -> Self {
        Self {
            color: CHROMA_GREEN,
            tolerance,
        }
    }

    pub fn is_background(&self, pixel: &Rgba<u8>) -> bool {
        if pixel[3] == 0 {
            return true;
        }
        pixel
            .0
            .iter()
            .zip(self.color.0.iter())
            .all(|(p, k)| p.abs_diff(*k) <= self.tolerance)
    }

    /// Replace every background pixel with [`TRANSPARENT`]. Returns the
    /// number of pixels that changed.
    pub fn key_in_place(&self, image: &mut RgbaImage) -> usize {
        let mut changed = 0;
        for pixel in image.pixels_mut() {
            if self.is_background(pixel) && *pixel != TRANSPARENT {
                *pixel = TRANSPARENT;
                changed += 1;
            }
        }
        changed
    }

    /// Keyed copy of `image`; used for single-item edit results.
    pub fn key_image(&self, image: &RgbaImage) -> RgbaImage {
        let mut out = image.clone();
        self.key_in_place(&mut out);
        out
    }
}
