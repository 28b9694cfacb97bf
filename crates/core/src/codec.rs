//! In-memory image decode/encode helpers.

use std::io::Cursor;

use image::{imageops::FilterType, ImageFormat, RgbaImage};

use crate::error::CoreError;

/// Decode PNG, JPEG or WebP bytes into an RGBA buffer.
pub fn decode_rgba(bytes: &[u8]) -> Result<RgbaImage, CoreError> {
    Ok(image::load_from_memory(bytes)?.to_rgba8())
}

/// Encode an RGBA buffer as PNG, keeping the alpha channel.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, CoreError> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}

/// Resample `image` to exactly `width` x `height`. Returns the input
/// unchanged when it already has that size.
pub fn resize_exact(image: RgbaImage, width: u32, height: u32) -> RgbaImage {
    if image.dimensions() == (width, height) {
        return image;
    }
    image::imageops::resize(&image, width, height, FilterType::Lanczos3)
}
