//! Tile decoding.
//!
//! Tiles arrive as PNG or JPEG and are always reduced to a single 8-bit
//! greyscale channel, returned as a `(rows, columns)` array.

use image::ImageFormat;
use ndarray::Array2;

use super::source::TileResponse;
use crate::error::FetchError;

/// Content types a tile server may answer with, and how each is decoded.
pub const SUPPORTED_CONTENT_TYPES: [(&str, ImageFormat); 2] = [
    ("image/png", ImageFormat::Png),
    ("image/jpeg", ImageFormat::Jpeg),
];

/// Decode a successful tile response into a greyscale pixel array.
///
/// # Errors
///
/// - `UnsupportedContentType` unless the response matches one of
///   [`SUPPORTED_CONTENT_TYPES`] (parameters such as `; charset=...` are
///   ignored)
/// - `Decode` if the body is not a valid image of that type
pub fn decode_tile(response: &TileResponse) -> Result<Array2<u8>, FetchError> {
    let content_type = response.content_type.as_deref().unwrap_or("");
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    let format = SUPPORTED_CONTENT_TYPES
        .iter()
        .find(|(supported, _)| *supported == mime)
        .map(|(_, format)| *format)
        .ok_or_else(|| FetchError::UnsupportedContentType(content_type.to_string()))?;

    let img = image::load_from_memory_with_format(&response.body, format)
        .map_err(|e| FetchError::Decode(e.to_string()))?;

    let grey = img.into_luma8();
    let (width, height) = grey.dimensions();

    Array2::from_shape_vec((height as usize, width as usize), grey.into_raw())
        .map_err(|e| FetchError::Decode(e.to_string()))
}
