//! Image decoding and grayscale conversion.
//!
//! Accepts raw image bytes (PNG, JPEG, BMP, TIFF, WebP) and produces the
//! retained RGBA original plus a single-channel grayscale working copy.
//!
//! This is the first step in the pipeline: raw bytes in, buffers out.

use image::{DynamicImage, GrayImage, RgbaImage};

use crate::types::PipelineError;

/// Decode raw image bytes.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the image format is
/// unrecognized or the data is corrupt.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }
    Ok(image::load_from_memory(bytes)?)
}

/// Split a decoded image into the RGBA original used for annotation
/// and the grayscale buffer used for analysis.
///
/// Color images use the `image` crate's luminance weighting
/// (Rec. 709 coefficients); grayscale inputs pass through unchanged.
#[must_use]
pub fn split_original_and_gray(image: &DynamicImage) -> (RgbaImage, GrayImage) {
    (image.to_rgba8(), image.to_luma8())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// Encode a 1x1 RGBA pixel as PNG bytes.
    fn encode_rgba_pixel(r: u8, g: u8, b: u8) -> Vec<u8> {
        let img = RgbaImage::from_fn(1, 1, |_, _| image::Rgba([r, g, b, 255]));
        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        image::ImageEncoder::write_image(
            encoder,
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::Rgba8,
        )
        .unwrap();
        buf
    }

    #[test]
    fn empty_input_returns_error() {
        assert!(matches!(decode(&[]), Err(PipelineError::EmptyInput)));
    }

    #[test]
    fn corrupt_bytes_returns_image_decode_error() {
        let result = decode(&[0xFF, 0xFE, 0x00, 0x01]);
        assert!(matches!(result, Err(PipelineError::ImageDecode(_))));
    }

    #[test]
    fn split_keeps_dimensions_and_color() {
        let bytes = encode_rgba_pixel(200, 10, 30);
        let decoded = decode(&bytes).unwrap();
        let (original, gray) = split_original_and_gray(&decoded);
        assert_eq!(original.dimensions(), (1, 1));
        assert_eq!(gray.dimensions(), (1, 1));
        assert_eq!(original.get_pixel(0, 0).0, [200, 10, 30, 255]);
    }

    #[test]
    fn luminance_weights_green_highest() {
        let gray_of = |r, g, b| {
            let decoded = decode(&encode_rgba_pixel(r, g, b)).unwrap();
            split_original_and_gray(&decoded).1.get_pixel(0, 0).0[0]
        };
        let (red, green, blue) = (gray_of(255, 0, 0), gray_of(0, 255, 0), gray_of(0, 0, 255));
        assert!(
            green > red && red > blue,
            "expected green > red > blue luminance, got R={red} G={green} B={blue}",
        );
    }
}
