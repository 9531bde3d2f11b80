//! Contrast stretching.
//!
//! Maps the darkest sample of a grayscale buffer to 0 and the brightest
//! to 255, rescaling everything in between linearly:
//!
//! ```text
//! out = round((s - low) / (high - low) × 255)
//! ```
//!
//! A flat buffer (`high == low`) has no range to stretch and is returned
//! unchanged.

use image::GrayImage;

/// Darkest and brightest intensity in the buffer, or `None` for an
/// empty buffer.
#[must_use]
pub fn intensity_range(image: &GrayImage) -> Option<(u8, u8)> {
    let histogram = imageproc::stats::histogram(image);
    let counts = histogram.channels.first()?;
    let low = counts.iter().position(|&c| c > 0)?;
    let high = counts.iter().rposition(|&c| c > 0)?;
    Some((u8::try_from(low).ok()?, u8::try_from(high).ok()?))
}

/// Stretch the intensities of `image` to the full 0..=255 range.
#[must_use = "returns the stretched image"]
pub fn stretch_contrast(image: &GrayImage) -> GrayImage {
    let Some((low, high)) = intensity_range(image) else {
        return image.clone();
    };
    if low == high {
        log::debug!("flat image (all samples = {low}), skipping contrast stretch");
        return image.clone();
    }

    let scale = 255.0 / f64::from(high - low);
    let lut: [u8; 256] = std::array::from_fn(|v| {
        let v = u8::try_from(v).unwrap_or(u8::MAX);
        let shifted = f64::from(v.saturating_sub(low));
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let out = (shifted * scale).round().clamp(0.0, 255.0) as u8;
        out
    });

    let mut out = image.clone();
    for p in out.pixels_mut() {
        p.0[0] = lut[usize::from(p.0[0])];
    }
    out
}

/// Invert intensities (`255 - s`).
#[must_use = "returns the inverted image"]
pub fn invert(image: &GrayImage) -> GrayImage {
    let mut out = image.clone();
    for p in out.pixels_mut() {
        p.0[0] = !p.0[0];
    }
    out
}
