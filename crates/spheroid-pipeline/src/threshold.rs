//! Percentile thresholding.
//!
//! Binarizes a grayscale buffer so that only the brightest samples
//! survive. The cutoff is the nearest-rank percentile of the buffer's own
//! intensities, which adapts to exposure differences between images.

use image::GrayImage;

/// Nearest-rank percentile of the buffer's intensities.
///
/// Returns the least intensity `v` such that at least `percentile`% of
/// the samples are `<= v`. `percentile` is clamped to `[0, 100]`; an
/// empty buffer yields 0.
#[must_use]
pub fn percentile_value(image: &GrayImage, percentile: f64) -> u8 {
    let histogram = imageproc::stats::histogram(image);
    let Some(counts) = histogram.channels.first() else {
        return 0;
    };
    let total: u64 = counts.iter().map(|&c| u64::from(c)).sum();
    if total == 0 {
        return 0;
    }

    #[allow(clippy::cast_precision_loss)]
    let needed = (percentile.clamp(0.0, 100.0) * total as f64 / 100.0).ceil();
    let mut cumulative = 0_u64;
    for (value, &count) in (0..=u8::MAX).zip(counts.iter()) {
        cumulative += u64::from(count);
        #[allow(clippy::cast_precision_loss)]
        let reached = cumulative as f64 >= needed;
        if reached && cumulative > 0 {
            return value;
        }
    }
    u8::MAX
}

/// Binarize: samples `> threshold` become 255, everything else 0.
///
/// When the threshold is the brightest level present, samples at that
/// level are foreground too, so a large uniformly bright object is not
/// lost to ties. A uniform buffer produces no foreground.
#[must_use = "returns the binary image"]
pub fn binarize(image: &GrayImage, threshold: u8) -> GrayImage {
    let (min, max) = image
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p.0[0]), hi.max(p.0[0])));
    let keep_top = threshold == max && max > min;
    let mut out = image.clone();
    for p in out.pixels_mut() {
        let v = p.0[0];
        p.0[0] = if v > threshold || (keep_top && v == threshold) { 255 } else { 0 };
    }
    out
}

/// Keep only the samples above the given percentile.
#[must_use = "returns the binary image"]
pub fn percentile_threshold(image: &GrayImage, percentile: f64) -> GrayImage {
    let threshold = percentile_value(image, percentile);
    log::debug!("percentile {percentile} -> threshold {threshold}");
    binarize(image, threshold)
}

/// Number of foreground (non-zero) pixels.
#[must_use]
pub fn foreground_count(image: &GrayImage) -> u64 {
    image.pixels().map(|p| u64::from(p.0[0] != 0)).sum()
}
