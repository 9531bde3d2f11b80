//! Per-image area statistics.
//!
//! Areas are pixel counts of rasterized masks in the original frame:
//! the filled spheroid, and the union of the filled invasion contours
//! with anything overlapping the spheroid removed.

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::raster;
use crate::threshold::foreground_count;
use crate::types::{Contour, Dimensions, Offset};

/// The statistics record reported for one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaStats {
    /// Name of the analysed image.
    pub filename: String,
    /// Spheroid plus invasion area, in pixels.
    pub total_area: u64,
    /// Filled spheroid area, in pixels.
    pub spheroid_area: u64,
    /// Invasion area outside the spheroid, in pixels.
    pub invasion_area: u64,
    /// `invasion_area / spheroid_area`, or `None` when the spheroid
    /// covers no pixels.
    pub invasion_ratio: Option<f64>,
}

impl AreaStats {
    /// Build the record from the two masks.
    ///
    /// The invasion mask is expected to exclude the spheroid already.
    #[must_use]
    pub fn from_masks(filename: &str, spheroid: &GrayImage, invasion: &GrayImage) -> Self {
        let spheroid_area = foreground_count(spheroid);
        let invasion_area = foreground_count(invasion);
        #[allow(clippy::cast_precision_loss)]
        let invasion_ratio =
            (spheroid_area > 0).then(|| invasion_area as f64 / spheroid_area as f64);
        Self {
            filename: filename.to_owned(),
            total_area: spheroid_area + invasion_area,
            spheroid_area,
            invasion_area,
            invasion_ratio,
        }
    }
}

/// The spheroid and invasion masks of an image.
#[derive(Debug, Clone)]
pub struct AreaMasks {
    /// Filled spheroid.
    pub spheroid: GrayImage,
    /// Filled invasion contours minus the spheroid.
    pub invasion: GrayImage,
}

/// Rasterize the final contours, all in the original frame.
#[must_use]
pub fn area_masks(size: Dimensions, spheroid: &Contour, invasions: &[Contour]) -> AreaMasks {
    let spheroid_mask = raster::filled_mask(size, std::slice::from_ref(spheroid), Offset::ZERO);
    let mut invasion_mask = raster::filled_mask(size, invasions, Offset::ZERO);
    raster::subtract(&mut invasion_mask, &spheroid_mask);
    AreaMasks {
        spheroid: spheroid_mask,
        invasion: invasion_mask,
    }
}

/// Masks and statistics in one step.
#[must_use]
pub fn area_stats(
    filename: &str,
    size: Dimensions,
    spheroid: &Contour,
    invasions: &[Contour],
) -> AreaStats {
    let masks = area_masks(size, spheroid, invasions);
    AreaStats::from_masks(filename, &masks.spheroid, &masks.invasion)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::Point;

    fn square(x: i32, y: i32, side: i32) -> Contour {
        Contour::new(vec![
            Point::new(x, y),
            Point::new(x + side - 1, y),
            Point::new(x + side - 1, y + side - 1),
            Point::new(x, y + side - 1),
        ])
    }

    const SIZE: Dimensions = Dimensions {
        width: 100,
        height: 100,
    };

    #[test]
    fn spheroid_only() {
        let stats = area_stats("a.png", SIZE, &square(10, 10, 20), &[]);
        assert_eq!(stats.filename, "a.png");
        assert_eq!(stats.spheroid_area, 400);
        assert_eq!(stats.invasion_area, 0);
        assert_eq!(stats.total_area, 400);
        assert_eq!(stats.invasion_ratio, Some(0.0));
    }

    #[test]
    fn invasion_overlap_with_spheroid_is_excluded() {
        // Invasion square half inside the spheroid.
        let stats = area_stats(
            "b.png",
            SIZE,
            &square(10, 10, 20),
            &[square(20, 10, 20), square(60, 60, 5)],
        );
        assert_eq!(stats.spheroid_area, 400);
        assert_eq!(stats.invasion_area, 200 + 25);
        assert_eq!(stats.total_area, 625);
        let ratio = stats.invasion_ratio.unwrap();
        assert!((ratio - 225.0 / 400.0).abs() < 1e-12);
    }

    #[test]
    fn overlapping_invasions_are_counted_once() {
        let stats = area_stats(
            "c.png",
            SIZE,
            &square(0, 0, 2),
            &[square(50, 50, 10), square(55, 50, 10)],
        );
        assert_eq!(stats.invasion_area, 150);
    }

    #[test]
    fn empty_spheroid_has_undefined_ratio() {
        let blank = GrayImage::new(10, 10);
        let invasion = GrayImage::from_pixel(10, 10, image::Luma([255]));
        let stats = AreaStats::from_masks("d.png", &blank, &invasion);
        assert_eq!(stats.spheroid_area, 0);
        assert_eq!(stats.invasion_area, 100);
        assert!(stats.invasion_ratio.is_none());
    }
}
