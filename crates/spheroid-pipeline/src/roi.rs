//! Region-of-interest cropping around a reference contour.
//!
//! The spheroid's bounding box is zoomed out about its center by a scale
//! factor and clamped to the image. Clamping trims the far edge instead
//! of shifting the origin, so a spheroid near a border gets an
//! asymmetric crop.

use image::{ImageBuffer, Pixel};

use crate::types::{Contour, Dimensions, Offset, Region};

/// A crop rectangle and the bookkeeping to move between frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Roi {
    /// The crop rectangle in original-image coordinates.
    pub region: Region,
}

impl Roi {
    /// Translation from the original frame into the crop's local frame.
    #[must_use]
    pub const fn offset(&self) -> Offset {
        Offset::new(-self.region.x, -self.region.y)
    }

    /// Translation from the crop's local frame back to the original frame.
    #[must_use]
    pub const fn to_original(&self) -> Offset {
        self.offset().negate()
    }

    /// Crop dimensions.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: u32::try_from(self.region.width).unwrap_or(0),
            height: u32::try_from(self.region.height).unwrap_or(0),
        }
    }
}

/// Zoomed-out, clamped bounding region of `contour` inside an image of
/// size `bounds`. Returns `None` for an empty contour.
#[must_use]
pub fn roi_for(contour: &Contour, bounds: Dimensions, scale: f64) -> Option<Roi> {
    let bbox = contour.bounding_box()?;
    let (width, height) = (i64::from(bounds.width), i64::from(bounds.height));

    let (x, w) = scale_axis(bbox.x, bbox.width, scale, width);
    let (y, h) = scale_axis(bbox.y, bbox.height, scale, height);

    let region = Region {
        x: i32::try_from(x).ok()?,
        y: i32::try_from(y).ok()?,
        width: i32::try_from(w).ok()?,
        height: i32::try_from(h).ok()?,
    };
    log::debug!("roi {bbox:?} x{scale} -> {region:?}");
    Some(Roi { region })
}

/// Scale one axis of a box about its center and clamp it to `[0, limit)`.
///
/// Returns the new start and extent.
fn scale_axis(start: i32, extent: i32, scale: f64, limit: i64) -> (i64, i64) {
    let center = f64::from(start) + f64::from(extent) / 2.0;
    let scaled = f64::from(extent) * scale;
    #[allow(clippy::cast_possible_truncation)]
    let origin = (center - scaled / 2.0).trunc() as i64;
    #[allow(clippy::cast_possible_truncation)]
    let extent = scaled.trunc() as i64;

    let origin = origin.clamp(0, (limit - 1).max(0));
    let extent = extent.clamp(1, limit.max(1)).min(limit - origin).max(0);
    (origin, extent)
}

/// Copy the pixels of `region` out of `image`.
///
/// Works for any pixel type, so grayscale working buffers and the RGBA
/// original share one implementation. The region is clipped to the
/// image.
#[must_use = "returns the cropped image"]
pub fn crop<P>(
    image: &ImageBuffer<P, Vec<P::Subpixel>>,
    region: Region,
) -> ImageBuffer<P, Vec<P::Subpixel>>
where
    P: Pixel + 'static,
{
    let x = u32::try_from(region.x).unwrap_or(0);
    let y = u32::try_from(region.y).unwrap_or(0);
    let w = u32::try_from(region.width).unwrap_or(0);
    let h = u32::try_from(region.height).unwrap_or(0);
    image::imageops::crop_imm(image, x, y, w, h).to_image()
}
