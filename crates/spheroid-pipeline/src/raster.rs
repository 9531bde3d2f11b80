//! Rasterizing contours back into binary buffers.
//!
//! The refiner and the area statistics both need contours turned into
//! pixels again: as thick outlines (join and kill steps), as filled
//! polygons (masks and spheroid erasure), or both.

use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;

use crate::types::{Contour, Dimensions, Offset, Point};

/// Foreground value used for every mask this module produces.
pub const FOREGROUND: u8 = 255;

/// Draw the outlines of `contours`, shifted by `offset`, `width` pixels
/// thick, setting covered pixels of `target` to `value`.
///
/// Outlines are drawn one pixel wide and then dilated with a square
/// kernel, so the width is odd in practice (`2 * (width / 2) + 1`).
/// Pixels outside `target` are clipped.
pub fn draw_outlines(
    target: &mut GrayImage,
    contours: &[Contour],
    offset: Offset,
    width: u8,
    value: u8,
) {
    let (w, h) = target.dimensions();
    let mut lines = GrayImage::new(w, h);
    for contour in contours {
        trace_outline(&mut lines, &contour.translated(offset));
    }
    let radius = width / 2;
    let thick = if radius == 0 {
        lines
    } else {
        imageproc::morphology::dilate(&lines, Norm::LInf, radius)
    };
    paint_where(target, &thick, value);
}

/// Fill the interiors of `contours` (boundary included), shifted by
/// `offset`, setting covered pixels of `target` to `value`.
///
/// Degenerate contours with fewer than three distinct vertices have no
/// interior; their points and segments are drawn instead.
pub fn fill_polygons(target: &mut GrayImage, contours: &[Contour], offset: Offset, value: u8) {
    let (w, h) = target.dimensions();
    let mut mask = GrayImage::new(w, h);
    for contour in contours {
        let shifted = contour.translated(offset);
        let mut polygon = shifted.to_imageproc();
        // The fill routine rejects rings that repeat their first point.
        while polygon.len() > 1 && polygon.first() == polygon.last() {
            polygon.pop();
        }
        if polygon.len() >= 3 {
            imageproc::drawing::draw_polygon_mut(&mut mask, &polygon, Luma([FOREGROUND]));
        }
        trace_outline(&mut mask, &shifted);
    }
    paint_where(target, &mask, value);
}

/// A blank buffer with `contours` filled in.
#[must_use]
pub fn filled_mask(size: Dimensions, contours: &[Contour], offset: Offset) -> GrayImage {
    let mut mask = GrayImage::new(size.width, size.height);
    fill_polygons(&mut mask, contours, offset, FOREGROUND);
    mask
}

/// A blank buffer with the outlines of `contours` drawn `width` thick.
#[must_use]
pub fn outline_mask(
    size: Dimensions,
    contours: &[Contour],
    offset: Offset,
    width: u8,
) -> GrayImage {
    let mut mask = GrayImage::new(size.width, size.height);
    draw_outlines(&mut mask, contours, offset, width, FOREGROUND);
    mask
}

/// Morphological opening (erode, then dilate) with a disk of `radius`.
///
/// Removes foreground parts too thin to contain the disk.
#[must_use = "returns the opened image"]
pub fn open_disk(binary: &GrayImage, radius: u8) -> GrayImage {
    if radius == 0 {
        return binary.clone();
    }
    imageproc::morphology::open(binary, Norm::L2, radius)
}

/// Morphological closing (dilate, then erode) with a disk of `radius`.
#[must_use = "returns the closed image"]
pub fn close_disk(binary: &GrayImage, radius: u8) -> GrayImage {
    if radius == 0 {
        return binary.clone();
    }
    imageproc::morphology::close(binary, Norm::L2, radius)
}

/// Pixel-wise union of two same-sized masks.
#[must_use = "returns the union"]
pub fn union(a: &GrayImage, b: &GrayImage) -> GrayImage {
    let mut out = a.clone();
    paint_where(&mut out, b, FOREGROUND);
    out
}

/// Clear every pixel of `target` that is set in `mask`.
pub fn subtract(target: &mut GrayImage, mask: &GrayImage) {
    paint_where(target, mask, 0);
}

/// One-pixel closed outline of a contour, clipped to the buffer.
fn trace_outline(target: &mut GrayImage, contour: &Contour) {
    let points = contour.points();
    match points {
        [] => {}
        [p] => put_clipped(target, *p),
        _ => {
            let next = points.iter().cycle().skip(1);
            for (a, b) in points.iter().zip(next) {
                #[allow(clippy::cast_precision_loss)]
                let (start, end) = ((a.x as f32, a.y as f32), (b.x as f32, b.y as f32));
                imageproc::drawing::draw_line_segment_mut(target, start, end, Luma([FOREGROUND]));
            }
        }
    }
}

fn put_clipped(target: &mut GrayImage, p: Point) {
    if let (Ok(x), Ok(y)) = (u32::try_from(p.x), u32::try_from(p.y))
        && x < target.width()
        && y < target.height()
    {
        target.put_pixel(x, y, Luma([FOREGROUND]));
    }
}

/// Set `target` to `value` wherever `mask` is non-zero.
fn paint_where(target: &mut GrayImage, mask: &GrayImage, value: u8) {
    for (t, m) in target.pixels_mut().zip(mask.pixels()) {
        if m.0[0] != 0 {
            t.0[0] = value;
        }
    }
}
