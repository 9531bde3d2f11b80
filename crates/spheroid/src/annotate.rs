//! Annotated output images: contours stroked over the original with
//! `tiny-skia`, which handles sub-pixel positioning and AA.

use image::{Rgba, RgbaImage};
use spheroid_pipeline::{Contour, InvasionResult, Offset};
use tiny_skia::{LineCap, LineJoin, Paint, PathBuilder, Pixmap, Stroke, Transform};

/// Spheroid outline colour.
const SPHEROID_COLOR: [u8; 3] = [255, 0, 255];
/// Invasion outline colour.
const INVASION_COLOR: [u8; 3] = [0, 255, 255];
/// Outline width in pixels.
const LINE_WIDTH: f32 = 3.0;

/// The original image with the spheroid and invasion contours drawn on it.
#[must_use]
pub fn annotate(result: &InvasionResult) -> RgbaImage {
    let invasions: Vec<&Contour> = result.invasions.iter().map(|r| &r.contour).collect();
    draw_contours(&result.original, &result.spheroid, &invasions, Offset::ZERO)
}

/// The search region of the original image, contours drawn in its frame.
#[must_use]
pub fn annotate_crop(result: &InvasionResult) -> RgbaImage {
    let cropped = spheroid_pipeline::roi::crop(&result.original, result.roi.region);
    let invasions: Vec<&Contour> = result.invasions.iter().map(|r| &r.contour).collect();
    draw_contours(&cropped, &result.spheroid, &invasions, result.roi.offset())
}

/// Stroke the contours (shifted by `offset`) over a copy of `base`.
#[must_use]
pub fn draw_contours(
    base: &RgbaImage,
    spheroid: &Contour,
    invasions: &[&Contour],
    offset: Offset,
) -> RgbaImage {
    let mut out = base.clone();
    let layers = [
        (vec![spheroid], SPHEROID_COLOR),
        (invasions.to_vec(), INVASION_COLOR),
    ];
    let (width, height) = out.dimensions();
    for (contours, color) in layers {
        if let Some(overlay) = render_outlines(&contours, offset, color, width, height) {
            composite_over(&mut out, &overlay);
        }
    }
    out
}

/// Render closed outlines in one colour on a transparent background.
///
/// Returns `None` when nothing drawable remains.
#[allow(clippy::cast_precision_loss)]
fn render_outlines(
    contours: &[&Contour],
    offset: Offset,
    color: [u8; 3],
    width: u32,
    height: u32,
) -> Option<RgbaImage> {
    let mut pb = PathBuilder::new();
    for contour in contours {
        let mut points = contour.points().iter().map(|p| p.translated(offset));
        let Some(first) = points.next() else {
            continue;
        };
        pb.move_to(first.x as f32, first.y as f32);
        for p in points {
            pb.line_to(p.x as f32, p.y as f32);
        }
        pb.close();
    }
    let path = pb.finish()?;

    let stroke = Stroke {
        width: LINE_WIDTH,
        line_cap: LineCap::Round,
        line_join: LineJoin::Round,
        ..Stroke::default()
    };
    let mut paint = Paint::default();
    paint.set_color_rgba8(color[0], color[1], color[2], 255);
    paint.anti_alias = true;

    let mut pixmap = Pixmap::new(width, height)?;
    pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);

    // Convert the pixmap (premultiplied RGBA) to an `RgbaImage` (straight RGBA).
    let data = pixmap.data();
    let mut img = RgbaImage::new(width, height);
    for (pixel, px) in img.pixels_mut().zip(data.chunks_exact(4)) {
        let a = px[3];
        if a == 0 {
            continue;
        }
        let unmul = |c: u8| u8::try_from(u16::from(c) * 255 / u16::from(a)).unwrap_or(u8::MAX);
        *pixel = Rgba([unmul(px[0]), unmul(px[1]), unmul(px[2]), a]);
    }
    Some(img)
}

/// Alpha-blend `overlay` onto `base` in place.
fn composite_over(base: &mut RgbaImage, overlay: &RgbaImage) {
    for (dst, src) in base.pixels_mut().zip(overlay.pixels()) {
        let a = u16::from(src.0[3]);
        if a == 0 {
            continue;
        }
        let blend = |s: u8, d: u8| {
            let v = (u16::from(s) * a + u16::from(d) * (255 - a)) / 255;
            u8::try_from(v).unwrap_or(u8::MAX)
        };
        *dst = Rgba([
            blend(src.0[0], dst.0[0]),
            blend(src.0[1], dst.0[1]),
            blend(src.0[2], dst.0[2]),
            dst.0[3].max(src.0[3]),
        ]);
    }
}
