//! Integration test: synthetic spheroid images through the full pipeline.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::f64::consts::PI;

use image::{GrayImage, Luma};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut};
use imageproc::rect::Rect;
use spheroid_pipeline::{MemoryTrace, Offset, PipelineConfig, contour_distance};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn encode(img: GrayImage) -> Vec<u8> {
    let mut buf = Vec::new();
    image::DynamicImage::ImageLuma8(img)
        .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

fn disk_image() -> GrayImage {
    let mut img = GrayImage::new(200, 200);
    draw_filled_circle_mut(&mut img, (100, 100), 20, Luma([255]));
    img
}

#[test]
fn lone_spheroid_has_no_invasion() {
    init_logging();
    let png = encode(disk_image());
    let result = spheroid_pipeline::process(&png, &PipelineConfig::default(), "disk.png")
        .expect("pipeline should succeed");

    let expected = PI * 20.0 * 20.0;
    #[allow(clippy::cast_precision_loss)]
    let spheroid = result.stats.spheroid_area as f64;
    assert!(
        (spheroid - expected).abs() / expected < 0.05,
        "spheroid area {spheroid}, expected about {expected}"
    );
    assert_eq!(result.stats.invasion_area, 0);
    assert_eq!(result.stats.total_area, result.stats.spheroid_area);
    assert_eq!(result.stats.invasion_ratio, Some(0.0));
    assert!(result.invasions.is_empty());
}

fn decoy_contour() -> spheroid_pipeline::Contour {
    let mut decoy = GrayImage::new(200, 200);
    draw_filled_circle_mut(&mut decoy, (20, 180), 8, Luma([255]));
    spheroid_pipeline::contour::find_external_contours(&decoy)
        .into_iter()
        .next()
        .unwrap()
}

#[test]
fn strand_extending_from_spheroid_edge_is_an_invasion() {
    init_logging();
    let mut img = disk_image();
    // Strand growing out of the disk's right edge (x = 120).
    draw_filled_rect_mut(&mut img, Rect::at(119, 99).of_size(41, 3), Luma([255]));
    // Small decoy far outside the search region.
    draw_filled_circle_mut(&mut img, (20, 180), 8, Luma([255]));
    let png = encode(img);

    let mut trace = MemoryTrace::new();
    let result = spheroid_pipeline::process_traced(
        &png,
        &PipelineConfig::default(),
        "strand.png",
        &mut trace,
    )
    .expect("pipeline should succeed");

    // The spheroid is the disk alone, not the disk plus its strand.
    let bbox = result.spheroid.bounding_box().unwrap();
    assert!((79..=81).contains(&bbox.x), "spheroid picked wrong: {bbox:?}");
    assert!(bbox.width <= 43, "strand merged into spheroid: {bbox:?}");
    let expected = PI * 20.0 * 20.0;
    #[allow(clippy::cast_precision_loss)]
    let spheroid = result.stats.spheroid_area as f64;
    assert!((spheroid - expected).abs() / expected < 0.05, "spheroid area {spheroid}");

    assert!(result.stats.invasion_area > 0);
    assert!(result.stats.invasion_ratio.unwrap() > 0.0);
    assert_eq!(result.invasions.len(), 1);

    let strand = &result.invasions[0];
    let strand_box = strand.contour.bounding_box().unwrap();
    assert!(strand_box.x >= 118, "invasion not in original frame: {strand_box:?}");
    assert!(strand_box.x + strand_box.width >= 155, "{strand_box:?}");
    assert!(strand.distance < 6.0, "distance {}", strand.distance);

    // Closer to the spheroid than to the decoy, which is never a candidate.
    let to_decoy = contour_distance(&strand.contour, &decoy_contour(), Offset::ZERO);
    assert!(strand.distance < to_decoy, "{} vs {to_decoy}", strand.distance);
    let decoy_box = result
        .invasions
        .iter()
        .filter_map(|r| r.contour.bounding_box())
        .find(|b| b.x < 40 && b.y > 160);
    assert!(decoy_box.is_none());

    assert!(trace.get("morphological opening").is_some());
    assert!(trace.get("spheroid erased").is_some());
    assert!(trace.get("contours after elimination step").is_some());
}

#[test]
fn strand_detached_from_spheroid_is_an_invasion() {
    init_logging();
    let mut img = disk_image();
    // Strand starting 3 px right of the disk edge.
    draw_filled_rect_mut(&mut img, Rect::at(124, 99).of_size(41, 3), Luma([255]));
    let result = spheroid_pipeline::process(&encode(img), &PipelineConfig::default(), "gap.png")
        .expect("pipeline should succeed");

    let bbox = result.spheroid.bounding_box().unwrap();
    assert!((79..=81).contains(&bbox.x), "{bbox:?}");
    assert!(result.stats.invasion_area > 0);
    assert_eq!(result.invasions.len(), 1);
    assert!(result.invasions[0].distance < 6.0);

    // The decoy lies outside the crop.
    let roi = result.roi.region;
    assert!(roi.x > 28 || roi.y + roi.height < 172, "{roi:?}");
}

#[test]
fn decoy_distance_is_far_from_spheroid() {
    init_logging();
    let disk_contours = spheroid_pipeline::contour::find_external_contours(&disk_image());
    assert_eq!(disk_contours.len(), 1);

    let d = contour_distance(&decoy_contour(), &disk_contours[0], Offset::ZERO);
    // Centers are about 113 px apart; subtract both radii.
    assert!(d > 80.0 && d < 90.0, "distance {d}");
}

#[test]
fn uniform_image_fails_without_spheroid() {
    init_logging();
    let png = encode(GrayImage::from_pixel(32, 32, Luma([77])));
    let err = spheroid_pipeline::process(&png, &PipelineConfig::default(), "flat.png")
        .expect_err("flat image has no foreground");
    assert!(matches!(err, spheroid_pipeline::PipelineError::NoSpheroid));
}
