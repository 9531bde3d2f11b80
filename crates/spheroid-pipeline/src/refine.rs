//! Find-join-kill refinement of fragmented foreground.
//!
//! A thresholded invasion region is usually a cloud of small fragments:
//! pieces of the same ray broken by noise, plus isolated speckle. Each
//! round of the refiner
//!
//! 1. **finds** the external contours of the current buffer,
//! 2. **joins** them by stroking their outlines and closing the result
//!    with a disk, so fragments a few pixels apart fuse into one blob,
//! 3. **kills** all but the largest joined contours.
//!
//! The survivors, stroked and filled, become the next round's input.
//! Each round can only shrink the candidate set.

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::contour::find_external_contours;
use crate::raster;
use crate::shape::contour_area;
use crate::trace::TraceSink;
use crate::types::{Contour, Dimensions, Offset, RefineConfig};

/// Counts observed during one find-join-kill round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefineRound {
    /// Contours found in the round's input buffer.
    pub found: usize,
    /// Contours left after joining.
    pub joined: usize,
    /// Contours that survived the kill step.
    pub survived: usize,
}

/// Outcome of [`refine`]: the surviving contours plus per-round counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refinement {
    /// Final surviving contours, largest first.
    pub contours: Vec<Contour>,
    /// One entry per round actually run.
    pub rounds: Vec<RefineRound>,
}

/// How many of `count` contours survive a kill step.
///
/// `floor(count × fraction)`, but never fewer than one while any
/// contour exists.
#[must_use]
pub fn survivor_count(count: usize, fraction: f64) -> usize {
    if count == 0 {
        return 0;
    }
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    let kept = (count as f64 * fraction.clamp(0.0, 1.0)).floor() as usize;
    kept.clamp(1, count)
}

/// Keep the largest contours by enclosed area.
///
/// Ties keep their extraction order.
#[must_use]
pub fn kill(contours: Vec<Contour>, fraction: f64) -> Vec<Contour> {
    let keep = survivor_count(contours.len(), fraction);
    let mut by_area: Vec<(f64, Contour)> = contours
        .into_iter()
        .map(|c| (contour_area(&c), c))
        .collect();
    by_area.sort_by(|a, b| b.0.total_cmp(&a.0));
    by_area.truncate(keep);
    by_area.into_iter().map(|(_, c)| c).collect()
}

/// Stroke `contours`, close the strokes with a disk and re-extract.
///
/// Returns the closed buffer alongside the joined contours.
#[must_use]
pub fn join(
    contours: &[Contour],
    size: Dimensions,
    config: &RefineConfig,
) -> (GrayImage, Vec<Contour>) {
    let strokes = raster::outline_mask(size, contours, Offset::ZERO, config.stroke_width);
    let closed = raster::close_disk(&strokes, config.closing_radius);
    let joined = find_external_contours(&closed);
    (closed, joined)
}

/// Run the refiner, returning only the surviving contours.
#[must_use]
pub fn find_join_kill(
    binary: &GrayImage,
    config: &RefineConfig,
    trace: &mut dyn TraceSink,
) -> Vec<Contour> {
    refine(binary, config, trace).contours
}

/// Run the refiner on a binary buffer.
///
/// With zero iterations the buffer's own external contours are returned.
/// A round whose input has no foreground ends refinement with an empty
/// set.
#[must_use]
pub fn refine(
    binary: &GrayImage,
    config: &RefineConfig,
    trace: &mut dyn TraceSink,
) -> Refinement {
    let size = Dimensions::of(binary);
    let mut current = binary.clone();
    let mut contours = if config.iterations == 0 {
        find_external_contours(binary)
    } else {
        Vec::new()
    };
    let mut rounds = Vec::with_capacity(config.iterations);

    for round in 0..config.iterations {
        let found = find_external_contours(&current);
        if found.is_empty() {
            log::debug!("refine round {round}: nothing to join");
            return Refinement {
                contours: Vec::new(),
                rounds,
            };
        }
        if trace.enabled() {
            let strokes = raster::outline_mask(size, &found, Offset::ZERO, config.stroke_width);
            trace.record("contours detected", &strokes);
        }

        let (closed, joined) = join(&found, size, config);
        trace.record("morphological closing", &closed);
        if trace.enabled() {
            let outlines = raster::outline_mask(size, &joined, Offset::ZERO, config.stroke_width);
            trace.record("joined contours", &outlines);
        }

        let joined_count = joined.len();
        let survivors = kill(joined, config.survival_fraction);
        let outlines = raster::outline_mask(size, &survivors, Offset::ZERO, config.stroke_width);
        trace.record("contours after elimination step", &outlines);

        let interiors = raster::filled_mask(size, &survivors, Offset::ZERO);
        let filled = raster::union(&outlines, &interiors);
        trace.record("contours filled-in", &filled);

        log::debug!(
            "refine round {round}: {} found, {joined_count} joined, {} kept",
            found.len(),
            survivors.len(),
        );
        rounds.push(RefineRound {
            found: found.len(),
            joined: joined_count,
            survived: survivors.len(),
        });
        current = filled;
        contours = survivors;
    }

    Refinement { contours, rounds }
}
