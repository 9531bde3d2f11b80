//! spheroid-pipeline: Pure spheroid invasion analysis pipeline (sans-IO).
//!
//! Finds a tumour spheroid in a microscopy image and the invasive
//! structures growing out of it, through:
//! contrast normalize -> percentile threshold -> spheroid selection ->
//! ROI crop -> spheroid erase -> rethreshold -> find-join-kill refinement
//! -> proximity ranking -> area statistics.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! byte slices and returns structured data. Files, tables and overlays
//! live in `spheroid-export` and the `spheroid` CLI.

pub mod contour;
pub mod diagnostics;
pub mod distance;
pub mod grayscale;
pub mod normalize;
pub mod pipeline;
pub mod raster;
pub mod refine;
pub mod roi;
pub mod shape;
pub mod stats;
pub mod threshold;
pub mod trace;
pub mod types;

pub use contour::{ContourTracer, ContourTracerKind};
pub use diagnostics::{Clock, PipelineDiagnostics, StageMetrics, process_with_diagnostics};
pub use distance::{RankedContour, contour_distance};
pub use pipeline::Pipeline;
pub use roi::Roi;
pub use stats::{AreaMasks, AreaStats};
pub use trace::{MemoryTrace, NoopTrace, TraceSink};
pub use types::{
    Contour, Dimensions, InvasionResult, Offset, PipelineConfig, PipelineError, Point,
    RefineConfig, Region,
};

/// Run the full invasion analysis on one image.
///
/// Takes raw image bytes (PNG, JPEG, BMP, TIFF, WebP), a configuration
/// and a display name for the statistics record, and produces an
/// [`InvasionResult`] with every contour in the original frame.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `image_bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the image format is unrecognized.
/// Returns [`PipelineError::NoSpheroid`] if thresholding finds no foreground.
pub fn process(
    image_bytes: &[u8],
    config: &PipelineConfig,
    filename: &str,
) -> Result<InvasionResult, PipelineError> {
    process_traced(image_bytes, config, filename, &mut NoopTrace)
}

/// [`process`], handing every intermediate buffer to `trace`.
///
/// # Errors
///
/// Same as [`process`].
pub fn process_traced(
    image_bytes: &[u8],
    config: &PipelineConfig,
    filename: &str,
    trace: &mut dyn TraceSink,
) -> Result<InvasionResult, PipelineError> {
    let result = Pipeline::new(image_bytes.to_vec(), config.clone(), filename)
        .load(trace)?
        .normalize(trace)
        .binarize(trace)
        .select_spheroid(trace)?
        .crop(trace)
        .erase_spheroid(trace)
        .rebinarize(trace)
        .refine(trace)
        .rank(trace)
        .finalize(trace)
        .into_result();
    Ok(result)
}
