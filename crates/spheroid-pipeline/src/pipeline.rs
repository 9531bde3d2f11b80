//! Incremental pipeline: advance stage-by-stage, inspecting each
//! intermediate result before continuing.
//!
//! Unlike [`crate::process`] which runs the entire analysis in one call,
//! [`Pipeline`] lets the caller drive execution one step at a time:
//!
//! ```rust
//! # use spheroid_pipeline::{NoopTrace, Pipeline, PipelineConfig, PipelineError};
//! # fn run(png: Vec<u8>) -> Result<(), PipelineError> {
//! let trace = &mut NoopTrace;
//! let result = Pipeline::new(png, PipelineConfig::default(), "well-a1.png")
//!     .load(trace)?
//!     .normalize(trace)
//!     .binarize(trace)
//!     .select_spheroid(trace)?
//!     .crop(trace)
//!     .erase_spheroid(trace)
//!     .rebinarize(trace)
//!     .refine(trace)
//!     .rank(trace)
//!     .finalize(trace)
//!     .into_result();
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next pipeline state
//! (or `Result` for fallible stages), carrying forward only what later
//! stages need. Every transition hands its output buffer to the supplied
//! [`TraceSink`].

use crate::diagnostics::StageMetrics;
use crate::distance::{self, RankedContour};
use crate::raster;
use crate::refine::Refinement;
use crate::roi::{self, Roi};
use crate::shape;
use crate::stats::{self, AreaMasks, AreaStats};
use crate::threshold;
use crate::trace::TraceSink;
use crate::types::{
    Contour, Dimensions, GrayImage, InvasionResult, Offset, PipelineConfig, PipelineError,
    Region, RgbaImage,
};

/// State carried unchanged through every stage after loading.
struct Carry {
    config: PipelineConfig,
    filename: String,
    source_len: usize,
    original: RgbaImage,
    dimensions: Dimensions,
}

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Pipeline state before any processing has occurred.
///
/// Call [`load`](Self::load) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing — call .load() to continue"]
pub struct Pending {
    config: PipelineConfig,
    filename: String,
    source: Vec<u8>,
}

impl Pending {
    /// The raw source image bytes.
    #[must_use]
    pub fn source(&self) -> &[u8] {
        &self.source
    }

    /// Decode the source image and advance to the [`Loaded`] stage.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptyInput`] if the source bytes are
    /// empty. Returns [`PipelineError::ImageDecode`] if the image
    /// format is unrecognized or the data is corrupt.
    pub fn load(self, trace: &mut dyn TraceSink) -> Result<Loaded, PipelineError> {
        let image = crate::grayscale::decode(&self.source)?;
        let (original, gray) = crate::grayscale::split_original_and_gray(&image);
        log::debug!(
            "{}: loaded {}x{}",
            self.filename,
            original.width(),
            original.height()
        );
        trace.record("input", &gray);
        Ok(Loaded {
            carry: Carry {
                config: self.config,
                filename: self.filename,
                source_len: self.source.len(),
                dimensions: Dimensions::of(&original),
                original,
            },
            gray,
        })
    }
}

// ───────────────────────── Stage 1: Loaded ───────────────────────────

/// Pipeline state after decoding: RGBA original plus grayscale copy.
///
/// Call [`normalize`](Self::normalize) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing — call .normalize() to continue"]
pub struct Loaded {
    carry: Carry,
    gray: GrayImage,
}

impl Loaded {
    /// The decoded RGBA image.
    #[must_use]
    pub const fn original(&self) -> &RgbaImage {
        &self.carry.original
    }

    /// The grayscale working copy.
    #[must_use]
    pub const fn gray(&self) -> &GrayImage {
        &self.gray
    }

    /// Stretch contrast (and optionally invert), advancing to
    /// [`Normalized`].
    pub fn normalize(self, trace: &mut dyn TraceSink) -> Normalized {
        let range = crate::normalize::intensity_range(&self.gray);
        let stretched = crate::normalize::stretch_contrast(&self.gray);
        let normalized = if self.carry.config.invert {
            crate::normalize::invert(&stretched)
        } else {
            stretched
        };
        trace.record("normalized", &normalized);
        Normalized {
            carry: self.carry,
            range,
            normalized,
        }
    }
}

// ───────────────────────── Stage 2: Normalized ───────────────────────

/// Pipeline state after contrast stretching.
///
/// Call [`binarize`](Self::binarize) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing — call .binarize() to continue"]
pub struct Normalized {
    carry: Carry,
    range: Option<(u8, u8)>,
    normalized: GrayImage,
}

impl Normalized {
    /// The contrast-stretched buffer.
    #[must_use]
    pub const fn normalized(&self) -> &GrayImage {
        &self.normalized
    }

    /// Percentile-threshold the whole image, open it with the core disk
    /// and extract external contours, advancing to [`Binarized`].
    pub fn binarize(self, trace: &mut dyn TraceSink) -> Binarized {
        let percentile = self.carry.config.percentile;
        let threshold = threshold::percentile_value(&self.normalized, percentile);
        let binary = threshold::binarize(&self.normalized, threshold);
        trace.record("thresholding", &binary);

        let core_radius = self.carry.config.core_radius;
        let contours = if core_radius == 0 {
            crate::contour::find_external_contours(&binary)
        } else {
            let opened = raster::open_disk(&binary, core_radius);
            trace.record("morphological opening", &opened);
            crate::contour::find_external_contours(&opened)
        };
        if trace.enabled() {
            let outlines =
                raster::outline_mask(self.carry.dimensions, &contours, Offset::ZERO, 1);
            trace.record("contour detection", &outlines);
        }
        log::debug!(
            "{}: threshold {threshold}, {} contours",
            self.carry.filename,
            contours.len()
        );
        Binarized {
            carry: self.carry,
            normalized: self.normalized,
            threshold,
            binary,
            contours,
        }
    }
}

// ───────────────────────── Stage 3: Binarized ────────────────────────

/// Pipeline state after the first thresholding pass.
///
/// Call [`select_spheroid`](Self::select_spheroid) to advance. This is a
/// fallible step: it returns `Err` if no contours were found.
#[must_use = "pipeline stages are consumed by advancing — call .select_spheroid() to continue"]
pub struct Binarized {
    carry: Carry,
    normalized: GrayImage,
    threshold: u8,
    binary: GrayImage,
    contours: Vec<Contour>,
}

impl Binarized {
    /// The binary foreground mask.
    #[must_use]
    pub const fn binary(&self) -> &GrayImage {
        &self.binary
    }

    /// External contours of the foreground.
    #[must_use]
    pub fn contours(&self) -> &[Contour] {
        &self.contours
    }

    /// Pick the spheroid, advancing to [`SpheroidSelected`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NoSpheroid`] if the foreground has no
    /// contours.
    pub fn select_spheroid(
        self,
        trace: &mut dyn TraceSink,
    ) -> Result<SpheroidSelected, PipelineError> {
        let threshold = self.carry.config.circularity_threshold;
        let Some(spheroid) = shape::select_spheroid(&self.contours, threshold).cloned() else {
            log::warn!("{}: no foreground contours", self.carry.filename);
            return Err(PipelineError::NoSpheroid);
        };
        let circularity = shape::circularity(&spheroid);
        let fallback = !shape::is_circle(&spheroid, threshold);

        if trace.enabled() {
            let mut overlay = self.normalized.clone();
            raster::draw_outlines(
                &mut overlay,
                std::slice::from_ref(&spheroid),
                Offset::ZERO,
                self.carry.config.refine.stroke_width,
                raster::FOREGROUND,
            );
            trace.record("spheroid", &overlay);
        }
        Ok(SpheroidSelected {
            carry: self.carry,
            normalized: self.normalized,
            threshold: self.threshold,
            candidate_count: self.contours.len(),
            spheroid,
            circularity,
            fallback,
        })
    }
}

// ───────────────────────── Stage 4: SpheroidSelected ─────────────────

/// Pipeline state after the spheroid has been chosen.
///
/// Call [`crop`](Self::crop) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing — call .crop() to continue"]
pub struct SpheroidSelected {
    carry: Carry,
    normalized: GrayImage,
    threshold: u8,
    candidate_count: usize,
    spheroid: Contour,
    circularity: Option<f64>,
    fallback: bool,
}

impl SpheroidSelected {
    /// The spheroid boundary in original coordinates.
    #[must_use]
    pub const fn spheroid(&self) -> &Contour {
        &self.spheroid
    }

    /// Circularity of the spheroid, if defined.
    #[must_use]
    pub const fn circularity(&self) -> Option<f64> {
        self.circularity
    }

    /// Crop the zoomed-out spheroid region, advancing to [`Cropped`].
    pub fn crop(self, trace: &mut dyn TraceSink) -> Cropped {
        let dims = self.carry.dimensions;
        let roi = roi::roi_for(&self.spheroid, dims, self.carry.config.crop_scale)
            .unwrap_or_else(|| whole_image(dims));
        let cropped = roi::crop(&self.normalized, roi.region);
        trace.record("cropped", &cropped);
        Cropped {
            carry: self.carry,
            spheroid: self.spheroid,
            roi,
            cropped,
        }
    }
}

/// A region covering the full image.
fn whole_image(dims: Dimensions) -> Roi {
    Roi {
        region: Region {
            x: 0,
            y: 0,
            width: i32::try_from(dims.width).unwrap_or(i32::MAX),
            height: i32::try_from(dims.height).unwrap_or(i32::MAX),
        },
    }
}

// ───────────────────────── Stage 5: Cropped ──────────────────────────

/// Pipeline state after cropping the search region.
///
/// Call [`erase_spheroid`](Self::erase_spheroid) to advance.
#[must_use = "pipeline stages are consumed by advancing — call .erase_spheroid() to continue"]
pub struct Cropped {
    carry: Carry,
    spheroid: Contour,
    roi: Roi,
    cropped: GrayImage,
}

impl Cropped {
    /// The crop rectangle and offsets.
    #[must_use]
    pub const fn roi(&self) -> &Roi {
        &self.roi
    }

    /// The cropped normalized buffer.
    #[must_use]
    pub const fn cropped(&self) -> &GrayImage {
        &self.cropped
    }

    /// Paint the spheroid (interior and a stroked rim) black inside the
    /// crop, advancing to [`SpheroidErased`].
    pub fn erase_spheroid(self, trace: &mut dyn TraceSink) -> SpheroidErased {
        let spheroid = std::slice::from_ref(&self.spheroid);
        let offset = self.roi.offset();
        let lit_before = threshold::foreground_count(&self.cropped);
        let mut erased = self.cropped;
        raster::fill_polygons(&mut erased, spheroid, offset, 0);
        raster::draw_outlines(
            &mut erased,
            spheroid,
            offset,
            self.carry.config.refine.stroke_width,
            0,
        );
        trace.record("spheroid erased", &erased);
        SpheroidErased {
            carry: self.carry,
            spheroid: self.spheroid,
            roi: self.roi,
            erased_pixels: lit_before.saturating_sub(threshold::foreground_count(&erased)),
            erased,
        }
    }
}

// ───────────────────────── Stage 6: SpheroidErased ───────────────────

/// Pipeline state after the spheroid has been removed from the crop.
///
/// Call [`rebinarize`](Self::rebinarize) to advance.
#[must_use = "pipeline stages are consumed by advancing — call .rebinarize() to continue"]
pub struct SpheroidErased {
    carry: Carry,
    spheroid: Contour,
    roi: Roi,
    erased_pixels: u64,
    erased: GrayImage,
}

impl SpheroidErased {
    /// The crop with the spheroid cleared.
    #[must_use]
    pub const fn erased(&self) -> &GrayImage {
        &self.erased
    }

    /// Threshold the erased crop, advancing to [`Rebinarized`].
    pub fn rebinarize(self, trace: &mut dyn TraceSink) -> Rebinarized {
        let threshold = threshold::percentile_value(&self.erased, self.carry.config.percentile);
        let binary = threshold::binarize(&self.erased, threshold);
        trace.record("invasion thresholding", &binary);
        Rebinarized {
            carry: self.carry,
            spheroid: self.spheroid,
            roi: self.roi,
            threshold,
            binary,
        }
    }
}

// ───────────────────────── Stage 7: Rebinarized ──────────────────────

/// Pipeline state after thresholding the invasion region.
///
/// Call [`refine`](Self::refine) to advance.
#[must_use = "pipeline stages are consumed by advancing — call .refine() to continue"]
pub struct Rebinarized {
    carry: Carry,
    spheroid: Contour,
    roi: Roi,
    threshold: u8,
    binary: GrayImage,
}

impl Rebinarized {
    /// The binary invasion candidates, in crop coordinates.
    #[must_use]
    pub const fn binary(&self) -> &GrayImage {
        &self.binary
    }

    /// Run find-join-kill, advancing to [`Refined`].
    pub fn refine(self, trace: &mut dyn TraceSink) -> Refined {
        let refinement = crate::refine::refine(&self.binary, &self.carry.config.refine, trace);
        Refined {
            carry: self.carry,
            spheroid: self.spheroid,
            roi: self.roi,
            refinement,
        }
    }
}

// ───────────────────────── Stage 8: Refined ──────────────────────────

/// Pipeline state after refinement.
///
/// Call [`rank`](Self::rank) to advance.
#[must_use = "pipeline stages are consumed by advancing — call .rank() to continue"]
pub struct Refined {
    carry: Carry,
    spheroid: Contour,
    roi: Roi,
    refinement: Refinement,
}

impl Refined {
    /// Surviving contours, in crop coordinates.
    #[must_use]
    pub fn candidates(&self) -> &[Contour] {
        &self.refinement.contours
    }

    /// Score candidates by size and proximity to the spheroid, advancing
    /// to [`Ranked`].
    pub fn rank(self, trace: &mut dyn TraceSink) -> Ranked {
        let candidate_count = self.refinement.contours.len();
        let invasions = distance::rank_invasions(
            self.refinement.contours,
            &self.spheroid,
            self.roi.to_original(),
            self.carry.config.top_k,
        );
        if trace.enabled() {
            let contours: Vec<Contour> = invasions.iter().map(|r| r.contour.clone()).collect();
            let outlines = raster::outline_mask(
                self.roi.dimensions(),
                &contours,
                Offset::ZERO,
                self.carry.config.refine.stroke_width,
            );
            trace.record("ranked invasions", &outlines);
        }
        Ranked {
            carry: self.carry,
            spheroid: self.spheroid,
            roi: self.roi,
            candidate_count,
            invasions,
        }
    }
}

// ───────────────────────── Stage 9: Ranked ───────────────────────────

/// Pipeline state after ranking.
///
/// Call [`finalize`](Self::finalize) to advance to the final stage.
#[must_use = "pipeline stages are consumed by advancing — call .finalize() to continue"]
pub struct Ranked {
    carry: Carry,
    spheroid: Contour,
    roi: Roi,
    candidate_count: usize,
    invasions: Vec<RankedContour>,
}

impl Ranked {
    /// Reported invasion contours, in crop coordinates, best first.
    #[must_use]
    pub fn invasions(&self) -> &[RankedContour] {
        &self.invasions
    }

    /// Move invasions to the original frame and count areas, advancing
    /// to [`Finalized`].
    pub fn finalize(self, trace: &mut dyn TraceSink) -> Finalized {
        let to_original = self.roi.to_original();
        let invasions: Vec<RankedContour> = self
            .invasions
            .into_iter()
            .map(|r| RankedContour {
                contour: r.contour.translated(to_original),
                ..r
            })
            .collect();
        let contours: Vec<Contour> = invasions.iter().map(|r| r.contour.clone()).collect();
        let masks = stats::area_masks(self.carry.dimensions, &self.spheroid, &contours);
        let stats = AreaStats::from_masks(&self.carry.filename, &masks.spheroid, &masks.invasion);
        trace.record("spheroid mask", &masks.spheroid);
        trace.record("invasion mask", &masks.invasion);
        log::debug!(
            "{}: spheroid {} px, invasion {} px",
            self.carry.filename,
            stats.spheroid_area,
            stats.invasion_area
        );
        Finalized {
            carry: self.carry,
            spheroid: self.spheroid,
            roi: self.roi,
            invasions,
            masks,
            stats,
        }
    }
}

// ───────────────────────── Stage 10: Finalized ───────────────────────

/// Pipeline state after the statistics are computed. This is the final stage.
///
/// Call [`into_result`](Self::into_result) to extract the
/// [`InvasionResult`].
#[must_use = "call .into_result() to extract the InvasionResult"]
pub struct Finalized {
    carry: Carry,
    spheroid: Contour,
    roi: Roi,
    invasions: Vec<RankedContour>,
    masks: AreaMasks,
    stats: AreaStats,
}

impl Finalized {
    /// The statistics record.
    #[must_use]
    pub const fn stats(&self) -> &AreaStats {
        &self.stats
    }

    /// Consume the pipeline and return the [`InvasionResult`].
    #[must_use]
    pub fn into_result(self) -> InvasionResult {
        InvasionResult {
            original: self.carry.original,
            dimensions: self.carry.dimensions,
            spheroid: self.spheroid,
            invasions: self.invasions,
            roi: self.roi,
            masks: self.masks,
            stats: self.stats,
        }
    }
}

// ──────────────────── PipelineStage trait + Stage enum ────────────────

/// Total number of stages in the pipeline.
pub const STAGE_COUNT: usize = 11;

/// The output produced by a single pipeline stage.
///
/// Each variant borrows the data that the corresponding stage computed.
#[must_use]
pub enum StageOutput<'a> {
    /// Source image bytes (not yet decoded).
    Source {
        /// The raw image bytes.
        bytes: &'a [u8],
    },
    /// Decoded image.
    Loaded {
        /// The RGBA original.
        original: &'a RgbaImage,
        /// The grayscale working copy.
        gray: &'a GrayImage,
    },
    /// Contrast-stretched buffer.
    Normalized {
        /// The normalized buffer.
        normalized: &'a GrayImage,
    },
    /// First thresholding pass.
    Binarized {
        /// The foreground mask.
        binary: &'a GrayImage,
        /// Its external contours.
        contours: &'a [Contour],
    },
    /// The selected spheroid.
    SpheroidSelected {
        /// The spheroid boundary.
        spheroid: &'a Contour,
    },
    /// The search region.
    Cropped {
        /// The crop rectangle.
        roi: &'a Roi,
        /// The cropped buffer.
        cropped: &'a GrayImage,
    },
    /// The crop with the spheroid cleared.
    SpheroidErased {
        /// The erased buffer.
        erased: &'a GrayImage,
    },
    /// Second thresholding pass.
    Rebinarized {
        /// The invasion foreground mask.
        binary: &'a GrayImage,
    },
    /// Find-join-kill survivors.
    Refined {
        /// Surviving contours, crop coordinates.
        candidates: &'a [Contour],
    },
    /// Ranked invasions.
    Ranked {
        /// Reported contours, crop coordinates.
        invasions: &'a [RankedContour],
    },
    /// Final statistics.
    Finalized {
        /// The statistics record.
        stats: &'a AreaStats,
        /// Reported contours, original coordinates.
        invasions: &'a [RankedContour],
    },
}

/// Trait implemented by every pipeline stage, enabling uniform iteration.
///
/// Both the typed API (individual stage structs) and the dynamic API
/// ([`Stage`] enum) are available. This trait bridges the two: each
/// stage struct implements it, and [`Stage`] delegates to whichever
/// variant it holds.
///
/// # Loop pattern
///
/// ```rust
/// # use spheroid_pipeline::{NoopTrace, Pipeline, PipelineConfig, PipelineError};
/// # use spheroid_pipeline::pipeline::{Stage, Advance};
/// # fn run(png: Vec<u8>) -> Result<(), PipelineError> {
/// let trace = &mut NoopTrace;
/// let mut stage: Stage = Pipeline::new(png, PipelineConfig::default(), "a.png").into();
/// loop {
///     match stage.advance(trace)? {
///         Advance::Next(next) => stage = next,
///         Advance::Complete(done) => { stage = done; break; }
///     }
/// }
/// let result = stage.complete(trace)?;
/// # Ok(())
/// # }
/// ```
pub trait PipelineStage: Sized {
    /// Human-readable name of this stage (e.g. `"source"`, `"refine"`).
    const NAME: &str;

    /// Zero-based index of this stage (`0` for Pending through `10` for
    /// Finalized).
    const INDEX: usize;

    /// The output this stage produced.
    fn output(&self) -> StageOutput<'_>;

    /// Stage-specific metrics for diagnostics.
    ///
    /// Returns `None` for the initial [`Pending`] stage which has not
    /// yet performed any processing.
    fn metrics(&self) -> Option<StageMetrics>;

    /// Advance to the next stage.
    ///
    /// Returns `Ok(Some(stage))` on success, `Ok(None)` if already at
    /// the final stage, or `Err` if the stage transition fails.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptyInput`] or
    /// [`PipelineError::ImageDecode`] when decoding fails, and
    /// [`PipelineError::NoSpheroid`] when the first thresholding pass
    /// finds nothing.
    fn next(self, trace: &mut dyn TraceSink) -> Result<Option<Stage>, PipelineError>;

    /// Run all remaining stages to completion and return the final
    /// [`InvasionResult`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if any remaining fallible stage fails.
    fn complete(self, trace: &mut dyn TraceSink) -> Result<InvasionResult, PipelineError>;
}

impl PipelineStage for Pending {
    const NAME: &str = "source";
    const INDEX: usize = 0;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Source {
            bytes: &self.source,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        None
    }

    fn next(self, trace: &mut dyn TraceSink) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Loaded(self.load(trace)?)))
    }

    fn complete(self, trace: &mut dyn TraceSink) -> Result<InvasionResult, PipelineError> {
        self.load(trace)?.complete(trace)
    }
}

impl PipelineStage for Loaded {
    const NAME: &str = "load";
    const INDEX: usize = 1;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Loaded {
            original: &self.carry.original,
            gray: &self.gray,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        let dims = self.carry.dimensions;
        Some(StageMetrics::Load {
            input_bytes: self.carry.source_len,
            width: dims.width,
            height: dims.height,
            pixel_count: dims.pixel_count(),
        })
    }

    fn next(self, trace: &mut dyn TraceSink) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Normalized(self.normalize(trace))))
    }

    fn complete(self, trace: &mut dyn TraceSink) -> Result<InvasionResult, PipelineError> {
        self.normalize(trace).complete(trace)
    }
}

impl PipelineStage for Normalized {
    const NAME: &str = "normalize";
    const INDEX: usize = 2;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Normalized {
            normalized: &self.normalized,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        let (low, high) = self.range.unwrap_or((0, 0));
        Some(StageMetrics::Normalize {
            low,
            high,
            inverted: self.carry.config.invert,
        })
    }

    fn next(self, trace: &mut dyn TraceSink) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Binarized(self.binarize(trace))))
    }

    fn complete(self, trace: &mut dyn TraceSink) -> Result<InvasionResult, PipelineError> {
        self.binarize(trace).complete(trace)
    }
}

impl PipelineStage for Binarized {
    const NAME: &str = "threshold";
    const INDEX: usize = 3;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Binarized {
            binary: &self.binary,
            contours: &self.contours,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Threshold {
            percentile: self.carry.config.percentile,
            threshold: self.threshold,
            foreground_pixels: threshold::foreground_count(&self.binary),
            contour_count: self.contours.len(),
        })
    }

    fn next(self, trace: &mut dyn TraceSink) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::SpheroidSelected(self.select_spheroid(trace)?)))
    }

    fn complete(self, trace: &mut dyn TraceSink) -> Result<InvasionResult, PipelineError> {
        self.select_spheroid(trace)?.complete(trace)
    }
}

impl PipelineStage for SpheroidSelected {
    const NAME: &str = "spheroid";
    const INDEX: usize = 4;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::SpheroidSelected {
            spheroid: &self.spheroid,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::SpheroidSelection {
            candidate_count: self.candidate_count,
            area: shape::contour_area(&self.spheroid),
            circularity: self.circularity,
            fallback: self.fallback,
        })
    }

    fn next(self, trace: &mut dyn TraceSink) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Cropped(self.crop(trace))))
    }

    fn complete(self, trace: &mut dyn TraceSink) -> Result<InvasionResult, PipelineError> {
        self.crop(trace).complete(trace)
    }
}

impl PipelineStage for Cropped {
    const NAME: &str = "crop";
    const INDEX: usize = 5;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Cropped {
            roi: &self.roi,
            cropped: &self.cropped,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        let r = self.roi.region;
        Some(StageMetrics::Crop {
            x: r.x,
            y: r.y,
            width: r.width,
            height: r.height,
        })
    }

    fn next(self, trace: &mut dyn TraceSink) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::SpheroidErased(self.erase_spheroid(trace))))
    }

    fn complete(self, trace: &mut dyn TraceSink) -> Result<InvasionResult, PipelineError> {
        self.erase_spheroid(trace).complete(trace)
    }
}

impl PipelineStage for SpheroidErased {
    const NAME: &str = "erase";
    const INDEX: usize = 6;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::SpheroidErased {
            erased: &self.erased,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Erase {
            erased_pixels: self.erased_pixels,
        })
    }

    fn next(self, trace: &mut dyn TraceSink) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Rebinarized(self.rebinarize(trace))))
    }

    fn complete(self, trace: &mut dyn TraceSink) -> Result<InvasionResult, PipelineError> {
        self.rebinarize(trace).complete(trace)
    }
}

impl PipelineStage for Rebinarized {
    const NAME: &str = "rebinarize";
    const INDEX: usize = 7;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Rebinarized {
            binary: &self.binary,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Rebinarize {
            threshold: self.threshold,
            foreground_pixels: threshold::foreground_count(&self.binary),
        })
    }

    fn next(self, trace: &mut dyn TraceSink) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Refined(self.refine(trace))))
    }

    fn complete(self, trace: &mut dyn TraceSink) -> Result<InvasionResult, PipelineError> {
        self.refine(trace).complete(trace)
    }
}

impl PipelineStage for Refined {
    const NAME: &str = "refine";
    const INDEX: usize = 8;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Refined {
            candidates: &self.refinement.contours,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Refine {
            rounds: self.refinement.rounds.clone(),
            survivors: self.refinement.contours.len(),
        })
    }

    fn next(self, trace: &mut dyn TraceSink) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Ranked(self.rank(trace))))
    }

    fn complete(self, trace: &mut dyn TraceSink) -> Result<InvasionResult, PipelineError> {
        self.rank(trace).complete(trace)
    }
}

impl PipelineStage for Ranked {
    const NAME: &str = "rank";
    const INDEX: usize = 9;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Ranked {
            invasions: &self.invasions,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Rank {
            candidate_count: self.candidate_count,
            reported: self.invasions.len(),
            best_score: self.invasions.first().map(|r| r.score),
        })
    }

    fn next(self, trace: &mut dyn TraceSink) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Finalized(self.finalize(trace))))
    }

    fn complete(self, trace: &mut dyn TraceSink) -> Result<InvasionResult, PipelineError> {
        Ok(self.finalize(trace).into_result())
    }
}

impl PipelineStage for Finalized {
    const NAME: &str = "finalize";
    const INDEX: usize = 10;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Finalized {
            stats: &self.stats,
            invasions: &self.invasions,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Finalize {
            spheroid_area: self.stats.spheroid_area,
            invasion_area: self.stats.invasion_area,
        })
    }

    fn next(self, _trace: &mut dyn TraceSink) -> Result<Option<Stage>, PipelineError> {
        Ok(None)
    }

    fn complete(self, _trace: &mut dyn TraceSink) -> Result<InvasionResult, PipelineError> {
        Ok(self.into_result())
    }
}

/// Enum wrapping all pipeline stages for uniform, loopable access.
///
/// Use [`From`] conversions to enter the dynamic API from any typed
/// stage, then call [`advance`](Self::advance) in a loop.
#[must_use]
pub enum Stage {
    /// See [`Pending`].
    Pending(Pending),
    /// See [`Loaded`].
    Loaded(Loaded),
    /// See [`Normalized`].
    Normalized(Normalized),
    /// See [`Binarized`].
    Binarized(Binarized),
    /// See [`SpheroidSelected`].
    SpheroidSelected(SpheroidSelected),
    /// See [`Cropped`].
    Cropped(Cropped),
    /// See [`SpheroidErased`].
    SpheroidErased(SpheroidErased),
    /// See [`Rebinarized`].
    Rebinarized(Rebinarized),
    /// See [`Refined`].
    Refined(Refined),
    /// See [`Ranked`].
    Ranked(Ranked),
    /// See [`Finalized`].
    Finalized(Finalized),
}

/// Compile-time guard: if a [`Stage`] variant is added, this match becomes
/// non-exhaustive and the build fails, a reminder to bump [`STAGE_COUNT`].
#[allow(dead_code, clippy::match_same_arms)]
const fn _stage_count_guard(s: &Stage) {
    match s {
        Stage::Pending(_)
        | Stage::Loaded(_)
        | Stage::Normalized(_)
        | Stage::Binarized(_)
        | Stage::SpheroidSelected(_)
        | Stage::Cropped(_)
        | Stage::SpheroidErased(_)
        | Stage::Rebinarized(_)
        | Stage::Refined(_)
        | Stage::Ranked(_)
        | Stage::Finalized(_) => {}
    }
}

/// Result of [`Stage::advance`]: either the next stage or the
/// completed final stage returned unchanged.
#[must_use]
pub enum Advance {
    /// The pipeline advanced to this next stage.
    Next(Stage),
    /// The pipeline was already at the final stage, returned unchanged.
    Complete(Stage),
}

/// Delegate a method call to whichever `Stage` variant is active.
macro_rules! delegate {
    ($self:ident, $method:ident $(, $arg:expr)*) => {
        match $self {
            Self::Pending(s) => s.$method($($arg),*),
            Self::Loaded(s) => s.$method($($arg),*),
            Self::Normalized(s) => s.$method($($arg),*),
            Self::Binarized(s) => s.$method($($arg),*),
            Self::SpheroidSelected(s) => s.$method($($arg),*),
            Self::Cropped(s) => s.$method($($arg),*),
            Self::SpheroidErased(s) => s.$method($($arg),*),
            Self::Rebinarized(s) => s.$method($($arg),*),
            Self::Refined(s) => s.$method($($arg),*),
            Self::Ranked(s) => s.$method($($arg),*),
            Self::Finalized(s) => s.$method($($arg),*),
        }
    };
}

impl Stage {
    /// Human-readable name of the current stage.
    #[must_use]
    pub fn name(&self) -> &'static str {
        delegate!(self, name)
    }

    /// Zero-based index of the current stage.
    #[must_use]
    pub fn index(&self) -> usize {
        delegate!(self, index)
    }

    /// The output this stage produced.
    pub fn output(&self) -> StageOutput<'_> {
        delegate!(self, output)
    }

    /// Stage-specific metrics for diagnostics.
    #[must_use]
    pub fn metrics(&self) -> Option<StageMetrics> {
        delegate!(self, metrics)
    }

    /// Whether the pipeline is at the final stage.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        matches!(self, Self::Finalized(_))
    }

    /// Advance to the next stage.
    ///
    /// Returns `Ok(Some(next_stage))` on success, `Ok(None)` if
    /// already complete (the `Finalized` value is consumed), or `Err` if
    /// the transition fails.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if a fallible stage transition fails.
    pub fn next(self, trace: &mut dyn TraceSink) -> Result<Option<Self>, PipelineError> {
        delegate!(self, next, trace)
    }

    /// Advance to the next stage, returning `self` unchanged if
    /// already complete.
    ///
    /// This is the loop-friendly version of [`next`](Self::next).
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if a fallible stage transition fails.
    pub fn advance(self, trace: &mut dyn TraceSink) -> Result<Advance, PipelineError> {
        if self.is_complete() {
            return Ok(Advance::Complete(self));
        }
        // Non-complete stages always return Ok(Some(_)) from next().
        #[allow(clippy::unreachable)]
        let next = self
            .next(trace)?
            .unwrap_or_else(|| unreachable!("non-complete stage returned None from next()"));
        Ok(Advance::Next(next))
    }

    /// Run all remaining stages to completion.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if any remaining fallible stage fails.
    pub fn complete(self, trace: &mut dyn TraceSink) -> Result<InvasionResult, PipelineError> {
        delegate!(self, complete, trace)
    }
}

// Private helper trait so the macro can call `.name()` and `.index()` on
// `&self`; associated constants are not callable via `self.NAME`.
trait StageMetadata {
    fn name(&self) -> &'static str;
    fn index(&self) -> usize;
}

impl<T: PipelineStage> StageMetadata for T {
    fn name(&self) -> &'static str {
        T::NAME
    }

    fn index(&self) -> usize {
        T::INDEX
    }
}

macro_rules! stage_from {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Stage {
                fn from(s: $variant) -> Self {
                    Self::$variant(s)
                }
            }
        )*
    };
}

stage_from!(
    Pending,
    Loaded,
    Normalized,
    Binarized,
    SpheroidSelected,
    Cropped,
    SpheroidErased,
    Rebinarized,
    Refined,
    Ranked,
    Finalized,
);

// ───────────────────── Pipeline entry point ──────────────────────────

/// Incremental invasion pipeline.
///
/// Created via [`Pipeline::new`], which stores the source image, config
/// and a display name without doing any processing. Each stage method
/// consumes the current state and returns the next, making it a
/// compile-time error to skip stages or call them out of order.
pub struct Pipeline;

impl Pipeline {
    /// Create a new pipeline from source image bytes and config.
    ///
    /// `filename` labels log lines and the statistics record.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(
        image_bytes: Vec<u8>,
        config: PipelineConfig,
        filename: impl Into<String>,
    ) -> Pending {
        Pending {
            config,
            filename: filename.into(),
            source: image_bytes,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::trace::{MemoryTrace, NoopTrace};

    /// PNG with a filled disk of `radius` at the center of a dark field.
    fn disk_png(size: u32, radius: i32) -> Vec<u8> {
        let mut img = image::GrayImage::from_pixel(size, size, image::Luma([10]));
        let c = i32::try_from(size / 2).unwrap();
        imageproc::drawing::draw_filled_circle_mut(&mut img, (c, c), radius, image::Luma([240]));
        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        image::ImageEncoder::write_image(
            encoder,
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::L8,
        )
        .unwrap();
        buf
    }

    fn uniform_png() -> Vec<u8> {
        let img = image::GrayImage::from_pixel(20, 20, image::Luma([128]));
        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        image::ImageEncoder::write_image(
            encoder,
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::L8,
        )
        .unwrap();
        buf
    }

    // ─────────── Typed API tests ─────────────────────────────────

    #[test]
    fn pending_exposes_source_bytes() {
        let png = disk_png(40, 8);
        let expected_len = png.len();
        let pending = Pipeline::new(png, PipelineConfig::default(), "a.png");
        assert_eq!(pending.source().len(), expected_len);
    }

    #[test]
    fn load_empty_input_returns_error() {
        let result = Pipeline::new(vec![], PipelineConfig::default(), "a.png").load(&mut NoopTrace);
        assert!(matches!(result, Err(PipelineError::EmptyInput)));
    }

    #[test]
    fn load_corrupt_input_returns_error() {
        let pending = Pipeline::new(vec![0xFF, 0x00], PipelineConfig::default(), "a.png");
        let result = pending.load(&mut NoopTrace);
        assert!(matches!(result, Err(PipelineError::ImageDecode(_))));
    }

    #[test]
    fn normalize_stretches_to_full_range() {
        let trace = &mut NoopTrace;
        let normalized = Pipeline::new(disk_png(40, 8), PipelineConfig::default(), "a.png")
            .load(trace)
            .unwrap()
            .normalize(trace);
        assert_eq!(
            crate::normalize::intensity_range(normalized.normalized()),
            Some((0, 255))
        );
    }

    #[test]
    fn uniform_image_has_no_spheroid() {
        let trace = &mut NoopTrace;
        let binarized = Pipeline::new(uniform_png(), PipelineConfig::default(), "flat.png")
            .load(trace)
            .unwrap()
            .normalize(trace)
            .binarize(trace);
        assert!(binarized.contours().is_empty());
        assert!(matches!(
            binarized.select_spheroid(trace),
            Err(PipelineError::NoSpheroid)
        ));
    }

    #[test]
    fn crop_surrounds_the_spheroid() {
        let trace = &mut NoopTrace;
        let cropped = Pipeline::new(disk_png(120, 10), PipelineConfig::default(), "a.png")
            .load(trace)
            .unwrap()
            .normalize(trace)
            .binarize(trace)
            .select_spheroid(trace)
            .unwrap()
            .crop(trace);
        let r = cropped.roi().region;
        // 21 px disk zoomed x3 about (60, 60).
        assert!(r.x > 20 && r.x < 40, "{r:?}");
        assert!((60..=66).contains(&r.width), "{r:?}");
        assert_eq!(cropped.cropped().width(), u32::try_from(r.width).unwrap());
    }

    #[test]
    fn erasing_removes_the_whole_spheroid() {
        let trace = &mut NoopTrace;
        let erased = Pipeline::new(disk_png(120, 10), PipelineConfig::default(), "a.png")
            .load(trace)
            .unwrap()
            .normalize(trace)
            .binarize(trace)
            .select_spheroid(trace)
            .unwrap()
            .crop(trace)
            .erase_spheroid(trace);
        assert!(erased.erased().pixels().all(|p| p.0[0] == 0));
    }

    // ─────────── Dynamic API tests ───────────────────────────────

    #[test]
    fn stage_loop_visits_every_stage_in_order() {
        let trace = &mut NoopTrace;
        let mut stage: Stage =
            Pipeline::new(disk_png(60, 8), PipelineConfig::default(), "a.png").into();
        let mut seen = vec![(stage.index(), stage.name())];
        loop {
            match stage.advance(trace).unwrap() {
                Advance::Next(next) => {
                    seen.push((next.index(), next.name()));
                    stage = next;
                }
                Advance::Complete(done) => {
                    stage = done;
                    break;
                }
            }
        }
        assert_eq!(seen.len(), STAGE_COUNT);
        assert!(seen.iter().enumerate().all(|(i, (index, _))| i == *index));
        assert_eq!(seen.last().map(|(_, n)| *n), Some("finalize"));
        assert!(stage.metrics().is_some());
        let result = stage.complete(trace).unwrap();
        assert_eq!(result.stats.filename, "a.png");
    }

    #[test]
    fn pending_has_no_metrics() {
        let stage: Stage =
            Pipeline::new(disk_png(20, 4), PipelineConfig::default(), "a.png").into();
        assert!(stage.metrics().is_none());
        assert!(matches!(stage.output(), StageOutput::Source { .. }));
    }

    #[test]
    fn complete_from_pending_matches_typed_chain() {
        let png = disk_png(60, 8);
        let config = PipelineConfig::default();
        let trace = &mut NoopTrace;
        let via_stage = Stage::from(Pipeline::new(png.clone(), config.clone(), "a.png"))
            .complete(trace)
            .unwrap();
        let via_chain = Pipeline::new(png, config, "a.png")
            .load(trace)
            .unwrap()
            .normalize(trace)
            .binarize(trace)
            .select_spheroid(trace)
            .unwrap()
            .crop(trace)
            .erase_spheroid(trace)
            .rebinarize(trace)
            .refine(trace)
            .rank(trace)
            .finalize(trace)
            .into_result();
        assert_eq!(via_stage.stats, via_chain.stats);
        assert_eq!(via_stage.spheroid, via_chain.spheroid);
    }

    #[test]
    fn trace_records_stage_labels_in_order() {
        let mut trace = MemoryTrace::new();
        let _ = Pipeline::new(disk_png(60, 8), PipelineConfig::default(), "a.png")
            .load(&mut trace)
            .unwrap()
            .normalize(&mut trace)
            .binarize(&mut trace)
            .select_spheroid(&mut trace)
            .unwrap()
            .crop(&mut trace)
            .erase_spheroid(&mut trace)
            .rebinarize(&mut trace);
        assert_eq!(
            trace.labels(),
            vec![
                "input",
                "normalized",
                "thresholding",
                "morphological opening",
                "contour detection",
                "spheroid",
                "cropped",
                "spheroid erased",
                "invasion thresholding",
            ]
        );
    }
}
