//! Pipeline diagnostics: timing, counts, and other metrics for each stage.
//!
//! These diagnostics are permanent instrumentation for parameter tuning.
//! [`process_with_diagnostics`] drives the pipeline one stage at a time
//! and records what each stage did and how long it took.
//!
//! Time is read through the [`Clock`] trait so this crate stays free of
//! platform time sources; the caller supplies the implementation.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pipeline::{Advance, Pipeline, Stage};
use crate::refine::RefineRound;
use crate::trace::TraceSink;
use crate::types::{InvasionResult, PipelineConfig, PipelineError};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// A monotonic time source.
pub trait Clock {
    /// An opaque point in time.
    type Instant;

    /// The current instant.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// Diagnostics collected from a single pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Image the run analysed.
    pub filename: String,
    /// One entry per executed stage, in order.
    pub stages: Vec<StageDiagnostics>,
    /// Total wall-clock duration of the entire pipeline (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary counts across all stages.
    pub summary: PipelineSummary,
}

/// Diagnostics for a single pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Stage name (e.g. `"threshold"`).
    pub stage: String,
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics (counts, sizes, etc.).
    pub metrics: StageMetrics,
}

/// Stage-specific metrics that vary by pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Image decoding metrics.
    Load {
        /// Size of the input image bytes.
        input_bytes: usize,
        /// Decoded image width in pixels.
        width: u32,
        /// Decoded image height in pixels.
        height: u32,
        /// Total pixel count (`width * height`).
        pixel_count: u64,
    },
    /// Contrast stretch metrics.
    Normalize {
        /// Darkest input intensity.
        low: u8,
        /// Brightest input intensity.
        high: u8,
        /// Whether intensities were inverted afterwards.
        inverted: bool,
    },
    /// First thresholding pass and contour extraction.
    Threshold {
        /// Percentile used for the cutoff.
        percentile: f64,
        /// Resulting intensity cutoff.
        threshold: u8,
        /// Foreground pixels after binarization.
        foreground_pixels: u64,
        /// External contours found.
        contour_count: usize,
    },
    /// Spheroid selection.
    SpheroidSelection {
        /// Contours considered.
        candidate_count: usize,
        /// Enclosed area of the chosen contour.
        area: f64,
        /// Circularity of the chosen contour, if defined.
        circularity: Option<f64>,
        /// Whether the largest-contour fallback was used.
        fallback: bool,
    },
    /// Region-of-interest crop.
    Crop {
        /// Left edge in the original image.
        x: i32,
        /// Top edge in the original image.
        y: i32,
        /// Crop width.
        width: i32,
        /// Crop height.
        height: i32,
    },
    /// Spheroid erasure inside the crop.
    Erase {
        /// Crop pixels cleared.
        erased_pixels: u64,
    },
    /// Second thresholding pass inside the crop.
    Rebinarize {
        /// Resulting intensity cutoff.
        threshold: u8,
        /// Foreground pixels after binarization.
        foreground_pixels: u64,
    },
    /// Find-join-kill refinement.
    Refine {
        /// Counts per round.
        rounds: Vec<RefineRound>,
        /// Surviving contours.
        survivors: usize,
    },
    /// Proximity ranking.
    Rank {
        /// Contours scored.
        candidate_count: usize,
        /// Contours reported.
        reported: usize,
        /// Score of the best contour.
        best_score: Option<f64>,
    },
    /// Final masks and statistics.
    Finalize {
        /// Spheroid area in pixels.
        spheroid_area: u64,
        /// Invasion area in pixels.
        invasion_area: u64,
    },
}

/// High-level summary for the entire pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Source image width in pixels.
    pub image_width: u32,
    /// Source image height in pixels.
    pub image_height: u32,
    /// Total pixel count.
    pub pixel_count: u64,
    /// Number of invasion contours reported.
    pub invasion_count: usize,
    /// Invasion area over spheroid area, if defined.
    pub invasion_ratio: Option<f64>,
}

impl PipelineDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!(
            "Pipeline Diagnostics Report: {}\n{}",
            self.filename,
            "=".repeat(60)
        ));
        lines.push(format!(
            "Image: {}x{} ({} pixels)",
            self.summary.image_width, self.summary.image_height, self.summary.pixel_count,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        for diag in &self.stages {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{:<24} {ms:>8.3}ms {pct:>9.1}%  {details}", diag.stage));
        }

        lines.push(String::new());
        let ratio = self
            .summary
            .invasion_ratio
            .map_or_else(|| "undefined".to_string(), |r| format!("{r:.4}"));
        lines.push(format!(
            "Invasions: {}  |  Invasion ratio: {ratio}",
            self.summary.invasion_count,
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Load {
            input_bytes,
            width,
            height,
            ..
        } => format!("{input_bytes} bytes -> {width}x{height}"),
        StageMetrics::Normalize {
            low,
            high,
            inverted,
        } => {
            let inv = if *inverted { " inverted" } else { "" };
            format!("{low}..{high} -> 0..255{inv}")
        }
        StageMetrics::Threshold {
            percentile,
            threshold,
            foreground_pixels,
            contour_count,
        } => format!(
            "p{percentile} -> {threshold}, {foreground_pixels} px, {contour_count} contours"
        ),
        StageMetrics::SpheroidSelection {
            candidate_count,
            area,
            circularity,
            fallback,
        } => {
            let circ = circularity.map_or_else(|| "n/a".to_string(), |c| format!("{c:.3}"));
            let how = if *fallback { "largest" } else { "circle" };
            format!("{how} of {candidate_count}, area={area:.1} circularity={circ}")
        }
        StageMetrics::Crop {
            x,
            y,
            width,
            height,
        } => format!("{width}x{height} at ({x}, {y})"),
        StageMetrics::Erase { erased_pixels } => format!("{erased_pixels} px cleared"),
        StageMetrics::Rebinarize {
            threshold,
            foreground_pixels,
        } => format!("-> {threshold}, {foreground_pixels} px"),
        StageMetrics::Refine { rounds, survivors } => {
            let per_round: Vec<String> = rounds
                .iter()
                .map(|r| format!("{}/{}/{}", r.found, r.joined, r.survived))
                .collect();
            format!("rounds [{}] -> {survivors}", per_round.join(" "))
        }
        StageMetrics::Rank {
            candidate_count,
            reported,
            best_score,
        } => {
            let best = best_score.map_or_else(|| "n/a".to_string(), |s| format!("{s:.2}"));
            format!("{reported} of {candidate_count}, best score={best}")
        }
        StageMetrics::Finalize {
            spheroid_area,
            invasion_area,
        } => format!("spheroid={spheroid_area} px invasion={invasion_area} px"),
    }
}

/// Run the pipeline stage by stage, collecting per-stage diagnostics.
///
/// # Errors
///
/// Returns the first [`PipelineError`] raised by any stage.
pub fn process_with_diagnostics<C: Clock>(
    image_bytes: &[u8],
    config: &PipelineConfig,
    filename: &str,
    clock: &C,
    trace: &mut dyn TraceSink,
) -> Result<(InvasionResult, PipelineDiagnostics), PipelineError> {
    let run_start = clock.now();
    let mut stages = Vec::new();
    let mut stage: Stage = Pipeline::new(image_bytes.to_vec(), config.clone(), filename).into();

    loop {
        let stage_start = clock.now();
        match stage.advance(trace)? {
            Advance::Next(next) => {
                let duration = clock.elapsed(&stage_start);
                if let Some(metrics) = next.metrics() {
                    stages.push(StageDiagnostics {
                        stage: next.name().to_string(),
                        duration,
                        metrics,
                    });
                }
                stage = next;
            }
            Advance::Complete(done) => {
                stage = done;
                break;
            }
        }
    }

    let result = stage.complete(trace)?;
    let total_duration = clock.elapsed(&run_start);
    let summary = PipelineSummary {
        image_width: result.dimensions.width,
        image_height: result.dimensions.height,
        pixel_count: result.dimensions.pixel_count(),
        invasion_count: result.invasions.len(),
        invasion_ratio: result.stats.invasion_ratio,
    };
    let diagnostics = PipelineDiagnostics {
        filename: filename.to_owned(),
        stages,
        total_duration,
        summary,
    };
    Ok((result, diagnostics))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::trace::NoopTrace;

    /// Deterministic clock: every reading advances by one millisecond.
    struct StepClock(Cell<u64>);

    impl Clock for StepClock {
        type Instant = u64;

        fn now(&self) -> u64 {
            let t = self.0.get();
            self.0.set(t + 1);
            t
        }

        fn elapsed(&self, since: &u64) -> Duration {
            Duration::from_millis(self.now() - since)
        }
    }

    fn disk_png() -> Vec<u8> {
        let mut img = image::GrayImage::new(80, 80);
        imageproc::drawing::draw_filled_circle_mut(&mut img, (40, 40), 12, image::Luma([255]));
        let mut buf = Vec::new();
        image::DynamicImage::ImageLuma8(img)
            .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn duration_ms_converts_correctly() {
        assert!((duration_ms(Duration::from_millis(1500)) - 1500.0).abs() < 1e-9);
    }

    #[test]
    fn every_stage_is_reported_in_order() {
        let clock = StepClock(Cell::new(0));
        let (result, diagnostics) = process_with_diagnostics(
            &disk_png(),
            &PipelineConfig::default(),
            "disk.png",
            &clock,
            &mut NoopTrace,
        )
        .unwrap();

        let names: Vec<&str> = diagnostics.stages.iter().map(|s| s.stage.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "load",
                "normalize",
                "threshold",
                "spheroid",
                "crop",
                "erase",
                "rebinarize",
                "refine",
                "rank",
                "finalize",
            ]
        );
        assert!(diagnostics.stages.iter().all(|s| s.duration > Duration::ZERO));
        assert!(diagnostics.total_duration >= diagnostics.stages[0].duration);
        assert_eq!(diagnostics.summary.image_width, 80);
        assert_eq!(diagnostics.summary.invasion_count, result.invasions.len());
    }

    #[test]
    fn report_and_json_mention_every_stage() {
        let clock = StepClock(Cell::new(0));
        let (_, diagnostics) = process_with_diagnostics(
            &disk_png(),
            &PipelineConfig::default(),
            "disk.png",
            &clock,
            &mut NoopTrace,
        )
        .unwrap();
        let report = diagnostics.report();
        assert!(report.contains("disk.png"));
        assert!(report.contains("refine"));
        assert!(report.contains("80x80"));

        let json = serde_json::to_string(&diagnostics).unwrap();
        let back: PipelineDiagnostics = serde_json::from_str(&json).unwrap();
        assert_eq!(back.stages.len(), diagnostics.stages.len());
        assert_eq!(back.stages[2].metrics, diagnostics.stages[2].metrics);
    }

    #[test]
    fn failing_stage_propagates_error() {
        let clock = StepClock(Cell::new(0));
        let result =
            process_with_diagnostics(&[], &PipelineConfig::default(), "x", &clock, &mut NoopTrace);
        assert!(matches!(result, Err(PipelineError::EmptyInput)));
    }
}
