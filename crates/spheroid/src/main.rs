//! spheroid: batch spheroid invasion quantification.
//!
//! Runs the invasion pipeline on every input image in parallel, writing
//! per image:
//!
//! - `<key>_annotated.png`: the original with the spheroid outlined in
//!   magenta and the invasion contours in cyan
//! - `<key>_crop.png` (`--crop-output`): the searched region only
//! - `<key>.svg` (`--svg`): the contours as an SVG overlay
//!
//! and one delimited area table for the whole batch. `<key>` is the file
//! stem, or `<stem>-<position>` when several inputs share a stem; the
//! same key names the image's trace subdirectory.
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin spheroid -- [OPTIONS] <IMAGES>...
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod annotate;
mod error;
mod trace_dir;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use clap::Parser;
use rayon::prelude::*;
use spheroid_pipeline::diagnostics::{Clock, PipelineDiagnostics};
use spheroid_pipeline::{AreaStats, NoopTrace, PipelineConfig, RefineConfig, TraceSink};

use crate::error::CliError;
use crate::trace_dir::DirTrace;

/// Measure spheroid and invasion areas in microscopy images.
///
/// Each image is analysed independently; images that cannot be decoded
/// or contain no spheroid are skipped with a warning.
#[derive(Parser)]
#[command(name = "spheroid", version)]
struct Cli {
    /// Input images (PNG, JPEG, BMP, TIFF, WebP).
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Directory for annotated images and the area table.
    #[arg(long, default_value = "results")]
    out_dir: PathBuf,

    /// Area table path [default: <OUT_DIR>/areas.csv].
    #[arg(long)]
    table: Option<PathBuf>,

    /// Table field delimiter.
    #[arg(long, default_value_t = ',')]
    delimiter: char,

    /// Dump every intermediate buffer as numbered PNGs under this
    /// directory, one subdirectory per run and image.
    #[arg(long)]
    trace_dir: Option<PathBuf>,

    /// Also write the annotated search region as `<key>_crop.png`.
    #[arg(long)]
    crop_output: bool,

    /// Also write the contours as `<key>.svg`.
    #[arg(long)]
    svg: bool,

    /// Print per-stage timing and metrics for each image.
    #[arg(long)]
    diagnostics: bool,

    /// Print diagnostics as JSON instead of a human-readable report.
    #[arg(long, requires = "diagnostics")]
    json: bool,

    /// Percentile cutoff for both thresholding passes.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_PERCENTILE)]
    percentile: f64,

    /// Minimum circularity for the spheroid.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_CIRCULARITY_THRESHOLD)]
    circularity_threshold: f64,

    /// Radius of the opening that cuts thin strands off the spheroid
    /// (0 disables).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_CORE_RADIUS)]
    core_radius: u8,

    /// Zoom-out factor of the invasion search region.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_CROP_SCALE)]
    crop_scale: f64,

    /// Find-join-kill rounds.
    #[arg(long, default_value_t = RefineConfig::DEFAULT_ITERATIONS)]
    iterations: usize,

    /// Fraction of contours surviving each kill step.
    #[arg(long, default_value_t = RefineConfig::DEFAULT_SURVIVAL_FRACTION)]
    survival_fraction: f64,

    /// Radius of the closing disk in the join step.
    #[arg(long, default_value_t = RefineConfig::DEFAULT_CLOSING_RADIUS)]
    closing_radius: u8,

    /// Outline width used by the join and kill steps.
    #[arg(long, default_value_t = RefineConfig::DEFAULT_STROKE_WIDTH)]
    stroke_width: u8,

    /// Number of invasion contours reported per image.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_TOP_K)]
    top_k: usize,

    /// Invert intensities (dark spheroid on a bright field).
    #[arg(long)]
    invert: bool,

    /// Full pipeline config as a JSON string.
    ///
    /// When provided, all other pipeline parameter flags are ignored.
    /// The JSON must be a valid `PipelineConfig` serialization.
    #[arg(long)]
    config_json: Option<String>,

    /// More logging (`-v` debug, `-vv` trace). `RUST_LOG` overrides.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Build a [`PipelineConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored.  Otherwise, a config is
/// assembled from the individual flags.
fn config_from_cli(cli: &Cli) -> Result<PipelineConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    Ok(PipelineConfig {
        percentile: cli.percentile,
        circularity_threshold: cli.circularity_threshold,
        core_radius: cli.core_radius,
        crop_scale: cli.crop_scale,
        refine: RefineConfig {
            iterations: cli.iterations,
            survival_fraction: cli.survival_fraction,
            closing_radius: cli.closing_radius,
            stroke_width: cli.stroke_width,
        },
        top_k: cli.top_k,
        invert: cli.invert,
    })
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

/// What one successfully analysed image contributes to the batch.
struct ImageReport {
    stats: AreaStats,
    diagnostics: PipelineDiagnostics,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match config_from_cli(&cli).and_then(|c| {
        c.validate().map_err(|e| e.to_string())?;
        Ok(c)
    }) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(source) = std::fs::create_dir_all(&cli.out_dir) {
        eprintln!(
            "{}",
            CliError::Write {
                path: cli.out_dir.clone(),
                source
            }
        );
        return ExitCode::FAILURE;
    }

    let run_dir = cli.trace_dir.as_ref().map(|root| root.join(run_stamp()));
    let keys = output_keys(&cli.images);
    log::info!("analysing {} image(s)", cli.images.len());

    // Indexed collect keeps input order.
    let outcomes: Vec<Result<ImageReport, CliError>> = cli
        .images
        .par_iter()
        .zip(keys.par_iter())
        .map(|(path, key)| analyse(path, key, &config, &cli, run_dir.as_deref()))
        .collect();

    let mut rows = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        match outcome {
            Ok(report) => {
                if cli.diagnostics
                    && let Err(e) = print_diagnostics(&report.diagnostics, cli.json)
                {
                    log::error!("{e}");
                    return ExitCode::FAILURE;
                }
                rows.push(report.stats);
            }
            Err(e) => log::warn!("skipped: {e}"),
        }
    }

    let table_path = cli
        .table
        .clone()
        .unwrap_or_else(|| cli.out_dir.join("areas.csv"));
    if let Err(e) = write_table(&table_path, &rows, cli.delimiter) {
        log::error!("{e}");
        return ExitCode::FAILURE;
    }
    log::info!(
        "{} of {} image(s) written to {}",
        rows.len(),
        cli.images.len(),
        table_path.display()
    );

    if rows.is_empty() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// One output name per input, distinct across the batch.
///
/// A stem used by exactly one input is kept as is. Repeated stems get the
/// 1-based input position appended, with a further counter if that name
/// is already taken.
fn output_keys(paths: &[PathBuf]) -> Vec<String> {
    let stems: Vec<String> = paths
        .iter()
        .map(|path| {
            path.file_stem()
                .or_else(|| path.file_name())
                .map_or_else(|| path.display().to_string(), |s| s.to_string_lossy().into_owned())
        })
        .collect();

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for stem in &stems {
        *counts.entry(stem.as_str()).or_default() += 1;
    }
    let mut taken: HashSet<String> = stems
        .iter()
        .filter(|stem| counts[stem.as_str()] == 1)
        .cloned()
        .collect();

    stems
        .iter()
        .enumerate()
        .map(|(i, stem)| {
            if counts[stem.as_str()] == 1 {
                return stem.clone();
            }
            let base = format!("{stem}-{}", i + 1);
            let mut key = base.clone();
            let mut n = 1;
            while taken.contains(&key) {
                n += 1;
                key = format!("{base}-{n}");
            }
            taken.insert(key.clone());
            key
        })
        .collect()
}

/// Run the pipeline on one image and write its per-image outputs under
/// `key`.
fn analyse(
    path: &Path,
    key: &str,
    config: &PipelineConfig,
    cli: &Cli,
    run_dir: Option<&Path>,
) -> Result<ImageReport, CliError> {
    let bytes = std::fs::read(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let filename = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());

    let mut trace: Box<dyn TraceSink> = match run_dir {
        Some(dir) => Box::new(DirTrace::create(&dir.join(key))?),
        None => Box::new(NoopTrace),
    };
    let (result, diagnostics) = spheroid_pipeline::process_with_diagnostics(
        &bytes,
        config,
        &filename,
        &StdClock,
        trace.as_mut(),
    )
    .map_err(|source| CliError::Pipeline {
        path: path.to_path_buf(),
        source,
    })?;

    let annotated = annotate::annotate(&result);
    save_png(&cli.out_dir.join(format!("{key}_annotated.png")), &annotated)?;
    if cli.crop_output {
        let crop = annotate::annotate_crop(&result);
        save_png(&cli.out_dir.join(format!("{key}_crop.png")), &crop)?;
    }
    if cli.svg {
        let invasions: Vec<&spheroid_pipeline::Contour> =
            result.invasions.iter().map(|r| &r.contour).collect();
        let description = format!(
            "spheroid {} px, invasion {} px",
            result.stats.spheroid_area, result.stats.invasion_area
        );
        let config_json = serde_json::to_string(config)?;
        let metadata = spheroid_export::SvgMetadata {
            title: Some(&filename),
            description: Some(&description),
            config_json: Some(&config_json),
        };
        let svg =
            spheroid_export::to_svg(&result.spheroid, &invasions, result.dimensions, &metadata);
        let svg_path = cli.out_dir.join(format!("{key}.svg"));
        std::fs::write(&svg_path, svg).map_err(|source| CliError::Write {
            path: svg_path,
            source,
        })?;
    }

    log::info!(
        "{filename}: spheroid {} px, invasion {} px, {} contour(s)",
        result.stats.spheroid_area,
        result.stats.invasion_area,
        result.invasions.len()
    );
    Ok(ImageReport {
        stats: result.stats,
        diagnostics,
    })
}

fn save_png(path: &Path, image: &image::RgbaImage) -> Result<(), CliError> {
    image.save(path).map_err(|source| CliError::SaveImage {
        path: path.to_path_buf(),
        source,
    })
}

fn write_table(path: &Path, rows: &[AreaStats], delimiter: char) -> Result<(), CliError> {
    let table = spheroid_export::to_table(rows, delimiter)?;
    std::fs::write(path, table).map_err(|source| CliError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn print_diagnostics(diagnostics: &PipelineDiagnostics, json: bool) -> Result<(), CliError> {
    if json {
        println!("{}", serde_json::to_string_pretty(diagnostics)?);
    } else {
        println!("{}", diagnostics.report());
    }
    Ok(())
}

/// Name of this run's trace subdirectory.
fn run_stamp() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs());
    format!("run-{secs}")
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}
