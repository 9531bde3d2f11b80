use std::path::PathBuf;

/// Failures of the command-line front end.
///
/// Per-image variants skip that image; the others end the batch.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// An input image could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// The input path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The pipeline rejected an image.
    #[error("{path}: {source}")]
    Pipeline {
        /// The input path.
        path: PathBuf,
        /// Underlying pipeline error.
        source: spheroid_pipeline::PipelineError,
    },

    /// An output image could not be encoded or written.
    #[error("failed to write {path}: {source}")]
    SaveImage {
        /// The output path.
        path: PathBuf,
        /// Underlying encoder error.
        source: image::ImageError,
    },

    /// An output file or directory could not be written.
    #[error("failed to write {path}: {source}")]
    Write {
        /// The output path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The area table could not be serialized.
    #[error(transparent)]
    Table(#[from] spheroid_export::TableError),

    /// Diagnostics could not be serialized.
    #[error("failed to serialize diagnostics: {0}")]
    Json(#[from] serde_json::Error),
}
