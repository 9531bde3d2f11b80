//! Trace sink that dumps every intermediate buffer as a numbered PNG.

use std::path::{Path, PathBuf};

use image::GrayImage;
use spheroid_pipeline::TraceSink;

use crate::error::CliError;

/// Writes `"{n} - {label}.png"` files into one directory per image.
///
/// Write failures are logged once and further snapshots are dropped;
/// tracing never fails the analysis.
pub struct DirTrace {
    dir: PathBuf,
    count: usize,
    broken: bool,
}

impl DirTrace {
    /// Create (or reuse) `dir` and start numbering at 1.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::Write`] if the directory cannot be created.
    pub fn create(dir: &Path) -> Result<Self, CliError> {
        std::fs::create_dir_all(dir).map_err(|source| CliError::Write {
            path: dir.to_path_buf(),
            source,
        })?;
        Ok(Self {
            dir: dir.to_path_buf(),
            count: 0,
            broken: false,
        })
    }

    /// Number of snapshots recorded so far.
    #[cfg(test)]
    const fn count(&self) -> usize {
        self.count
    }
}

impl TraceSink for DirTrace {
    fn record(&mut self, label: &str, image: &GrayImage) {
        if self.broken {
            return;
        }
        self.count += 1;
        let path = self.dir.join(format!("{} - {label}.png", self.count));
        if let Err(e) = image.save(&path) {
            log::warn!("trace disabled, cannot write {}: {e}", path.display());
            self.broken = true;
        }
    }

    fn enabled(&self) -> bool {
        !self.broken
    }
}
