use std::path::{Path, PathBuf};

use classport_core::{ClassifierError, Result};
use image::ImageFormat;
use tracing::debug;

/// One input image, consumed once by the pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageRecord {
    pub path: PathBuf,
    pub label: Option<String>,
}

impl ImageRecord {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Lists every image file directly under `dir`, sorted by file name.
    ///
    /// Entries whose extension is not a known image format are skipped; the
    /// label of each record is its file name.
    pub fn list_dir(dir: &Path) -> Result<Vec<ImageRecord>> {
        let entries = std::fs::read_dir(dir).map_err(|err| ClassifierError::image_load(dir, err))?;

        let mut records = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| ClassifierError::image_load(dir, err))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if ImageFormat::from_path(&path).is_err() {
                debug!(path = %path.display(), "skipping non-image file");
                continue;
            }
            let label = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned());
            records.push(ImageRecord { path, label });
        }

        records.sort_by(|a, b| a.path.file_name().cmp(&b.path.file_name()));
        Ok(records)
    }
}
