//! Calibration dataset: an ordered, immutable list of sample files
//!
//! Each file holds the raw bytes of one input tensor. Order is part of
//! the dataset's identity; the directory constructor sorts entries so the
//! same directory always produces the same dataset.

use std::path::{Path, PathBuf};

use crate::error::CalibrationError;

/// Ordered sequence of calibration sample files.
#[derive(Debug, Clone)]
pub struct CalibrationDataset {
    samples: Vec<PathBuf>,
}

impl CalibrationDataset {
    /// Build a dataset from an explicit file list. Order is preserved.
    pub fn from_files(samples: Vec<PathBuf>) -> Result<Self, CalibrationError> {
        if samples.is_empty() {
            return Err(CalibrationError::Config(
                "calibration dataset must contain at least one sample".into(),
            ));
        }
        Ok(Self { samples })
    }

    /// Build a dataset from every regular file in `dir`, sorted by path.
    pub fn from_dir(dir: &Path) -> Result<Self, CalibrationError> {
        let entries = std::fs::read_dir(dir).map_err(|e| {
            CalibrationError::Config(format!("cannot read dataset path {}: {e}", dir.display()))
        })?;

        let mut samples = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                CalibrationError::Config(format!(
                    "cannot read dataset path {}: {e}",
                    dir.display()
                ))
            })?;
            let path = entry.path();
            if path.is_file() {
                samples.push(path);
            }
        }
        samples.sort();

        Self::from_files(samples)
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Always false: construction rejects empty datasets.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample path at `index`.
    pub fn sample(&self, index: usize) -> &Path {
        &self.samples[index]
    }

    /// Iterate over sample paths in dataset order.
    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.samples.iter().map(PathBuf::as_path)
    }

    /// Dataset identity for fingerprinting: the ordered file names.
    ///
    /// File names rather than full paths, so relocating the dataset
    /// directory does not invalidate a calibration cache.
    pub fn identity(&self) -> Vec<String> {
        self.samples
            .iter()
            .map(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            })
            .collect()
    }
}
