//! Error types for calibration

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the calibration pipeline and controller.
///
/// `Config` is raised at construction and is fatal. `SampleRead` and
/// `SampleShape` abort the calibration run they occur in; the pipeline
/// never skips a sample, since that would break the batch-size invariants
/// the native calibration procedure assumes. Cache misses are not errors
/// and never appear here.
#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("invalid calibration configuration: {0}")]
    Config(String),

    #[error("failed to read calibration sample {path}: {source}")]
    SampleRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("calibration sample {path} is {actual} bytes, expected {expected}")]
    SampleShape {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },
}
