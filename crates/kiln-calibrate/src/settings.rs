//! Calibration configuration surface
//!
//! Consumed, not owned: callers assemble a [`CalibrationSettings`] (from a
//! config file, CLI glue, or code) and hand it to
//! [`CalibrationController::from_settings`](crate::controller::CalibrationController::from_settings).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::CalibrationError;

/// Quantization algorithm the native builder should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalibrationAlgorithm {
    /// Minimize KL divergence between original and quantized distributions.
    #[default]
    Entropy,
    /// Use observed min/max directly.
    MinMax,
    /// Pre-entropy legacy algorithm, kept for old calibration tables.
    Legacy,
}

impl CalibrationAlgorithm {
    /// Stable identifier used in fingerprints and config files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entropy => "entropy",
            Self::MinMax => "minmax",
            Self::Legacy => "legacy",
        }
    }
}

impl fmt::Display for CalibrationAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CalibrationAlgorithm {
    type Err = CalibrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "entropy" => Ok(Self::Entropy),
            "minmax" => Ok(Self::MinMax),
            "legacy" => Ok(Self::Legacy),
            other => Err(CalibrationError::Config(format!(
                "unknown calibration algorithm: {other}"
            ))),
        }
    }
}

/// Settings for one calibration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationSettings {
    /// Quantization algorithm selector.
    pub algorithm: CalibrationAlgorithm,

    /// Samples per calibration batch.
    pub batch_size: usize,

    /// Directory holding the calibration sample files.
    pub data_path: PathBuf,

    /// Path of the calibration cache file.
    pub cache_path: PathBuf,

    /// Stage one batch ahead on a background worker.
    pub prefetch: bool,
}

impl CalibrationSettings {
    /// Settings with defaults: entropy algorithm, batch size 1, no prefetch.
    pub fn new(data_path: impl Into<PathBuf>, cache_path: impl Into<PathBuf>) -> Self {
        Self {
            algorithm: CalibrationAlgorithm::Entropy,
            batch_size: 1,
            data_path: data_path.into(),
            cache_path: cache_path.into(),
            prefetch: false,
        }
    }

    /// Set the quantization algorithm
    pub fn with_algorithm(mut self, algorithm: CalibrationAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Set the batch size
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Enable one-batch-ahead prefetch
    pub fn with_prefetch(mut self, enabled: bool) -> Self {
        self.prefetch = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_parse_roundtrip() {
        for algo in [
            CalibrationAlgorithm::Entropy,
            CalibrationAlgorithm::MinMax,
            CalibrationAlgorithm::Legacy,
        ] {
            assert_eq!(algo.as_str().parse::<CalibrationAlgorithm>().unwrap(), algo);
        }
        assert!("percentile".parse::<CalibrationAlgorithm>().is_err());
    }

    #[test]
    fn test_settings_builder() {
        let settings = CalibrationSettings::new("data", "calib.cache")
            .with_algorithm(CalibrationAlgorithm::MinMax)
            .with_batch_size(8)
            .with_prefetch(true);

        assert_eq!(settings.algorithm, CalibrationAlgorithm::MinMax);
        assert_eq!(settings.batch_size, 8);
        assert!(settings.prefetch);
    }

    #[test]
    fn test_settings_serialization() {
        let settings = CalibrationSettings::new("data", "calib.cache").with_batch_size(4);

        let json = serde_json::to_string(&settings).unwrap();
        let restored: CalibrationSettings = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.algorithm, CalibrationAlgorithm::Entropy);
        assert_eq!(restored.batch_size, 4);
        assert_eq!(restored.data_path, PathBuf::from("data"));
    }
}
