//! Kiln Calibrate - INT8 calibration data pipeline, cache, and controller
//!
//! Feeds bounded batches of representative input data to the native
//! quantization procedure, persists the resulting parameters under a
//! configuration fingerprint, and implements the builder-facing
//! quantization-callback contract.
//!
//! # Example
//!
//! ```ignore
//! use kiln_calibrate::{CalibrationController, CalibrationSettings, CalibrationAlgorithm};
//!
//! let settings = CalibrationSettings::new("calib-data/", "model.calib")
//!     .with_algorithm(CalibrationAlgorithm::Entropy)
//!     .with_batch_size(8);
//!
//! // input tensor is 1x3x224x224 f32
//! let controller = CalibrationController::from_settings(&settings, 3 * 224 * 224 * 4)?;
//! // hand `controller` to the engine builder as the INT8 calibrator
//! ```

pub mod batch;
pub mod cache;
pub mod controller;
pub mod dataset;
pub mod error;
pub mod pipeline;
pub mod settings;

// Re-export main types
pub use batch::{CalibrationBatch, DeviceBuffer};
pub use cache::{CalibrationCache, Fingerprint, CACHE_MAGIC, CACHE_VERSION};
pub use controller::{
    CalibrationController, Int8Calibrator, InterfaceInfo, CALIBRATOR_INTERFACE,
};
pub use dataset::CalibrationDataset;
pub use error::CalibrationError;
pub use pipeline::{BatchPipeline, BatchSource, PrefetchPipeline};
pub use settings::{CalibrationAlgorithm, CalibrationSettings};
