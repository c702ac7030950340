//! Error types for engine building and the runtime

use kiln_calibrate::CalibrationError;
use thiserror::Error;

/// Errors from an engine build pass.
///
/// None of these are retryable as-is: the caller must change the
/// blueprint (or fix the calibration inputs) before building again.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("network has no layers")]
    EmptyNetwork,

    #[error("invalid build configuration: {0}")]
    Configuration(String),

    #[error("calibration failed: {0}")]
    Calibration(#[from] CalibrationError),

    #[error("native build failed: {0}")]
    Native(String),
}

/// Errors from engine deserialization and execution.
///
/// `CorruptBlob` and `VersionMismatch` are fatal: the engine must be
/// rebuilt from the source network. `OutOfResources` may succeed on
/// retry once the caller frees device memory.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("corrupt engine blob: {0}")]
    CorruptBlob(String),

    #[error("engine blob format v{found} incompatible with this runtime (supports v{supported})")]
    VersionMismatch { found: u32, supported: u32 },

    #[error("out of device resources")]
    OutOfResources,

    #[error("binding size mismatch: expected {expected} bytes, got {actual}")]
    BindingMismatch { expected: usize, actual: usize },
}
