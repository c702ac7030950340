//! Error types shared across kiln crates

use thiserror::Error;

use crate::version::NativeVersion;

/// Errors from capability resolution
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("native version {found} below supported floor (major {floor})")]
    UnsupportedVersion { found: NativeVersion, floor: u32 },

    #[error("invalid version string: {0}")]
    InvalidVersion(String),
}
