//! Kiln Core - Shared primitives for the kiln build/run/calibrate pipeline
//!
//! This crate provides the version-capability model, the native ownership
//! guard, and the hashing utilities used by `kiln-calibrate` and
//! `kiln-engine`.

pub mod capability;
pub mod error;
pub mod hash;
pub mod owned;
pub mod version;

// Re-export commonly used types
pub use capability::{
    BuildMode, CapabilityDescriptor, EnqueueSignature, OwnershipModel, WorkspaceMechanism,
    MIN_SUPPORTED_MAJOR,
};
pub use error::CapabilityError;
pub use hash::{crc32, hash_to_hex, sha256, verify_crc32};
pub use owned::{NativeObject, NativeOwned};
pub use version::NativeVersion;
