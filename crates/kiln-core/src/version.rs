//! Native library version handling
//!
//! The linked acceleration library reports a `major.minor.patch` triplet.
//! Everything version-dependent in kiln is derived from this triplet once,
//! at process start, through [`CapabilityDescriptor::resolve`]
//! (see [`crate::capability`]).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CapabilityError;

/// Version triplet of the linked native acceleration library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NativeVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl NativeVersion {
    /// Create a version triplet.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// True when `self >= major.minor.patch`.
    pub const fn at_least(self, major: u32, minor: u32, patch: u32) -> bool {
        self.major > major
            || (self.major == major && self.minor > minor)
            || (self.major == major && self.minor == minor && self.patch >= patch)
    }

    /// True when `self < major.minor.patch`.
    pub const fn before(self, major: u32, minor: u32, patch: u32) -> bool {
        !self.at_least(major, minor, patch)
    }
}

impl fmt::Display for NativeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for NativeVersion {
    type Err = CapabilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('.');
        let mut next = || {
            parts
                .next()
                .and_then(|p| p.parse::<u32>().ok())
                .ok_or_else(|| CapabilityError::InvalidVersion(s.to_string()))
        };
        let version = Self::new(next()?, next()?, next()?);
        if parts.next().is_some() {
            return Err(CapabilityError::InvalidVersion(s.to_string()));
        }
        Ok(version)
    }
}
