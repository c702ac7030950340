//! Calibration cache: a fingerprinted quantization-parameter store
//!
//! ## File Layout
//!
//! ```text
//! [KCAL magic: 4 bytes]
//! [Version: u32 LE]
//! [Fingerprint: 32 bytes]
//! [Payload length: u64 LE]
//! [Payload: variable]
//! [CRC32 checksum: u32 LE]
//! ```
//!
//! The payload is whatever the quantization procedure emitted; this core
//! treats it as opaque. A cache entry is only ever consumed for the
//! fingerprint that produced it: a mismatched fingerprint, a truncated
//! file, or a bad checksum all read as a miss, never as an error.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use kiln_core::{crc32, hash_to_hex, sha256, verify_crc32};
use tracing::debug;

use crate::dataset::CalibrationDataset;
use crate::settings::CalibrationAlgorithm;

/// Magic bytes for calibration cache files
pub const CACHE_MAGIC: &[u8; 4] = b"KCAL";

/// Current cache file format version
pub const CACHE_VERSION: u32 = 1;

/// Deterministic identity of a calibration configuration.
///
/// SHA256 over the algorithm kind, batch size, and the ordered dataset
/// file names. Two runs with the same fingerprint may share a cache
/// entry; anything else must recompute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Compute the fingerprint of a calibration configuration.
    pub fn compute(
        algorithm: CalibrationAlgorithm,
        batch_size: usize,
        dataset: &CalibrationDataset,
    ) -> Self {
        let mut material = Vec::new();
        material.extend_from_slice(algorithm.as_str().as_bytes());
        material.push(0);
        material.extend_from_slice(&(batch_size as u64).to_le_bytes());
        for name in dataset.identity() {
            material.extend_from_slice(name.as_bytes());
            material.push(0);
        }
        Self(sha256(&material))
    }

    /// Raw fingerprint bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hash_to_hex(&self.0))
    }
}

/// Path-addressed store for one quantization-parameter blob.
#[derive(Debug, Clone)]
pub struct CalibrationCache {
    path: PathBuf,
    fingerprint: Fingerprint,
}

impl CalibrationCache {
    /// Cache at `path`, keyed by `fingerprint`.
    pub fn new(path: impl Into<PathBuf>, fingerprint: Fingerprint) -> Self {
        Self {
            path: path.into(),
            fingerprint,
        }
    }

    /// The fingerprint entries must match to be served.
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Cache file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the cached parameter blob, or `None` on any kind of miss.
    ///
    /// Absent file, unreadable file, malformed contents, checksum
    /// failure, and fingerprint mismatch are all misses: the caller
    /// recomputes, it never aborts.
    pub fn load(&self) -> Option<Vec<u8>> {
        let data = std::fs::read(&self.path).ok()?;
        let payload = Self::parse(&data, &self.fingerprint);
        match &payload {
            Some(bytes) => debug!(
                path = %self.path.display(),
                len = bytes.len(),
                "calibration cache hit"
            ),
            None => debug!(path = %self.path.display(), "calibration cache miss"),
        }
        payload
    }

    /// Persist `payload`, replacing any prior entry at this path.
    pub fn save(&self, payload: &[u8]) -> std::io::Result<()> {
        let mut buf = Vec::with_capacity(payload.len() + 52);
        buf.write_all(CACHE_MAGIC)?;
        buf.write_u32::<LittleEndian>(CACHE_VERSION)?;
        buf.write_all(self.fingerprint.as_bytes())?;
        buf.write_u64::<LittleEndian>(payload.len() as u64)?;
        buf.write_all(payload)?;
        let checksum = crc32(&buf);
        buf.write_u32::<LittleEndian>(checksum)?;

        std::fs::write(&self.path, &buf)?;
        debug!(
            path = %self.path.display(),
            len = payload.len(),
            fingerprint = %self.fingerprint,
            "wrote calibration cache"
        );
        Ok(())
    }

    fn parse(data: &[u8], expected: &Fingerprint) -> Option<Vec<u8>> {
        // magic + version + fingerprint + length + crc
        if data.len() < 4 + 4 + 32 + 8 + 4 {
            return None;
        }
        if &data[..4] != CACHE_MAGIC {
            return None;
        }

        let body = &data[..data.len() - 4];
        let stored_crc = u32::from_le_bytes(data[data.len() - 4..].try_into().ok()?);
        if !verify_crc32(body, stored_crc) {
            return None;
        }

        let mut cursor = Cursor::new(body);
        cursor.set_position(4);

        let version = cursor.read_u32::<LittleEndian>().ok()?;
        if version != CACHE_VERSION {
            return None;
        }

        let mut fingerprint = [0u8; 32];
        cursor.read_exact(&mut fingerprint).ok()?;
        if &fingerprint != expected.as_bytes() {
            return None;
        }

        // The length field is untrusted even under a valid checksum; it
        // must account for exactly the bytes left in the body.
        let len = cursor.read_u64::<LittleEndian>().ok()?;
        let remaining = body.len() as u64 - cursor.position();
        if len != remaining {
            return None;
        }
        let mut payload = vec![0u8; len as usize];
        cursor.read_exact(&mut payload).ok()?;
        Some(payload)
    }
}
