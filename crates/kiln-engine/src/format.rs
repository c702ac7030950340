//! Serialized engine blob format
//!
//! ## Format Layout
//!
//! ```text
//! [KEGN magic: 4 bytes]
//! [Format version: u32 LE]
//! [Precision: u8]
//! [Workspace limit: u64 LE]
//! [Max batch size: u32 LE]
//! [Input bytes: u64 LE]
//! [Output bytes: u64 LE]
//! [Network name length: u32 LE][Network name: variable]
//! [Layer count: u32 LE]
//!   per layer: [name len: u32][name][op len: u32][op][weights len: u64][weights]
//! [Calibration table present: u8]
//!   if present: [table len: u64 LE][table: variable]
//! [CRC32 checksum: u32 LE]
//! ```
//!
//! The blob is the unit of persistence and transport. Decoding checks
//! structure and checksum before the version tag, so a flipped bit reads
//! as corruption rather than a spurious version mismatch.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};

use kiln_core::{crc32, verify_crc32};

use crate::blueprint::{LayerSpec, PrecisionMode};
use crate::error::RuntimeError;

/// Magic bytes for engine blobs
pub const ENGINE_MAGIC: &[u8; 4] = b"KEGN";

/// Current engine blob format version
pub const ENGINE_FORMAT_VERSION: u32 = 1;

/// The decoded contents of an engine blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineRecord {
    pub network_name: String,
    pub precision: PrecisionMode,
    pub workspace_limit: u64,
    pub max_batch_size: u32,
    pub input_bytes: u64,
    pub output_bytes: u64,
    pub layers: Vec<LayerSpec>,
    pub calibration_table: Option<Vec<u8>>,
}

/// An immutable serialized engine, as produced by a successful build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedEngine {
    bytes: Vec<u8>,
}

impl SerializedEngine {
    /// Wrap raw blob bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// The blob contents.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume into the raw blob.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Persist the blob to a file.
    pub fn write_to(&self, path: &std::path::Path) -> std::io::Result<()> {
        std::fs::write(path, &self.bytes)
    }

    /// Read a blob back from a file. Contents are validated at
    /// deserialization, not here.
    pub fn read_from(path: &std::path::Path) -> std::io::Result<Self> {
        Ok(Self::from_bytes(std::fs::read(path)?))
    }
}

fn precision_tag(precision: PrecisionMode) -> u8 {
    match precision {
        PrecisionMode::Fp32 => 0,
        PrecisionMode::Fp16 => 1,
        PrecisionMode::Int8 => 2,
    }
}

fn precision_from_tag(tag: u8) -> Option<PrecisionMode> {
    match tag {
        0 => Some(PrecisionMode::Fp32),
        1 => Some(PrecisionMode::Fp16),
        2 => Some(PrecisionMode::Int8),
        _ => None,
    }
}

/// Encode a record into blob bytes.
pub fn encode(record: &EngineRecord) -> Vec<u8> {
    encode_with_version(record, ENGINE_FORMAT_VERSION)
}

fn encode_with_version(record: &EngineRecord, version: u32) -> Vec<u8> {
    let mut buf = Vec::new();

    // Writes into a Vec cannot fail.
    let _ = buf.write_all(ENGINE_MAGIC);
    let _ = buf.write_u32::<LittleEndian>(version);
    let _ = buf.write_u8(precision_tag(record.precision));
    let _ = buf.write_u64::<LittleEndian>(record.workspace_limit);
    let _ = buf.write_u32::<LittleEndian>(record.max_batch_size);
    let _ = buf.write_u64::<LittleEndian>(record.input_bytes);
    let _ = buf.write_u64::<LittleEndian>(record.output_bytes);

    let _ = buf.write_u32::<LittleEndian>(record.network_name.len() as u32);
    let _ = buf.write_all(record.network_name.as_bytes());

    let _ = buf.write_u32::<LittleEndian>(record.layers.len() as u32);
    for layer in &record.layers {
        let _ = buf.write_u32::<LittleEndian>(layer.name.len() as u32);
        let _ = buf.write_all(layer.name.as_bytes());
        let _ = buf.write_u32::<LittleEndian>(layer.op.len() as u32);
        let _ = buf.write_all(layer.op.as_bytes());
        let _ = buf.write_u64::<LittleEndian>(layer.weights.len() as u64);
        let _ = buf.write_all(&layer.weights);
    }

    match &record.calibration_table {
        Some(table) => {
            let _ = buf.write_u8(1);
            let _ = buf.write_u64::<LittleEndian>(table.len() as u64);
            let _ = buf.write_all(table);
        }
        None => {
            let _ = buf.write_u8(0);
        }
    }

    let checksum = crc32(&buf);
    let _ = buf.write_u32::<LittleEndian>(checksum);
    buf
}

fn corrupt(msg: impl Into<String>) -> RuntimeError {
    RuntimeError::CorruptBlob(msg.into())
}

/// Bytes left between the cursor and the end of the body.
///
/// Length fields are untrusted even under a valid checksum; every
/// variable-length read checks against this before allocating.
fn remaining(cursor: &Cursor<&[u8]>) -> u64 {
    cursor.get_ref().len() as u64 - cursor.position()
}

fn read_string(cursor: &mut Cursor<&[u8]>, what: &str) -> Result<String, RuntimeError> {
    let len = cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| corrupt(format!("truncated {what} length")))?;
    if u64::from(len) > remaining(cursor) {
        return Err(corrupt(format!("{what} length exceeds blob")));
    }
    let mut bytes = vec![0u8; len as usize];
    cursor
        .read_exact(&mut bytes)
        .map_err(|_| corrupt(format!("truncated {what}")))?;
    String::from_utf8(bytes).map_err(|_| corrupt(format!("{what} is not valid UTF-8")))
}

/// Decode an engine blob.
///
/// Fails with [`RuntimeError::CorruptBlob`] on malformed input and
/// [`RuntimeError::VersionMismatch`] when the embedded format version is
/// not the one this runtime supports. No partially decoded record is
/// observable on failure.
pub fn decode(data: &[u8]) -> Result<EngineRecord, RuntimeError> {
    if data.len() < 4 {
        return Err(corrupt("blob too small"));
    }
    if &data[..4] != ENGINE_MAGIC {
        return Err(corrupt("bad magic"));
    }
    if data.len() < 12 {
        return Err(corrupt("blob too small for checksum"));
    }

    let body = &data[..data.len() - 4];
    let stored_crc = u32::from_le_bytes(
        data[data.len() - 4..]
            .try_into()
            .map_err(|_| corrupt("truncated checksum"))?,
    );
    if !verify_crc32(body, stored_crc) {
        return Err(corrupt("checksum mismatch"));
    }

    let mut cursor = Cursor::new(body);
    cursor.set_position(4);

    let version = cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| corrupt("truncated version"))?;
    if version != ENGINE_FORMAT_VERSION {
        return Err(RuntimeError::VersionMismatch {
            found: version,
            supported: ENGINE_FORMAT_VERSION,
        });
    }

    let precision_tag = cursor.read_u8().map_err(|_| corrupt("truncated header"))?;
    let precision =
        precision_from_tag(precision_tag).ok_or_else(|| corrupt("unknown precision tag"))?;
    let workspace_limit = cursor
        .read_u64::<LittleEndian>()
        .map_err(|_| corrupt("truncated header"))?;
    let max_batch_size = cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| corrupt("truncated header"))?;
    let input_bytes = cursor
        .read_u64::<LittleEndian>()
        .map_err(|_| corrupt("truncated header"))?;
    let output_bytes = cursor
        .read_u64::<LittleEndian>()
        .map_err(|_| corrupt("truncated header"))?;

    let network_name = read_string(&mut cursor, "network name")?;

    let layer_count = cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| corrupt("truncated layer count"))? as usize;
    let mut layers = Vec::with_capacity(layer_count.min(1024));
    for _ in 0..layer_count {
        let name = read_string(&mut cursor, "layer name")?;
        let op = read_string(&mut cursor, "layer op")?;
        let weights_len = cursor
            .read_u64::<LittleEndian>()
            .map_err(|_| corrupt("truncated weights length"))?;
        if weights_len > remaining(&cursor) {
            return Err(corrupt("weights length exceeds blob"));
        }
        let mut weights = vec![0u8; weights_len as usize];
        cursor
            .read_exact(&mut weights)
            .map_err(|_| corrupt("truncated weights"))?;
        layers.push(LayerSpec { name, op, weights });
    }

    let has_table = cursor
        .read_u8()
        .map_err(|_| corrupt("truncated calibration flag"))?;
    let calibration_table = match has_table {
        0 => None,
        1 => {
            let len = cursor
                .read_u64::<LittleEndian>()
                .map_err(|_| corrupt("truncated calibration table length"))?;
            if len > remaining(&cursor) {
                return Err(corrupt("calibration table length exceeds blob"));
            }
            let mut table = vec![0u8; len as usize];
            cursor
                .read_exact(&mut table)
                .map_err(|_| corrupt("truncated calibration table"))?;
            Some(table)
        }
        _ => return Err(corrupt("invalid calibration flag")),
    };

    Ok(EngineRecord {
        network_name,
        precision,
        workspace_limit,
        max_batch_size,
        input_bytes,
        output_bytes,
        layers,
        calibration_table,
    })
}
