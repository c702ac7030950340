//! In-process native build driver
//!
//! Stands in for the linked acceleration library: it exposes the same
//! lifecycle surface the generation backends adapt to (build
//! configuration object, build-then-serialize and direct-serialize entry
//! points, two enqueue signatures, and the calibration callback
//! protocol), with a deterministic implementation. The arithmetic
//! kernels behind enqueue are external plugins in a real deployment;
//! here enqueue performs a fixed placeholder transform so the lifecycle
//! is exercisable end to end.

use byteorder::{LittleEndian, WriteBytesExt};
use std::io::Write;

use kiln_calibrate::Int8Calibrator;
use kiln_core::NativeObject;
use tracing::debug;

use crate::blueprint::{NetworkDescription, PrecisionMode};
use crate::error::{BuildError, RuntimeError};
use crate::format::{self, EngineRecord};

/// Memory pools addressable through the pool-limit API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    /// Build-time scratch memory for layer algorithms.
    Workspace,
}

/// How the working-memory ceiling was configured on this build config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum WorkspaceSetting {
    #[default]
    Unset,
    /// Via the dedicated legacy setter.
    MaxWorkspace(u64),
    /// Via the pool-limit API.
    PoolLimit(u64),
}

/// The native builder-configuration object.
///
/// Both workspace mechanisms configure the same logical ceiling; the
/// build step reads the resolved value and does not care which setter
/// ran.
#[derive(Debug, Clone)]
pub struct BuilderConfig {
    precision: PrecisionMode,
    max_batch_size: u32,
    workspace: WorkspaceSetting,
}

impl BuilderConfig {
    pub fn new(precision: PrecisionMode, max_batch_size: u32) -> Self {
        Self {
            precision,
            max_batch_size,
            workspace: WorkspaceSetting::Unset,
        }
    }

    /// Legacy workspace setter (generations before the pool-limit API).
    pub fn set_max_workspace_size(&mut self, bytes: u64) {
        self.workspace = WorkspaceSetting::MaxWorkspace(bytes);
    }

    /// Pool-limit API (newer generations).
    pub fn set_memory_pool_limit(&mut self, pool: PoolKind, bytes: u64) {
        match pool {
            PoolKind::Workspace => self.workspace = WorkspaceSetting::PoolLimit(bytes),
        }
    }

    pub fn precision(&self) -> PrecisionMode {
        self.precision
    }

    pub fn max_batch_size(&self) -> u32 {
        self.max_batch_size
    }

    /// The logical working-memory ceiling, however it was configured.
    pub fn workspace_limit(&self) -> Option<u64> {
        match self.workspace {
            WorkspaceSetting::Unset => None,
            WorkspaceSetting::MaxWorkspace(bytes) | WorkspaceSetting::PoolLimit(bytes) => {
                Some(bytes)
            }
        }
    }
}

/// The intermediate engine object of the build-then-serialize sequence.
///
/// Only the oldest generation materializes this; newer generations go
/// straight to the serialized blob. Carries an explicit destructor, as
/// that generation's ownership model demands.
#[derive(Debug)]
pub struct NativeEngine {
    record: Option<EngineRecord>,
}

impl NativeEngine {
    fn new(record: EngineRecord) -> Self {
        Self {
            record: Some(record),
        }
    }

    fn record(&self) -> Result<&EngineRecord, BuildError> {
        self.record
            .as_ref()
            .ok_or_else(|| BuildError::Native("engine object already destroyed".into()))
    }
}

impl NativeObject for NativeEngine {
    fn destroy(&mut self) {
        self.record = None;
    }
}

/// Compile the network into an engine record.
///
/// Shared core of both build sequences: validation of the configured
/// workspace, the INT8 calibration protocol, then assembly of the
/// record the blob encoder serializes.
pub fn compile(
    network: &NetworkDescription,
    config: &BuilderConfig,
    calibrator: Option<&mut dyn Int8Calibrator>,
) -> Result<EngineRecord, BuildError> {
    let workspace_limit = config
        .workspace_limit()
        .ok_or_else(|| BuildError::Native("workspace limit not configured".into()))?;

    let calibration_table = if config.precision() == PrecisionMode::Int8 {
        let calibrator = calibrator
            .ok_or_else(|| BuildError::Native("INT8 build without a calibrator".into()))?;
        Some(run_calibration(calibrator, &network.input.name)?)
    } else {
        None
    };

    Ok(EngineRecord {
        network_name: network.name.clone(),
        precision: config.precision(),
        workspace_limit,
        max_batch_size: config.max_batch_size(),
        input_bytes: network.input.byte_size as u64,
        output_bytes: network.output.byte_size as u64,
        layers: network.layers.clone(),
        calibration_table,
    })
}

/// Build an engine object (build-then-serialize sequence, step one).
pub fn build_engine(
    network: &NetworkDescription,
    config: &BuilderConfig,
    calibrator: Option<&mut dyn Int8Calibrator>,
) -> Result<NativeEngine, BuildError> {
    Ok(NativeEngine::new(compile(network, config, calibrator)?))
}

/// Serialize a built engine object (build-then-serialize, step two).
pub fn serialize_engine(engine: &NativeEngine) -> Result<Vec<u8>, BuildError> {
    Ok(format::encode(engine.record()?))
}

/// Build straight to a serialized blob (direct sequence, one call).
pub fn build_serialized_network(
    network: &NetworkDescription,
    config: &BuilderConfig,
    calibrator: Option<&mut dyn Int8Calibrator>,
) -> Result<Vec<u8>, BuildError> {
    Ok(format::encode(&compile(network, config, calibrator)?))
}

/// Drive the calibration callback protocol to a parameter table.
///
/// Protocol order matches what the native builder does: probe the cache
/// first; on a hit, use the cached table verbatim (the cached and
/// freshly computed tables are interchangeable by the fingerprint
/// contract). On a miss, drain batches until the calibrator signals
/// completion, derive the table from the observed value range, and hand
/// it back for persistence exactly once.
fn run_calibration(calibrator: &mut dyn Int8Calibrator, input_name: &str) -> Result<Vec<u8>, BuildError> {
    let batch_size = calibrator.batch_size();
    if batch_size == 0 {
        return Err(BuildError::Native("calibrator reports zero batch size".into()));
    }

    if let Some(cached) = calibrator.read_calibration_cache() {
        debug!(len = cached.len(), "using cached calibration table");
        return Ok(cached.to_vec());
    }

    let mut min = u8::MAX;
    let mut max = u8::MIN;
    let mut samples: u64 = 0;
    let mut batches: u64 = 0;

    while let Some(batch) = calibrator.get_batch(&[input_name])? {
        for &value in batch.buffer().as_bytes() {
            min = min.min(value);
            max = max.max(value);
        }
        samples += batch.sample_count() as u64;
        batches += 1;
    }

    if samples == 0 {
        return Err(BuildError::Native("calibrator yielded no batches".into()));
    }
    debug!(batches, samples, "calibration passes finished");

    let table = encode_calibration_table(calibrator.algorithm().as_str(), min, max, samples);
    calibrator.write_calibration_cache(&table);
    Ok(table)
}

/// Quantization-parameter table emitted by the stand-in procedure.
///
/// Opaque to everything outside this module; the cache and the blob
/// carry it as bytes.
fn encode_calibration_table(algorithm: &str, min: u8, max: u8, samples: u64) -> Vec<u8> {
    let mut table = Vec::with_capacity(algorithm.len() + 15);
    let _ = table.write_all(algorithm.as_bytes());
    let _ = table.write_u8(0);
    let _ = table.write_u8(min);
    let _ = table.write_u8(max);
    let _ = table.write_u64::<LittleEndian>(samples);
    let scale = f32::from(max.saturating_sub(min)) / 255.0;
    let _ = table.write_f32::<LittleEndian>(scale);
    table
}

fn check_bindings(record: &EngineRecord, input: &[u8], output: &[u8]) -> Result<(), RuntimeError> {
    if input.len() != record.input_bytes as usize {
        return Err(RuntimeError::BindingMismatch {
            expected: record.input_bytes as usize,
            actual: input.len(),
        });
    }
    if output.len() != record.output_bytes as usize {
        return Err(RuntimeError::BindingMismatch {
            expected: record.output_bytes as usize,
            actual: output.len(),
        });
    }
    Ok(())
}

fn run_kernels(record: &EngineRecord, scratch: &mut Vec<u8>, input: &[u8], output: &mut [u8]) {
    // Placeholder for the external plugin kernels: stage the input in
    // the context scratch, then produce a deterministic projection of it.
    scratch.clear();
    scratch.extend_from_slice(input);
    if scratch.is_empty() {
        output.fill(0);
        return;
    }
    let salt = record.layers.len() as u8;
    for (i, out) in output.iter_mut().enumerate() {
        *out = scratch[i % scratch.len()].wrapping_add(salt);
    }
}

/// Legacy enqueue signature: explicit batch count alongside bindings.
pub fn enqueue_batched(
    record: &EngineRecord,
    batch_size: u32,
    scratch: &mut Vec<u8>,
    input: &[u8],
    output: &mut [u8],
) -> Result<(), RuntimeError> {
    if batch_size == 0 {
        return Err(RuntimeError::BindingMismatch {
            expected: record.max_batch_size as usize,
            actual: 0,
        });
    }
    check_bindings(record, input, output)?;
    run_kernels(record, scratch, input, output);
    Ok(())
}

/// Current enqueue signature: bindings only.
pub fn enqueue_bindings(
    record: &EngineRecord,
    scratch: &mut Vec<u8>,
    input: &[u8],
    output: &mut [u8],
) -> Result<(), RuntimeError> {
    check_bindings(record, input, output)?;
    run_kernels(record, scratch, input, output);
    Ok(())
}
