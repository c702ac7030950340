//! Engine runtime: deserialization and execution contexts
//!
//! The runtime turns a serialized blob back into an executable
//! [`Engine`]. Engines are immutable and shareable across threads;
//! per-thread mutable state (scratch and output buffers) lives in
//! [`ExecutionContext`], one per concurrent stream of work.

use std::sync::Arc;

use kiln_core::CapabilityDescriptor;
use tracing::{debug, info};

use crate::backend::{self, Backend};
use crate::error::RuntimeError;
use crate::format::{self, EngineRecord, SerializedEngine};

/// Deserializes engines for one native generation.
pub struct EngineRuntime {
    backend: Arc<dyn Backend>,
}

impl EngineRuntime {
    /// Create a runtime for a resolved capability descriptor.
    pub fn new(descriptor: CapabilityDescriptor) -> Self {
        Self {
            backend: backend::for_descriptor(descriptor),
        }
    }

    /// Create a runtime over an already-selected backend.
    pub fn with_backend(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// The descriptor this runtime targets.
    pub fn descriptor(&self) -> &CapabilityDescriptor {
        self.backend.descriptor()
    }

    /// Validate and decode a serialized engine.
    pub fn deserialize(&self, engine: &SerializedEngine) -> Result<Engine, RuntimeError> {
        let record = format::decode(engine.as_bytes())?;
        info!(
            network = %record.network_name,
            precision = ?record.precision,
            "engine deserialized"
        );
        Ok(Engine {
            record: Arc::new(record),
            backend: self.backend.clone(),
        })
    }
}

/// An executable engine.
///
/// Immutable after deserialization; clone it (cheaply) to share across
/// threads, and create one [`ExecutionContext`] per stream of work.
#[derive(Clone)]
pub struct Engine {
    record: Arc<EngineRecord>,
    backend: Arc<dyn Backend>,
}

impl Engine {
    /// The decoded engine record.
    pub fn record(&self) -> &EngineRecord {
        &self.record
    }

    /// Allocate the mutable per-stream state for execution.
    ///
    /// Reserves the engine's configured working memory up front so
    /// exhaustion surfaces here, not mid-inference.
    pub fn create_context(&self) -> Result<ExecutionContext, RuntimeError> {
        let workspace = usize::try_from(self.record.workspace_limit)
            .map_err(|_| RuntimeError::OutOfResources)?;
        let output_len = usize::try_from(self.record.output_bytes)
            .map_err(|_| RuntimeError::OutOfResources)?;

        let mut scratch = Vec::new();
        scratch
            .try_reserve_exact(workspace)
            .map_err(|_| RuntimeError::OutOfResources)?;

        let mut output = Vec::new();
        output
            .try_reserve_exact(output_len)
            .map_err(|_| RuntimeError::OutOfResources)?;
        output.resize(output_len, 0);

        debug!(workspace, output_len, "execution context allocated");
        Ok(ExecutionContext {
            record: self.record.clone(),
            backend: self.backend.clone(),
            scratch,
            output,
        })
    }
}

/// Mutable per-stream execution state.
///
/// Not shareable; each concurrent stream of inferences owns its own
/// context over the same engine.
pub struct ExecutionContext {
    record: Arc<EngineRecord>,
    backend: Arc<dyn Backend>,
    scratch: Vec<u8>,
    output: Vec<u8>,
}

impl ExecutionContext {
    /// Run one inference; the returned slice is valid until the next call.
    pub fn execute(&mut self, input: &[u8]) -> Result<&[u8], RuntimeError> {
        self.backend
            .enqueue(&self.record, &mut self.scratch, input, &mut self.output)?;
        Ok(&self.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprint::{
        BuildSettings, EngineBlueprint, LayerSpec, NetworkDescription, TensorSpec,
    };
    use crate::builder::EngineBuilder;
    use kiln_core::NativeVersion;

    fn descriptor(major: u32) -> CapabilityDescriptor {
        CapabilityDescriptor::resolve(NativeVersion::new(major, 4, 0)).unwrap()
    }

    fn build_engine(settings: BuildSettings) -> SerializedEngine {
        let network = NetworkDescription::new(
            "net",
            TensorSpec::new("input", 4),
            TensorSpec::new("output", 4),
        )
        .with_layer(LayerSpec::new("relu1", "relu", vec![]));
        EngineBuilder::new(descriptor(8))
            .build(&EngineBlueprint::new(network, settings))
            .unwrap()
    }

    #[test]
    fn test_execute_round_trip() {
        let serialized = build_engine(BuildSettings::new().with_workspace_limit(64));
        let runtime = EngineRuntime::new(descriptor(8));
        let engine = runtime.deserialize(&serialized).unwrap();
        let mut context = engine.create_context().unwrap();

        let out = context.execute(&[1, 2, 3, 4]).unwrap();
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn test_execution_is_deterministic() {
        let serialized = build_engine(BuildSettings::new().with_workspace_limit(64));
        let runtime = EngineRuntime::new(descriptor(8));
        let engine = runtime.deserialize(&serialized).unwrap();
        let mut context = engine.create_context().unwrap();

        let first = context.execute(&[5, 6, 7, 8]).unwrap().to_vec();
        let second = context.execute(&[5, 6, 7, 8]).unwrap().to_vec();
        assert_eq!(first, second);
    }

    #[test]
    fn test_wrong_input_size_is_binding_mismatch() {
        let serialized = build_engine(BuildSettings::new().with_workspace_limit(64));
        let runtime = EngineRuntime::new(descriptor(8));
        let engine = runtime.deserialize(&serialized).unwrap();
        let mut context = engine.create_context().unwrap();

        assert!(matches!(
            context.execute(&[1, 2]),
            Err(RuntimeError::BindingMismatch {
                expected: 4,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_excessive_workspace_is_out_of_resources() {
        let serialized = build_engine(BuildSettings::new().with_workspace_limit(u64::MAX));
        let runtime = EngineRuntime::new(descriptor(8));
        let engine = runtime.deserialize(&serialized).unwrap();

        assert!(matches!(
            engine.create_context(),
            Err(RuntimeError::OutOfResources)
        ));
    }

    #[test]
    fn test_corrupt_blob_rejected() {
        let serialized = build_engine(BuildSettings::new());
        let mut bytes = serialized.as_bytes().to_vec();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xFF;

        let runtime = EngineRuntime::new(descriptor(8));
        assert!(matches!(
            runtime.deserialize(&SerializedEngine::from_bytes(bytes)),
            Err(RuntimeError::CorruptBlob(_))
        ));
    }

    #[test]
    fn test_engine_shared_across_threads() {
        let serialized = build_engine(BuildSettings::new().with_workspace_limit(64));
        let runtime = EngineRuntime::new(descriptor(10));
        let engine = runtime.deserialize(&serialized).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let engine = engine.clone();
                std::thread::spawn(move || {
                    let mut context = engine.create_context().unwrap();
                    context.execute(&[i, i, i, i]).unwrap().to_vec()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().len(), 4);
        }
    }
}
