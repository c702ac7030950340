//! Generation backends over the native build and runtime surface
//!
//! One backend per native API generation. Each encapsulates the build
//! sequence, workspace setter, ownership handling, and enqueue
//! signature of its generation, so nothing above this module ever
//! inspects a version. Selection happens once, from the resolved
//! [`CapabilityDescriptor`].

use std::sync::Arc;

use kiln_calibrate::{Int8Calibrator, CALIBRATOR_INTERFACE};
use kiln_core::{
    BuildMode, CapabilityDescriptor, EnqueueSignature, NativeOwned, WorkspaceMechanism,
};
use tracing::debug;

use crate::blueprint::NetworkDescription;
use crate::error::{BuildError, RuntimeError};
use crate::format::EngineRecord;
use crate::native::{self, BuilderConfig, PoolKind};

/// The per-generation adaptation seam.
///
/// Implementations are stateless beyond their descriptor; one instance
/// serves any number of concurrent builds and executions.
pub trait Backend: Send + Sync {
    /// The descriptor this backend was selected for.
    fn descriptor(&self) -> &CapabilityDescriptor;

    /// Apply the working-memory ceiling through this generation's API.
    fn configure_workspace(&self, config: &mut BuilderConfig, limit_bytes: u64);

    /// Run the generation's build sequence to a serialized blob.
    fn build_serialized(
        &self,
        network: &NetworkDescription,
        config: &mut BuilderConfig,
        calibrator: Option<&mut dyn Int8Calibrator>,
    ) -> Result<Vec<u8>, BuildError>;

    /// Dispatch one inference through this generation's enqueue signature.
    fn enqueue(
        &self,
        record: &EngineRecord,
        scratch: &mut Vec<u8>,
        input: &[u8],
        output: &mut [u8],
    ) -> Result<(), RuntimeError> {
        match self.descriptor().enqueue_signature {
            EnqueueSignature::LegacyBatched => native::enqueue_batched(
                record,
                record.max_batch_size,
                scratch,
                input,
                output,
            ),
            EnqueueSignature::BindingsOnly => {
                native::enqueue_bindings(record, scratch, input, output)
            }
        }
    }
}

/// Select the backend for a resolved descriptor.
pub fn for_descriptor(descriptor: CapabilityDescriptor) -> Arc<dyn Backend> {
    debug!(%descriptor, "selecting backend");
    match descriptor.build_mode {
        BuildMode::BuildThenSerialize => Arc::new(LegacyBackend { descriptor }),
        BuildMode::BuildSerializedDirect => {
            if descriptor.versioned_interfaces {
                Arc::new(VersionedBackend { descriptor })
            } else {
                Arc::new(ReleaseBackend { descriptor })
            }
        }
    }
}

fn set_workspace(descriptor: &CapabilityDescriptor, config: &mut BuilderConfig, limit_bytes: u64) {
    match descriptor.workspace_mechanism {
        WorkspaceMechanism::LegacySetter => config.set_max_workspace_size(limit_bytes),
        WorkspaceMechanism::PoolLimit => {
            config.set_memory_pool_limit(PoolKind::Workspace, limit_bytes)
        }
    }
}

/// Generation 7: build an engine object, serialize it, destroy it.
struct LegacyBackend {
    descriptor: CapabilityDescriptor,
}

impl Backend for LegacyBackend {
    fn descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }

    fn configure_workspace(&self, config: &mut BuilderConfig, limit_bytes: u64) {
        set_workspace(&self.descriptor, config, limit_bytes);
    }

    fn build_serialized(
        &self,
        network: &NetworkDescription,
        config: &mut BuilderConfig,
        calibrator: Option<&mut dyn Int8Calibrator>,
    ) -> Result<Vec<u8>, BuildError> {
        // The intermediate engine object must be destroyed explicitly;
        // the guard covers the serialization error path too.
        let engine = NativeOwned::new(
            native::build_engine(network, config, calibrator)?,
            self.descriptor.ownership,
        );
        native::serialize_engine(&engine)
    }
}

/// Generations 8 and 9: direct serialization, ordinary ownership.
struct ReleaseBackend {
    descriptor: CapabilityDescriptor,
}

impl Backend for ReleaseBackend {
    fn descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }

    fn configure_workspace(&self, config: &mut BuilderConfig, limit_bytes: u64) {
        set_workspace(&self.descriptor, config, limit_bytes);
    }

    fn build_serialized(
        &self,
        network: &NetworkDescription,
        config: &mut BuilderConfig,
        calibrator: Option<&mut dyn Int8Calibrator>,
    ) -> Result<Vec<u8>, BuildError> {
        native::build_serialized_network(network, config, calibrator)
    }
}

/// Generation 10+: direct serialization with interface-identity
/// negotiation on every callback implementation handed to the builder.
struct VersionedBackend {
    descriptor: CapabilityDescriptor,
}

impl Backend for VersionedBackend {
    fn descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }

    fn configure_workspace(&self, config: &mut BuilderConfig, limit_bytes: u64) {
        set_workspace(&self.descriptor, config, limit_bytes);
    }

    fn build_serialized(
        &self,
        network: &NetworkDescription,
        config: &mut BuilderConfig,
        mut calibrator: Option<&mut dyn Int8Calibrator>,
    ) -> Result<Vec<u8>, BuildError> {
        if let Some(calibrator) = calibrator.as_deref_mut() {
            let info = calibrator.interface_info();
            debug!(name = info.name, major = info.major, minor = info.minor, "negotiating calibrator interface");
            // Name and major version must match; minor revisions are
            // backward compatible.
            if info.name != CALIBRATOR_INTERFACE.name || info.major != CALIBRATOR_INTERFACE.major {
                return Err(BuildError::Configuration(format!(
                    "calibrator implements interface {}/{}.{}, runtime requires {}/{}.x",
                    info.name,
                    info.major,
                    info.minor,
                    CALIBRATOR_INTERFACE.name,
                    CALIBRATOR_INTERFACE.major,
                )));
            }
        }
        native::build_serialized_network(network, config, calibrator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprint::{LayerSpec, PrecisionMode, TensorSpec};
    use kiln_core::NativeVersion;

    fn backend_for(major: u32, minor: u32) -> Arc<dyn Backend> {
        let descriptor =
            CapabilityDescriptor::resolve(NativeVersion::new(major, minor, 0)).unwrap();
        for_descriptor(descriptor)
    }

    fn sample_network() -> NetworkDescription {
        NetworkDescription::new(
            "net",
            TensorSpec::new("input", 8),
            TensorSpec::new("output", 8),
        )
        .with_layer(LayerSpec::new("relu1", "relu", vec![]))
    }

    #[test]
    fn test_workspace_setters_converge() {
        let network = sample_network();
        let mut blobs = Vec::new();

        for backend in [backend_for(7, 2), backend_for(8, 2), backend_for(8, 6)] {
            let mut config = BuilderConfig::new(PrecisionMode::Fp32, 1);
            backend.configure_workspace(&mut config, 4096);
            assert_eq!(config.workspace_limit(), Some(4096));
            blobs.push(backend.build_serialized(&network, &mut config, None).unwrap());
        }

        // Same blueprint, same blob, regardless of generation.
        assert_eq!(blobs[0], blobs[1]);
        assert_eq!(blobs[1], blobs[2]);
    }

    #[test]
    fn test_build_modes_agree_on_output() {
        let network = sample_network();

        let legacy = backend_for(7, 0);
        let mut config = BuilderConfig::new(PrecisionMode::Fp16, 4);
        legacy.configure_workspace(&mut config, 1 << 20);
        let via_object = legacy.build_serialized(&network, &mut config, None).unwrap();

        let direct = backend_for(10, 3);
        let mut config = BuilderConfig::new(PrecisionMode::Fp16, 4);
        direct.configure_workspace(&mut config, 1 << 20);
        let via_direct = direct.build_serialized(&network, &mut config, None).unwrap();

        assert_eq!(via_object, via_direct);
    }

    #[test]
    fn test_enqueue_signature_follows_descriptor() {
        let record = EngineRecord {
            network_name: "net".into(),
            precision: PrecisionMode::Fp32,
            workspace_limit: 64,
            max_batch_size: 1,
            input_bytes: 4,
            output_bytes: 4,
            layers: vec![LayerSpec::new("relu1", "relu", vec![])],
            calibration_table: None,
        };
        let input = [9u8, 8, 7, 6];

        let mut legacy_out = [0u8; 4];
        let mut scratch = Vec::new();
        backend_for(7, 2)
            .enqueue(&record, &mut scratch, &input, &mut legacy_out)
            .unwrap();

        let mut current_out = [0u8; 4];
        backend_for(10, 0)
            .enqueue(&record, &mut scratch, &input, &mut current_out)
            .unwrap();

        assert_eq!(legacy_out, current_out);
    }
}
