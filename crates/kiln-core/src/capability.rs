//! Capability resolution for the linked native library
//!
//! Three successive generations of the native API changed object
//! ownership, enqueue signatures, and workspace configuration
//! incompatibly. [`CapabilityDescriptor`] captures which shape is in
//! effect as plain data, resolved once from the version triplet. No
//! component downstream of this module checks versions; they match on
//! the descriptor's fields (or, better, on a backend built from it).

use std::fmt;

use crate::error::CapabilityError;
use crate::version::NativeVersion;

/// Oldest native major version kiln supports.
pub const MIN_SUPPORTED_MAJOR: u32 = 7;

/// How native-owned objects are disposed of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OwnershipModel {
    /// Generation 7: objects expose an explicit destructor that must be
    /// called before the handle is dropped.
    ExplicitDestroy,
    /// Generation 8+: ordinary ownership release; dropping the handle is
    /// the whole story.
    AutomaticRelease,
}

/// Which inference-enqueue signature the native runtime exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnqueueSignature {
    /// Legacy shape: takes an explicit batch count alongside bindings.
    LegacyBatched,
    /// Current shape: bindings only; batch size comes from tensor shapes.
    BindingsOnly,
}

/// How the build-time working-memory ceiling is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkspaceMechanism {
    /// Dedicated workspace-size setter on the build configuration.
    LegacySetter,
    /// Memory-pool limit API keyed by pool kind.
    PoolLimit,
}

/// Which build sequence the native builder exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildMode {
    /// Build an engine object, then serialize it in a second call.
    BuildThenSerialize,
    /// One call yields the serialized blob; no intermediate engine object.
    BuildSerializedDirect,
}

/// Resolved shape of the native API, fixed for the process lifetime.
///
/// Pure data: constructing one has no side effects, and two descriptors
/// resolved from the same version are identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CapabilityDescriptor {
    /// The version this descriptor was resolved from.
    pub version: NativeVersion,
    pub ownership: OwnershipModel,
    pub enqueue_signature: EnqueueSignature,
    pub workspace_mechanism: WorkspaceMechanism,
    pub build_mode: BuildMode,
    /// Deep-learning-accelerator offload is available.
    pub dla_support: bool,
    /// Dynamic input shapes are available.
    pub dynamic_shapes: bool,
    /// The newest generation requires callback implementations to answer
    /// an interface-identity negotiation query.
    pub versioned_interfaces: bool,
}

impl CapabilityDescriptor {
    /// Resolve the descriptor for a native library version.
    ///
    /// Pure function of the triplet. The only error is a major version
    /// below the supported floor.
    pub fn resolve(version: NativeVersion) -> Result<Self, CapabilityError> {
        if version.major < MIN_SUPPORTED_MAJOR {
            return Err(CapabilityError::UnsupportedVersion {
                found: version,
                floor: MIN_SUPPORTED_MAJOR,
            });
        }

        let legacy = version.before(8, 0, 0);

        Ok(Self {
            version,
            ownership: if legacy {
                OwnershipModel::ExplicitDestroy
            } else {
                OwnershipModel::AutomaticRelease
            },
            enqueue_signature: if legacy {
                EnqueueSignature::LegacyBatched
            } else {
                EnqueueSignature::BindingsOnly
            },
            // The dedicated workspace setter survived into early gen 8
            // before the pool-limit API replaced it in 8.4.
            workspace_mechanism: if version.before(8, 4, 0) {
                WorkspaceMechanism::LegacySetter
            } else {
                WorkspaceMechanism::PoolLimit
            },
            build_mode: if legacy {
                BuildMode::BuildThenSerialize
            } else {
                BuildMode::BuildSerializedDirect
            },
            dla_support: version.at_least(8, 0, 0),
            dynamic_shapes: true,
            versioned_interfaces: version.at_least(10, 0, 0),
        })
    }
}

impl fmt::Display for CapabilityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "native {} ({:?}, {:?}, {:?}, {:?})",
            self.version,
            self.ownership,
            self.workspace_mechanism,
            self.build_mode,
            self.enqueue_signature,
        )
    }
}
