//! Kiln Engine - Version-adaptive engine building and execution
//!
//! This crate adapts one build/run pipeline to three incompatible
//! generations of the native acceleration API. The generation is
//! resolved once into a `CapabilityDescriptor` (see `kiln-core`); a
//! backend selected from it hides the per-generation build sequence,
//! workspace setter, ownership handling, and enqueue signature.
//!
//! # Example
//!
//! ```ignore
//! use kiln_core::{CapabilityDescriptor, NativeVersion};
//! use kiln_engine::{
//!     BuildSettings, EngineBlueprint, EngineBuilder, EngineRuntime, LayerSpec,
//!     NetworkDescription, TensorSpec,
//! };
//!
//! let descriptor = CapabilityDescriptor::resolve(NativeVersion::new(10, 3, 0))?;
//!
//! let network = NetworkDescription::new(
//!     "resnet-mini",
//!     TensorSpec::new("input", 3 * 224 * 224),
//!     TensorSpec::new("output", 1000),
//! )
//! .with_layer(LayerSpec::new("conv1", "conv", weights));
//!
//! let blueprint = EngineBlueprint::new(network, BuildSettings::new());
//! let serialized = EngineBuilder::new(descriptor).build(&blueprint)?;
//!
//! let engine = EngineRuntime::new(descriptor).deserialize(&serialized)?;
//! let mut context = engine.create_context()?;
//! let output = context.execute(&input)?;
//! ```

pub mod backend;
pub mod blueprint;
pub mod builder;
pub mod error;
pub mod format;
pub mod native;
pub mod runtime;

// Re-export commonly used types
pub use backend::{for_descriptor, Backend};
pub use blueprint::{
    BuildSettings, EngineBlueprint, LayerSpec, NetworkDescription, PrecisionMode, TensorSpec,
};
pub use builder::EngineBuilder;
pub use error::{BuildError, RuntimeError};
pub use format::{EngineRecord, SerializedEngine, ENGINE_FORMAT_VERSION, ENGINE_MAGIC};
pub use runtime::{Engine, EngineRuntime, ExecutionContext};
