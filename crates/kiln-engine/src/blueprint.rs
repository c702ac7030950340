//! Engine blueprints: network description plus build settings
//!
//! A blueprint is everything the builder needs to produce a serialized
//! engine. It is immutable once handed to [`EngineBuilder`]
//! (see [`crate::builder`]).

use serde::{Deserialize, Serialize};

use kiln_calibrate::CalibrationSettings;

/// Compute precision mode for the built engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrecisionMode {
    /// Full 32-bit floating point
    #[default]
    Fp32,
    /// Half precision
    Fp16,
    /// 8-bit integer quantization (requires calibration)
    Int8,
}

/// A named tensor binding with its fixed byte size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorSpec {
    pub name: String,
    pub byte_size: usize,
}

impl TensorSpec {
    pub fn new(name: impl Into<String>, byte_size: usize) -> Self {
        Self {
            name: name.into(),
            byte_size,
        }
    }
}

/// One layer of the network: identity, operation kind, and weights.
///
/// The arithmetic of the operation itself lives in external kernels;
/// only its identity and parameters pass through the build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerSpec {
    pub name: String,
    pub op: String,
    pub weights: Vec<u8>,
}

impl LayerSpec {
    pub fn new(name: impl Into<String>, op: impl Into<String>, weights: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            op: op.into(),
            weights,
        }
    }
}

/// Network topology handed to the builder.
///
/// Single input and output binding; multi-binding networks are an
/// integration concern of the network importer, not of this core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkDescription {
    pub name: String,
    pub input: TensorSpec,
    pub output: TensorSpec,
    pub layers: Vec<LayerSpec>,
}

impl NetworkDescription {
    pub fn new(name: impl Into<String>, input: TensorSpec, output: TensorSpec) -> Self {
        Self {
            name: name.into(),
            input,
            output,
            layers: Vec::new(),
        }
    }

    /// Append a layer, preserving topological order.
    pub fn with_layer(mut self, layer: LayerSpec) -> Self {
        self.layers.push(layer);
        self
    }
}

/// Build-time configuration consumed by the builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSettings {
    /// Compute precision mode
    pub precision: PrecisionMode,

    /// Working-memory ceiling for the build step, in bytes
    pub workspace_limit: u64,

    /// Maximum batch size the engine should support
    pub max_batch_size: u32,

    /// Calibration settings (required for INT8 precision)
    pub calibration: Option<CalibrationSettings>,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            precision: PrecisionMode::Fp32,
            workspace_limit: 1 << 30,
            max_batch_size: 1,
            calibration: None,
        }
    }
}

impl BuildSettings {
    /// Create settings with defaults (FP32, 1 GiB workspace, batch 1)
    pub fn new() -> Self {
        Self::default()
    }

    /// Set compute precision
    pub fn with_precision(mut self, precision: PrecisionMode) -> Self {
        self.precision = precision;
        self
    }

    /// Set the workspace byte limit
    pub fn with_workspace_limit(mut self, bytes: u64) -> Self {
        self.workspace_limit = bytes;
        self
    }

    /// Set maximum batch size
    pub fn with_max_batch_size(mut self, batch_size: u32) -> Self {
        self.max_batch_size = batch_size;
        self
    }

    /// Attach calibration settings for INT8 builds
    pub fn with_calibration(mut self, calibration: CalibrationSettings) -> Self {
        self.calibration = Some(calibration);
        self
    }
}

/// Network plus settings: the immutable input of one build pass.
#[derive(Debug, Clone)]
pub struct EngineBlueprint {
    pub network: NetworkDescription,
    pub settings: BuildSettings,
}

impl EngineBlueprint {
    pub fn new(network: NetworkDescription, settings: BuildSettings) -> Self {
        Self { network, settings }
    }
}
