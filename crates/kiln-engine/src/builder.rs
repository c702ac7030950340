//! Engine builder: blueprint in, serialized engine out
//!
//! The builder validates the blueprint, wires up calibration for INT8
//! precision, and runs the selected backend's build sequence. It holds
//! no per-build state; one builder serves any number of blueprints.

use std::sync::Arc;

use kiln_calibrate::{CalibrationController, Int8Calibrator};
use kiln_core::CapabilityDescriptor;
use tracing::info;

use crate::backend::{self, Backend};
use crate::blueprint::{EngineBlueprint, PrecisionMode};
use crate::error::BuildError;
use crate::format::SerializedEngine;
use crate::native::BuilderConfig;

/// Builds serialized engines for one native generation.
pub struct EngineBuilder {
    backend: Arc<dyn Backend>,
}

impl EngineBuilder {
    /// Create a builder for a resolved capability descriptor.
    pub fn new(descriptor: CapabilityDescriptor) -> Self {
        Self {
            backend: backend::for_descriptor(descriptor),
        }
    }

    /// Create a builder over an already-selected backend.
    pub fn with_backend(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// The descriptor this builder targets.
    pub fn descriptor(&self) -> &CapabilityDescriptor {
        self.backend.descriptor()
    }

    /// Build a serialized engine from the blueprint.
    ///
    /// For INT8 precision the blueprint's calibration settings are used
    /// to construct the production calibrator over the configured
    /// dataset directory.
    pub fn build(&self, blueprint: &EngineBlueprint) -> Result<SerializedEngine, BuildError> {
        if blueprint.settings.precision == PrecisionMode::Int8 {
            let calibration = blueprint.settings.calibration.as_ref().ok_or_else(|| {
                BuildError::Configuration("INT8 precision requires calibration settings".into())
            })?;
            let mut calibrator =
                CalibrationController::from_settings(calibration, blueprint.network.input.byte_size)?;
            self.build_with_calibrator(blueprint, Some(&mut calibrator))
        } else {
            self.build_with_calibrator(blueprint, None)
        }
    }

    /// Build with a caller-supplied calibrator implementation.
    ///
    /// The calibrator is consulted only for INT8 blueprints; passing one
    /// alongside another precision is a configuration error, since the
    /// caller clearly expected calibration to run.
    pub fn build_with_calibrator(
        &self,
        blueprint: &EngineBlueprint,
        calibrator: Option<&mut dyn Int8Calibrator>,
    ) -> Result<SerializedEngine, BuildError> {
        self.validate(blueprint, calibrator.is_some())?;

        let mut config = BuilderConfig::new(
            blueprint.settings.precision,
            blueprint.settings.max_batch_size,
        );
        self.backend
            .configure_workspace(&mut config, blueprint.settings.workspace_limit);

        let bytes = self
            .backend
            .build_serialized(&blueprint.network, &mut config, calibrator)?;

        info!(
            network = %blueprint.network.name,
            precision = ?blueprint.settings.precision,
            blob_bytes = bytes.len(),
            "engine built"
        );
        Ok(SerializedEngine::from_bytes(bytes))
    }

    fn validate(&self, blueprint: &EngineBlueprint, has_calibrator: bool) -> Result<(), BuildError> {
        let network = &blueprint.network;
        let settings = &blueprint.settings;

        if network.layers.is_empty() {
            return Err(BuildError::EmptyNetwork);
        }
        if network.input.byte_size == 0 || network.output.byte_size == 0 {
            return Err(BuildError::Configuration(
                "input and output tensors must have nonzero byte sizes".into(),
            ));
        }
        if settings.workspace_limit == 0 {
            return Err(BuildError::Configuration(
                "workspace limit must be nonzero".into(),
            ));
        }
        if settings.max_batch_size == 0 {
            return Err(BuildError::Configuration(
                "maximum batch size must be nonzero".into(),
            ));
        }
        if settings.precision == PrecisionMode::Int8
            && !has_calibrator
            && settings.calibration.is_none()
        {
            return Err(BuildError::Configuration(
                "INT8 precision requires calibration settings".into(),
            ));
        }
        if settings.precision != PrecisionMode::Int8 && has_calibrator {
            return Err(BuildError::Configuration(format!(
                "calibrator supplied but precision is {:?}",
                settings.precision
            )));
        }
        Ok(())
    }
}
