//! Builder for basic and referenced motors.

use std::sync::Arc;

use crate::config::{MotorConfig, SoftwareLimits, SystemConfig};
use crate::controller::MotorController;
use crate::error::{ConfigError, Error, Result};

use super::basic::BasicMotor;
use super::referenced::ReferencedMotor;

/// Builder for [`BasicMotor`] and [`ReferencedMotor`] instances.
pub struct MotorBuilder {
    controller: Option<Arc<dyn MotorController>>,
    config: MotorConfig,
}

impl std::fmt::Debug for MotorBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MotorBuilder")
            .field("controller", &self.controller.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl Default for MotorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MotorBuilder {
    /// Create a new builder with a default configuration named `motor`.
    pub fn new() -> Self {
        Self {
            controller: None,
            config: MotorConfig::new("motor"),
        }
    }

    /// Set the controller the motor drives.
    pub fn controller(mut self, controller: Arc<dyn MotorController>) -> Self {
        self.controller = Some(controller);
        self
    }

    /// Set the motor name.
    pub fn name(mut self, name: &str) -> Self {
        self.config.name = heapless::String::try_from(name).unwrap_or_default();
        self
    }

    /// Set user units per motor step.
    pub fn units_per_step(mut self, units_per_step: f64) -> Self {
        self.config.units_per_step = units_per_step;
        self
    }

    /// Set user units per encoder step.
    pub fn encoder_units_per_step(mut self, units_per_step: f64) -> Self {
        self.config.encoder_units_per_step = units_per_step;
        self
    }

    /// Start moves as soon as a target is set.
    pub fn autostart(mut self, autostart: bool) -> Self {
        self.config.autostart = autostart;
        self
    }

    /// Set the interval at which background actions poll the controller.
    pub fn poll_interval_ms(mut self, interval_ms: u64) -> Self {
        self.config.poll_interval_ms = interval_ms;
        self
    }

    /// Set software limits.
    pub fn limits(mut self, limits: SoftwareLimits) -> Self {
        self.config.limits = Some(limits);
        self
    }

    /// Configure from a MotorConfig.
    pub fn from_motor_config(mut self, config: &MotorConfig) -> Self {
        self.config = config.clone();
        self
    }

    /// Configure from SystemConfig by motor name.
    pub fn from_config(self, config: &SystemConfig, motor_name: &str) -> Result<Self> {
        let motor_config = config.motor(motor_name).ok_or_else(|| {
            Error::Config(ConfigError::MotorNotFound(
                heapless::String::try_from(motor_name).unwrap_or_default(),
            ))
        })?;

        Ok(self.from_motor_config(motor_config))
    }

    /// Build a motor without end-switch handling.
    ///
    /// # Errors
    ///
    /// Returns an error if no controller was set or the configuration is invalid.
    pub fn build_basic(self) -> Result<BasicMotor> {
        let controller = self.take_controller()?;
        BasicMotor::new(controller, &self.config)
    }

    /// Build a motor that calibrates against its end switches.
    ///
    /// # Errors
    ///
    /// Returns an error if no controller was set or the configuration is invalid.
    pub fn build_referenced(self) -> Result<ReferencedMotor> {
        let controller = self.take_controller()?;
        ReferencedMotor::new(controller, &self.config)
    }

    fn take_controller(&self) -> Result<Arc<dyn MotorController>> {
        self.controller
            .clone()
            .ok_or(Error::Config(ConfigError::MissingField("controller")))
    }
}
