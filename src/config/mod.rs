//! Configuration management for mixin-kit
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use mixin_kit::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Pipeline: {}", config.pipeline.name);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `MIXIN_KIT__<section>__<key>`
//!
//! Examples:
//! - `MIXIN_KIT__PIPELINE__NAME=api`
//! - `MIXIN_KIT__TELEMETRY__LOG_FILTER=mixin_kit=debug`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/mixin-kit.toml`.
//! This can be overridden using the `MIXIN_KIT_CONFIG` environment variable.
//!
//! ```toml
//! [pipeline]
//! name = "api"
//! stack = ["recover", "trace", ["count", "count"]]
//!
//! [settings.server]
//! port = 8080
//! ```

mod models;
mod sources;
mod validation;

pub use models::{Config, PipelineConfig, TelemetryConfig};
pub use sources::config_path;
pub use validation::ValidationError;

use std::path::PathBuf;
use thiserror::Error;

use crate::middleware::{Arguments, Catalog, Pipeline, PipelineOptions, RegistrationError};
use crate::settings::{Settings, SettingsSchema};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),

    #[error("Pipeline stack could not be registered: {0}")]
    RegistrationError(#[from] RegistrationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`MIXIN_KIT__*`)
    /// 2. TOML file (default: `config/mixin-kit.toml`)
    /// 3. Default values
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file is malformed
    /// - Validation fails (empty stack, invalid entries, bad log filter)
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Build the configured pipeline, resolving stack names in `catalog`
    pub fn build_pipeline<A: Arguments>(
        &self,
        catalog: &Catalog<A>,
    ) -> Result<Pipeline<A>, ConfigError> {
        let pipeline = Pipeline::with_options(
            PipelineOptions::builder()
                .name(self.pipeline.name.clone())
                .build(),
        );
        pipeline.use_values(catalog, &self.pipeline.stack)?;
        Ok(pipeline)
    }

    /// Settings store seeded with the `[settings]` table
    pub fn build_settings(&self) -> Settings {
        Settings::new(SettingsSchema::from_defaults(self.settings_defaults()).into_shared())
    }
}
