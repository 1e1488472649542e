use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::middleware::DEFAULT_PIPELINE_NAME;

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    /// Initial settings, seeded as defaults of the settings store
    #[serde(default = "default_settings")]
    pub settings: Value,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            telemetry: TelemetryConfig::default(),
            settings: default_settings(),
        }
    }
}

/// Middleware stack configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    #[serde(default = "default_pipeline_name")]
    pub name: String,
    /// Handler names from the catalog; nested arrays are flattened in order
    #[serde(default)]
    pub stack: Vec<Value>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: default_pipeline_name(),
            stack: Vec::new(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// `tracing_subscriber::EnvFilter` directives, used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
        }
    }
}

impl Config {
    /// The `[settings]` table as a JSON object (empty if absent)
    pub fn settings_defaults(&self) -> Map<String, Value> {
        match &self.settings {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        }
    }
}

fn default_pipeline_name() -> String {
    DEFAULT_PIPELINE_NAME.to_string()
}

fn default_log_filter() -> String {
    "info".to_string()
}

fn default_settings() -> Value {
    Value::Object(Map::new())
}
