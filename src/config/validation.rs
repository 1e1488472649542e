use super::models::Config;
use crate::middleware::json_type;
use serde_json::Value;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Pipeline name must not be empty")]
    EmptyPipelineName,

    #[error("Pipeline stack is empty (at least one handler is required)")]
    EmptyStack,

    #[error("Pipeline stack entry at {position} is a {found}, expected a handler name or a list")]
    InvalidStackEntry { position: String, found: &'static str },

    #[error("Invalid log filter '{filter}': {reason}")]
    InvalidLogFilter { filter: String, reason: String },

    #[error("Settings must be a table, got {found}")]
    SettingsNotATable { found: &'static str },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_pipeline(config)?;
    validate_telemetry(config)?;
    validate_settings(config)?;
    Ok(())
}

/// Ensure the stack names at least one handler and holds only names and lists
fn validate_pipeline(config: &Config) -> Result<(), ValidationError> {
    if config.pipeline.name.trim().is_empty() {
        return Err(ValidationError::EmptyPipelineName);
    }

    let mut handlers = 0;
    for (index, entry) in config.pipeline.stack.iter().enumerate() {
        handlers += count_entries(entry, &index.to_string())?;
    }

    if handlers == 0 {
        return Err(ValidationError::EmptyStack);
    }

    Ok(())
}

/// Count handler names under `entry`, rejecting anything else
fn count_entries(entry: &Value, position: &str) -> Result<usize, ValidationError> {
    match entry {
        Value::String(_) => Ok(1),
        Value::Array(items) => {
            let mut total = 0;
            for (index, item) in items.iter().enumerate() {
                total += count_entries(item, &format!("{position}.{index}"))?;
            }
            Ok(total)
        }
        other => Err(ValidationError::InvalidStackEntry {
            position: position.to_string(),
            found: json_type(other),
        }),
    }
}

fn validate_telemetry(config: &Config) -> Result<(), ValidationError> {
    let filter = &config.telemetry.log_filter;
    EnvFilter::try_new(filter).map_err(|err| ValidationError::InvalidLogFilter {
        filter: filter.clone(),
        reason: err.to_string(),
    })?;
    Ok(())
}

fn validate_settings(config: &Config) -> Result<(), ValidationError> {
    match &config.settings {
        Value::Object(_) => Ok(()),
        other => Err(ValidationError::SettingsNotATable {
            found: json_type(other),
        }),
    }
}
