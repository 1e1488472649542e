//! Settings store
//!
//! Keyed JSON values addressed by dotted paths (`"server.port"`).
//!
//! A [`SettingsSchema`] holds the definitions shared by every instance:
//! defaults, validators, transforms applied on write, and getters applied
//! on read. [`Settings`] is one instance's values, seeded from the schema.
//!
//! ```rust
//! use mixin_kit::settings::{Settings, SettingsSchema};
//! use serde_json::json;
//!
//! let schema = SettingsSchema::new()
//!     .default_value("name", json!("anonymous"))
//!     .validate("name", |value| value.is_string())
//!     .transform("name", |value| match value.as_str() {
//!         Some(name) => json!(name.to_uppercase()),
//!         None => value,
//!     });
//!
//! let mut settings = Settings::new(schema.into_shared());
//! assert_eq!(settings.get("name"), Some(json!("anonymous")));
//!
//! settings.set("name", json!("works")).unwrap();
//! assert_eq!(settings.get("name"), Some(json!("WORKS")));
//! assert!(settings.set("name", json!(4)).is_err());
//! ```

mod path;

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Value: {value} failed validator for {path} setting")]
    Rejected { path: String, value: Value },

    #[error("Setting path '{path}' does not hold an object")]
    NotAnObject { path: String },

    #[error("Invalid setting path '{0}'")]
    InvalidPath(String),
}

type Validator = Arc<dyn Fn(&Value) -> bool + Send + Sync>;
type Mapper = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Definitions shared by all [`Settings`] created from it
#[derive(Clone, Default)]
pub struct SettingsSchema {
    defaults: Map<String, Value>,
    validators: HashMap<String, Validator>,
    transforms: HashMap<String, Mapper>,
    getters: HashMap<String, Mapper>,
}

impl SettingsSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed defaults from a JSON object, e.g. the `[settings]` table of
    /// the configuration file.
    pub fn from_defaults(defaults: Map<String, Value>) -> Self {
        Self {
            defaults,
            ..Self::default()
        }
    }

    /// Default for `path`. Invalid paths are ignored with a warning.
    pub fn default_value(mut self, path: &str, value: Value) -> Self {
        if let Err(err) = path::insert(&mut self.defaults, path, value) {
            tracing::warn!(%path, error = %err, "ignoring setting default");
        }
        self
    }

    /// Only values accepted by `validator` can be set at `path`.
    pub fn validate<F>(mut self, path: &str, validator: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.validators.insert(path.to_string(), Arc::new(validator));
        self
    }

    /// Applied to values set at `path`, after validation.
    pub fn transform<F>(mut self, path: &str, transform: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.transforms.insert(path.to_string(), Arc::new(transform));
        self
    }

    /// Applied to the stored value whenever `path` is read.
    pub fn getter<F>(mut self, path: &str, getter: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.getters.insert(path.to_string(), Arc::new(getter));
        self
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl fmt::Debug for SettingsSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingsSchema")
            .field("defaults", &self.defaults)
            .field("validators", &self.validators.keys().collect::<Vec<_>>())
            .field("transforms", &self.transforms.keys().collect::<Vec<_>>())
            .field("getters", &self.getters.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// One instance's settings
#[derive(Debug, Clone)]
pub struct Settings {
    schema: Arc<SettingsSchema>,
    values: Map<String, Value>,
}

impl Settings {
    pub fn new(schema: Arc<SettingsSchema>) -> Self {
        let values = schema.defaults.clone();
        Self { schema, values }
    }

    pub fn schema(&self) -> &Arc<SettingsSchema> {
        &self.schema
    }

    /// Value at `path`, passed through its getter if one is defined.
    pub fn get(&self, path: &str) -> Option<Value> {
        let value = path::lookup(&self.values, path)?.clone();
        match self.schema.getters.get(path) {
            Some(getter) => Some(getter(value)),
            None => Some(value),
        }
    }

    pub fn has(&self, path: &str) -> bool {
        path::lookup(&self.values, path).is_some()
    }

    /// Store `value` at `path`.
    ///
    /// # Errors
    ///
    /// - [`SettingsError::Rejected`] if the validator for `path` refuses it
    /// - [`SettingsError::NotAnObject`] if a parent segment holds a scalar
    /// - [`SettingsError::InvalidPath`] for empty segments
    pub fn set(&mut self, path: &str, value: Value) -> Result<&mut Self, SettingsError> {
        if let Some(validator) = self.schema.validators.get(path) {
            if !validator(&value) {
                return Err(SettingsError::Rejected {
                    path: path.to_string(),
                    value,
                });
            }
        }

        let value = match self.schema.transforms.get(path) {
            Some(transform) => transform(value),
            None => value,
        };

        path::insert(&mut self.values, path, value)?;
        tracing::trace!(%path, "setting updated");
        Ok(self)
    }

    pub fn remove(&mut self, path: &str) -> Option<Value> {
        path::remove(&mut self.values, path)
    }

    /// All stored values as one JSON object (getters not applied).
    pub fn to_value(&self) -> Value {
        Value::Object(self.values.clone())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new(Arc::new(SettingsSchema::default()))
    }
}
