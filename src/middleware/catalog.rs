use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use super::error::{HandlerFailure, RegistrationError};
use super::handler::{Arguments, Handler, Layer};

/// Arguments used by the built-in handlers: one shared JSON document.
pub type JsonArgs = (Arc<Mutex<Value>>,);

/// Named handlers that configuration stacks refer to
#[derive(Clone)]
pub struct Catalog<A> {
    handlers: BTreeMap<String, Handler<A>>,
}

impl<A: Arguments> Catalog<A> {
    pub fn new() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }

    /// Register `handler` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, handler: Handler<A>) -> &mut Self {
        let name = name.into();
        let handler = handler.named(name.clone());
        self.handlers.insert(name, handler);
        self
    }

    pub fn get(&self, name: &str) -> Result<Handler<A>, RegistrationError> {
        self.handlers
            .get(name)
            .cloned()
            .ok_or_else(|| RegistrationError::UnknownHandler(name.to_string()))
    }

    pub fn has_handler(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Turn a configuration value into a layer.
    ///
    /// Strings are looked up by name and arrays become nested stacks.
    /// Anything else is not callable.
    pub fn resolve(&self, value: &Value) -> Result<Layer<A>, RegistrationError> {
        match value {
            Value::String(name) => self.get(name).map(Layer::Handler),
            Value::Array(items) => items
                .iter()
                .map(|item| self.resolve(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Layer::Stack),
            other => Err(RegistrationError::NotCallable {
                found: json_type(other),
            }),
        }
    }
}

impl<A: Arguments> Default for Catalog<A> {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn with_object<R>(
    document: &Mutex<Value>,
    f: impl FnOnce(&mut Map<String, Value>) -> R,
) -> Result<R, HandlerFailure> {
    let mut document = document.lock().unwrap_or_else(PoisonError::into_inner);
    match &mut *document {
        Value::Object(map) => Ok(f(map)),
        other => Err(format!("context must be a JSON object, got {}", json_type(other)).into()),
    }
}

impl Catalog<JsonArgs> {
    /// Catalog with the built-in handlers:
    ///
    /// - `count`: increments `count`
    /// - `trace`: appends the current `count` to `trace`
    /// - `fail`: reports a failure carrying `fail_message` (default "requested failure")
    /// - `recover`: error handler storing the failure message in `error`
    pub fn with_defaults() -> Self {
        let mut catalog = Self::new();

        catalog.register(
            "count",
            Handler::new(|(document,): &JsonArgs, next| {
                with_object(document, |map| {
                    let count = map.get("count").and_then(Value::as_u64).unwrap_or(0);
                    map.insert("count".to_string(), Value::from(count + 1));
                })?;
                next.call();
                Ok(())
            }),
        );

        catalog.register(
            "trace",
            Handler::new(|(document,): &JsonArgs, next| {
                with_object(document, |map| {
                    let count = map.get("count").cloned().unwrap_or(Value::from(0));
                    match map.entry("trace").or_insert_with(|| Value::Array(Vec::new())) {
                        Value::Array(items) => items.push(count),
                        other => *other = Value::Array(vec![count]),
                    }
                })?;
                next.call();
                Ok(())
            }),
        );

        catalog.register(
            "fail",
            Handler::new(|(document,): &JsonArgs, next| {
                let message = with_object(document, |map| {
                    map.get("fail_message")
                        .and_then(Value::as_str)
                        .unwrap_or("requested failure")
                        .to_string()
                })?;
                next.fail(message);
                Ok(())
            }),
        );

        catalog.register(
            "recover",
            Handler::error(|failure, (document,): &JsonArgs, _next| {
                with_object(document, |map| {
                    map.insert("error".to_string(), Value::from(failure.to_string()));
                })
            }),
        );

        catalog
    }
}
