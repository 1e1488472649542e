//! Dotted-path access into nested JSON objects (`"a.b.c"`).

use serde_json::{Map, Value};

use super::SettingsError;

pub(crate) fn segments(path: &str) -> Result<Vec<&str>, SettingsError> {
    let parts: Vec<&str> = path.split('.').collect();
    if parts.iter().any(|part| part.is_empty()) {
        return Err(SettingsError::InvalidPath(path.to_string()));
    }
    Ok(parts)
}

pub(crate) fn lookup<'a>(root: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let parts = segments(path).ok()?;
    let (last, parents) = parts.split_last()?;

    let mut current = root;
    for part in parents {
        current = current.get(*part)?.as_object()?;
    }
    current.get(*last)
}

/// Store `value` at `path`, creating missing intermediate objects.
pub(crate) fn insert(
    root: &mut Map<String, Value>,
    path: &str,
    value: Value,
) -> Result<Option<Value>, SettingsError> {
    let parts = segments(path)?;
    let Some((last, parents)) = parts.split_last() else {
        return Err(SettingsError::InvalidPath(path.to_string()));
    };

    let mut current = root;
    for (depth, part) in parents.iter().enumerate() {
        let entry = current
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        current = match entry {
            Value::Object(map) => map,
            _ => {
                return Err(SettingsError::NotAnObject {
                    path: parents[..=depth].join("."),
                });
            }
        };
    }

    Ok(current.insert(last.to_string(), value))
}

pub(crate) fn remove(root: &mut Map<String, Value>, path: &str) -> Option<Value> {
    let parts = segments(path).ok()?;
    let (last, parents) = parts.split_last()?;

    let mut current = root;
    for part in parents {
        current = current.get_mut(*part)?.as_object_mut()?;
    }
    current.remove(*last)
}
