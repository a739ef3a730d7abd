use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::errors::{ErrorInfo, HdxError};

fn serde_error(code: &str, err: impl ToString) -> HdxError {
    HdxError::Serde(ErrorInfo::new(code, err.to_string()))
}

/// Rebuilds every object of `value` with its keys in lexicographic order.
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(entries.into_iter().map(|(k, v)| (k, sort_keys(v))).collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        scalar => scalar,
    }
}

/// Compact JSON with sorted object keys, used for result hashes and exports.
///
/// Non-finite floats serialize as `null`.
pub fn to_canonical_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, HdxError> {
    let tree = serde_json::to_value(value).map_err(|err| serde_error("json_serialize", err))?;
    serde_json::to_vec(&sort_keys(tree)).map_err(|err| serde_error("json_write", err))
}

/// YAML rendering of a configuration.
pub fn to_yaml_string<T: Serialize>(value: &T) -> Result<String, HdxError> {
    serde_yaml::to_string(value).map_err(|err| serde_error("yaml_serialize", err))
}

/// Parses a YAML configuration document.
pub fn from_yaml_slice<T: DeserializeOwned>(data: &[u8]) -> Result<T, HdxError> {
    serde_yaml::from_slice(data).map_err(|err| serde_error("yaml_deserialize", err))
}
