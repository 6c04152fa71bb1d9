use crate::crud::WriteMode;
use crate::error::ApiError;
use serde_json::{Map, Value};

pub fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, ApiError> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::field(key, "is required"))
}

pub fn optional_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// `params.data` for writes; must be a JSON object.
pub fn data_obj(params: &Value) -> Result<&Map<String, Value>, ApiError> {
    params
        .get("data")
        .and_then(|v| v.as_object())
        .ok_or_else(|| ApiError::field("data", "must be an object"))
}

/// Top-level params as an object, empty when params is absent or not an object.
pub fn params_obj(params: &Value) -> Map<String, Value> {
    params.as_object().cloned().unwrap_or_default()
}

pub fn write_mode(op: &str) -> WriteMode {
    match op {
        "create" => WriteMode::Create,
        "patch" => WriteMode::Merge,
        _ => WriteMode::Replace,
    }
}
