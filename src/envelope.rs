//! Normalization of the API's response shapes.
//!
//! The server answers either with the payload itself or with the payload
//! wrapped as `{"data": ...}`. Login returns `{"token": ...}` or
//! `{"data": {"token": ...}}`. Failure bodies may carry `{"message": ...}`.
//! Everything above the HTTP adapter goes through these helpers instead of
//! probing both shapes at each call site.

use crate::error::ApiError;
use crate::models::MessRecord;
use serde_json::Value;

/// Strip a `data` envelope if present, else return the body unchanged.
pub fn unwrap_data(body: &Value) -> &Value {
    match body.get("data") {
        Some(inner) if body.is_object() => inner,
        _ => body,
    }
}

/// Session token from a login response. Empty strings count as absent.
pub fn extract_token(body: &Value) -> Option<String> {
    let direct = body.get("token").and_then(Value::as_str);
    let nested = body
        .get("data")
        .and_then(|d| d.get("token"))
        .and_then(Value::as_str);

    direct
        .filter(|t| !t.is_empty())
        .or(nested.filter(|t| !t.is_empty()))
        .map(str::to_string)
}

/// `message` field of a failure body, read opportunistically.
pub fn error_message(body: &Value) -> Option<String> {
    body.get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Record list from `GET /messes`, in server order.
pub fn extract_records(body: &Value) -> Result<Vec<MessRecord>, ApiError> {
    let list = unwrap_data(body);
    if !list.is_array() {
        return Err(ApiError::Decode(format!(
            "expected a list of messes, got {}",
            kind(list)
        )));
    }
    serde_json::from_value(list.clone()).map_err(|e| ApiError::Decode(e.to_string()))
}

fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
