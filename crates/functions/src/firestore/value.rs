//! Conversion between plain JSON and Firestore's typed `Value` encoding.
//!
//! ```text
//! null          {"nullValue": null}
//! true          {"booleanValue": true}
//! 42            {"integerValue": "42"}
//! 4.2           {"doubleValue": 4.2}
//! "s"           {"stringValue": "s"}
//! [..]          {"arrayValue": {"values": [..]}}
//! {..}          {"mapValue": {"fields": {..}}}
//! ```
//!
//! Decoding additionally flattens the types plain JSON has no equivalent
//! for: timestamps, references and bytes become strings, geo points become
//! `{latitude, longitude}` objects.

use serde_json::{Map, Number, Value, json};

use super::{Fields, FirestoreError};

/// Encode document fields for a REST request body.
#[must_use]
pub fn encode_fields(fields: &Fields) -> Map<String, Value> {
    fields
        .iter()
        .map(|(name, value)| (name.clone(), encode_value(value)))
        .collect()
}

/// Encode a single JSON value.
#[must_use]
pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => encode_number(n),
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(encode_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(fields) => {
            json!({ "mapValue": { "fields": encode_fields(fields) } })
        }
    }
}

fn encode_number(n: &Number) -> Value {
    // Firestore integers are signed 64-bit and travel as decimal strings
    n.as_i64().map_or_else(
        || json!({ "doubleValue": n.as_f64().unwrap_or_default() }),
        |i| json!({ "integerValue": i.to_string() }),
    )
}

/// Decode the `fields` object of a REST document.
///
/// # Errors
///
/// Returns `FirestoreError::Encoding` if a value has an unknown or malformed type.
pub fn decode_fields(fields: &Map<String, Value>) -> Result<Fields, FirestoreError> {
    fields
        .iter()
        .map(|(name, value)| Ok((name.clone(), decode_value(value)?)))
        .collect()
}

/// Decode a single typed value.
///
/// # Errors
///
/// Returns `FirestoreError::Encoding` if the value has an unknown or malformed type.
pub fn decode_value(value: &Value) -> Result<Value, FirestoreError> {
    let typed = value
        .as_object()
        .ok_or_else(|| malformed("value", value))?;
    let (kind, inner) = typed
        .iter()
        .next()
        .ok_or_else(|| malformed("value", value))?;

    match kind.as_str() {
        "nullValue" => Ok(Value::Null),
        "booleanValue" => inner
            .as_bool()
            .map(Value::Bool)
            .ok_or_else(|| malformed(kind, inner)),
        "integerValue" => decode_integer(inner).ok_or_else(|| malformed(kind, inner)),
        // NaN and the infinities arrive as strings and have no JSON form
        "doubleValue" => Ok(inner
            .as_f64()
            .and_then(Number::from_f64)
            .map_or(Value::Null, Value::Number)),
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => inner
            .as_str()
            .map(|s| Value::String(s.to_string()))
            .ok_or_else(|| malformed(kind, inner)),
        "geoPointValue" => Ok(json!({
            "latitude": inner.get("latitude").cloned().unwrap_or(json!(0.0)),
            "longitude": inner.get("longitude").cloned().unwrap_or(json!(0.0)),
        })),
        "arrayValue" => {
            let values = inner
                .get("values")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            values
                .iter()
                .map(decode_value)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        "mapValue" => match inner.get("fields").and_then(Value::as_object) {
            Some(fields) => decode_fields(fields).map(Value::Object),
            None => Ok(Value::Object(Map::new())),
        },
        _ => Err(FirestoreError::Encoding(format!(
            "unsupported value type '{kind}'"
        ))),
    }
}

fn decode_integer(inner: &Value) -> Option<Value> {
    match inner {
        Value::String(s) => s.parse::<i64>().ok().map(Value::from),
        Value::Number(n) => n.as_i64().map(Value::from),
        _ => None,
    }
}

fn malformed(kind: &str, value: &Value) -> FirestoreError {
    FirestoreError::Encoding(format!("malformed {kind}: {value}"))
}

/// Render a top-level field name as a field path for `updateMask`.
///
/// Names that are not simple identifiers must be back-quoted, with
/// backticks and backslashes escaped.
#[must_use]
pub fn field_path(name: &str) -> String {
    let mut chars = name.chars();
    let simple = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if simple {
        name.to_string()
    } else {
        let escaped = name.replace('\\', "\\\\").replace('`', "\\`");
        format!("`{escaped}`")
    }
}

/// Field paths of every leaf under `fields`, for a merging `updateMask`.
///
/// Non-empty maps are descended into so that a merge keeps nested keys it
/// does not mention. Empty maps, arrays and scalars are leaves.
#[must_use]
pub fn merge_field_paths(fields: &Fields) -> Vec<String> {
    let mut paths = Vec::new();
    collect_leaf_paths(fields, "", &mut paths);
    paths
}

fn collect_leaf_paths(fields: &Fields, parent: &str, paths: &mut Vec<String>) {
    for (name, value) in fields {
        let path = if parent.is_empty() {
            field_path(name)
        } else {
            format!("{parent}.{}", field_path(name))
        };
        match value {
            Value::Object(nested) if !nested.is_empty() => {
                collect_leaf_paths(nested, &path, paths);
            }
            _ => paths.push(path),
        }
    }
}
