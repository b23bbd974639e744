//! Report payload decoding.
//!
//! A successful report response carries its rows as base64-encoded JSON:
//!
//! ```text
//! {"code": "200", "result": "eyJfX3Jvd3MiOiBb..."}
//!                              │
//!                   base64 ──► {"__rows": [ {...}, {...} ]}
//!                              │
//!   hierarchical reports ──►   {"__rows": [ {"__detailrows": {"D-0001": [ ... ]}} ]}
//! ```
//!
//! Decoding failures are [`IntegrationError::Decode`]; a payload that simply
//! lacks the expected path yields no rows.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::Value;

use hednova_core::RemoteRow;

use crate::error::{IntegrationError, IntegrationResult};

const ROWS_FIELD: &str = "__rows";
const DETAIL_ROWS_FIELD: &str = "__detailrows";

/// Decodes the base64 framing and parses the JSON inside it.
pub fn decode_payload(encoded: &str) -> IntegrationResult<Value> {
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = STANDARD.decode(compact.as_bytes())?;
    let text = String::from_utf8_lossy(&bytes);
    Ok(serde_json::from_str(&text)?)
}

/// Locates the row collection inside a decoded payload.
///
/// With `detail` set, rows are read from `__rows[0].__detailrows[detail]`.
pub fn extract_rows(payload: &Value, detail: Option<&str>) -> IntegrationResult<Vec<RemoteRow>> {
    let Some(rows) = payload.get(ROWS_FIELD) else {
        return Ok(Vec::new());
    };

    let rows = match detail {
        None => rows,
        Some(detail) => {
            let nested = rows
                .as_array()
                .and_then(|r| r.first())
                .and_then(|first| first.get(DETAIL_ROWS_FIELD))
                .and_then(|details| details.get(detail));
            match nested {
                Some(nested) => nested,
                None => return Ok(Vec::new()),
            }
        }
    };

    match rows {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Object(map) => Ok(RemoteRow::from(map.clone())),
                other => Err(IntegrationError::Decode(format!(
                    "row {} is not an object: {}",
                    i,
                    type_name(other)
                ))),
            })
            .collect(),
        other => Err(IntegrationError::Decode(format!(
            "row collection is not an array: {}",
            type_name(other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
