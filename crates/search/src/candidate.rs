use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{FusionError, Result};

/// A retrievable document: an opaque identifier plus passthrough payload.
///
/// Identity is decided by `id` alone; the payload is carried, never inspected.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub payload: Map<String, Value>,
}

impl Candidate {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            payload: Map::new(),
        }
    }

    pub fn with_payload(id: impl Into<String>, payload: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            payload,
        }
    }
}

/// Render a database `_id` as an opaque candidate identifier.
///
/// Accepts plain strings, extended-JSON object ids (`{"$oid": ".."}`) and numbers.
pub fn document_id(value: &Value) -> Result<String> {
    match value {
        Value::String(s) if !s.is_empty() => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Object(map) => match map.get("$oid") {
            Some(Value::String(oid)) if !oid.is_empty() => Ok(oid.clone()),
            _ => Err(FusionError::invalid(format!(
                "unsupported document id object: {value}"
            ))),
        },
        _ => Err(FusionError::invalid(format!(
            "document id must be a non-empty string, number or $oid, got {value}"
        ))),
    }
}
