use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

/// Errors raised while reading caller-supplied record payloads
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("Invalid JSON format: {0}")]
    InvalidJson(String),
    #[error("Missing required field: {0}")]
    MissingRequiredField(String),
    #[error("Invalid UUID format for field '{field}': {value}")]
    InvalidUuid { field: String, value: String },
}

/// A stored record as read back from the backing store. `data` holds the
/// list-context columns plus, for variant entities, the active variant's
/// side-table columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub key: Uuid,
    pub data: Map<String, Value>,
}

/// One record of a mutation request.
///
/// Accepts either `{ "key": ..., "data": { ... } }` or a flat object where
/// every field other than `key` is data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordInput {
    pub key: Option<Uuid>,
    pub data: Map<String, Value>,
}

impl RecordInput {
    pub fn from_json(value: Value) -> Result<Self, RecordError> {
        let mut object = match value {
            Value::Object(map) => map,
            other => {
                return Err(RecordError::InvalidJson(format!(
                    "Expected a record object, got {}",
                    type_name(&other)
                )))
            }
        };

        let key = match object.remove("key") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(Uuid::parse_str(&s).map_err(|_| RecordError::InvalidUuid {
                field: "key".to_string(),
                value: s,
            })?),
            Some(other) => {
                return Err(RecordError::InvalidUuid {
                    field: "key".to_string(),
                    value: other.to_string(),
                })
            }
        };

        let data = match object.remove("data") {
            Some(Value::Object(data)) if object.is_empty() => data,
            Some(Value::Object(_)) => {
                return Err(RecordError::InvalidJson(
                    "Record mixes a 'data' object with top-level fields".to_string(),
                ))
            }
            Some(other) => {
                // A column literally named `data` in flat form.
                object.insert("data".to_string(), other);
                object
            }
            None => object,
        };

        Ok(Self { key, data })
    }

    pub fn require_key(&self) -> Result<Uuid, RecordError> {
        self.key
            .ok_or_else(|| RecordError::MissingRequiredField("key".to_string()))
    }
}

/// Request body of a mutation: records per type name. Type names iterate in
/// lexical order, which is also the write order.
pub type Batch = BTreeMap<String, Vec<RecordInput>>;

/// Unwrap a mutation request body of the form `{ "data": { type: [...] } }`.
pub fn parse_request(body: Value) -> Result<Batch, RecordError> {
    match body {
        Value::Object(mut map) => match map.remove("data") {
            Some(data) => parse_batch(data),
            None => Err(RecordError::MissingRequiredField("data".to_string())),
        },
        other => Err(RecordError::InvalidJson(format!(
            "Expected a request object, got {}",
            type_name(&other)
        ))),
    }
}

pub fn parse_batch(body: Value) -> Result<Batch, RecordError> {
    let object = match body {
        Value::Object(map) => map,
        other => {
            return Err(RecordError::InvalidJson(format!(
                "Expected an object keyed by type name, got {}",
                type_name(&other)
            )))
        }
    };

    let mut batch = Batch::new();
    for (type_name, records) in object {
        let records = match records {
            Value::Array(items) => items
                .into_iter()
                .map(RecordInput::from_json)
                .collect::<Result<Vec<_>, _>>()?,
            single @ Value::Object(_) => vec![RecordInput::from_json(single)?],
            other => {
                return Err(RecordError::InvalidJson(format!(
                    "Records for '{}' must be an array, got {}",
                    type_name,
                    self::type_name(&other)
                )))
            }
        };
        batch.insert(type_name, records);
    }
    Ok(batch)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
