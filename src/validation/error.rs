//! Validation error types for payloads checked against resource metadata.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;

/// One structured error recorded against a field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    pub message: String,
    /// Permitted values, when the field is enumerated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<String>>,
}

/// Errors raised while validating a payload. All map onto HTTP 400.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// The field exists neither on the resource nor on any owned custom resource.
    UnknownField {
        /// The field name as sent in the payload.
        field: String,
    },

    /// The field is enumerated and the value is not one of its members.
    InvalidValue {
        /// The field name.
        field: String,
        /// The rejected value.
        value: Value,
        /// The permitted values.
        allowed: Vec<String>,
    },

    /// One or more fields failed; carries every error by field name.
    Failed(BTreeMap<String, Vec<FieldError>>),
}

impl ValidationError {
    /// Structured payload of the error
    pub fn data(&self) -> Value {
        match self {
            ValidationError::UnknownField { field } => json!({ "field": field }),
            ValidationError::InvalidValue { allowed, .. } => json!(allowed),
            ValidationError::Failed(errors) => json!(errors),
        }
    }

    /// Permitted values carried by an `InvalidValue` error
    pub fn allowed_values(&self) -> Option<&[String]> {
        match self {
            ValidationError::InvalidValue { allowed, .. } => Some(allowed),
            _ => None,
        }
    }

    /// Collapse into the per-field form stored in an accumulator
    pub fn to_field_error(&self) -> FieldError {
        match self {
            ValidationError::InvalidValue { allowed, .. } => FieldError {
                message: self.to_string(),
                data: Some(allowed.clone()),
            },
            _ => FieldError {
                message: self.to_string(),
                data: None,
            },
        }
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::UnknownField { field } => {
                write!(f, "Unknown field '{}'", field)
            }
            ValidationError::InvalidValue {
                field,
                value,
                allowed,
            } => {
                write!(
                    f,
                    "Invalid value '{}' for field '{}': must be one of [{}]",
                    display_value(value),
                    field,
                    allowed.join(", ")
                )
            }
            ValidationError::Failed(errors) => {
                let fields: Vec<&str> = errors.keys().map(String::as_str).collect();
                write!(
                    f,
                    "Validation failed for {} field(s): {}",
                    errors.len(),
                    fields.join(", ")
                )
            }
        }
    }
}

impl std::error::Error for ValidationError {}
