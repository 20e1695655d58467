//! # Payload Validation
//!
//! The `Decoder` contract used at every bridge boundary: a decoder either
//! returns the (possibly normalized) value or a `DecodeError` naming the
//! exact path that violated the schema. Invalid payloads are rejected at
//! the gate: never sent, never handed to a controller.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A schema violation, pointing at the offending path.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("schema violation at `{path}`: expected {expected}, found {found}")]
pub struct DecodeError {
    /// JSON-path style location, e.g. `$.target.windowId`.
    pub path: String,
    /// What the schema required.
    pub expected: String,
    /// What was actually present.
    pub found: String,
}

impl DecodeError {
    /// Build an error for a path.
    pub fn at(path: impl Into<String>, expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }
}

/// Coarse JSON value kinds used by field specs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
    /// Matches anything, including null.
    Any,
}

impl ValueKind {
    /// The kind of a concrete value.
    #[must_use]
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Bool,
            Value::Number(_) => Self::Number,
            Value::String(_) => Self::String,
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Object,
        }
    }

    /// Whether `value` satisfies this kind.
    #[must_use]
    pub fn matches(&self, value: &Value) -> bool {
        matches!(self, Self::Any) || Self::of(value) == *self
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Number => "number",
            Self::String => "string",
            Self::Array => "array",
            Self::Object => "object",
            Self::Any => "any",
        };
        write!(f, "{name}")
    }
}

/// Validates one payload shape.
pub trait Decoder: Send + Sync {
    /// Validate `value`, returning it on success.
    fn run(&self, value: &Value) -> Result<Value, DecodeError>;
}

/// Shared decoder handle, as stored on a `BridgeOperation`.
pub type DynDecoder = Arc<dyn Decoder>;

impl<T: Decoder + ?Sized> Decoder for Arc<T> {
    fn run(&self, value: &Value) -> Result<Value, DecodeError> {
        (**self).run(value)
    }
}

/// Requires a specific top-level kind, nothing more.
#[derive(Debug, Clone, Copy)]
pub struct KindDecoder(pub ValueKind);

impl Decoder for KindDecoder {
    fn run(&self, value: &Value) -> Result<Value, DecodeError> {
        if self.0.matches(value) {
            Ok(value.clone())
        } else {
            Err(DecodeError::at("$", self.0.to_string(), ValueKind::of(value).to_string()))
        }
    }
}

/// One field requirement of an [`ObjectDecoder`].
#[derive(Debug, Clone)]
struct FieldSpec {
    name: &'static str,
    kind: ValueKind,
    required: bool,
}

/// Validates a JSON object field by field.
///
/// Unknown fields pass through untouched; the decoder only enforces the
/// declared ones.
#[derive(Debug, Clone, Default)]
pub struct ObjectDecoder {
    fields: Vec<FieldSpec>,
}

impl ObjectDecoder {
    /// Start an empty object schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `name` to be present with the given kind.
    #[must_use]
    pub fn required(mut self, name: &'static str, kind: ValueKind) -> Self {
        self.fields.push(FieldSpec { name, kind, required: true });
        self
    }

    /// Allow `name`, enforcing the kind only when present (null counts as absent).
    #[must_use]
    pub fn optional(mut self, name: &'static str, kind: ValueKind) -> Self {
        self.fields.push(FieldSpec { name, kind, required: false });
        self
    }

    /// Wrap into a shared handle.
    #[must_use]
    pub fn shared(self) -> DynDecoder {
        Arc::new(self)
    }
}

impl Decoder for ObjectDecoder {
    fn run(&self, value: &Value) -> Result<Value, DecodeError> {
        let Value::Object(map) = value else {
            return Err(DecodeError::at("$", "object", ValueKind::of(value).to_string()));
        };

        for spec in &self.fields {
            let path = format!("$.{}", spec.name);
            match map.get(spec.name) {
                None | Some(Value::Null) => {
                    if spec.required {
                        return Err(DecodeError::at(path, spec.kind.to_string(), "missing"));
                    }
                }
                Some(present) => {
                    if !spec.kind.matches(present) {
                        return Err(DecodeError::at(
                            path,
                            spec.kind.to_string(),
                            ValueKind::of(present).to_string(),
                        ));
                    }
                }
            }
        }

        Ok(value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_decoder_accepts_matching() {
        let decoder = KindDecoder(ValueKind::String);
        assert!(decoder.run(&json!("hello")).is_ok());
    }

    #[test]
    fn test_kind_decoder_reports_mismatch() {
        let decoder = KindDecoder(ValueKind::Object);
        let err = decoder.run(&json!(3)).unwrap_err();
        assert_eq!(err.path, "$");
        assert_eq!(err.expected, "object");
        assert_eq!(err.found, "number");
    }

    #[test]
    fn test_object_decoder_required_field() {
        let decoder = ObjectDecoder::new().required("method", ValueKind::String);
        assert!(decoder.run(&json!({"method": "Ping"})).is_ok());

        let err = decoder.run(&json!({})).unwrap_err();
        assert_eq!(err.path, "$.method");
        assert_eq!(err.found, "missing");
    }

    #[test]
    fn test_object_decoder_optional_field_kind() {
        let decoder = ObjectDecoder::new().optional("timeout", ValueKind::Number);
        assert!(decoder.run(&json!({})).is_ok());
        assert!(decoder.run(&json!({"timeout": null})).is_ok());
        assert!(decoder.run(&json!({"timeout": 250})).is_ok());

        let err = decoder.run(&json!({"timeout": "soon"})).unwrap_err();
        assert_eq!(err.path, "$.timeout");
    }

    #[test]
    fn test_object_decoder_rejects_non_object() {
        let decoder = ObjectDecoder::new();
        let err = decoder.run(&json!([1, 2])).unwrap_err();
        assert_eq!(err.expected, "object");
        assert_eq!(err.found, "array");
    }

    #[test]
    fn test_unknown_fields_pass_through() {
        let decoder = ObjectDecoder::new().required("name", ValueKind::String);
        let value = json!({"name": "Red", "extra": true});
        assert_eq!(decoder.run(&value).unwrap(), value);
    }
}
