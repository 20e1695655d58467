//! # Wire Envelope
//!
//! The transport-agnostic wire shapes for ALL peer-to-peer traffic:
//!
//! - request:  `{domain, operation, data, commandId}`
//! - response: `{commandId, result?, error?}`
//! - notify:   `{domain, event, payload}` (out-of-band, no command id)
//!
//! Requests and responses correlate by `CommandId` alone; notifies are
//! fire-and-forget broadcasts (context deltas, stream data, disconnects).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Correlation id for one request/response round trip.
///
/// UUID v7: time-ordered, which keeps pending-command sweeps and log
/// correlation cheap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(Uuid);

impl CommandId {
    /// Generate a new command id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Create from an existing UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parse from string form.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }
}

impl Default for CommandId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable error codes carried in response envelopes.
pub mod error_codes {
    /// Payload failed schema validation.
    pub const VALIDATION: &str = "validation";
    /// The call exceeded its timeout window.
    pub const TIMEOUT: &str = "timeout";
    /// No registered method matched the invocation.
    pub const METHOD_NOT_FOUND: &str = "method_not_found";
    /// A method with the same name is already registered for the instance.
    pub const DUPLICATE_METHOD: &str = "duplicate_method";
    /// A registered handler returned an error.
    pub const HANDLER_FAILED: &str = "handler_failed";
    /// The stream owner rejected the subscription.
    pub const SUBSCRIPTION_REJECTED: &str = "subscription_rejected";
    /// The domain controller has no such operation.
    pub const OPERATION_NOT_FOUND: &str = "operation_not_found";
    /// No controller is registered for the request's domain.
    pub const UNKNOWN_DOMAIN: &str = "unknown_domain";
    /// The controller failed while executing the operation.
    pub const EXECUTION: &str = "execution";
    /// The controller exists but is not available (not started, disabled).
    pub const UNAVAILABLE: &str = "unavailable";
}

/// Error payload of a response envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    /// One of [`error_codes`].
    pub code: String,
    /// Human-readable description.
    pub message: String,
    /// Optional structured details (e.g. the schema failure path).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl WireError {
    /// Create a wire error with a code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Attach structured details.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// One wire message.
///
/// Untagged on the wire; the shapes are discriminated by their required
/// fields (`operation` ⇒ request, `event` ⇒ notify, otherwise response).
/// Variant order matters for deserialization and must not change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireEnvelope {
    /// A domain operation expecting a correlated response.
    #[serde(rename_all = "camelCase")]
    Request {
        domain: String,
        operation: String,
        #[serde(default)]
        data: Value,
        command_id: CommandId,
    },
    /// An out-of-band notification; never answered.
    #[serde(rename_all = "camelCase")]
    Notify {
        domain: String,
        event: String,
        #[serde(default)]
        payload: Value,
    },
    /// The answer to a request, matched by `command_id`.
    #[serde(rename_all = "camelCase")]
    Response {
        command_id: CommandId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<WireError>,
    },
}

impl WireEnvelope {
    /// Build a request envelope.
    #[must_use]
    pub fn request(domain: &str, operation: &str, data: Value, command_id: CommandId) -> Self {
        Self::Request {
            domain: domain.to_string(),
            operation: operation.to_string(),
            data,
            command_id,
        }
    }

    /// Build a successful response.
    #[must_use]
    pub fn response_ok(command_id: CommandId, result: Value) -> Self {
        Self::Response {
            command_id,
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response.
    #[must_use]
    pub fn response_err(command_id: CommandId, error: WireError) -> Self {
        Self::Response {
            command_id,
            result: None,
            error: Some(error),
        }
    }

    /// Build a notify envelope.
    #[must_use]
    pub fn notify(domain: &str, event: &str, payload: Value) -> Self {
        Self::Notify {
            domain: domain.to_string(),
            event: event.to_string(),
            payload,
        }
    }

    /// The domain this envelope belongs to, if any (responses have none).
    #[must_use]
    pub fn domain(&self) -> Option<&str> {
        match self {
            Self::Request { domain, .. } | Self::Notify { domain, .. } => Some(domain),
            Self::Response { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_command_id_unique_and_parseable() {
        let id = CommandId::new();
        assert_ne!(id, CommandId::new());
        assert_eq!(CommandId::parse(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn test_request_roundtrip() {
        let env = WireEnvelope::request("interop", "invoke", json!({"method": "Ping"}), CommandId::new());
        let wire = serde_json::to_string(&env).unwrap();
        assert!(wire.contains("commandId"));

        let back: WireEnvelope = serde_json::from_str(&wire).unwrap();
        assert_eq!(back, env);
    }

    #[test]
    fn test_notify_discriminated_from_request() {
        let wire = json!({"domain": "contexts", "event": "context-updated", "payload": {}});
        let env: WireEnvelope = serde_json::from_value(wire).unwrap();
        assert!(matches!(env, WireEnvelope::Notify { .. }));
    }

    #[test]
    fn test_response_discriminated_without_domain() {
        let id = CommandId::new();
        let wire = json!({"commandId": id, "result": 7});
        let env: WireEnvelope = serde_json::from_value(wire).unwrap();
        match env {
            WireEnvelope::Response { command_id, result, error } => {
                assert_eq!(command_id, id);
                assert_eq!(result, Some(json!(7)));
                assert!(error.is_none());
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn test_error_response_roundtrip() {
        let id = CommandId::new();
        let env = WireEnvelope::response_err(
            id,
            WireError::new(error_codes::METHOD_NOT_FOUND, "no such method: Ping"),
        );
        let back: WireEnvelope = serde_json::from_value(serde_json::to_value(&env).unwrap()).unwrap();
        assert_eq!(back, env);
    }

    #[test]
    fn test_request_with_missing_data_defaults_null() {
        let wire = json!({
            "domain": "system",
            "operation": "getEnvironment",
            "commandId": CommandId::new(),
        });
        let env: WireEnvelope = serde_json::from_value(wire).unwrap();
        match env {
            WireEnvelope::Request { data, .. } => assert!(data.is_null()),
            other => panic!("expected request, got {other:?}"),
        }
    }
}
