//! # Interop Errors
//!
//! Protocol errors are scoped to the offending call; none of them
//! corrupts the registry.

use shared_types::{error_codes, WireError};
use thiserror::Error;
use wm_02_bridge::BridgeError;

/// Errors of registration, invocation and subscription.
#[derive(Debug, Error)]
pub enum InteropError {
    /// A method with this name is already registered for this instance.
    #[error("method '{method}' already registered for this instance")]
    DuplicateMethod { method: String },

    /// No registered method matched the invocation.
    #[error("method not found: '{method}'")]
    MethodNotFound { method: String },

    /// The registered handler returned an error; propagated, not swallowed.
    #[error("method '{method}' failed: {message}")]
    HandlerFailed { method: String, message: String },

    /// The stream owner rejected the subscription.
    #[error("subscription rejected: {reason}")]
    SubscriptionRejected { reason: String },

    /// The method exists but does not support streaming.
    #[error("method '{method}' is not a stream")]
    NotAStream { method: String },

    /// The owner's request handler dropped the decision handle.
    ///
    /// Surfaced to subscribers as the generic bridge timeout; this
    /// variant only exists between the stream internals and the
    /// controller boundary.
    #[error("stream owner made no decision on the subscription request")]
    NoDecision,

    /// The underlying bridge call failed (timeout, transport, validation).
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

impl InteropError {
    /// Map a remote wire error back onto the interop taxonomy.
    #[must_use]
    pub fn from_wire(method: &str, wire: WireError) -> Self {
        match wire.code.as_str() {
            error_codes::METHOD_NOT_FOUND => Self::MethodNotFound {
                method: method.to_string(),
            },
            error_codes::HANDLER_FAILED => Self::HandlerFailed {
                method: method.to_string(),
                message: wire.message,
            },
            error_codes::SUBSCRIPTION_REJECTED => Self::SubscriptionRejected {
                reason: wire.message,
            },
            _ => Self::Bridge(BridgeError::Remote(wire)),
        }
    }
}
