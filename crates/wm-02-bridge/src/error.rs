//! # Bridge Errors
//!
//! The caller-facing error taxonomy of a bridge round trip.

use shared_bus::TransportError;
use shared_types::{DecodeError, WireError};
use thiserror::Error;

/// Errors a `send` (or the bridge itself) can produce.
#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    /// Outbound data or inbound result failed schema validation.
    #[error(transparent)]
    Validation(#[from] DecodeError),

    /// The peer did not answer within the timeout window.
    #[error("'{operation}' timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u128 },

    /// The transport refused the envelope.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The remote side answered with an error.
    #[error("remote error: {0}")]
    Remote(WireError),

    /// The pending entry disappeared without an outcome.
    #[error("command channel closed before settlement")]
    ChannelClosed,

    /// The bridge loops are already running.
    #[error("bridge already started")]
    AlreadyStarted,
}
