//! # Shared Bus - Transport Layer for the Window Mesh
//!
//! Defines the abstract channel contract the core needs from any
//! transport, plus the in-process reference implementation.
//!
//! ## Contract
//!
//! A transport can deliver ordered envelopes between peers and reports
//! connection-state transitions:
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────┐
//! │   Window A   │                    │   Window B   │
//! │              │      send()        │              │
//! │              │ ──────┐            │              │
//! └──────────────┘       │            └──────────────┘
//!                        ▼                    ↑
//!                  ┌──────────────┐          │
//!                  │ InMemoryHub  │ ─────────┘
//!                  │              │   subscribe()
//!                  └──────────────┘
//! ```
//!
//! The core never assumes a concrete transport. A postMessage bridge, a
//! WebSocket, and the in-process hub all satisfy the same trait.

pub mod hub;
pub mod subscription;
pub mod transport;

pub use hub::{ConnectParams, ConnectionId, Frame, HubConnection, InMemoryHub};
pub use subscription::{EnvelopeFilter, EnvelopeStream, EnvelopeSubscription};
pub use transport::{EventSubscription, Transport, TransportError, TransportEvent};

/// Maximum envelopes buffered per subscriber before lag drops occur.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Domain used for hub-originated connection notifications.
pub const CONNECTION_DOMAIN: &str = "connection";

/// Event name broadcast when a peer leaves the hub.
pub const PEER_DISCONNECTED_EVENT: &str = "peer-disconnected";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_capacity() {
        assert_eq!(DEFAULT_CHANNEL_CAPACITY, 1024);
    }
}
