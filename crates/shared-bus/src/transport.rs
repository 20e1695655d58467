//! # Transport Contract
//!
//! The abstract channel the core builds on: ordered envelope delivery,
//! envelope subscriptions, and connection-state events.

use crate::subscription::EnvelopeSubscription;
use shared_types::{RawIdentity, WireEnvelope};
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors from transport operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The connection is not (or no longer) established.
    #[error("transport not connected")]
    NotConnected,

    /// The underlying channel was closed.
    #[error("transport channel closed")]
    Closed,
}

/// Connection-state transitions reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The channel is established.
    Connected,
    /// The transport resolved (or re-resolved) the peer's identity.
    LoggedIn(RawIdentity),
    /// The channel went away.
    Disconnected,
}

/// The channel contract the core needs from any transport.
///
/// Implementations must deliver envelopes from one peer in send order;
/// delivery across peers carries no ordering guarantee.
pub trait Transport: Send + Sync {
    /// Hand an envelope to the channel.
    fn send(&self, envelope: WireEnvelope) -> Result<(), TransportError>;

    /// Subscribe to every envelope arriving from other peers.
    fn subscribe(&self) -> EnvelopeSubscription;

    /// Subscribe to connection-state events.
    ///
    /// The current state is replayed first: an established connection
    /// yields `Connected` (and `LoggedIn` once identity resolved) before
    /// any live event, so late subscribers never miss the handshake.
    fn events(&self) -> EventSubscription;

    /// Whether the channel is currently established.
    fn is_connected(&self) -> bool;
}

/// A handle yielding connection-state events.
pub struct EventSubscription {
    receiver: mpsc::UnboundedReceiver<TransportEvent>,
}

impl EventSubscription {
    /// Wrap a receiver; transports push replayed state before live events.
    #[must_use]
    pub fn new(receiver: mpsc::UnboundedReceiver<TransportEvent>) -> Self {
        Self { receiver }
    }

    /// Receive the next event, or `None` once the transport is gone.
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.receiver.recv().await
    }

    /// Non-blocking receive.
    #[must_use]
    pub fn try_recv(&mut self) -> Option<TransportEvent> {
        self.receiver.try_recv().ok()
    }
}
