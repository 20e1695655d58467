//! # In-Memory Hub
//!
//! The in-process reference transport: every connected window sees every
//! envelope sent by every other window, in global send order. Suitable
//! for same-process peers and for tests; remote deployments substitute a
//! WebSocket or postMessage implementation of the same `Transport` trait.

use crate::subscription::{EnvelopeFilter, EnvelopeSubscription};
use crate::transport::{EventSubscription, Transport, TransportError, TransportEvent};
use crate::{CONNECTION_DOMAIN, DEFAULT_CHANNEL_CAPACITY, PEER_DISCONNECTED_EVENT};
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use shared_types::{RawIdentity, WireEnvelope};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

/// Identifier of one hub connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

/// One envelope plus its sender, as carried on the hub channel.
#[derive(Debug, Clone)]
pub struct Frame {
    /// The connection that sent the envelope.
    pub from: ConnectionId,
    /// The envelope itself.
    pub envelope: WireEnvelope,
}

/// Handshake parameters of a connecting window.
#[derive(Debug, Clone, Default)]
pub struct ConnectParams {
    pub application_name: Option<String>,
    pub window_id: Option<String>,
    pub pid: Option<u64>,
    pub machine: Option<String>,
    pub environment: Option<String>,
    pub user: Option<String>,
    pub region: Option<String>,
}

struct HubInner {
    sender: broadcast::Sender<Frame>,
    seats: RwLock<HashMap<ConnectionId, String>>,
    next_id: AtomicU64,
    next_window: AtomicU64,
}

/// The in-process transport hub.
#[derive(Clone)]
pub struct InMemoryHub {
    inner: Arc<HubInner>,
}

impl InMemoryHub {
    /// Create a hub with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a hub with a specific per-subscriber buffer capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(HubInner {
                sender,
                seats: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                next_window: AtomicU64::new(1),
            }),
        }
    }

    /// Connect a window to the hub.
    ///
    /// The returned connection is immediately `Connected` and `LoggedIn`
    /// with an identity derived from `params`; both are replayed to every
    /// `events()` subscriber.
    #[must_use]
    pub fn connect(&self, params: ConnectParams) -> HubConnection {
        let id = ConnectionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let window_id = params
            .window_id
            .clone()
            .unwrap_or_else(|| format!("wnd-{}", self.inner.next_window.fetch_add(1, Ordering::Relaxed)));

        self.inner.seats.write().insert(id, window_id.clone());

        let raw = RawIdentity {
            application_name: params.application_name,
            window_id: Some(window_id.clone()),
            pid: params.pid,
            machine: params.machine,
            environment: params.environment,
            is_local: None,
            user: params.user,
            region: params.region,
        };

        info!(connection = id.0, window = %window_id, "Window connected to hub");

        HubConnection {
            id,
            window_id,
            inner: Arc::clone(&self.inner),
            raw: Mutex::new(raw),
            event_sinks: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
        }
    }

    /// Number of currently connected windows.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.inner.seats.read().len()
    }
}

impl Default for InMemoryHub {
    fn default() -> Self {
        Self::new()
    }
}

/// One window's connection to the hub.
pub struct HubConnection {
    id: ConnectionId,
    window_id: String,
    inner: Arc<HubInner>,
    raw: Mutex<RawIdentity>,
    event_sinks: Mutex<Vec<mpsc::UnboundedSender<TransportEvent>>>,
    connected: AtomicBool,
}

impl HubConnection {
    /// The window id the hub assigned (or accepted) at connect time.
    #[must_use]
    pub fn window_id(&self) -> &str {
        &self.window_id
    }

    /// Re-resolve identity, as a reconnecting transport would.
    ///
    /// Emits a fresh `LoggedIn` to every event subscriber.
    pub fn refresh_identity(&self, raw: RawIdentity) {
        *self.raw.lock() = raw.clone();
        self.emit(TransportEvent::LoggedIn(raw));
    }

    /// Leave the hub: peers are told via a `peer-disconnected` notify,
    /// local event subscribers see `Disconnected`.
    pub fn close(&self) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }

        self.inner.seats.write().remove(&self.id);

        let notice = WireEnvelope::notify(
            CONNECTION_DOMAIN,
            PEER_DISCONNECTED_EVENT,
            json!({ "windowId": self.window_id }),
        );
        // Peers may all be gone already; a send error only means that.
        let _ = self.inner.sender.send(Frame {
            from: self.id,
            envelope: notice,
        });

        self.emit(TransportEvent::Disconnected);
        info!(connection = self.id.0, window = %self.window_id, "Window left hub");
    }

    fn emit(&self, event: TransportEvent) {
        let mut sinks = self.event_sinks.lock();
        sinks.retain(|sink| sink.send(event.clone()).is_ok());
    }
}

impl Transport for HubConnection {
    fn send(&self, envelope: WireEnvelope) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }

        match self.inner.sender.send(Frame {
            from: self.id,
            envelope,
        }) {
            Ok(receivers) => {
                debug!(connection = self.id.0, receivers, "Envelope handed to hub");
                Ok(())
            }
            Err(_) => {
                warn!(connection = self.id.0, "Envelope dropped (no hub subscribers)");
                Ok(())
            }
        }
    }

    fn subscribe(&self) -> EnvelopeSubscription {
        EnvelopeSubscription::new(self.inner.sender.subscribe(), self.id, EnvelopeFilter::all())
    }

    fn events(&self) -> EventSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        if self.connected.load(Ordering::SeqCst) {
            // Replay current state so late subscribers see the handshake.
            let _ = tx.send(TransportEvent::Connected);
            let _ = tx.send(TransportEvent::LoggedIn(self.raw.lock().clone()));
        }
        self.event_sinks.lock().push(tx);
        EventSubscription::new(rx)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for HubConnection {
    fn drop(&mut self) {
        self.close();
    }
}
