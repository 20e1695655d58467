//! # Context Engine
//!
//! The per-peer store of named shared objects. Writes compute a delta,
//! apply it locally, deliver it to local subscribers and broadcast it to
//! every peer; remote deltas are mirrored in arrival order (single-writer
//! order is preserved by the transport, cross-writer order is
//! last-write-wins).

use crate::delta::{
    apply_commands, apply_delta, diff_delta, merge_delta, merge_into, replace_delta,
    ContextCommand, ContextDelta, Entries,
};
use crate::error::ContextError;
use crate::subscription::ContextSubscription;
use crate::{CONTEXT_BUFFER, DOMAIN};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_types::{Instance, InstanceId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use wm_02_bridge::GatewayBridge;

/// Notify event names of the contexts domain.
pub mod events {
    pub const CONTEXT_UPDATED: &str = "context-updated";
    pub const CONTEXT_SNAPSHOT: &str = "context-snapshot";
    pub const HELLO: &str = "hello";
}

/// `context-updated` notify payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextUpdated {
    pub name: String,
    pub delta: ContextDelta,
    pub origin: InstanceId,
}

/// `context-snapshot` notify payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSnapshot {
    pub name: String,
    #[serde(default)]
    pub entries: Entries,
    pub origin: InstanceId,
}

/// What a subscriber receives on every write.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextEvent {
    /// The context that changed.
    pub context: String,
    /// The change itself.
    pub delta: ContextDelta,
    /// Full entries after the change.
    pub entries: Entries,
}

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<ContextEvent>,
}

/// State shared between the engine facade and its subscriptions.
pub(crate) struct ContextShared {
    bridge: Arc<GatewayBridge>,
    instance: Instance,
    contexts: RwLock<HashMap<String, Entries>>,
    subscribers: RwLock<HashMap<String, Vec<Subscriber>>>,
    next_subscriber: AtomicU64,
}

/// The context engine of one peer.
#[derive(Clone)]
pub struct ContextEngine {
    shared: Arc<ContextShared>,
}

impl ContextEngine {
    /// Build the engine over a started bridge.
    ///
    /// Wires the contexts notify handler and greets existing peers so
    /// their contexts are mirrored here.
    #[must_use]
    pub fn new(bridge: Arc<GatewayBridge>, instance: Instance) -> Self {
        let shared = Arc::new(ContextShared {
            bridge: Arc::clone(&bridge),
            instance,
            contexts: RwLock::new(HashMap::new()),
            subscribers: RwLock::new(HashMap::new()),
            next_subscriber: AtomicU64::new(1),
        });

        let weak: Weak<ContextShared> = Arc::downgrade(&shared);
        bridge.on_notify(
            DOMAIN,
            Arc::new(move |event, payload| {
                if let Some(shared) = weak.upgrade() {
                    shared.handle_notify(event, payload);
                }
            }),
        );

        Self { shared }
    }

    /// Ask peers for their context snapshots (late-join convergence).
    pub fn announce(&self) {
        self.shared.notify_json(events::HELLO, &serde_json::json!({}));
    }

    /// Replace a context wholesale. Creates it on first use.
    pub fn set(&self, name: &str, value: Value) -> Result<(), ContextError> {
        let next = as_entries(value)?;
        let (delta, snapshot) = {
            let mut contexts = self.shared.contexts.write();
            let entry = contexts.entry(name.to_string()).or_default();
            let delta = replace_delta(entry, &next);
            *entry = next;
            (delta, entry.clone())
        };
        self.shared.publish(name, delta, snapshot);
        Ok(())
    }

    /// Shallow-merge `partial` into a context. Creates it on first use.
    ///
    /// Only top-level keys present in `partial` are touched; nested
    /// objects are replaced wholesale (use [`apply_commands`](Self::apply_commands)
    /// for path-scoped nested mutation).
    pub fn update(&self, name: &str, partial: Value) -> Result<(), ContextError> {
        let partial = as_entries(partial)?;
        let (delta, snapshot) = {
            let mut contexts = self.shared.contexts.write();
            let entry = contexts.entry(name.to_string()).or_default();
            let delta = merge_delta(entry, &partial);
            merge_into(entry, &partial);
            (delta, entry.clone())
        };

        if delta.is_empty() {
            return Ok(());
        }
        self.shared.publish(name, delta, snapshot);
        Ok(())
    }

    /// Apply path-scoped commands for nested mutation.
    pub fn apply_commands(&self, name: &str, commands: &[ContextCommand]) -> Result<(), ContextError> {
        let (delta, snapshot) = {
            let mut contexts = self.shared.contexts.write();
            let entry = contexts.entry(name.to_string()).or_default();
            let mut next = entry.clone();
            apply_commands(&mut next, commands)?;
            let delta = diff_delta(entry, &next);
            *entry = next;
            (delta, entry.clone())
        };

        if delta.is_empty() {
            return Ok(());
        }
        self.shared.publish(name, delta, snapshot);
        Ok(())
    }

    /// Snapshot of one context, if it exists.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        self.shared
            .contexts
            .read()
            .get(name)
            .map(|entries| Value::Object(entries.clone()))
    }

    /// Every context name known locally, remote-created ones included.
    #[must_use]
    pub fn all(&self) -> Vec<String> {
        let mut names: Vec<String> = self.shared.contexts.read().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Subscribe to a context, existing or not; the first write fires.
    #[must_use]
    pub fn subscribe(&self, name: &str) -> ContextSubscription {
        let id = self.shared.next_subscriber.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(CONTEXT_BUFFER);

        self.shared
            .subscribers
            .write()
            .entry(name.to_string())
            .or_default()
            .push(Subscriber { id, tx });

        debug!(context = name, subscriber = id, "Context subscription added");
        ContextSubscription::new(id, name.to_string(), rx, Arc::clone(&self.shared))
    }
}

fn as_entries(value: Value) -> Result<Entries, ContextError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ContextError::NotAnObject),
    }
}

impl ContextShared {
    /// Deliver locally and broadcast to peers.
    fn publish(&self, name: &str, delta: ContextDelta, snapshot: Entries) {
        self.deliver(name, &delta, &snapshot);
        self.notify_json(
            events::CONTEXT_UPDATED,
            &ContextUpdated {
                name: name.to_string(),
                delta,
                origin: self.instance.instance_id,
            },
        );
    }

    fn deliver(&self, name: &str, delta: &ContextDelta, snapshot: &Entries) {
        let subscribers = self.subscribers.read();
        let Some(list) = subscribers.get(name) else {
            return;
        };
        for subscriber in list {
            let event = ContextEvent {
                context: name.to_string(),
                delta: delta.clone(),
                entries: snapshot.clone(),
            };
            match subscriber.tx.try_send(event) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(context = name, subscriber = subscriber.id, "Slow context subscriber, delta dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
    }

    pub(crate) fn remove_subscriber(&self, name: &str, id: u64) {
        let mut subscribers = self.subscribers.write();
        if let Some(list) = subscribers.get_mut(name) {
            list.retain(|s| s.id != id);
            if list.is_empty() {
                subscribers.remove(name);
            }
        }
    }

    fn notify_json<T: serde::Serialize>(&self, event: &str, payload: &T) {
        match serde_json::to_value(payload) {
            Ok(value) => {
                if let Err(err) = self.bridge.notify(DOMAIN, event, value) {
                    warn!(event, error = %err, "Context notify failed");
                }
            }
            Err(err) => warn!(event, error = %err, "Context notify payload unserializable"),
        }
    }

    fn handle_notify(&self, event: &str, payload: &Value) {
        match event {
            events::CONTEXT_UPDATED => {
                let Ok(update) = serde_json::from_value::<ContextUpdated>(payload.clone()) else {
                    warn!(event, "Malformed context notify ignored");
                    return;
                };
                if update.origin == self.instance.instance_id {
                    return;
                }

                let snapshot = {
                    let mut contexts = self.contexts.write();
                    let entry = contexts.entry(update.name.clone()).or_default();
                    apply_delta(entry, &update.delta);
                    entry.clone()
                };
                self.deliver(&update.name, &update.delta, &snapshot);
            }
            events::CONTEXT_SNAPSHOT => {
                let Ok(snapshot) = serde_json::from_value::<ContextSnapshot>(payload.clone()) else {
                    return;
                };
                if snapshot.origin == self.instance.instance_id {
                    return;
                }

                // Snapshots only seed contexts we have never seen; live
                // updates always win over catch-up data.
                let mut contexts = self.contexts.write();
                if contexts.contains_key(&snapshot.name) {
                    return;
                }
                let delta = ContextDelta {
                    added: snapshot.entries.clone(),
                    reset: true,
                    ..ContextDelta::default()
                };
                contexts.insert(snapshot.name.clone(), snapshot.entries.clone());
                drop(contexts);
                self.deliver(&snapshot.name, &delta, &snapshot.entries);
            }
            events::HELLO => {
                // A late joiner asks for our contexts.
                let all: Vec<(String, Entries)> = self
                    .contexts
                    .read()
                    .iter()
                    .map(|(name, entries)| (name.clone(), entries.clone()))
                    .collect();
                for (name, entries) in all {
                    self.notify_json(
                        events::CONTEXT_SNAPSHOT,
                        &ContextSnapshot {
                            name,
                            entries,
                            origin: self.instance.instance_id,
                        },
                    );
                }
            }
            _ => debug!(event, "Unhandled contexts notify"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared_bus::{ConnectParams, InMemoryHub, Transport, TransportEvent};
    use std::time::Duration;
    use tokio::time::timeout;
    use wm_01_identity::IdentityResolver;
    use wm_02_bridge::BridgeConfig;

    async fn peer(hub: &InMemoryHub, app: &str) -> ContextEngine {
        let connection = Arc::new(hub.connect(ConnectParams {
            application_name: Some(app.to_string()),
            ..ConnectParams::default()
        }));

        let mut events = connection.events();
        let raw = loop {
            match events.recv().await {
                Some(TransportEvent::LoggedIn(raw)) => break raw,
                Some(_) => continue,
                None => panic!("transport gone during login"),
            }
        };
        let instance = IdentityResolver::new().resolve(&raw);

        let bridge = GatewayBridge::new(connection, BridgeConfig::default());
        bridge.set_instance(instance.clone());
        let engine = ContextEngine::new(Arc::clone(&bridge), instance);
        bridge.start().unwrap();
        engine.announce();
        engine
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    fn entries(value: Value) -> Entries {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn test_subscribe_before_create_fires_on_first_write() {
        let hub = InMemoryHub::new();
        let engine = peer(&hub, "app").await;

        let mut subscription = engine.subscribe("Theme");
        engine.update("Theme", json!({ "dark": true })).unwrap();

        let event = timeout(Duration::from_millis(500), subscription.recv())
            .await
            .expect("timeout")
            .expect("event");
        assert_eq!(event.context, "Theme");
        assert_eq!(event.delta.added, entries(json!({ "dark": true })));
        assert!(event.delta.updated.is_empty());
    }

    #[tokio::test]
    async fn test_update_update_set_delta_sequence() {
        let hub = InMemoryHub::new();
        let engine = peer(&hub, "app").await;
        let mut subscription = engine.subscribe("X");

        engine.update("X", json!({ "a": 1 })).unwrap();
        engine.update("X", json!({ "b": 2 })).unwrap();
        engine.set("X", json!({ "b": 2 })).unwrap();

        let first = subscription.recv().await.unwrap();
        assert_eq!(first.delta.added, entries(json!({ "a": 1 })));

        let second = subscription.recv().await.unwrap();
        assert_eq!(second.delta.added, entries(json!({ "b": 2 })));
        // The untouched key survives a merge.
        assert_eq!(second.entries, entries(json!({ "a": 1, "b": 2 })));

        let third = subscription.recv().await.unwrap();
        assert!(third.delta.reset);
        assert_eq!(third.delta.added, entries(json!({ "b": 2 })));
        assert_eq!(third.delta.removed, vec!["a".to_string()]);
        assert_eq!(third.entries, entries(json!({ "b": 2 })));
    }

    #[tokio::test]
    async fn test_cross_peer_sync_and_all() {
        let hub = InMemoryHub::new();
        let writer = peer(&hub, "writer").await;
        let reader = peer(&hub, "reader").await;
        settle().await;

        let mut subscription = reader.subscribe("Selection");
        writer.set("Selection", json!({ "client": "acme" })).unwrap();

        let event = timeout(Duration::from_millis(500), subscription.recv())
            .await
            .expect("timeout")
            .expect("event");
        assert_eq!(event.entries, entries(json!({ "client": "acme" })));

        settle().await;
        assert_eq!(reader.all(), vec!["Selection".to_string()]);
        assert_eq!(reader.get("Selection").unwrap(), json!({ "client": "acme" }));
    }

    #[tokio::test]
    async fn test_late_joiner_receives_snapshot() {
        let hub = InMemoryHub::new();
        let writer = peer(&hub, "writer").await;
        writer.set("Board", json!({ "rows": 3 })).unwrap();
        settle().await;

        let late = peer(&hub, "late").await;
        settle().await;

        assert_eq!(late.get("Board").unwrap(), json!({ "rows": 3 }));
    }

    #[tokio::test]
    async fn test_single_writer_order_preserved() {
        let hub = InMemoryHub::new();
        let writer = peer(&hub, "writer").await;
        let reader = peer(&hub, "reader").await;
        settle().await;

        let mut subscription = reader.subscribe("Counter");
        for i in 0..20 {
            writer.set("Counter", json!({ "value": i })).unwrap();
        }

        for i in 0..20 {
            let event = timeout(Duration::from_millis(500), subscription.recv())
                .await
                .expect("timeout")
                .expect("event");
            assert_eq!(event.entries["value"], json!(i));
        }
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent_and_final() {
        let hub = InMemoryHub::new();
        let engine = peer(&hub, "app").await;

        let mut subscription = engine.subscribe("Theme");
        engine.update("Theme", json!({ "dark": true })).unwrap();

        // The delta is already queued; unsubscribing must still win.
        subscription.unsubscribe();
        subscription.unsubscribe();

        assert_eq!(subscription.recv().await, None);
        engine.update("Theme", json!({ "dark": false })).unwrap();
        assert_eq!(subscription.recv().await, None);
    }

    #[tokio::test]
    async fn test_non_object_value_rejected() {
        let hub = InMemoryHub::new();
        let engine = peer(&hub, "app").await;

        assert_eq!(engine.set("X", json!(42)).unwrap_err(), ContextError::NotAnObject);
        assert_eq!(engine.update("X", json!([1])).unwrap_err(), ContextError::NotAnObject);
        assert!(engine.get("X").is_none());
    }

    #[tokio::test]
    async fn test_path_commands_produce_updated_delta() {
        let hub = InMemoryHub::new();
        let engine = peer(&hub, "app").await;
        engine.set("Prefs", json!({ "layout": { "cols": 2 } })).unwrap();

        let mut subscription = engine.subscribe("Prefs");
        engine
            .apply_commands(
                "Prefs",
                &[ContextCommand::Set { path: "layout.cols".into(), value: json!(4) }],
            )
            .unwrap();

        let event = subscription.recv().await.unwrap();
        assert_eq!(event.delta.updated, entries(json!({ "layout": { "cols": 4 } })));
        assert_eq!(event.entries, entries(json!({ "layout": { "cols": 4 } })));
    }
}
