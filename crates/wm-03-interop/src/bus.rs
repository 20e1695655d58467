//! # Interop Bus
//!
//! The per-peer bus facade: registration, invocation and subscription
//! over the gateway bridge, plus the notify handlers that keep the
//! method registry converged across peers.

use crate::domain::{
    InstanceFilter, InteropError, InvocationResult, MethodDefinition, MethodHandler, MethodTarget,
};
use crate::protocol::{
    self, events, InvokeRequest, MethodAnnouncement, MethodRemoval, RegistrySnapshot,
    StreamClosed, StreamData, StreamUnsubscribe, SubscribeReply, SubscribeRequest,
};
use crate::registry::{Candidate, MethodRegistry};
use crate::streams::{
    ActiveSubscription, Decision, DeliveryRoute, StreamEvent, StreamEvents, StreamHandle,
    StreamSubscription, SubscriptionId, SubscriptionInfo, SubscriptionRequest, SubscriptionState,
};
use crate::{DOMAIN, STREAM_BUFFER};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use shared_bus::{CONNECTION_DOMAIN, PEER_DISCONNECTED_EVENT};
use shared_types::{Instance, InstanceId};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use wm_02_bridge::{BridgeError, GatewayBridge};

/// Options of a `subscribe` call.
#[derive(Debug, Clone, Default)]
pub struct SubscribeOptions {
    /// Arguments handed to the owner's request handler.
    pub arguments: Value,
    /// Which owner to attach to; `Best`/`All` pick the first streaming
    /// candidate in registration order.
    pub target: MethodTarget,
}

/// A subscription we hold on a remote (or local) stream.
struct OutboundSub {
    tx: mpsc::Sender<StreamEvent>,
    owner_window: String,
}

/// Owner-side record of one created stream.
pub(crate) struct StreamRecord {
    pub events: Arc<dyn StreamEvents>,
    pub subs: Vec<ActiveSubscription>,
}

/// State shared between the bus facade, its handles and its controller.
pub(crate) struct InteropShared {
    pub bridge: Arc<GatewayBridge>,
    pub instance: Instance,
    pub registry: RwLock<MethodRegistry>,
    pub streams: RwLock<HashMap<String, StreamRecord>>,
    client_subs: DashMap<SubscriptionId, OutboundSub>,
}

/// The interop bus of one peer.
#[derive(Clone)]
pub struct InteropBus {
    shared: Arc<InteropShared>,
}

impl InteropBus {
    /// Build the bus over a started bridge and a resolved identity.
    ///
    /// Wires the interop and connection notify handlers; call
    /// [`announce`](Self::announce) after platform startup so peers
    /// learn this instance's methods.
    #[must_use]
    pub fn new(bridge: Arc<GatewayBridge>, instance: Instance) -> Self {
        let shared = Arc::new(InteropShared {
            bridge: Arc::clone(&bridge),
            instance,
            registry: RwLock::new(MethodRegistry::new()),
            streams: RwLock::new(HashMap::new()),
            client_subs: DashMap::new(),
        });

        let weak: Weak<InteropShared> = Arc::downgrade(&shared);
        bridge.on_notify(
            DOMAIN,
            Arc::new(move |event, payload| {
                if let Some(shared) = weak.upgrade() {
                    shared.handle_interop_notify(event, payload);
                }
            }),
        );

        let weak: Weak<InteropShared> = Arc::downgrade(&shared);
        bridge.on_notify(
            CONNECTION_DOMAIN,
            Arc::new(move |event, payload| {
                if let Some(shared) = weak.upgrade() {
                    shared.handle_connection_notify(event, payload);
                }
            }),
        );

        Self { shared }
    }

    /// This peer's identity.
    #[must_use]
    pub fn instance(&self) -> &Instance {
        &self.shared.instance
    }

    pub(crate) fn shared(&self) -> &Arc<InteropShared> {
        &self.shared
    }

    /// Register a method and announce it to every peer.
    pub fn register(&self, def: MethodDefinition, handler: MethodHandler) -> Result<(), InteropError> {
        self.shared.registry.write().add_local(def.clone(), handler)?;
        self.shared.announce_method(&def);
        Ok(())
    }

    /// Remove a method. A streaming method closes like
    /// [`StreamHandle::close`]: subscribers are told before removal.
    pub fn unregister(&self, name: &str) -> Result<(), InteropError> {
        let is_stream = self.shared.streams.read().contains_key(name);
        if is_stream {
            self.shared.close_stream(name, Some("method unregistered"));
            return Ok(());
        }

        let removed = self.shared.registry.write().remove_local(name);
        match removed {
            Some(def) => {
                self.shared.announce_removal(&def.name);
                Ok(())
            }
            None => Err(InteropError::MethodNotFound {
                method: name.to_string(),
            }),
        }
    }

    /// Register a streaming method and return its owner handle.
    pub fn create_stream(
        &self,
        def: MethodDefinition,
        events: Arc<dyn StreamEvents>,
    ) -> Result<StreamHandle, InteropError> {
        let def = MethodDefinition {
            supports_streaming: true,
            ..def
        };
        let name = def.name.clone();

        // Direct invocation of a stream is a handler error, not a crash.
        let invoked_name = name.clone();
        let handler: MethodHandler = Arc::new(move |_, _| {
            let method = invoked_name.clone();
            Box::pin(async move { Err(format!("'{method}' is a stream; subscribe to it instead")) })
        });

        self.shared.registry.write().add_local(def.clone(), handler)?;
        self.shared.streams.write().insert(
            name.clone(),
            StreamRecord {
                events,
                subs: Vec::new(),
            },
        );
        self.shared.announce_method(&def);

        Ok(StreamHandle::new(name, Arc::clone(&self.shared)))
    }

    /// Invoke the best matching method (registration-order tie-break).
    pub async fn invoke(&self, method: &str, args: Value) -> Result<Value, InteropError> {
        let candidate = self.first_candidate(method, &MethodTarget::Best)?;
        self.call_candidate(&candidate, method, args).await
    }

    /// Invoke the best match among instances passing `filter`.
    pub async fn invoke_filtered(
        &self,
        method: &str,
        args: Value,
        filter: InstanceFilter,
    ) -> Result<Value, InteropError> {
        let candidate = self.first_candidate(method, &MethodTarget::Filtered(filter))?;
        self.call_candidate(&candidate, method, args).await
    }

    /// Fan the invocation out to every owner; one result per instance,
    /// individual failures carried per entry.
    pub async fn invoke_all(
        &self,
        method: &str,
        args: Value,
    ) -> Result<Vec<InvocationResult>, InteropError> {
        let candidates = self.candidates(method, &MethodTarget::All);
        if candidates.is_empty() {
            return Err(InteropError::MethodNotFound {
                method: method.to_string(),
            });
        }

        let calls = candidates.into_iter().map(|candidate| {
            let args = args.clone();
            async move {
                let result = self.call_candidate(&candidate, method, args).await;
                InvocationResult {
                    instance: candidate.owner,
                    result,
                }
            }
        });

        Ok(futures::future::join_all(calls).await)
    }

    /// Attach to a stream; resolves once the owner accepts, fails on
    /// reject, and times out when the owner never decides.
    pub async fn subscribe(
        &self,
        method: &str,
        options: SubscribeOptions,
    ) -> Result<StreamSubscription, InteropError> {
        let candidate = self.first_streaming_candidate(method, &options.target)?;
        let id = SubscriptionId::new();
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);

        if candidate.is_local {
            return self.subscribe_local(method, id, options.arguments, tx, rx).await;
        }

        self.shared.client_subs.insert(
            id,
            OutboundSub {
                tx,
                owner_window: candidate.owner.window_id.clone(),
            },
        );

        let request = SubscribeRequest {
            target: candidate.owner.instance_id,
            method: method.to_string(),
            subscription_id: id,
            arguments: options.arguments,
            subscriber: self.shared.instance.clone(),
        };
        let payload = serde_json::to_value(&request)
            .map_err(|err| InteropError::HandlerFailed {
                method: method.to_string(),
                message: err.to_string(),
            })?;

        match self
            .shared
            .bridge
            .send(DOMAIN, &protocol::subscribe_operation(), payload, None)
            .await
        {
            Ok(reply) => {
                let reply: SubscribeReply = serde_json::from_value(reply).unwrap_or(SubscribeReply {
                    accepted: true,
                    branch_key: None,
                });
                Ok(StreamSubscription::new(
                    id,
                    method.to_string(),
                    reply.branch_key,
                    rx,
                    Arc::clone(&self.shared),
                ))
            }
            Err(BridgeError::Remote(wire)) => {
                self.shared.client_subs.remove(&id);
                Err(InteropError::from_wire(method, wire))
            }
            Err(err) => {
                self.shared.client_subs.remove(&id);
                Err(InteropError::Bridge(err))
            }
        }
    }

    async fn subscribe_local(
        &self,
        method: &str,
        id: SubscriptionId,
        arguments: Value,
        tx: mpsc::Sender<StreamEvent>,
        rx: mpsc::Receiver<StreamEvent>,
    ) -> Result<StreamSubscription, InteropError> {
        let window = self.shared.bridge.config().control_timeout;
        let started = Instant::now();
        let request = self.shared.process_subscription_request(
            method,
            self.shared.instance.clone(),
            id,
            arguments,
            DeliveryRoute::Local(tx),
        );

        let timeout_error = || {
            InteropError::Bridge(BridgeError::Timeout {
                operation: protocol::ops::SUBSCRIBE.to_string(),
                timeout_ms: window.as_millis(),
            })
        };

        match tokio::time::timeout(window, request).await {
            Ok(Ok(branch_key)) => Ok(StreamSubscription::new(
                id,
                method.to_string(),
                branch_key,
                rx,
                Arc::clone(&self.shared),
            )),
            Ok(Err(InteropError::NoDecision)) => {
                // Same outcome a remote subscriber would see: the full
                // timeout window elapses, then the call fails.
                tokio::time::sleep(window.saturating_sub(started.elapsed())).await;
                Err(timeout_error())
            }
            Ok(Err(err)) => Err(err),
            Err(_) => Err(timeout_error()),
        }
    }

    /// Broadcast this instance and its methods; peers answer with their
    /// own snapshots so a late joiner converges immediately.
    pub fn announce(&self) {
        let snapshot = RegistrySnapshot {
            instance: self.shared.instance.clone(),
            methods: self.shared.registry.read().local_defs(),
        };
        self.shared.notify_json(events::HELLO, &snapshot);
    }

    /// Every method on the bus with its owner.
    #[must_use]
    pub fn methods(&self) -> Vec<(Instance, MethodDefinition)> {
        self.shared.registry.read().all_methods(&self.shared.instance)
    }

    /// Methods owned by one instance.
    #[must_use]
    pub fn methods_for_instance(&self, instance_id: &InstanceId) -> Vec<MethodDefinition> {
        self.shared
            .registry
            .read()
            .methods_for_instance(instance_id, &self.shared.instance)
    }

    /// The streaming subset of an instance's methods.
    #[must_use]
    pub fn streams_for_instance(&self, instance_id: &InstanceId) -> Vec<MethodDefinition> {
        self.shared
            .registry
            .read()
            .streams_for_instance(instance_id, &self.shared.instance)
    }

    /// Every instance known to this peer.
    #[must_use]
    pub fn instances(&self) -> Vec<Instance> {
        self.shared.registry.read().instances(&self.shared.instance)
    }

    fn candidates(&self, method: &str, target: &MethodTarget) -> Vec<Candidate> {
        let all = self
            .shared
            .registry
            .read()
            .candidates(method, &self.shared.instance);
        match target {
            MethodTarget::Best | MethodTarget::All => all,
            MethodTarget::Filtered(filter) => all
                .into_iter()
                .filter(|c| filter.matches(&c.owner))
                .collect(),
        }
    }

    fn first_candidate(&self, method: &str, target: &MethodTarget) -> Result<Candidate, InteropError> {
        self.candidates(method, target)
            .into_iter()
            .next()
            .ok_or_else(|| InteropError::MethodNotFound {
                method: method.to_string(),
            })
    }

    fn first_streaming_candidate(
        &self,
        method: &str,
        target: &MethodTarget,
    ) -> Result<Candidate, InteropError> {
        let candidates = self.candidates(method, target);
        if candidates.is_empty() {
            return Err(InteropError::MethodNotFound {
                method: method.to_string(),
            });
        }
        candidates
            .into_iter()
            .find(|c| c.def.supports_streaming)
            .ok_or_else(|| InteropError::NotAStream {
                method: method.to_string(),
            })
    }

    async fn call_candidate(
        &self,
        candidate: &Candidate,
        method: &str,
        args: Value,
    ) -> Result<Value, InteropError> {
        if candidate.is_local {
            return self
                .shared
                .execute_local(method, args, Some(self.shared.instance.clone()))
                .await;
        }

        let request = InvokeRequest {
            target: candidate.owner.instance_id,
            method: method.to_string(),
            args,
            caller: self.shared.instance.clone(),
        };
        let payload = serde_json::to_value(&request).map_err(|err| InteropError::HandlerFailed {
            method: method.to_string(),
            message: err.to_string(),
        })?;

        match self
            .shared
            .bridge
            .send(DOMAIN, &protocol::invoke_operation(), payload, None)
            .await
        {
            Ok(value) => Ok(value),
            Err(BridgeError::Remote(wire)) => Err(InteropError::from_wire(method, wire)),
            Err(err) => Err(InteropError::Bridge(err)),
        }
    }
}

impl InteropShared {
    /// Execute a locally registered handler; errors propagate.
    pub(crate) async fn execute_local(
        &self,
        method: &str,
        args: Value,
        caller: Option<Instance>,
    ) -> Result<Value, InteropError> {
        let handler = self
            .registry
            .read()
            .local_handler(method)
            .ok_or_else(|| InteropError::MethodNotFound {
                method: method.to_string(),
            })?;

        handler(args, caller)
            .await
            .map_err(|message| InteropError::HandlerFailed {
                method: method.to_string(),
                message,
            })
    }

    /// Run the accept/reject handshake for one subscription request.
    ///
    /// On accept the subscription becomes active and visible in
    /// `subscriptions()`; on a dropped decision handle the caller gets
    /// [`InteropError::NoDecision`].
    pub(crate) async fn process_subscription_request(
        &self,
        method: &str,
        subscriber: Instance,
        id: SubscriptionId,
        arguments: Value,
        route: DeliveryRoute,
    ) -> Result<Option<String>, InteropError> {
        let stream_events = self
            .streams
            .read()
            .get(method)
            .map(|record| Arc::clone(&record.events))
            .ok_or_else(|| InteropError::NotAStream {
                method: method.to_string(),
            })?;

        let (tx, rx) = oneshot::channel();
        let info = SubscriptionInfo {
            id,
            instance: subscriber,
            branch_key: None,
            arguments,
            state: SubscriptionState::Pending,
        };
        stream_events.on_subscription_request(SubscriptionRequest::new(info.clone(), tx));

        match rx.await {
            Ok(Decision::Accept { branch_key }) => {
                let accepted = SubscriptionInfo {
                    branch_key: branch_key.clone(),
                    state: SubscriptionState::Accepted,
                    ..info
                };

                let mut streams = self.streams.write();
                let Some(record) = streams.get_mut(method) else {
                    // Stream closed while the owner was deciding.
                    return Err(InteropError::SubscriptionRejected {
                        reason: "stream closed".to_string(),
                    });
                };
                record.subs.push(ActiveSubscription {
                    info: accepted.clone(),
                    route,
                });
                drop(streams);

                stream_events.on_subscription_added(&accepted);
                debug!(method, subscription = %id, "Subscription accepted");
                Ok(branch_key)
            }
            Ok(Decision::Reject { reason }) => Err(InteropError::SubscriptionRejected {
                reason: reason.unwrap_or_else(|| "rejected by stream owner".to_string()),
            }),
            Err(_) => Err(InteropError::NoDecision),
        }
    }

    /// Deliver one push to the matching subscribers.
    pub(crate) fn push_stream(&self, method: &str, data: Value, branch: Option<&str>) -> usize {
        let subs: Vec<ActiveSubscription> = self
            .streams
            .read()
            .get(method)
            .map(|record| {
                record
                    .subs
                    .iter()
                    .filter(|sub| match branch {
                        None => true,
                        Some(key) => sub.info.branch_key.as_deref() == Some(key),
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let mut delivered = 0;
        for sub in subs {
            match &sub.route {
                DeliveryRoute::Local(tx) => match tx.try_send(StreamEvent::Data(data.clone())) {
                    Ok(()) => delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(method, subscription = %sub.info.id, "Slow subscriber, event dropped");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        debug!(method, subscription = %sub.info.id, "Subscriber gone");
                    }
                },
                DeliveryRoute::Remote => {
                    let payload = StreamData {
                        subscription_id: sub.info.id,
                        data: data.clone(),
                    };
                    self.notify_json(events::STREAM_DATA, &payload);
                    delivered += 1;
                }
            }
        }
        delivered
    }

    /// Accepted subscriptions of one stream.
    pub(crate) fn stream_subscriptions(&self, method: &str) -> Vec<SubscriptionInfo> {
        self.streams
            .read()
            .get(method)
            .map(|record| record.subs.iter().map(|sub| sub.info.clone()).collect())
            .unwrap_or_default()
    }

    /// Close a stream: tell every subscriber, then unregister.
    pub(crate) fn close_stream(&self, method: &str, reason: Option<&str>) {
        let record = self.streams.write().remove(method);
        if let Some(record) = record {
            for sub in &record.subs {
                self.deliver_closed(sub, reason);
                record.events.on_subscription_removed(&sub.info);
            }
        }

        if self.registry.write().remove_local(method).is_some() {
            self.announce_removal(method);
        }
    }

    /// Remove one owned subscription (unsubscribe or disconnect).
    pub(crate) fn remove_owned_subscription(&self, id: SubscriptionId) -> bool {
        let removed = {
            let mut streams = self.streams.write();
            streams.values_mut().find_map(|record| {
                let index = record.subs.iter().position(|sub| sub.info.id == id)?;
                let sub = record.subs.remove(index);
                Some((Arc::clone(&record.events), sub.info))
            })
        };

        match removed {
            Some((events, info)) => {
                events.on_subscription_removed(&info);
                true
            }
            None => false,
        }
    }

    /// Subscriber-side detach: stop local delivery and tell the owner.
    pub(crate) fn detach_subscription(&self, id: SubscriptionId) {
        self.client_subs.remove(&id);
        self.remove_owned_subscription(id);
        self.notify_json(events::STREAM_UNSUBSCRIBE, &StreamUnsubscribe { subscription_id: id });
    }

    fn deliver_closed(&self, sub: &ActiveSubscription, reason: Option<&str>) {
        let reason = reason.map(str::to_string);
        match &sub.route {
            DeliveryRoute::Local(tx) => {
                let _ = tx.try_send(StreamEvent::Closed { reason });
            }
            DeliveryRoute::Remote => {
                self.notify_json(
                    events::STREAM_CLOSED,
                    &StreamClosed {
                        subscription_id: sub.info.id,
                        reason,
                    },
                );
            }
        }
    }

    fn announce_method(&self, def: &MethodDefinition) {
        let payload = MethodAnnouncement {
            instance: self.instance.clone(),
            method: def.clone(),
        };
        self.notify_json(events::METHOD_ADDED, &payload);
    }

    fn announce_removal(&self, method: &str) {
        let payload = MethodRemoval {
            instance_id: self.instance.instance_id,
            method: method.to_string(),
        };
        self.notify_json(events::METHOD_REMOVED, &payload);
    }

    fn notify_json<T: serde::Serialize>(&self, event: &str, payload: &T) {
        match serde_json::to_value(payload) {
            Ok(value) => {
                if let Err(err) = self.bridge.notify(DOMAIN, event, value) {
                    warn!(event, error = %err, "Interop notify failed");
                }
            }
            Err(err) => warn!(event, error = %err, "Interop notify payload unserializable"),
        }
    }

    fn handle_interop_notify(&self, event: &str, payload: &Value) {
        match event {
            events::METHOD_ADDED => {
                let Ok(announcement) = serde_json::from_value::<MethodAnnouncement>(payload.clone())
                else {
                    warn!(event, "Malformed interop notify ignored");
                    return;
                };
                if announcement.instance.instance_id == self.instance.instance_id {
                    return;
                }
                self.registry
                    .write()
                    .add_remote(announcement.instance, announcement.method);
            }
            events::METHOD_REMOVED => {
                if let Ok(removal) = serde_json::from_value::<MethodRemoval>(payload.clone()) {
                    self.registry
                        .write()
                        .remove_remote(&removal.instance_id, &removal.method);
                }
            }
            events::HELLO | events::METHODS_SNAPSHOT => {
                let Ok(snapshot) = serde_json::from_value::<RegistrySnapshot>(payload.clone())
                else {
                    warn!(event, "Malformed registry snapshot ignored");
                    return;
                };
                if snapshot.instance.instance_id == self.instance.instance_id {
                    return;
                }
                self.registry
                    .write()
                    .set_remote_snapshot(snapshot.instance, snapshot.methods);

                // A hello asks for our side of the handshake.
                if event == events::HELLO {
                    let reply = RegistrySnapshot {
                        instance: self.instance.clone(),
                        methods: self.registry.read().local_defs(),
                    };
                    self.notify_json(events::METHODS_SNAPSHOT, &reply);
                }
            }
            events::STREAM_DATA => {
                if let Ok(data) = serde_json::from_value::<StreamData>(payload.clone()) {
                    if let Some(entry) = self.client_subs.get(&data.subscription_id) {
                        if entry.tx.try_send(StreamEvent::Data(data.data)).is_err() {
                            warn!(subscription = %data.subscription_id, "Stream event dropped");
                        }
                    }
                }
            }
            events::STREAM_CLOSED => {
                if let Ok(closed) = serde_json::from_value::<StreamClosed>(payload.clone()) {
                    if let Some((_, entry)) = self.client_subs.remove(&closed.subscription_id) {
                        let _ = entry.tx.try_send(StreamEvent::Closed {
                            reason: closed.reason,
                        });
                    }
                }
            }
            events::STREAM_UNSUBSCRIBE => {
                if let Ok(unsub) = serde_json::from_value::<StreamUnsubscribe>(payload.clone()) {
                    self.remove_owned_subscription(unsub.subscription_id);
                }
            }
            _ => debug!(event, "Unhandled interop notify"),
        }
    }

    fn handle_connection_notify(&self, event: &str, payload: &Value) {
        if event != PEER_DISCONNECTED_EVENT {
            return;
        }
        let Some(window_id) = payload.get("windowId").and_then(Value::as_str) else {
            return;
        };

        // Forget the peer's announced methods.
        self.registry.write().drop_instance_by_window(window_id);

        // Drop its subscriptions on our streams.
        let orphaned: Vec<SubscriptionId> = self
            .streams
            .read()
            .values()
            .flat_map(|record| record.subs.iter())
            .filter(|sub| sub.info.instance.window_id == window_id)
            .map(|sub| sub.info.id)
            .collect();
        for id in orphaned {
            self.remove_owned_subscription(id);
        }

        // Fail our subscriptions on its streams.
        let lost: Vec<SubscriptionId> = self
            .client_subs
            .iter()
            .filter(|entry| entry.owner_window == window_id)
            .map(|entry| *entry.key())
            .collect();
        for id in lost {
            if let Some((_, entry)) = self.client_subs.remove(&id) {
                let _ = entry.tx.try_send(StreamEvent::Closed {
                    reason: Some("peer disconnected".to_string()),
                });
            }
        }

        debug!(window = window_id, "Pruned state of disconnected peer");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::InteropController;
    use crate::streams::SubscriptionRequest;
    use serde_json::json;
    use shared_bus::{ConnectParams, InMemoryHub, Transport, TransportEvent};
    use std::time::Duration;
    use tokio::time::timeout;
    use wm_01_identity::IdentityResolver;
    use wm_02_bridge::BridgeConfig;

    /// Accepts every subscription, optionally onto a branch.
    struct AcceptAll {
        branch: Option<String>,
    }

    impl StreamEvents for AcceptAll {
        fn on_subscription_request(&self, request: SubscriptionRequest) {
            match &self.branch {
                Some(key) => request.accept_on_branch(key.clone()),
                None => request.accept(),
            }
        }
    }

    /// Rejects every subscription.
    struct RejectAll;

    impl StreamEvents for RejectAll {
        fn on_subscription_request(&self, request: SubscriptionRequest) {
            request.reject(Some("not today".to_string()));
        }
    }

    /// Drops every request without deciding (protocol violation).
    struct Undecided;

    impl StreamEvents for Undecided {
        fn on_subscription_request(&self, request: SubscriptionRequest) {
            drop(request);
        }
    }

    fn test_config() -> BridgeConfig {
        BridgeConfig {
            control_timeout: Duration::from_millis(200),
            ..BridgeConfig::default()
        }
    }

    async fn peer(hub: &InMemoryHub, app: &str) -> InteropBus {
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

        let bridge = GatewayBridge::new(connection, test_config());
        bridge.set_instance(instance.clone());
        let bus = InteropBus::new(Arc::clone(&bridge), instance);
        bridge.register_controller(InteropController::new(&bus));
        bridge.start().unwrap();
        bus.announce();
        bus
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    fn ping_handler() -> MethodHandler {
        Arc::new(|args, _caller| Box::pin(async move { Ok(json!({ "echo": args })) }))
    }

    #[tokio::test]
    async fn test_remote_invoke_best() {
        let hub = InMemoryHub::new();
        let owner = peer(&hub, "owner").await;
        let caller = peer(&hub, "caller").await;
        settle().await;

        owner.register(MethodDefinition::new("Ping"), ping_handler()).unwrap();
        settle().await;

        let result = caller.invoke("Ping", json!({ "n": 7 })).await.unwrap();
        assert_eq!(result, json!({ "echo": { "n": 7 } }));
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let hub = InMemoryHub::new();
        let bus = peer(&hub, "solo").await;

        bus.register(MethodDefinition::new("Ping"), ping_handler()).unwrap();
        let err = bus.register(MethodDefinition::new("Ping"), ping_handler()).unwrap_err();
        assert!(matches!(err, InteropError::DuplicateMethod { .. }));

        // The registry is undisturbed.
        assert_eq!(bus.methods_for_instance(&bus.instance().instance_id).len(), 1);
    }

    #[tokio::test]
    async fn test_handler_error_propagates_to_remote_caller() {
        let hub = InMemoryHub::new();
        let owner = peer(&hub, "owner").await;
        let caller = peer(&hub, "caller").await;
        settle().await;

        let failing: MethodHandler =
            Arc::new(|_, _| Box::pin(async { Err("division by zero".to_string()) }));
        owner.register(MethodDefinition::new("Divide"), failing).unwrap();
        settle().await;

        let err = caller.invoke("Divide", json!({})).await.unwrap_err();
        match err {
            InteropError::HandlerFailed { message, .. } => assert_eq!(message, "division by zero"),
            other => panic!("expected HandlerFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_method_rejects() {
        let hub = InMemoryHub::new();
        let bus = peer(&hub, "solo").await;

        let err = bus.invoke("Nothing", json!({})).await.unwrap_err();
        assert!(matches!(err, InteropError::MethodNotFound { .. }));
    }

    #[tokio::test]
    async fn test_invoke_all_collects_per_owner_results() {
        let hub = InMemoryHub::new();
        let one = peer(&hub, "one").await;
        let two = peer(&hub, "two").await;
        let caller = peer(&hub, "caller").await;
        settle().await;

        one.register(
            MethodDefinition::new("Status"),
            Arc::new(|_, _| Box::pin(async { Ok(json!("one-ok")) })),
        )
        .unwrap();
        two.register(
            MethodDefinition::new("Status"),
            Arc::new(|_, _| Box::pin(async { Err("two-down".to_string()) })),
        )
        .unwrap();
        settle().await;

        let results = caller.invoke_all("Status", json!({})).await.unwrap();
        assert_eq!(results.len(), 2);

        let ok = results.iter().find(|r| r.instance.application_name == "one").unwrap();
        assert_eq!(ok.result.as_ref().unwrap(), &json!("one-ok"));

        let failed = results.iter().find(|r| r.instance.application_name == "two").unwrap();
        assert!(matches!(
            failed.result.as_ref().unwrap_err(),
            InteropError::HandlerFailed { .. }
        ));
    }

    #[tokio::test]
    async fn test_stream_accept_on_branch_and_push() {
        let hub = InMemoryHub::new();
        let owner = peer(&hub, "owner").await;
        let subscriber = peer(&hub, "subscriber").await;
        settle().await;

        let handle = owner
            .create_stream(
                MethodDefinition::new("Prices"),
                Arc::new(AcceptAll { branch: Some("1".to_string()) }),
            )
            .unwrap();
        settle().await;

        let mut subscription = subscriber
            .subscribe("Prices", SubscribeOptions::default())
            .await
            .unwrap();

        assert_eq!(subscription.branch_key(), Some("1"));
        assert_eq!(handle.subscriptions().len(), 1);
        assert_eq!(handle.subscriptions()[0].branch_key.as_deref(), Some("1"));

        handle.push(json!({ "tick": 1 }), Some("1"));
        handle.push(json!({ "tick": 2 }), None);
        handle.push(json!({ "tick": 3 }), Some("other"));

        let first = timeout(Duration::from_millis(500), subscription.recv())
            .await
            .expect("timeout")
            .expect("event");
        assert_eq!(first, StreamEvent::Data(json!({ "tick": 1 })));

        // The unbranched push reaches every subscriber, branched ones only
        // their own branch.
        let second = timeout(Duration::from_millis(500), subscription.recv())
            .await
            .expect("timeout")
            .expect("event");
        assert_eq!(second, StreamEvent::Data(json!({ "tick": 2 })));
    }

    #[tokio::test]
    async fn test_subscribe_rejection() {
        let hub = InMemoryHub::new();
        let owner = peer(&hub, "owner").await;
        let subscriber = peer(&hub, "subscriber").await;
        settle().await;

        let _handle = owner
            .create_stream(MethodDefinition::new("Vault"), Arc::new(RejectAll))
            .unwrap();
        settle().await;

        let err = subscriber
            .subscribe("Vault", SubscribeOptions::default())
            .await
            .unwrap_err();
        match err {
            InteropError::SubscriptionRejected { reason } => assert_eq!(reason, "not today"),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_no_decision_surfaces_as_timeout() {
        let hub = InMemoryHub::new();
        let owner = peer(&hub, "owner").await;
        let subscriber = peer(&hub, "subscriber").await;
        settle().await;

        let _handle = owner
            .create_stream(MethodDefinition::new("Limbo"), Arc::new(Undecided))
            .unwrap();
        settle().await;

        let err = subscriber
            .subscribe("Limbo", SubscribeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, InteropError::Bridge(BridgeError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_stream_close_notifies_subscribers() {
        let hub = InMemoryHub::new();
        let owner = peer(&hub, "owner").await;
        let subscriber = peer(&hub, "subscriber").await;
        settle().await;

        let handle = owner
            .create_stream(MethodDefinition::new("Feed"), Arc::new(AcceptAll { branch: None }))
            .unwrap();
        settle().await;

        let mut subscription = subscriber
            .subscribe("Feed", SubscribeOptions::default())
            .await
            .unwrap();

        handle.close();

        let event = timeout(Duration::from_millis(500), subscription.recv())
            .await
            .expect("timeout")
            .expect("event");
        assert!(matches!(event, StreamEvent::Closed { .. }));
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let hub = InMemoryHub::new();
        let owner = peer(&hub, "owner").await;
        let subscriber = peer(&hub, "subscriber").await;
        settle().await;

        let handle = owner
            .create_stream(MethodDefinition::new("Feed"), Arc::new(AcceptAll { branch: None }))
            .unwrap();
        settle().await;

        let mut subscription = subscriber
            .subscribe("Feed", SubscribeOptions::default())
            .await
            .unwrap();
        settle().await;

        subscription.unsubscribe();
        subscription.unsubscribe();
        settle().await;

        // The owner no longer lists the subscription, and pushing after
        // unsubscribe delivers nothing to the departed subscriber.
        assert!(handle.subscriptions().is_empty());
        handle.push(json!({ "tick": 1 }), None);
        assert_eq!(subscription.recv().await, None);
    }

    #[tokio::test]
    async fn test_late_joiner_converges_via_hello() {
        let hub = InMemoryHub::new();
        let early = peer(&hub, "early").await;
        early.register(MethodDefinition::new("Ping"), ping_handler()).unwrap();

        let late = peer(&hub, "late").await;
        settle().await;

        let result = late.invoke("Ping", json!(1)).await.unwrap();
        assert_eq!(result, json!({ "echo": 1 }));
        assert_eq!(late.instances().len(), 2);
    }

    #[tokio::test]
    async fn test_registry_projection_invariant() {
        let hub = InMemoryHub::new();
        let bus = peer(&hub, "solo").await;

        bus.register(MethodDefinition::new("Plain"), ping_handler()).unwrap();
        let _stream = bus
            .create_stream(MethodDefinition::new("Feed"), Arc::new(AcceptAll { branch: None }))
            .unwrap();

        let id = bus.instance().instance_id;
        let methods = bus.methods_for_instance(&id);
        let streams = bus.streams_for_instance(&id);
        assert_eq!(
            streams.len(),
            methods.iter().filter(|m| m.supports_streaming).count()
        );
        assert_eq!(methods.len(), 2);
        assert_eq!(streams.len(), 1);
    }
}
