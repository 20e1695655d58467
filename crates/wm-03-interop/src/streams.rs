//! # Streams and Subscriptions
//!
//! A stream is a method registered with `supports_streaming = true`. A
//! subscriber attaches through an accept/reject handshake: the owner's
//! request handler consumes a decision handle exactly once. Accepted
//! subscriptions receive pushed data in send order and are always told
//! when the stream closes.

use crate::bus::InteropShared;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_types::Instance;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::Stream;
use uuid::Uuid;

/// Identifier of one subscription, allocated by the subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Allocate a fresh id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of one subscription. The pending → accepted/rejected
/// transition happens exactly once, through the owner's decision handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Pending,
    Accepted,
    Rejected,
}

/// What the stream owner knows about one subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionInfo {
    pub id: SubscriptionId,
    /// The subscribing peer.
    pub instance: Instance,
    /// Branch the owner placed the subscription on, if any.
    pub branch_key: Option<String>,
    /// Arguments supplied at subscribe time.
    pub arguments: Value,
    pub state: SubscriptionState,
}

/// The owner's verdict on a subscription request.
#[derive(Debug)]
pub(crate) enum Decision {
    Accept { branch_key: Option<String> },
    Reject { reason: Option<String> },
}

/// A pending subscription request, handed to the stream owner.
///
/// The handler must consume exactly one of `accept`,
/// `accept_on_branch` or `reject`; dropping the request without a
/// decision leaves the subscriber to its bridge timeout.
pub struct SubscriptionRequest {
    info: SubscriptionInfo,
    decision: oneshot::Sender<Decision>,
}

impl SubscriptionRequest {
    pub(crate) fn new(info: SubscriptionInfo, decision: oneshot::Sender<Decision>) -> Self {
        Self { info, decision }
    }

    /// The requesting subscription.
    #[must_use]
    pub fn info(&self) -> &SubscriptionInfo {
        &self.info
    }

    /// Arguments supplied by the subscriber.
    #[must_use]
    pub fn arguments(&self) -> &Value {
        &self.info.arguments
    }

    /// Accept onto the trunk: the subscriber sees every unbranched push.
    pub fn accept(self) {
        let _ = self.decision.send(Decision::Accept { branch_key: None });
    }

    /// Accept onto a branch: the subscriber sees pushes for that branch.
    pub fn accept_on_branch(self, key: impl Into<String>) {
        let _ = self.decision.send(Decision::Accept {
            branch_key: Some(key.into()),
        });
    }

    /// Reject; the subscriber's `subscribe` call fails with the reason.
    pub fn reject(self, reason: Option<String>) {
        let _ = self.decision.send(Decision::Reject { reason });
    }
}

/// Owner-side callbacks of one stream.
pub trait StreamEvents: Send + Sync {
    /// A peer wants to subscribe; decide via the request handle.
    fn on_subscription_request(&self, request: SubscriptionRequest);

    /// A subscription was accepted and is now live.
    fn on_subscription_added(&self, subscription: &SubscriptionInfo) {
        let _ = subscription;
    }

    /// A subscription went away (unsubscribe, close, disconnect).
    fn on_subscription_removed(&self, subscription: &SubscriptionInfo) {
        let _ = subscription;
    }
}

/// What a subscriber receives.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// One pushed payload.
    Data(Value),
    /// The stream ended; no further events follow.
    Closed { reason: Option<String> },
}

/// How the owner reaches one accepted subscriber.
#[derive(Clone)]
pub(crate) enum DeliveryRoute {
    /// Same-peer subscriber, fed directly.
    Local(mpsc::Sender<StreamEvent>),
    /// Remote subscriber, fed via stream-data notifies.
    Remote,
}

/// One accepted subscription as held by the owner.
#[derive(Clone)]
pub(crate) struct ActiveSubscription {
    pub info: SubscriptionInfo,
    pub route: DeliveryRoute,
}

/// Owner-side handle of a created stream.
pub struct StreamHandle {
    method: String,
    shared: Arc<InteropShared>,
}

impl StreamHandle {
    pub(crate) fn new(method: String, shared: Arc<InteropShared>) -> Self {
        Self { method, shared }
    }

    /// The stream's method name.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Push `data` to subscribers: every trunk subscriber when `branch`
    /// is `None`, only that branch's subscribers otherwise.
    ///
    /// Returns the number of subscribers the payload was routed to.
    pub fn push(&self, data: Value, branch: Option<&str>) -> usize {
        self.shared.push_stream(&self.method, data, branch)
    }

    /// Accepted subscriptions, in acceptance order.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        self.shared.stream_subscriptions(&self.method)
    }

    /// Close the stream: every subscriber is told, then the method is
    /// unregistered and de-announced.
    pub fn close(self) {
        self.shared.close_stream(&self.method, None);
    }
}

/// Subscriber-side handle of a live subscription.
///
/// Yields `StreamEvent`s via [`recv`](Self::recv) or the `Stream` impl.
/// `unsubscribe` is idempotent; after it returns no further events are
/// delivered, queued ones included.
pub struct StreamSubscription {
    id: SubscriptionId,
    method: String,
    branch_key: Option<String>,
    rx: mpsc::Receiver<StreamEvent>,
    shared: Arc<InteropShared>,
    unsubscribed: bool,
}

impl fmt::Debug for StreamSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSubscription")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("branch_key", &self.branch_key)
            .field("unsubscribed", &self.unsubscribed)
            .finish_non_exhaustive()
    }
}

impl StreamSubscription {
    pub(crate) fn new(
        id: SubscriptionId,
        method: String,
        branch_key: Option<String>,
        rx: mpsc::Receiver<StreamEvent>,
        shared: Arc<InteropShared>,
    ) -> Self {
        Self {
            id,
            method,
            branch_key,
            rx,
            shared,
            unsubscribed: false,
        }
    }

    /// This subscription's id.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// The subscribed method.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Branch the owner placed this subscription on.
    #[must_use]
    pub fn branch_key(&self) -> Option<&str> {
        self.branch_key.as_deref()
    }

    /// Receive the next event; `None` after close or unsubscribe.
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        if self.unsubscribed {
            return None;
        }
        self.rx.recv().await
    }

    /// Detach from the stream. Safe to call repeatedly, and after the
    /// stream closed; never re-delivers.
    pub fn unsubscribe(&mut self) {
        if self.unsubscribed {
            return;
        }
        self.unsubscribed = true;
        self.rx.close();
        // Drain whatever was queued so nothing is observed afterwards.
        while self.rx.try_recv().is_ok() {}
        self.shared.detach_subscription(self.id);
    }
}

impl Stream for StreamSubscription {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.unsubscribed {
            return Poll::Ready(None);
        }
        self.rx.poll_recv(cx)
    }
}

impl Drop for StreamSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_decision_handle_is_single_use() {
        let (tx, rx) = oneshot::channel();
        let info = SubscriptionInfo {
            id: SubscriptionId::new(),
            instance: test_instance(),
            branch_key: None,
            arguments: Value::Null,
            state: SubscriptionState::Pending,
        };

        SubscriptionRequest::new(info, tx).accept_on_branch("1");
        match rx.await.unwrap() {
            Decision::Accept { branch_key } => assert_eq!(branch_key.as_deref(), Some("1")),
            other => panic!("expected accept, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_dropped_request_yields_no_decision() {
        let (tx, rx) = oneshot::channel();
        let info = SubscriptionInfo {
            id: SubscriptionId::new(),
            instance: test_instance(),
            branch_key: None,
            arguments: Value::Null,
            state: SubscriptionState::Pending,
        };

        drop(SubscriptionRequest::new(info, tx));
        assert!(rx.await.is_err());
    }

    fn test_instance() -> Instance {
        Instance {
            application_name: "test".into(),
            instance_id: shared_types::InstanceId::new(),
            window_id: "wnd-test".into(),
            pid: 1,
            machine: "localhost".into(),
            environment: "local".into(),
            is_local: true,
            user: None,
            region: None,
        }
    }
}
