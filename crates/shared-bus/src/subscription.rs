//! # Envelope Subscriptions
//!
//! The receiving side of a transport: a subscription yields every
//! envelope sent by *other* peers, in their send order, optionally
//! narrowed by a domain filter.

use crate::hub::{ConnectionId, Frame};
use shared_types::WireEnvelope;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::broadcast;
use tokio_stream::Stream;
use tracing::debug;

/// Narrows a subscription to a set of domains.
///
/// Responses carry no domain and always match: they are addressed by
/// command id, and a domain filter must not hide them.
#[derive(Debug, Clone, Default)]
pub struct EnvelopeFilter {
    domains: Option<Vec<String>>,
}

impl EnvelopeFilter {
    /// Match every envelope.
    #[must_use]
    pub fn all() -> Self {
        Self { domains: None }
    }

    /// Match requests/notifies of the given domains (plus all responses).
    #[must_use]
    pub fn domains<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            domains: Some(domains.into_iter().map(Into::into).collect()),
        }
    }

    /// Whether `envelope` passes this filter.
    #[must_use]
    pub fn matches(&self, envelope: &WireEnvelope) -> bool {
        match (&self.domains, envelope.domain()) {
            (None, _) | (_, None) => true,
            (Some(domains), Some(domain)) => domains.iter().any(|d| d == domain),
        }
    }
}

/// A subscription to envelopes from other peers.
pub struct EnvelopeSubscription {
    receiver: broadcast::Receiver<Frame>,
    /// Own connection id; own frames are skipped.
    exclude: ConnectionId,
    filter: EnvelopeFilter,
}

impl EnvelopeSubscription {
    /// Create a subscription over a frame channel.
    #[must_use]
    pub fn new(
        receiver: broadcast::Receiver<Frame>,
        exclude: ConnectionId,
        filter: EnvelopeFilter,
    ) -> Self {
        Self {
            receiver,
            exclude,
            filter,
        }
    }

    /// Receive the next matching envelope.
    ///
    /// Returns `None` once the transport is gone. A lagged subscriber
    /// skips the dropped envelopes and keeps receiving.
    pub async fn recv(&mut self) -> Option<WireEnvelope> {
        loop {
            let frame = match self.receiver.recv().await {
                Ok(frame) => frame,
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    debug!(lagged = count, "Envelope subscriber lagged, messages dropped");
                    continue;
                }
            };

            if frame.from != self.exclude && self.filter.matches(&frame.envelope) {
                return Some(frame.envelope);
            }
        }
    }

    /// Try to receive without blocking; `Ok(None)` when nothing is ready.
    pub fn try_recv(&mut self) -> Result<Option<WireEnvelope>, broadcast::error::TryRecvError> {
        loop {
            let frame = match self.receiver.try_recv() {
                Ok(frame) => frame,
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(err @ broadcast::error::TryRecvError::Closed) => return Err(err),
            };

            if frame.from != self.exclude && self.filter.matches(&frame.envelope) {
                return Ok(Some(frame.envelope));
            }
        }
    }
}

/// Stream adapter over a subscription, for combinator-style consumers.
pub struct EnvelopeStream {
    subscription: EnvelopeSubscription,
}

impl EnvelopeStream {
    /// Wrap a subscription.
    #[must_use]
    pub fn new(subscription: EnvelopeSubscription) -> Self {
        Self { subscription }
    }
}

impl Stream for EnvelopeStream {
    type Item = WireEnvelope;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.subscription.try_recv() {
            Ok(Some(envelope)) => Poll::Ready(Some(envelope)),
            Ok(None) => {
                cx.waker().wake_by_ref();
                Poll::Pending
            }
            Err(_) => Poll::Ready(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared_types::CommandId;

    fn request(domain: &str) -> WireEnvelope {
        WireEnvelope::request(domain, "op", json!({}), CommandId::new())
    }

    #[test]
    fn test_filter_all_matches_everything() {
        let filter = EnvelopeFilter::all();
        assert!(filter.matches(&request("interop")));
        assert!(filter.matches(&WireEnvelope::response_ok(CommandId::new(), json!(1))));
    }

    #[test]
    fn test_domain_filter() {
        let filter = EnvelopeFilter::domains(["contexts"]);
        assert!(filter.matches(&request("contexts")));
        assert!(!filter.matches(&request("interop")));
        // Responses always pass.
        assert!(filter.matches(&WireEnvelope::response_ok(CommandId::new(), json!(1))));
    }

    #[tokio::test]
    async fn test_subscription_skips_own_frames() {
        let (tx, rx) = broadcast::channel(8);
        let mut sub = EnvelopeSubscription::new(rx, ConnectionId(1), EnvelopeFilter::all());

        tx.send(Frame { from: ConnectionId(1), envelope: request("interop") }).unwrap();
        tx.send(Frame { from: ConnectionId(2), envelope: request("contexts") }).unwrap();

        let received = sub.recv().await.unwrap();
        assert_eq!(received.domain(), Some("contexts"));
    }

    #[tokio::test]
    async fn test_subscription_closed_returns_none() {
        let (tx, rx) = broadcast::channel::<Frame>(8);
        let mut sub = EnvelopeSubscription::new(rx, ConnectionId(1), EnvelopeFilter::all());
        drop(tx);
        assert!(sub.recv().await.is_none());
    }
}
