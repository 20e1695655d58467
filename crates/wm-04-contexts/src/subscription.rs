//! # Context Subscriptions
//!
//! A cancellable handle yielding delta events for one context name.
//! Valid before the context exists; the first write fires it.

use crate::engine::{ContextEvent, ContextShared};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::Stream;

/// A live subscription to one context.
///
/// `unsubscribe` is idempotent and final: after it returns, no further
/// events are observed, queued ones included.
pub struct ContextSubscription {
    id: u64,
    name: String,
    rx: mpsc::Receiver<ContextEvent>,
    shared: Arc<ContextShared>,
    unsubscribed: bool,
}

impl ContextSubscription {
    pub(crate) fn new(
        id: u64,
        name: String,
        rx: mpsc::Receiver<ContextEvent>,
        shared: Arc<ContextShared>,
    ) -> Self {
        Self {
            id,
            name,
            rx,
            shared,
            unsubscribed: false,
        }
    }

    /// The subscribed context name.
    #[must_use]
    pub fn context(&self) -> &str {
        &self.name
    }

    /// Receive the next delta event; `None` after unsubscribe.
    pub async fn recv(&mut self) -> Option<ContextEvent> {
        if self.unsubscribed {
            return None;
        }
        self.rx.recv().await
    }

    /// Detach. Safe to call repeatedly; never re-delivers.
    pub fn unsubscribe(&mut self) {
        if self.unsubscribed {
            return;
        }
        self.unsubscribed = true;
        self.rx.close();
        while self.rx.try_recv().is_ok() {}
        self.shared.remove_subscriber(&self.name, self.id);
    }
}

impl Stream for ContextSubscription {
    type Item = ContextEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.unsubscribed {
            return Poll::Ready(None);
        }
        self.rx.poll_recv(cx)
    }
}

impl Drop for ContextSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
