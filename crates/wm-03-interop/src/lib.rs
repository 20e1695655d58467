//! # Interop Bus
//!
//! Method registration, invocation routing and stream subscriptions
//! between peers. Built on the gateway bridge: local calls execute
//! in-process, remote calls ride the correlation-id envelope, and the
//! registry converges across peers through announce notifies.
//!
//! ## Protocol
//!
//! - `register` announces a method so every peer can discover and invoke
//!   it; duplicate names per instance are rejected.
//! - `invoke` targets the best match, all matches, or an explicit
//!   instance filter; handler errors propagate to the caller.
//! - `create_stream`/`subscribe` implement the accept/reject handshake:
//!   the owner decides each subscription exactly once, data flows per
//!   subscriber in push order, and closure is always announced rather
//!   than silently dropped.

pub mod bus;
pub mod controller;
pub mod domain;
pub mod protocol;
pub mod registry;
pub mod streams;

pub use bus::{InteropBus, SubscribeOptions};
pub use controller::InteropController;
pub use domain::{
    HandlerFuture, InstanceFilter, InteropError, InvocationResult, MethodDefinition,
    MethodHandler, MethodTarget,
};
pub use streams::{
    StreamEvent, StreamEvents, StreamHandle, StreamSubscription, SubscriptionId,
    SubscriptionInfo, SubscriptionRequest, SubscriptionState,
};

/// Domain name of the interop controller.
pub const DOMAIN: &str = "interop";

/// Buffered events per stream subscriber before drops occur.
pub const STREAM_BUFFER: usize = 256;
