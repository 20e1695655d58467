//! # Gateway Bridge
//!
//! The correlation-id RPC layer over an abstract transport. Every
//! outgoing domain operation gets a `CommandId`, a pending-command entry
//! and a bounded timeout; every inbound envelope is demultiplexed to the
//! pending store (responses), the registered library controller for its
//! domain (requests), or notify handlers (out-of-band events).
//!
//! ## Guarantees
//!
//! - At most one settlement per command id; a late response after the
//!   timeout is silently dropped.
//! - No command stays pending forever: the caller's timeout and the
//!   background sweep both bound its lifetime, whichever fires first.
//! - Payloads are validated against the operation's decoders before they
//!   are sent and before results are handed back.

pub mod bridge;
pub mod config;
pub mod error;
pub mod pending;

pub use bridge::{GatewayBridge, NotifyHandler};
pub use config::{BridgeConfig, TimeoutClass};
pub use error::BridgeError;
pub use pending::{CommandOutcome, PendingCommandStore, PendingSnapshot, PendingStats};
