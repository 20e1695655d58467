//! # Context Engine
//!
//! Named shared mutable objects, synchronized across peers as deltas.
//! A context is created by its first write, never deleted (only
//! emptied), and observable before it exists: a subscription registered
//! ahead of creation fires on the first write. That ordering guarantee
//! is load-bearing for channel-style coordination.
//!
//! ## Merge semantics
//!
//! `update` merges top-level keys and replaces nested objects wholesale;
//! nested mutation goes through explicit path commands. `set` replaces
//! the whole context (remove-all-then-add-all, `reset` delta).

pub mod delta;
pub mod engine;
pub mod error;
pub mod subscription;

pub use delta::{ContextCommand, ContextDelta, Entries};
pub use engine::{ContextEngine, ContextEvent};
pub use error::ContextError;
pub use subscription::ContextSubscription;

/// Domain name of the context engine.
pub const DOMAIN: &str = "contexts";

/// Buffered events per context subscriber before drops occur.
pub const CONTEXT_BUFFER: usize = 256;
