//! # Identity Resolver
//!
//! Derives a stable peer `Instance` from whatever identity fields the
//! transport's handshake carries. Missing fields get deterministic
//! defaults; re-resolution on reconnect replaces transport-derived
//! fields instead of accumulating stale ones.

pub mod resolver;

pub use resolver::IdentityResolver;
