//! Cross-crate integration flows.

pub mod fixtures;

pub mod context_flows;
pub mod interop_flows;
pub mod platform_flows;
