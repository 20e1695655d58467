//! # Peer Identity Entities
//!
//! An `Instance` identifies one connected application window on the bus.
//! It is created by the identity resolver from the transport's handshake
//! payload (`RawIdentity`) and refreshed whenever the transport re-resolves
//! identity (e.g. reconnect).

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a peer instance.
///
/// Resolver-owned: survives identity refresh, changes only when a window
/// connects anew.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(Uuid);

impl InstanceId {
    /// Generate a fresh instance id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parse from string form.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of one connected peer (application window).
///
/// Owned by the connection; read by the interop bus for filtering and
/// targeting. Mutated only by identity refresh, which replaces
/// transport-derived fields wholesale (`user`/`region` are retained).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    /// Application this window belongs to.
    pub application_name: String,
    /// Stable per-connection identifier.
    pub instance_id: InstanceId,
    /// Window identifier within the application.
    pub window_id: String,
    /// Process id reported by the transport, or a random fallback.
    pub pid: u64,
    /// Machine the window runs on.
    pub machine: String,
    /// Deployment environment (e.g. "local", "prod").
    pub environment: String,
    /// Whether the window runs on the local machine.
    pub is_local: bool,
    /// Logged-in user, when the transport reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Deployment region, when the transport reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

impl Instance {
    /// Short human-readable label for logging.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}/{}", self.application_name, self.window_id)
    }
}

/// Raw identity fields carried by the transport's handshake payload.
///
/// Every field is optional; the identity resolver fills the gaps with
/// deterministic defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawIdentity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_local: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}
