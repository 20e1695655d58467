//! # Instance Resolution
//!
//! `resolve` builds a fresh `Instance` from a raw handshake payload;
//! `refresh` re-resolves after a reconnect. Refresh is replace-not-merge:
//! a field the transport stopped reporting falls back to its default
//! rather than keeping the stale value. `user` and `region` are the two
//! exceptions: once known they survive a refresh that omits them.

use rand::Rng;
use shared_types::{Instance, InstanceId, RawIdentity};
use tracing::debug;
use uuid::Uuid;

/// Environment assumed when the transport does not report one.
pub const DEFAULT_ENVIRONMENT: &str = "local";

/// Machine name assumed when the transport does not report one.
pub const DEFAULT_MACHINE: &str = "localhost";

/// Resolves raw handshake identities into `Instance`s.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityResolver;

impl IdentityResolver {
    /// Create a resolver.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Build a fresh instance from a handshake payload.
    ///
    /// Defaults: `pid` → random 10-digit number, `application_name` →
    /// generated id, `is_local` → true.
    #[must_use]
    pub fn resolve(&self, raw: &RawIdentity) -> Instance {
        let instance = Instance {
            application_name: raw
                .application_name
                .clone()
                .unwrap_or_else(generated_application_name),
            instance_id: InstanceId::new(),
            window_id: raw.window_id.clone().unwrap_or_else(generated_window_id),
            pid: raw.pid.unwrap_or_else(fallback_pid),
            machine: raw.machine.clone().unwrap_or_else(|| DEFAULT_MACHINE.to_string()),
            environment: raw
                .environment
                .clone()
                .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string()),
            is_local: raw.is_local.unwrap_or(true),
            user: raw.user.clone(),
            region: raw.region.clone(),
        };

        debug!(instance = %instance.label(), "Resolved peer identity");
        instance
    }

    /// Re-resolve identity after a reconnect.
    ///
    /// Every transport-derived field is replaced (and re-defaulted when
    /// absent); `instance_id` is resolver-owned and survives; `user` and
    /// `region` are retained when the new payload omits them.
    #[must_use]
    pub fn refresh(&self, current: &Instance, raw: &RawIdentity) -> Instance {
        let mut refreshed = self.resolve(raw);
        refreshed.instance_id = current.instance_id;
        if refreshed.user.is_none() {
            refreshed.user = current.user.clone();
        }
        if refreshed.region.is_none() {
            refreshed.region = current.region.clone();
        }

        debug!(instance = %refreshed.label(), "Refreshed peer identity");
        refreshed
    }
}

fn generated_application_name() -> String {
    format!("app-{}", short_id())
}

fn generated_window_id() -> String {
    format!("wnd-{}", short_id())
}

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Random 10-digit fallback when the transport reports no pid.
fn fallback_pid() -> u64 {
    rand::thread_rng().gen_range(1_000_000_000..10_000_000_000)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_raw() -> RawIdentity {
        RawIdentity {
            application_name: Some("clients".into()),
            window_id: Some("wnd-main".into()),
            pid: Some(777),
            machine: Some("desk-12".into()),
            environment: Some("prod".into()),
            is_local: Some(false),
            user: Some("jsmith".into()),
            region: Some("emea".into()),
        }
    }

    #[test]
    fn test_resolve_uses_reported_fields() {
        let instance = IdentityResolver::new().resolve(&full_raw());
        assert_eq!(instance.application_name, "clients");
        assert_eq!(instance.window_id, "wnd-main");
        assert_eq!(instance.pid, 777);
        assert_eq!(instance.machine, "desk-12");
        assert_eq!(instance.environment, "prod");
        assert!(!instance.is_local);
        assert_eq!(instance.user.as_deref(), Some("jsmith"));
    }

    #[test]
    fn test_resolve_defaults_missing_fields() {
        let instance = IdentityResolver::new().resolve(&RawIdentity::default());
        assert!(instance.application_name.starts_with("app-"));
        assert!(instance.window_id.starts_with("wnd-"));
        assert!(instance.pid >= 1_000_000_000 && instance.pid < 10_000_000_000);
        assert_eq!(instance.machine, DEFAULT_MACHINE);
        assert_eq!(instance.environment, DEFAULT_ENVIRONMENT);
        assert!(instance.is_local);
        assert!(instance.user.is_none());
    }

    #[test]
    fn test_refresh_replaces_dropped_fields() {
        let resolver = IdentityResolver::new();
        let first = resolver.resolve(&full_raw());

        // Reconnect with machine/environment no longer reported.
        let refreshed = resolver.refresh(
            &first,
            &RawIdentity {
                application_name: Some("clients".into()),
                window_id: Some("wnd-main".into()),
                ..RawIdentity::default()
            },
        );

        assert_eq!(refreshed.machine, DEFAULT_MACHINE);
        assert_eq!(refreshed.environment, DEFAULT_ENVIRONMENT);
        assert_ne!(refreshed.pid, first.pid);
    }

    #[test]
    fn test_refresh_keeps_instance_id_user_region() {
        let resolver = IdentityResolver::new();
        let first = resolver.resolve(&full_raw());

        let refreshed = resolver.refresh(&first, &RawIdentity::default());
        assert_eq!(refreshed.instance_id, first.instance_id);
        assert_eq!(refreshed.user.as_deref(), Some("jsmith"));
        assert_eq!(refreshed.region.as_deref(), Some("emea"));
    }

    #[test]
    fn test_refresh_is_safe_to_repeat() {
        let resolver = IdentityResolver::new();
        let first = resolver.resolve(&full_raw());
        let once = resolver.refresh(&first, &full_raw());
        let twice = resolver.refresh(&once, &full_raw());

        assert_eq!(once.instance_id, twice.instance_id);
        assert_eq!(once.application_name, twice.application_name);
        assert_eq!(once.user, twice.user);
    }
}
