//! # Test Fixtures
//!
//! Shared builders: a started platform window on a hub, plus stream
//! decision helpers used across the flow tests.

use platform_runtime::{Platform, PlatformOptions, StartRegistry};
use shared_bus::{ConnectParams, HubConnection, InMemoryHub, Transport};
use std::sync::Arc;
use std::time::Duration;
use wm_03_interop::{StreamEvents, SubscriptionRequest};

/// A started platform plus the raw connection (kept for explicit
/// disconnect in tests).
pub struct TestWindow {
    pub platform: Platform,
    pub connection: Arc<HubConnection>,
}

/// Start a platform window on the hub.
pub async fn start_window(
    hub: &InMemoryHub,
    registry: &Arc<StartRegistry>,
    app: &str,
    window: &str,
) -> TestWindow {
    let connection = Arc::new(hub.connect(ConnectParams {
        application_name: Some(app.to_string()),
        window_id: Some(window.to_string()),
        ..ConnectParams::default()
    }));

    let transport: Arc<dyn Transport> = Arc::clone(&connection) as Arc<dyn Transport>;
    let platform = Platform::start(transport, PlatformOptions::new(Arc::clone(registry)))
        .await
        .expect("platform start");

    TestWindow { platform, connection }
}

/// Give broadcast notifies a moment to land everywhere.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(75)).await;
}

/// Accepts every subscription, optionally onto a branch.
pub struct AcceptAll {
    pub branch: Option<String>,
}

impl StreamEvents for AcceptAll {
    fn on_subscription_request(&self, request: SubscriptionRequest) {
        match &self.branch {
            Some(key) => request.accept_on_branch(key.clone()),
            None => request.accept(),
        }
    }
}

/// Rejects every subscription with a fixed reason.
pub struct RejectAll;

impl StreamEvents for RejectAll {
    fn on_subscription_request(&self, request: SubscriptionRequest) {
        request.reject(Some("denied".to_string()));
    }
}
