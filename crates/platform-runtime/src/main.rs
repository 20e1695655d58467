//! # Window-Mesh Demo Runtime
//!
//! Boots an in-process hub with two platform windows, registers a method
//! on one, invokes it from the other, and moves a shared context:
//! the whole interop path exercised end to end, logged phase by phase.

use anyhow::Context;
use mesh_telemetry::{init_telemetry, TelemetryConfig};
use platform_runtime::{Platform, PlatformOptions, StartRegistry};
use serde_json::json;
use shared_bus::{ConnectParams, InMemoryHub};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use wm_03_interop::{MethodDefinition, SubscribeOptions};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _guard = init_telemetry(TelemetryConfig::from_env()).context("telemetry init")?;

    info!("Starting Window-Mesh demo hub");
    let hub = InMemoryHub::new();
    let registry = StartRegistry::new();

    let shell = Platform::start(
        Arc::new(hub.connect(ConnectParams {
            application_name: Some("shell".to_string()),
            window_id: Some("wnd-shell".to_string()),
            ..ConnectParams::default()
        })),
        PlatformOptions::new(Arc::clone(&registry)),
    )
    .await
    .context("shell platform start")?;

    let client = Platform::start(
        Arc::new(hub.connect(ConnectParams {
            application_name: Some("client".to_string()),
            window_id: Some("wnd-client".to_string()),
            ..ConnectParams::default()
        })),
        PlatformOptions::new(Arc::clone(&registry)),
    )
    .await
    .context("client platform start")?;

    // Registry convergence rides on announce notifies.
    tokio::time::sleep(Duration::from_millis(100)).await;

    shell
        .interop()
        .register(
            MethodDefinition::new("Shell.Echo").with_description("Echoes its arguments"),
            Arc::new(|args, caller| {
                Box::pin(async move {
                    let from = caller.map(|c| c.application_name).unwrap_or_default();
                    Ok(json!({ "echo": args, "servedFor": from }))
                })
            }),
        )
        .map_err(|err| anyhow::anyhow!("register: {err}"))?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let echoed = client
        .interop()
        .invoke("Shell.Echo", json!({ "greeting": "hello" }))
        .await
        .map_err(|err| anyhow::anyhow!("invoke: {err}"))?;
    info!(%echoed, "Invocation answered across windows");

    // Shared context: the client observes the shell's selection.
    let mut selection = client.contexts().subscribe("Selection");
    shell
        .contexts()
        .set("Selection", json!({ "client": "acme" }))
        .map_err(|err| anyhow::anyhow!("context set: {err}"))?;
    if let Some(event) = selection.recv().await {
        info!(context = %event.context, entries = ?event.entries, "Context delta observed");
    }

    // A stream, subscribed across windows.
    let prices = shell
        .interop()
        .create_stream(
            MethodDefinition::new("Shell.Prices"),
            Arc::new(AutoAccept),
        )
        .map_err(|err| anyhow::anyhow!("create stream: {err}"))?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut feed = client
        .interop()
        .subscribe("Shell.Prices", SubscribeOptions::default())
        .await
        .map_err(|err| anyhow::anyhow!("subscribe: {err}"))?;
    prices.push(json!({ "symbol": "ACME", "price": 41.5 }), None);
    if let Some(event) = feed.recv().await {
        info!(?event, "Stream event delivered");
    }

    info!("Demo complete");
    Ok(())
}

/// Accepts every subscriber onto the trunk.
struct AutoAccept;

impl wm_03_interop::StreamEvents for AutoAccept {
    fn on_subscription_request(&self, request: wm_03_interop::SubscriptionRequest) {
        request.accept();
    }
}
