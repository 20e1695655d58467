//! # Notifications Controller
//!
//! Raise/list/clear over an in-memory store; every raise is broadcast as
//! a notify so peers can render it. Retention is bounded by
//! configuration, oldest first out.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared_types::{
    BridgeOperation, ControlArgs, ControllerConfig, ControllerError, ControllerStatus,
    LibController, ObjectDecoder, OperationRegistry, ValueKind,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use wm_02_bridge::GatewayBridge;

use crate::config::NotificationSettings;

/// Domain name.
pub const DOMAIN: &str = "notifications";

/// Notify event broadcast on every raise.
pub const NOTIFICATION_RAISED_EVENT: &str = "notification-raised";

/// One retained notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub id: u64,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default)]
    pub severity: String,
}

struct Inner {
    bridge: Arc<GatewayBridge>,
    items: RwLock<Vec<NotificationRecord>>,
    max_retained: AtomicU64,
    next_id: AtomicU64,
    status: RwLock<ControllerStatus>,
}

/// Serves `raise`, `list` and `clear`.
pub struct NotificationsController {
    inner: Arc<Inner>,
    operations: OperationRegistry,
}

impl NotificationsController {
    /// Build the controller over the bridge.
    #[must_use]
    pub fn new(bridge: Arc<GatewayBridge>) -> Arc<Self> {
        let inner = Arc::new(Inner {
            bridge,
            items: RwLock::new(Vec::new()),
            max_retained: AtomicU64::new(100),
            next_id: AtomicU64::new(1),
            status: RwLock::new(ControllerStatus::Stopped),
        });

        let raise_inner = Arc::clone(&inner);
        let raise = BridgeOperation::new("raise")
            .accepts(
                ObjectDecoder::new()
                    .required("title", ValueKind::String)
                    .optional("body", ValueKind::String)
                    .optional("severity", ValueKind::String)
                    .shared(),
            )
            .handler(move |data, _| {
                let inner = Arc::clone(&raise_inner);
                Box::pin(async move {
                    let record = NotificationRecord {
                        id: inner.next_id.fetch_add(1, Ordering::Relaxed),
                        title: data["title"].as_str().unwrap_or_default().to_string(),
                        body: data["body"].as_str().map(str::to_string),
                        severity: data["severity"].as_str().unwrap_or("info").to_string(),
                    };

                    {
                        let mut items = inner.items.write();
                        items.push(record.clone());
                        let max = inner.max_retained.load(Ordering::Relaxed) as usize;
                        let overflow = items.len().saturating_sub(max);
                        if overflow > 0 {
                            items.drain(..overflow);
                        }
                    }

                    let payload = serde_json::to_value(&record)
                        .map_err(|err| ControllerError::Execution(err.to_string()))?;
                    if let Err(err) =
                        inner.bridge.notify(DOMAIN, NOTIFICATION_RAISED_EVENT, payload)
                    {
                        warn!(error = %err, "Notification broadcast failed");
                    }
                    Ok(json!({ "id": record.id }))
                })
            });

        let list_inner = Arc::clone(&inner);
        let list = BridgeOperation::new("list").handler(move |_, _| {
            let inner = Arc::clone(&list_inner);
            Box::pin(async move {
                serde_json::to_value(inner.items.read().clone())
                    .map_err(|err| ControllerError::Execution(err.to_string()))
            })
        });

        let clear_inner = Arc::clone(&inner);
        let clear = BridgeOperation::new("clear")
            .accepts(ObjectDecoder::new().optional("id", ValueKind::Number).shared())
            .handler(move |data, _| {
                let inner = Arc::clone(&clear_inner);
                Box::pin(async move {
                    let mut items = inner.items.write();
                    let before = items.len();
                    match data.get("id").and_then(Value::as_u64) {
                        Some(id) => items.retain(|record| record.id != id),
                        None => items.clear(),
                    }
                    Ok(json!({ "cleared": before - items.len() }))
                })
            });

        Arc::new(Self {
            inner,
            operations: OperationRegistry::new(DOMAIN).with(raise).with(list).with(clear),
        })
    }
}

#[async_trait]
impl LibController for NotificationsController {
    fn domain(&self) -> &'static str {
        DOMAIN
    }

    fn status(&self) -> ControllerStatus {
        *self.inner.status.read()
    }

    async fn start(&self, config: &ControllerConfig) -> Result<(), ControllerError> {
        let settings: NotificationSettings = serde_json::from_value(config.settings.clone())
            .map_err(|err| ControllerError::Execution(format!("bad notification settings: {err}")))?;

        if !settings.enabled {
            *self.inner.status.write() = ControllerStatus::Disabled;
            info!("Notifications controller disabled by configuration");
            return Ok(());
        }

        self.inner
            .max_retained
            .store(settings.max_retained as u64, Ordering::Relaxed);
        *self.inner.status.write() = ControllerStatus::Running;
        info!(max_retained = settings.max_retained, "Notifications controller started");
        Ok(())
    }

    async fn handle_control(&self, args: ControlArgs) -> Result<Value, ControllerError> {
        if *self.inner.status.read() != ControllerStatus::Running {
            return Err(ControllerError::Unavailable {
                domain: DOMAIN.to_string(),
                reason: "not running".to_string(),
            });
        }
        self.operations.handle(args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_bus::{ConnectParams, InMemoryHub};
    use wm_02_bridge::BridgeConfig;

    async fn controller(hub: &InMemoryHub, max_retained: usize) -> Arc<NotificationsController> {
        let bridge = GatewayBridge::new(
            Arc::new(hub.connect(ConnectParams::default())),
            BridgeConfig::default(),
        );
        bridge.start().unwrap();

        let controller = NotificationsController::new(bridge);
        controller
            .start(&ControllerConfig {
                settings: json!({ "enabled": true, "maxRetained": max_retained }),
                environment: "local".into(),
            })
            .await
            .unwrap();
        controller
    }

    fn args(operation: &str, data: Value) -> ControlArgs {
        ControlArgs {
            domain: DOMAIN.into(),
            operation: operation.into(),
            data,
            caller: None,
            command_id: None,
        }
    }

    #[tokio::test]
    async fn test_raise_and_list() {
        let hub = InMemoryHub::new();
        let controller = controller(&hub, 100).await;

        let raised = controller
            .handle_control(args("raise", json!({ "title": "Build done", "severity": "info" })))
            .await
            .unwrap();
        assert_eq!(raised["id"], 1);

        let list = controller.handle_control(args("list", Value::Null)).await.unwrap();
        assert_eq!(list.as_array().unwrap().len(), 1);
        assert_eq!(list[0]["title"], "Build done");
    }

    #[tokio::test]
    async fn test_retention_drops_oldest() {
        let hub = InMemoryHub::new();
        let controller = controller(&hub, 2).await;

        for title in ["one", "two", "three"] {
            controller
                .handle_control(args("raise", json!({ "title": title })))
                .await
                .unwrap();
        }

        let list = controller.handle_control(args("list", Value::Null)).await.unwrap();
        let titles: Vec<&str> = list
            .as_array()
            .unwrap()
            .iter()
            .map(|record| record["title"].as_str().unwrap())
            .collect();
        assert_eq!(titles, vec!["two", "three"]);
    }

    #[tokio::test]
    async fn test_clear_by_id_and_all() {
        let hub = InMemoryHub::new();
        let controller = controller(&hub, 100).await;

        controller.handle_control(args("raise", json!({ "title": "a" }))).await.unwrap();
        controller.handle_control(args("raise", json!({ "title": "b" }))).await.unwrap();

        let cleared = controller
            .handle_control(args("clear", json!({ "id": 1 })))
            .await
            .unwrap();
        assert_eq!(cleared["cleared"], 1);

        let cleared = controller.handle_control(args("clear", json!({}))).await.unwrap();
        assert_eq!(cleared["cleared"], 1);
    }

    #[tokio::test]
    async fn test_disabled_controller_is_unavailable() {
        let hub = InMemoryHub::new();
        let bridge = GatewayBridge::new(
            Arc::new(hub.connect(ConnectParams::default())),
            BridgeConfig::default(),
        );
        bridge.start().unwrap();

        let controller = NotificationsController::new(bridge);
        controller
            .start(&ControllerConfig {
                settings: json!({ "enabled": false }),
                environment: "local".into(),
            })
            .await
            .unwrap();

        assert_eq!(controller.status(), ControllerStatus::Disabled);
        let err = controller
            .handle_control(args("raise", json!({ "title": "x" })))
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::Unavailable { .. }));
    }
}
