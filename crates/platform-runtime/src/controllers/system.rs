//! # System Controller
//!
//! Environment and base-configuration queries. First in the startup
//! order; every other controller may assume it is running.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{json, Value};
use shared_types::{
    BridgeOperation, ControlArgs, ControllerConfig, ControllerError, ControllerStatus,
    Instance, LibController, OperationRegistry,
};
use std::sync::Arc;
use tracing::info;

/// Domain name.
pub const DOMAIN: &str = "system";

struct Inner {
    instance: Instance,
    environment: RwLock<String>,
    base: RwLock<Value>,
    status: RwLock<ControllerStatus>,
}

/// Serves `getEnvironment` and `getBase`.
pub struct SystemController {
    inner: Arc<Inner>,
    operations: OperationRegistry,
}

impl SystemController {
    /// Build the controller for this peer.
    #[must_use]
    pub fn new(instance: Instance) -> Arc<Self> {
        let inner = Arc::new(Inner {
            instance,
            environment: RwLock::new(String::new()),
            base: RwLock::new(Value::Null),
            status: RwLock::new(ControllerStatus::Stopped),
        });

        let env_inner = Arc::clone(&inner);
        let get_environment = BridgeOperation::new("getEnvironment").handler(move |_, _| {
            let inner = Arc::clone(&env_inner);
            Box::pin(async move {
                Ok(json!({
                    "environment": *inner.environment.read(),
                    "machine": inner.instance.machine,
                    "region": inner.instance.region,
                }))
            })
        });

        let base_inner = Arc::clone(&inner);
        let get_base = BridgeOperation::new("getBase").handler(move |_, _| {
            let inner = Arc::clone(&base_inner);
            Box::pin(async move { Ok(inner.base.read().clone()) })
        });

        Arc::new(Self {
            inner,
            operations: OperationRegistry::new(DOMAIN)
                .with(get_environment)
                .with(get_base),
        })
    }
}

#[async_trait]
impl LibController for SystemController {
    fn domain(&self) -> &'static str {
        DOMAIN
    }

    fn status(&self) -> ControllerStatus {
        *self.inner.status.read()
    }

    async fn start(&self, config: &ControllerConfig) -> Result<(), ControllerError> {
        *self.inner.environment.write() = config.environment.clone();
        *self.inner.base.write() = config.settings.clone();
        *self.inner.status.write() = ControllerStatus::Running;
        info!(environment = %config.environment, "System controller started");
        Ok(())
    }

    async fn handle_control(&self, args: ControlArgs) -> Result<Value, ControllerError> {
        if *self.inner.status.read() != ControllerStatus::Running {
            return Err(ControllerError::Unavailable {
                domain: DOMAIN.to_string(),
                reason: "not started".to_string(),
            });
        }
        self.operations.handle(args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::InstanceId;

    fn instance() -> Instance {
        Instance {
            application_name: "shell".into(),
            instance_id: InstanceId::new(),
            window_id: "wnd-shell".into(),
            pid: 1,
            machine: "desk-7".into(),
            environment: "local".into(),
            is_local: true,
            user: None,
            region: Some("emea".into()),
        }
    }

    fn args(operation: &str) -> ControlArgs {
        ControlArgs {
            domain: DOMAIN.into(),
            operation: operation.into(),
            data: Value::Null,
            caller: None,
            command_id: None,
        }
    }

    #[tokio::test]
    async fn test_get_environment_after_start() {
        let controller = SystemController::new(instance());
        controller
            .start(&ControllerConfig {
                settings: json!({ "windows": { "defaultWidth": 800 } }),
                environment: "prod".into(),
            })
            .await
            .unwrap();

        let result = controller.handle_control(args("getEnvironment")).await.unwrap();
        assert_eq!(result["environment"], "prod");
        assert_eq!(result["machine"], "desk-7");
        assert_eq!(result["region"], "emea");
    }

    #[tokio::test]
    async fn test_unavailable_before_start() {
        let controller = SystemController::new(instance());
        let err = controller.handle_control(args("getEnvironment")).await.unwrap_err();
        assert!(matches!(err, ControllerError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_get_base_returns_settings() {
        let controller = SystemController::new(instance());
        controller
            .start(&ControllerConfig {
                settings: json!({ "k": 1 }),
                environment: "local".into(),
            })
            .await
            .unwrap();

        let result = controller.handle_control(args("getBase")).await.unwrap();
        assert_eq!(result, json!({ "k": 1 }));
    }
}
