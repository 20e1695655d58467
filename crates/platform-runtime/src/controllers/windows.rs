//! # Windows Controller
//!
//! Window/instance bookkeeping: lists the peers the interop registry
//! knows and answers per-window lookups. The registry itself converges
//! through interop announces; this controller is a projection over it.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{json, Value};
use shared_types::{
    error_codes, BridgeOperation, ControlArgs, ControllerConfig, ControllerError,
    ControllerStatus, Instance, LibController, ObjectDecoder, OperationRegistry, ValueKind,
};
use std::sync::Arc;
use tracing::{debug, info};
use wm_03_interop::InteropBus;

/// Domain name.
pub const DOMAIN: &str = "windows";

struct Inner {
    interop: InteropBus,
    status: RwLock<ControllerStatus>,
}

/// Serves `list` and `get` over known windows.
pub struct WindowsController {
    inner: Arc<Inner>,
    operations: OperationRegistry,
}

fn window_view(instance: &Instance) -> Value {
    json!({
        "applicationName": instance.application_name,
        "windowId": instance.window_id,
        "instanceId": instance.instance_id,
        "isLocal": instance.is_local,
    })
}

impl WindowsController {
    /// Build the controller over the interop bus.
    #[must_use]
    pub fn new(interop: InteropBus) -> Arc<Self> {
        let inner = Arc::new(Inner {
            interop,
            status: RwLock::new(ControllerStatus::Stopped),
        });

        let list_inner = Arc::clone(&inner);
        let list = BridgeOperation::new("list").handler(move |_, _| {
            let inner = Arc::clone(&list_inner);
            Box::pin(async move {
                let views: Vec<Value> = inner.interop.instances().iter().map(window_view).collect();
                Ok(Value::Array(views))
            })
        });

        let get_inner = Arc::clone(&inner);
        let get = BridgeOperation::new("get")
            .accepts(ObjectDecoder::new().required("windowId", ValueKind::String).shared())
            .handler(move |data, _| {
                let inner = Arc::clone(&get_inner);
                Box::pin(async move {
                    let window_id = data["windowId"].as_str().unwrap_or_default();
                    inner
                        .interop
                        .instances()
                        .iter()
                        .find(|instance| instance.window_id == window_id)
                        .map(window_view)
                        .ok_or_else(|| {
                            ControllerError::domain(
                                error_codes::EXECUTION,
                                format!("unknown window '{window_id}'"),
                            )
                        })
                })
            });

        Arc::new(Self {
            inner,
            operations: OperationRegistry::new(DOMAIN).with(list).with(get),
        })
    }
}

#[async_trait]
impl LibController for WindowsController {
    fn domain(&self) -> &'static str {
        DOMAIN
    }

    fn status(&self) -> ControllerStatus {
        *self.inner.status.read()
    }

    async fn start(&self, _config: &ControllerConfig) -> Result<(), ControllerError> {
        *self.inner.status.write() = ControllerStatus::Running;
        info!("Windows controller started");
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

    async fn handle_client_unloaded(&self, window_id: &str) {
        // The interop registry prunes itself on disconnect notifies.
        debug!(window = window_id, "Window unloaded");
    }
}
