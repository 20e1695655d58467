//! # Extension Controller
//!
//! Soft-optional: when the hosting platform cannot run the browser
//! extension (or it is switched off), the controller disables itself and
//! the platform keeps starting; absence here is degradation, not
//! failure.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{json, Value};
use shared_types::{
    BridgeOperation, ControlArgs, ControllerConfig, ControllerError, ControllerStatus,
    LibController, OperationRegistry,
};
use std::sync::Arc;
use tracing::info;

use crate::config::ExtensionSettings;

/// Domain name.
pub const DOMAIN: &str = "extension";

struct Inner {
    status: RwLock<ControllerStatus>,
}

/// Serves `status` when enabled; disables itself otherwise.
pub struct ExtensionController {
    inner: Arc<Inner>,
    operations: OperationRegistry,
}

impl ExtensionController {
    /// Build the controller.
    #[must_use]
    pub fn new() -> Arc<Self> {
        let inner = Arc::new(Inner {
            status: RwLock::new(ControllerStatus::Stopped),
        });

        let status_inner = Arc::clone(&inner);
        let status = BridgeOperation::new("status").handler(move |_, _| {
            let inner = Arc::clone(&status_inner);
            Box::pin(async move {
                Ok(json!({ "enabled": *inner.status.read() == ControllerStatus::Running }))
            })
        });

        Arc::new(Self {
            inner,
            operations: OperationRegistry::new(DOMAIN).with(status),
        })
    }
}

#[async_trait]
impl LibController for ExtensionController {
    fn domain(&self) -> &'static str {
        DOMAIN
    }

    fn status(&self) -> ControllerStatus {
        *self.inner.status.read()
    }

    async fn start(&self, config: &ControllerConfig) -> Result<(), ControllerError> {
        let settings: ExtensionSettings =
            serde_json::from_value(config.settings.clone()).unwrap_or_default();

        if !settings.enabled {
            *self.inner.status.write() = ControllerStatus::Disabled;
            info!("Extension controller disabled by configuration");
            return Ok(());
        }
        if !settings.platform_supported {
            *self.inner.status.write() = ControllerStatus::Disabled;
            info!("Extension controller disabled: platform lacks extension support");
            return Ok(());
        }

        *self.inner.status.write() = ControllerStatus::Running;
        info!("Extension controller started");
        Ok(())
    }

    async fn handle_control(&self, args: ControlArgs) -> Result<Value, ControllerError> {
        // `status` answers even while disabled; everything else needs a
        // running controller.
        if args.operation != "status" && *self.inner.status.read() != ControllerStatus::Running {
            return Err(ControllerError::Unavailable {
                domain: DOMAIN.to_string(),
                reason: "extension disabled".to_string(),
            });
        }
        self.operations.handle(args).await
    }
}
