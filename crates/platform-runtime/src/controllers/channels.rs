//! # Channels Controller
//!
//! A channel is a context with the `___channel___` name prefix used for
//! "current selection" pub/sub between windows. The controller manages
//! channel definitions and this window's membership; the data itself
//! lives in the context engine and syncs like any other context.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{json, Value};
use shared_types::{
    error_codes, BridgeOperation, ControlArgs, ControllerConfig, ControllerError,
    ControllerStatus, LibController, ObjectDecoder, OperationRegistry, ValueKind,
};
use std::sync::Arc;
use tracing::info;
use wm_04_contexts::ContextEngine;

use crate::config::{ChannelDefinition, ChannelSettings};

/// Domain name.
pub const DOMAIN: &str = "channels";

/// Conventional context-name prefix marking channel contexts.
pub const CHANNEL_PREFIX: &str = "___channel___";

/// The context name backing a channel.
#[must_use]
pub fn channel_context(name: &str) -> String {
    format!("{CHANNEL_PREFIX}{name}")
}

struct Inner {
    contexts: ContextEngine,
    definitions: RwLock<Vec<ChannelDefinition>>,
    current: RwLock<Option<String>>,
    status: RwLock<ControllerStatus>,
}

impl Inner {
    fn known(&self, name: &str) -> bool {
        self.definitions.read().iter().any(|def| def.name == name)
    }
}

/// Serves channel membership and publication for one window.
pub struct ChannelsController {
    inner: Arc<Inner>,
    operations: OperationRegistry,
}

impl ChannelsController {
    /// Build the controller over the context engine.
    #[must_use]
    pub fn new(contexts: ContextEngine) -> Arc<Self> {
        let inner = Arc::new(Inner {
            contexts,
            definitions: RwLock::new(Vec::new()),
            current: RwLock::new(None),
            status: RwLock::new(ControllerStatus::Stopped),
        });

        let list_inner = Arc::clone(&inner);
        let list = BridgeOperation::new("list").handler(move |_, _| {
            let inner = Arc::clone(&list_inner);
            Box::pin(async move {
                let definitions = inner.definitions.read().clone();
                serde_json::to_value(definitions).map_err(|err| ControllerError::Execution(err.to_string()))
            })
        });

        let get_inner = Arc::clone(&inner);
        let get = BridgeOperation::new("get")
            .accepts(ObjectDecoder::new().required("name", ValueKind::String).shared())
            .handler(move |data, _| {
                let inner = Arc::clone(&get_inner);
                Box::pin(async move {
                    let name = data["name"].as_str().unwrap_or_default().to_string();
                    if !inner.known(&name) {
                        return Err(unknown_channel(&name));
                    }
                    Ok(inner
                        .contexts
                        .get(&channel_context(&name))
                        .unwrap_or_else(|| json!({})))
                })
            });

        let join_inner = Arc::clone(&inner);
        let join = BridgeOperation::new("join")
            .accepts(ObjectDecoder::new().required("name", ValueKind::String).shared())
            .handler(move |data, _| {
                let inner = Arc::clone(&join_inner);
                Box::pin(async move {
                    let name = data["name"].as_str().unwrap_or_default().to_string();
                    if !inner.known(&name) {
                        return Err(unknown_channel(&name));
                    }
                    *inner.current.write() = Some(name.clone());
                    Ok(json!({ "joined": name }))
                })
            });

        let leave_inner = Arc::clone(&inner);
        let leave = BridgeOperation::new("leave").handler(move |_, _| {
            let inner = Arc::clone(&leave_inner);
            Box::pin(async move {
                let left = inner.current.write().take();
                Ok(json!({ "left": left }))
            })
        });

        let current_inner = Arc::clone(&inner);
        let current = BridgeOperation::new("current").handler(move |_, _| {
            let inner = Arc::clone(&current_inner);
            Box::pin(async move { Ok(json!({ "channel": *inner.current.read() })) })
        });

        let publish_inner = Arc::clone(&inner);
        let publish = BridgeOperation::new("publish")
            .accepts(ObjectDecoder::new().required("data", ValueKind::Any).shared())
            .handler(move |data, _| {
                let inner = Arc::clone(&publish_inner);
                Box::pin(async move {
                    let Some(channel) = inner.current.read().clone() else {
                        return Err(ControllerError::domain(
                            error_codes::EXECUTION,
                            "not joined to a channel",
                        ));
                    };
                    inner
                        .contexts
                        .update(&channel_context(&channel), json!({ "data": data["data"] }))
                        .map_err(|err| ControllerError::Execution(err.to_string()))?;
                    Ok(json!({ "published": channel }))
                })
            });

        Arc::new(Self {
            inner,
            operations: OperationRegistry::new(DOMAIN)
                .with(list)
                .with(get)
                .with(join)
                .with(leave)
                .with(current)
                .with(publish),
        })
    }

    /// The channel this window is currently joined to.
    #[must_use]
    pub fn current(&self) -> Option<String> {
        self.inner.current.read().clone()
    }
}

fn unknown_channel(name: &str) -> ControllerError {
    ControllerError::domain(error_codes::EXECUTION, format!("unknown channel '{name}'"))
}

#[async_trait]
impl LibController for ChannelsController {
    fn domain(&self) -> &'static str {
        DOMAIN
    }

    fn status(&self) -> ControllerStatus {
        *self.inner.status.read()
    }

    async fn start(&self, config: &ControllerConfig) -> Result<(), ControllerError> {
        let settings: ChannelSettings = serde_json::from_value(config.settings.clone())
            .map_err(|err| ControllerError::Execution(format!("bad channel settings: {err}")))?;

        // Seed every configured channel context so late subscribers have
        // something to attach to.
        for definition in &settings.definitions {
            self.inner
                .contexts
                .update(
                    &channel_context(&definition.name),
                    json!({ "name": definition.name, "color": definition.color }),
                )
                .map_err(|err| ControllerError::Execution(err.to_string()))?;
        }

        info!(channels = settings.definitions.len(), "Channels controller started");
        *self.inner.definitions.write() = settings.definitions;
        *self.inner.status.write() = ControllerStatus::Running;
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
        let _ = window_id;
        // Membership is per-window local state; nothing held for peers.
    }
}
