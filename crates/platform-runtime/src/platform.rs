//! # Platform Container
//!
//! Glues the core plumbing (identity → bridge → interop/contexts) to the
//! library controllers and starts everything in dependency order:
//!
//! ```text
//! Phase 1: transport login → identity resolution
//! Phase 2: singleton claim (StartRegistry) + state machine
//! Phase 3: configuration layering + eager plugin validation
//! Phase 4: bridge, interop bus, context engine
//! Phase 5: library controllers (system → channels → windows →
//!          workspaces → extension → notifications), timeout-guarded
//! Phase 6: bridge loops + announces
//! Phase 7: plugins
//! ```
//!
//! A required controller failing aborts startup; soft-optional domains
//! (extension) degrade with a warning instead.

use crate::config::{validate_plugins, PlatformConfig, PluginDef};
use crate::controllers::{
    ChannelsController, ExtensionController, NotificationsController, SystemController,
    WindowsController, WorkspacesController,
};
use crate::state::{PlatformError, PlatformState, StartRegistry, StateMachine};
use serde_json::Value;
use shared_bus::{Transport, TransportEvent, CONNECTION_DOMAIN, PEER_DISCONNECTED_EVENT};
use shared_types::{ControlArgs, ControllerError, ControllerStatus, Instance, LibController};
use std::sync::Arc;
use tracing::{error, info, warn};
use wm_01_identity::IdentityResolver;
use wm_02_bridge::{BridgeConfig, GatewayBridge};
use wm_03_interop::{InteropBus, InteropController};
use wm_04_contexts::ContextEngine;

/// Domains allowed to fail startup without taking the platform down.
const SOFT_OPTIONAL_DOMAINS: &[&str] = &["extension"];

/// Everything `Platform::start` needs besides the transport.
pub struct PlatformOptions {
    /// Explicit call-site configuration (highest precedence).
    pub config: Option<Value>,
    /// Remotely-fetched defaults (middle precedence).
    pub remote_config: Option<Value>,
    /// User-supplied plugins, validated eagerly and run last.
    pub plugins: Vec<PluginDef>,
    /// Process-scoped singleton ledger.
    pub registry: Arc<StartRegistry>,
    /// Bridge timing configuration.
    pub bridge_config: BridgeConfig,
}

impl PlatformOptions {
    /// Options with defaults, sharing the given registry.
    #[must_use]
    pub fn new(registry: Arc<StartRegistry>) -> Self {
        Self {
            config: None,
            remote_config: None,
            plugins: Vec::new(),
            registry,
            bridge_config: BridgeConfig::default(),
        }
    }
}

/// One started platform window.
pub struct Platform {
    instance: Instance,
    config: PlatformConfig,
    bridge: Arc<GatewayBridge>,
    interop: InteropBus,
    contexts: ContextEngine,
    controllers: Vec<Arc<dyn LibController>>,
    state: StateMachine,
}

impl std::fmt::Debug for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Platform")
            .field("instance", &self.instance)
            .finish_non_exhaustive()
    }
}

impl Platform {
    /// Start a platform over a connected transport.
    pub async fn start(
        transport: Arc<dyn Transport>,
        options: PlatformOptions,
    ) -> Result<Self, PlatformError> {
        // =====================================================================
        // PHASE 1: Identity
        // =====================================================================
        let mut events = transport.events();
        let raw = tokio::time::timeout(options.bridge_config.init_timeout, async {
            loop {
                match events.recv().await {
                    Some(TransportEvent::LoggedIn(raw)) => break Some(raw),
                    Some(_) => continue,
                    None => break None,
                }
            }
        })
        .await
        .ok()
        .flatten()
        .ok_or(PlatformError::LoginTimeout)?;

        let instance = IdentityResolver::new().resolve(&raw);
        info!(instance = %instance.label(), "Phase 1: identity resolved");

        // =====================================================================
        // PHASE 2: Singleton claim
        // =====================================================================
        options.registry.acquire(&instance.window_id)?;
        let state = StateMachine::new();
        if let Err(err) = state.begin(&instance.window_id) {
            options.registry.release(&instance.window_id);
            return Err(err);
        }

        let abort = |err: PlatformError| {
            state.abort();
            options.registry.release(&instance.window_id);
            err
        };

        // =====================================================================
        // PHASE 3: Configuration
        // =====================================================================
        let config = match PlatformConfig::resolve(options.config.clone(), options.remote_config.clone()) {
            Ok(config) => config,
            Err(err) => return Err(abort(err.into())),
        };
        if let Err(err) = validate_plugins(&options.plugins) {
            return Err(abort(err.into()));
        }
        info!(environment = %config.environment, "Phase 3: configuration resolved");

        // =====================================================================
        // PHASE 4: Core plumbing
        // =====================================================================
        let bridge = GatewayBridge::new(transport, options.bridge_config.clone());
        bridge.set_instance(instance.clone());
        let interop = InteropBus::new(Arc::clone(&bridge), instance.clone());
        let contexts = ContextEngine::new(Arc::clone(&bridge), instance.clone());
        bridge.register_controller(InteropController::new(&interop));
        info!("Phase 4: bridge, interop bus and context engine wired");

        // =====================================================================
        // PHASE 5: Library controllers, dependency order
        // =====================================================================
        let controllers: Vec<Arc<dyn LibController>> = vec![
            SystemController::new(instance.clone()),
            ChannelsController::new(contexts.clone()),
            WindowsController::new(interop.clone()),
            WorkspacesController::new(),
            ExtensionController::new(),
            NotificationsController::new(Arc::clone(&bridge)),
        ];

        for controller in &controllers {
            let domain = controller.domain();
            let controller_config = config.controller_config(domain);
            let soft = SOFT_OPTIONAL_DOMAINS.contains(&domain);

            let started =
                tokio::time::timeout(options.bridge_config.init_timeout, controller.start(&controller_config))
                    .await;

            match started {
                Ok(Ok(())) => {
                    bridge.register_controller(Arc::clone(controller));
                }
                Ok(Err(err)) if soft => {
                    warn!(domain, error = %err, "Soft-optional controller degraded");
                }
                Ok(Err(err)) => {
                    error!(domain, error = %err, "Controller failed to start, aborting platform");
                    return Err(abort(PlatformError::ControllerFailed {
                        domain: domain.to_string(),
                        message: err.to_string(),
                    }));
                }
                Err(_) if soft => {
                    warn!(domain, "Soft-optional controller start timed out, degraded");
                }
                Err(_) => {
                    return Err(abort(PlatformError::StartupTimeout {
                        domain: domain.to_string(),
                    }));
                }
            }
        }
        info!(controllers = controllers.len(), "Phase 5: library controllers started");

        // =====================================================================
        // PHASE 6: Bridge loops + announces
        // =====================================================================
        if let Err(err) = bridge.start() {
            return Err(abort(err.into()));
        }
        interop.announce();
        contexts.announce();

        // Fan peer-unload events to every controller.
        let unload_targets = controllers.clone();
        bridge.on_notify(
            CONNECTION_DOMAIN,
            Arc::new(move |event, payload| {
                if event != PEER_DISCONNECTED_EVENT {
                    return;
                }
                let Some(window_id) = payload.get("windowId").and_then(Value::as_str) else {
                    return;
                };
                let window_id = window_id.to_string();
                let targets = unload_targets.clone();
                tokio::spawn(async move {
                    for controller in targets {
                        controller.handle_client_unloaded(&window_id).await;
                    }
                });
            }),
        );

        // =====================================================================
        // PHASE 7: Plugins
        // =====================================================================
        for plugin in &options.plugins {
            // Validated in phase 3; a definition without start cannot be here.
            let Some(start) = plugin.start.as_ref() else {
                continue;
            };
            match start().await {
                Ok(()) => info!(plugin = %plugin.name, "Plugin started"),
                Err(message) if plugin.critical => {
                    return Err(abort(PlatformError::PluginFailed {
                        plugin: plugin.name.clone(),
                        message,
                    }));
                }
                Err(message) => {
                    warn!(plugin = %plugin.name, error = %message, "Non-critical plugin failed");
                }
            }
        }

        state.complete();
        info!(instance = %instance.label(), "Platform started");

        Ok(Self {
            instance,
            config,
            bridge,
            interop,
            contexts,
            controllers,
            state,
        })
    }

    /// This window's identity.
    #[must_use]
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// The resolved configuration.
    #[must_use]
    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    /// The gateway bridge.
    #[must_use]
    pub fn bridge(&self) -> &Arc<GatewayBridge> {
        &self.bridge
    }

    /// The interop bus.
    #[must_use]
    pub fn interop(&self) -> &InteropBus {
        &self.interop
    }

    /// The context engine.
    #[must_use]
    pub fn contexts(&self) -> &ContextEngine {
        &self.contexts
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> PlatformState {
        self.state.current()
    }

    /// Status of one library controller.
    #[must_use]
    pub fn controller_status(&self, domain: &str) -> Option<ControllerStatus> {
        self.controllers
            .iter()
            .find(|controller| controller.domain() == domain)
            .map(|controller| controller.status())
    }

    /// Call one of this window's own controllers directly.
    pub async fn control(
        &self,
        domain: &str,
        operation: &str,
        data: Value,
    ) -> Result<Value, ControllerError> {
        let controller = self
            .controllers
            .iter()
            .find(|controller| controller.domain() == domain)
            .ok_or_else(|| ControllerError::Unavailable {
                domain: domain.to_string(),
                reason: "no such controller".to_string(),
            })?;

        controller
            .handle_control(ControlArgs {
                domain: domain.to_string(),
                operation: operation.to_string(),
                data,
                caller: Some(self.instance.clone()),
                command_id: None,
            })
            .await
    }
}
