//! # Gateway Bridge
//!
//! Wraps one transport connection: outbound sends with correlation ids
//! and bounded timeouts, inbound demux to the pending store, library
//! controllers, and notify handlers.

use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::pending::{sweep_task, PendingCommandStore, PendingSnapshot};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use shared_bus::Transport;
use shared_types::{
    error_codes, BridgeOperation, CommandId, ControlArgs, ControllerError, Instance,
    LibController, WireEnvelope, WireError,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Handler of out-of-band notifies for one domain.
pub type NotifyHandler = Arc<dyn Fn(&str, &Value) + Send + Sync>;

/// The correlation-id RPC layer over one transport connection.
pub struct GatewayBridge {
    transport: Arc<dyn Transport>,
    pending: Arc<PendingCommandStore>,
    controllers: DashMap<String, Arc<dyn LibController>>,
    notify_handlers: RwLock<HashMap<String, Vec<NotifyHandler>>>,
    instance: RwLock<Option<Instance>>,
    config: BridgeConfig,
    started: AtomicBool,
    /// Self-handle for the spawned loops.
    weak_self: Weak<GatewayBridge>,
}

impl GatewayBridge {
    /// Wrap a transport connection.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, config: BridgeConfig) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            transport,
            pending: Arc::new(PendingCommandStore::new()),
            controllers: DashMap::new(),
            notify_handlers: RwLock::new(HashMap::new()),
            instance: RwLock::new(None),
            config,
            started: AtomicBool::new(false),
            weak_self: weak_self.clone(),
        })
    }

    /// Start the inbound demux loop and the pending-command sweep.
    ///
    /// Register controllers and notify handlers before starting, or
    /// early envelopes may find no route.
    pub fn start(&self) -> Result<(), BridgeError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(BridgeError::AlreadyStarted);
        }

        let Some(bridge) = self.weak_self.upgrade() else {
            return Err(BridgeError::ChannelClosed);
        };
        tokio::spawn(async move { bridge.run_inbound().await });

        let store = Arc::clone(&self.pending);
        let interval = self.config.sweep_interval;
        tokio::spawn(sweep_task(store, interval));

        Ok(())
    }

    /// Bridge timing configuration.
    #[must_use]
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Record the resolved identity of this peer.
    pub fn set_instance(&self, instance: Instance) {
        *self.instance.write() = Some(instance);
    }

    /// The resolved identity, once login completed.
    #[must_use]
    pub fn instance(&self) -> Option<Instance> {
        self.instance.read().clone()
    }

    /// Route inbound requests for the controller's domain to it.
    pub fn register_controller(&self, controller: Arc<dyn LibController>) {
        let domain = controller.domain().to_string();
        if self.controllers.insert(domain.clone(), controller).is_some() {
            warn!(%domain, "Replacing registered controller");
        }
    }

    /// Invoke `handler` for every notify arriving on `domain`.
    pub fn on_notify(&self, domain: &str, handler: NotifyHandler) {
        self.notify_handlers
            .write()
            .entry(domain.to_string())
            .or_default()
            .push(handler);
    }

    /// Every controller currently registered.
    #[must_use]
    pub fn controllers(&self) -> Vec<Arc<dyn LibController>> {
        self.controllers.iter().map(|entry| Arc::clone(entry.value())).collect()
    }

    /// Send a domain operation and await its correlated response.
    ///
    /// `timeout` defaults to the control class. Data is validated before
    /// leaving, the result before being returned.
    pub async fn send(
        &self,
        domain: &str,
        operation: &BridgeOperation,
        data: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, BridgeError> {
        if let Some(decoder) = &operation.data_decoder {
            decoder.run(&data)?;
        }

        let command_id = CommandId::new();
        let timeout = timeout.unwrap_or(self.config.control_timeout);
        let rx = self.pending.register(command_id, operation.name, timeout);

        let envelope = WireEnvelope::request(domain, operation.name, data, command_id);
        if let Err(err) = self.transport.send(envelope) {
            self.pending.cancel(&command_id);
            return Err(err.into());
        }

        let outcome = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => return Err(BridgeError::ChannelClosed),
            Err(_) => {
                // Mark the command inert; a late response is dropped.
                self.pending.expire(&command_id);
                return Err(BridgeError::Timeout {
                    operation: operation.name.to_string(),
                    timeout_ms: timeout.as_millis(),
                });
            }
        };

        match outcome.result {
            Ok(value) => {
                if let Some(decoder) = &operation.result_decoder {
                    decoder.run(&value)?;
                }
                Ok(value)
            }
            Err(wire) if wire.code == error_codes::TIMEOUT => Err(BridgeError::Timeout {
                operation: operation.name.to_string(),
                timeout_ms: timeout.as_millis(),
            }),
            Err(wire) => Err(BridgeError::Remote(wire)),
        }
    }

    /// Send an out-of-band notify; never answered, never validated.
    pub fn notify(&self, domain: &str, event: &str, payload: Value) -> Result<(), BridgeError> {
        self.transport
            .send(WireEnvelope::notify(domain, event, payload))
            .map_err(Into::into)
    }

    /// Settlement counters of the pending store.
    #[must_use]
    pub fn pending_stats(&self) -> PendingSnapshot {
        self.pending.snapshot()
    }

    async fn run_inbound(self: Arc<Self>) {
        let mut subscription = self.transport.subscribe();

        while let Some(envelope) = subscription.recv().await {
            match envelope {
                WireEnvelope::Response { command_id, result, error } => {
                    let outcome = match error {
                        Some(wire) => Err(wire),
                        None => Ok(result.unwrap_or(Value::Null)),
                    };
                    self.pending.complete(command_id, outcome);
                }
                WireEnvelope::Request { domain, operation, data, command_id } => {
                    self.dispatch_request(domain, operation, data, command_id);
                }
                WireEnvelope::Notify { domain, event, payload } => {
                    let handlers = self
                        .notify_handlers
                        .read()
                        .get(&domain)
                        .cloned()
                        .unwrap_or_default();
                    for handler in handlers {
                        handler(&event, &payload);
                    }
                }
            }
        }

        debug!("Transport subscription ended, bridge inbound loop stopped");
    }

    /// Dispatch one request to its controller on a separate task, so a
    /// slow operation never blocks the demux loop.
    fn dispatch_request(&self, domain: String, operation: String, data: Value, command_id: CommandId) {
        let Some(controller) = self.controllers.get(&domain).map(|c| Arc::clone(c.value())) else {
            warn!(%domain, %operation, "Request for unknown domain");
            self.respond(WireEnvelope::response_err(
                command_id,
                WireError::new(error_codes::UNKNOWN_DOMAIN, format!("no controller for domain '{domain}'")),
            ));
            return;
        };

        let Some(bridge) = self.weak_self.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            let args = ControlArgs {
                domain: domain.clone(),
                operation: operation.clone(),
                data,
                caller: None,
                command_id: Some(command_id),
            };

            match controller.handle_control(args).await {
                Ok(result) => bridge.respond(WireEnvelope::response_ok(command_id, result)),
                Err(ControllerError::NoResponse) => {
                    debug!(%domain, %operation, command = %command_id, "Request produced no response");
                }
                Err(err) => {
                    error!(%domain, %operation, command = %command_id, error = %err, "Control call failed");
                    bridge.respond(WireEnvelope::response_err(command_id, err.to_wire()));
                }
            }
        });
    }

    fn respond(&self, envelope: WireEnvelope) {
        if let Err(err) = self.transport.send(envelope) {
            warn!(error = %err, "Failed to send response envelope");
        }
    }
}
