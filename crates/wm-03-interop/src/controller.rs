//! # Interop Controller
//!
//! The library controller serving the `interop` domain: remote `invoke`
//! and `subscribe` requests are decoded, checked for addressing (on a
//! broadcast transport only the targeted peer answers) and executed
//! against the local registry.

use crate::bus::{InteropBus, InteropShared};
use crate::protocol::{self, ops, InvokeRequest, SubscribeReply, SubscribeRequest};
use crate::streams::DeliveryRoute;
use crate::domain::InteropError;
use crate::DOMAIN;
use async_trait::async_trait;
use serde_json::Value;
use shared_types::{
    error_codes, ControlArgs, ControllerConfig, ControllerError, LibController,
    OperationRegistry,
};
use std::sync::Arc;

/// Serves `invoke` and `subscribe` for one peer.
pub struct InteropController {
    operations: OperationRegistry,
}

impl InteropController {
    /// Build the controller over a bus.
    #[must_use]
    pub fn new(bus: &InteropBus) -> Arc<Self> {
        let shared = Arc::clone(bus.shared());

        let invoke_shared = Arc::clone(&shared);
        let invoke = protocol::invoke_operation().handler(move |data, _| {
            let shared = Arc::clone(&invoke_shared);
            Box::pin(async move { serve_invoke(shared, data).await })
        });

        let subscribe_shared = Arc::clone(&shared);
        let subscribe = protocol::subscribe_operation().handler(move |data, _| {
            let shared = Arc::clone(&subscribe_shared);
            Box::pin(async move { serve_subscribe(shared, data).await })
        });

        Arc::new(Self {
            operations: OperationRegistry::new(DOMAIN).with(invoke).with(subscribe),
        })
    }
}

async fn serve_invoke(shared: Arc<InteropShared>, data: Value) -> Result<Value, ControllerError> {
    let request: InvokeRequest = serde_json::from_value(data)
        .map_err(|err| ControllerError::Execution(format!("malformed {} payload: {err}", ops::INVOKE)))?;

    if request.target != shared.instance.instance_id {
        // Addressed to another peer on the broadcast transport.
        return Err(ControllerError::NoResponse);
    }

    shared
        .execute_local(&request.method, request.args, Some(request.caller))
        .await
        .map_err(interop_to_controller)
}

async fn serve_subscribe(shared: Arc<InteropShared>, data: Value) -> Result<Value, ControllerError> {
    let request: SubscribeRequest = serde_json::from_value(data).map_err(|err| {
        ControllerError::Execution(format!("malformed {} payload: {err}", ops::SUBSCRIBE))
    })?;

    if request.target != shared.instance.instance_id {
        return Err(ControllerError::NoResponse);
    }

    let outcome = shared
        .process_subscription_request(
            &request.method,
            request.subscriber,
            request.subscription_id,
            request.arguments,
            DeliveryRoute::Remote,
        )
        .await;

    match outcome {
        Ok(branch_key) => {
            let reply = SubscribeReply {
                accepted: true,
                branch_key,
            };
            serde_json::to_value(&reply).map_err(|err| ControllerError::Execution(err.to_string()))
        }
        // Spec'd protocol violation: no decision means no answer at all,
        // leaving the subscriber to its bridge timeout.
        Err(InteropError::NoDecision) => Err(ControllerError::NoResponse),
        Err(err) => Err(interop_to_controller(err)),
    }
}

fn interop_to_controller(err: InteropError) -> ControllerError {
    match err {
        InteropError::MethodNotFound { method } => ControllerError::domain(
            error_codes::METHOD_NOT_FOUND,
            format!("method not found: '{method}'"),
        ),
        InteropError::NotAStream { method } => ControllerError::domain(
            error_codes::METHOD_NOT_FOUND,
            format!("method '{method}' is not a stream"),
        ),
        InteropError::HandlerFailed { message, .. } => {
            ControllerError::domain(error_codes::HANDLER_FAILED, message)
        }
        InteropError::SubscriptionRejected { reason } => {
            ControllerError::domain(error_codes::SUBSCRIPTION_REJECTED, reason)
        }
        other => ControllerError::Execution(other.to_string()),
    }
}

#[async_trait]
impl LibController for InteropController {
    fn domain(&self) -> &'static str {
        DOMAIN
    }

    async fn start(&self, _config: &ControllerConfig) -> Result<(), ControllerError> {
        Ok(())
    }

    async fn handle_control(&self, args: ControlArgs) -> Result<Value, ControllerError> {
        self.operations.handle(args).await
    }
}
