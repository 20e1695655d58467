//! # Interop Wire Protocol
//!
//! Payload shapes and operation definitions for the `interop` domain.
//! Requests are addressed inside the payload (`target`): on a broadcast
//! transport every peer sees every request and only the addressed one
//! answers.

use crate::domain::MethodDefinition;
use crate::streams::SubscriptionId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_types::{BridgeOperation, Instance, InstanceId, ObjectDecoder, ValueKind};

/// Operation names of the interop domain.
pub mod ops {
    pub const INVOKE: &str = "invoke";
    pub const SUBSCRIBE: &str = "subscribe";
}

/// Notify event names of the interop domain.
pub mod events {
    pub const METHOD_ADDED: &str = "method-added";
    pub const METHOD_REMOVED: &str = "method-removed";
    pub const HELLO: &str = "hello";
    pub const METHODS_SNAPSHOT: &str = "methods-snapshot";
    pub const STREAM_DATA: &str = "stream-data";
    pub const STREAM_CLOSED: &str = "stream-closed";
    pub const STREAM_UNSUBSCRIBE: &str = "stream-unsubscribe";
}

/// `invoke` request payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeRequest {
    /// The instance that should execute the method.
    pub target: InstanceId,
    pub method: String,
    #[serde(default)]
    pub args: Value,
    /// The invoking peer, passed through to the handler.
    pub caller: Instance,
}

/// `subscribe` request payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    /// The stream-owning instance.
    pub target: InstanceId,
    pub method: String,
    /// Allocated by the subscriber; stream data is routed by it.
    pub subscription_id: SubscriptionId,
    #[serde(default)]
    pub arguments: Value,
    pub subscriber: Instance,
}

/// `subscribe` success payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeReply {
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_key: Option<String>,
}

/// `method-added` notify payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodAnnouncement {
    pub instance: Instance,
    pub method: MethodDefinition,
}

/// `method-removed` notify payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodRemoval {
    pub instance_id: InstanceId,
    pub method: String,
}

/// `hello` / `methods-snapshot` notify payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySnapshot {
    pub instance: Instance,
    #[serde(default)]
    pub methods: Vec<MethodDefinition>,
}

/// `stream-data` notify payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamData {
    pub subscription_id: SubscriptionId,
    #[serde(default)]
    pub data: Value,
}

/// `stream-closed` notify payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamClosed {
    pub subscription_id: SubscriptionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// `stream-unsubscribe` notify payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamUnsubscribe {
    pub subscription_id: SubscriptionId,
}

/// Send-side definition of the `invoke` operation.
#[must_use]
pub fn invoke_operation() -> BridgeOperation {
    BridgeOperation::new(ops::INVOKE).accepts(
        ObjectDecoder::new()
            .required("target", ValueKind::String)
            .required("method", ValueKind::String)
            .required("caller", ValueKind::Object)
            .optional("args", ValueKind::Any)
            .shared(),
    )
}

/// Send-side definition of the `subscribe` operation.
#[must_use]
pub fn subscribe_operation() -> BridgeOperation {
    BridgeOperation::new(ops::SUBSCRIBE)
        .accepts(
            ObjectDecoder::new()
                .required("target", ValueKind::String)
                .required("method", ValueKind::String)
                .required("subscriptionId", ValueKind::String)
                .required("subscriber", ValueKind::Object)
                .optional("arguments", ValueKind::Any)
                .shared(),
        )
        .returns(
            ObjectDecoder::new()
                .required("accepted", ValueKind::Bool)
                .optional("branchKey", ValueKind::String)
                .shared(),
        )
}
