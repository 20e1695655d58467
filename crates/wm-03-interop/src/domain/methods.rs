//! # Method Model
//!
//! Definitions, target selectors and handler types for the interop
//! registry.

use crate::domain::errors::InteropError;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_types::{Instance, InstanceId};
use std::sync::Arc;

/// A method as announced on the bus.
///
/// Unique per instance by `name`; immutable after registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodDefinition {
    /// Method name, unique per owning instance.
    pub name: String,
    /// Signature of accepted arguments, informational.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepts: Option<String>,
    /// Signature of the returned value, informational.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returns: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Domain object types this method works on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub object_types: Vec<String>,
    /// Free-form flags carried with the definition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flags: Option<Value>,
    /// Whether subscribers can attach to this method as a stream.
    #[serde(default)]
    pub supports_streaming: bool,
}

impl MethodDefinition {
    /// A plain request/response method.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            accepts: None,
            returns: None,
            description: None,
            display_name: None,
            object_types: Vec::new(),
            flags: None,
            supports_streaming: false,
        }
    }

    /// Set the human-readable description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the display name.
    #[must_use]
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    /// Set the accepted-arguments signature.
    #[must_use]
    pub fn with_accepts(mut self, accepts: impl Into<String>) -> Self {
        self.accepts = Some(accepts.into());
        self
    }

    /// Set the return signature.
    #[must_use]
    pub fn with_returns(mut self, returns: impl Into<String>) -> Self {
        self.returns = Some(returns.into());
        self
    }

    /// Mark the method as streaming.
    #[must_use]
    pub fn streaming(mut self) -> Self {
        self.supports_streaming = true;
        self
    }
}

/// Who an invocation should reach.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MethodTarget {
    /// The first matching method; deterministic tie-break is
    /// registration order.
    #[default]
    Best,
    /// Every instance offering the method; yields one result per owner.
    All,
    /// The first match among instances passing the filter.
    Filtered(InstanceFilter),
}

/// Narrow candidates to specific instances.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceFilter {
    pub application_name: Option<String>,
    pub instance_id: Option<InstanceId>,
    pub window_id: Option<String>,
}

impl InstanceFilter {
    /// Match by application name.
    #[must_use]
    pub fn application(name: impl Into<String>) -> Self {
        Self {
            application_name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Match one specific instance.
    #[must_use]
    pub fn instance(id: InstanceId) -> Self {
        Self {
            instance_id: Some(id),
            ..Self::default()
        }
    }

    /// Match by window id.
    #[must_use]
    pub fn window(id: impl Into<String>) -> Self {
        Self {
            window_id: Some(id.into()),
            ..Self::default()
        }
    }

    /// Whether `instance` passes every set field.
    #[must_use]
    pub fn matches(&self, instance: &Instance) -> bool {
        if let Some(name) = &self.application_name {
            if &instance.application_name != name {
                return false;
            }
        }
        if let Some(id) = &self.instance_id {
            if &instance.instance_id != id {
                return false;
            }
        }
        if let Some(window) = &self.window_id {
            if &instance.window_id != window {
                return false;
            }
        }
        true
    }
}

/// One owner's outcome of a fan-out invocation.
#[derive(Debug)]
pub struct InvocationResult {
    /// The instance that served (or failed) the call.
    pub instance: Instance,
    /// The handler's result, errors propagated per owner.
    pub result: Result<Value, InteropError>,
}

/// Future returned by a method handler.
pub type HandlerFuture = BoxFuture<'static, Result<Value, String>>;

/// A registered method's handler.
///
/// Receives the invocation arguments and the caller's identity when
/// known; an `Err` propagates to the caller as a handler failure.
pub type MethodHandler = Arc<dyn Fn(Value, Option<Instance>) -> HandlerFuture + Send + Sync>;
