//! # Bridge Operations
//!
//! A `BridgeOperation` is the uniform per-operation contract a controller
//! exposes: a name, optional request/response decoders, and an execute
//! function. `OperationRegistry` implements the dispatch every controller
//! shares: look up by name, validate inbound, execute, validate outbound.

use crate::controller::{ControlArgs, ControllerError};
use crate::decoder::DynDecoder;
use crate::entities::Instance;
use crate::envelope::CommandId;
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Context handed to an operation's execute function.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    /// Identity of the calling peer, when known.
    pub caller: Option<Instance>,
    /// Correlation id of the underlying request, when one exists.
    pub command_id: Option<CommandId>,
}

/// Boxed future returned by operation handlers.
pub type ExecuteFuture = BoxFuture<'static, Result<Value, ControllerError>>;

/// Handler of one operation; receives the already-validated payload.
pub type ExecuteFn = Arc<dyn Fn(Value, CallContext) -> ExecuteFuture + Send + Sync>;

/// One operation of a domain controller.
///
/// `execute` is set on the serving side; call sites that only send the
/// operation outward need just the name and decoders.
#[derive(Clone)]
pub struct BridgeOperation {
    /// Operation name, unique within its domain.
    pub name: &'static str,
    /// Validates the request payload, when present.
    pub data_decoder: Option<DynDecoder>,
    /// Validates the result payload, when present.
    pub result_decoder: Option<DynDecoder>,
    /// Serves the operation; `None` for send-only definitions.
    pub execute: Option<ExecuteFn>,
}

impl BridgeOperation {
    /// Start an operation definition.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            data_decoder: None,
            result_decoder: None,
            execute: None,
        }
    }

    /// Validate request payloads with `decoder`.
    #[must_use]
    pub fn accepts(mut self, decoder: DynDecoder) -> Self {
        self.data_decoder = Some(decoder);
        self
    }

    /// Validate result payloads with `decoder`.
    #[must_use]
    pub fn returns(mut self, decoder: DynDecoder) -> Self {
        self.result_decoder = Some(decoder);
        self
    }

    /// Serve the operation with `handler`.
    #[must_use]
    pub fn handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(Value, CallContext) -> ExecuteFuture + Send + Sync + 'static,
    {
        self.execute = Some(Arc::new(handler));
        self
    }
}

impl std::fmt::Debug for BridgeOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeOperation")
            .field("name", &self.name)
            .field("has_data_decoder", &self.data_decoder.is_some())
            .field("has_result_decoder", &self.result_decoder.is_some())
            .field("has_execute", &self.execute.is_some())
            .finish()
    }
}

/// Operation table of one domain controller.
///
/// Controllers build their registry once at construction and route every
/// `handle_control` call through [`OperationRegistry::handle`]; the
/// decode/execute/validate sequence is identical across domains.
#[derive(Clone)]
pub struct OperationRegistry {
    domain: &'static str,
    operations: HashMap<&'static str, BridgeOperation>,
}

impl OperationRegistry {
    /// Create an empty registry for a domain.
    #[must_use]
    pub fn new(domain: &'static str) -> Self {
        Self {
            domain,
            operations: HashMap::new(),
        }
    }

    /// Add an operation. Last registration wins for duplicate names.
    #[must_use]
    pub fn with(mut self, operation: BridgeOperation) -> Self {
        self.operations.insert(operation.name, operation);
        self
    }

    /// The domain this registry serves.
    #[must_use]
    pub fn domain(&self) -> &'static str {
        self.domain
    }

    /// Look up an operation by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&BridgeOperation> {
        self.operations.get(name)
    }

    /// Registered operation names, for diagnostics.
    #[must_use]
    pub fn operation_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.operations.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Uniform control dispatch: look up, decode, execute, validate result.
    pub async fn handle(&self, args: ControlArgs) -> Result<Value, ControllerError> {
        let operation = self.get(&args.operation).ok_or_else(|| {
            ControllerError::OperationNotFound {
                domain: self.domain.to_string(),
                operation: args.operation.clone(),
            }
        })?;

        let data = match &operation.data_decoder {
            Some(decoder) => decoder.run(&args.data)?,
            None => args.data.clone(),
        };

        let execute = operation.execute.as_ref().ok_or_else(|| ControllerError::Unavailable {
            domain: self.domain.to_string(),
            reason: format!("operation '{}' is send-only", operation.name),
        })?;

        let context = CallContext {
            caller: args.caller.clone(),
            command_id: args.command_id,
        };
        let result = execute(data, context).await?;

        if let Some(decoder) = &operation.result_decoder {
            decoder.run(&result)?;
        }
        Ok(result)
    }
}

impl std::fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationRegistry")
            .field("domain", &self.domain)
            .field("operations", &self.operation_names())
            .finish()
    }
}
