//! # Library Controller Contract
//!
//! Every domain module (interop, contexts, channels, workspaces, …) plugs
//! into the platform through this trait: `start(config)` once during
//! platform startup, then `handle_control(args)` for every inbound domain
//! request, uniformly decoded and dispatched.

use crate::decoder::DecodeError;
use crate::entities::Instance;
use crate::envelope::{error_codes, CommandId, WireError};
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Errors produced by controllers and the operation dispatch around them.
#[derive(Debug, Clone, Error)]
pub enum ControllerError {
    /// The controller has no operation with this name.
    #[error("domain '{domain}' has no operation '{operation}'")]
    OperationNotFound { domain: String, operation: String },

    /// Inbound or outbound payload failed schema validation.
    #[error(transparent)]
    Validation(#[from] DecodeError),

    /// Domain-specific failure carrying its own wire code.
    #[error("[{code}] {message}")]
    Domain { code: String, message: String },

    /// The operation handler itself failed.
    #[error("operation failed: {0}")]
    Execution(String),

    /// The controller is registered but cannot serve requests.
    #[error("controller '{domain}' unavailable: {reason}")]
    Unavailable { domain: String, reason: String },

    /// The operation deliberately produces no response.
    ///
    /// Used when a request is not addressed to this peer (broadcast
    /// transport) or when a protocol violation must surface as the
    /// caller's timeout rather than an answer.
    #[error("no response")]
    NoResponse,
}

impl ControllerError {
    /// Domain-specific error with an explicit wire code.
    pub fn domain(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Domain {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Convert into the wire representation for a response envelope.
    #[must_use]
    pub fn to_wire(&self) -> WireError {
        match self {
            Self::OperationNotFound { .. } => {
                WireError::new(error_codes::OPERATION_NOT_FOUND, self.to_string())
            }
            Self::Validation(err) => WireError::new(error_codes::VALIDATION, err.to_string())
                .with_details(serde_json::json!({ "path": err.path })),
            Self::Domain { code, message } => WireError::new(code.clone(), message.clone()),
            Self::Execution(_) => WireError::new(error_codes::EXECUTION, self.to_string()),
            Self::Unavailable { .. } => WireError::new(error_codes::UNAVAILABLE, self.to_string()),
            Self::NoResponse => WireError::new(error_codes::EXECUTION, "no response"),
        }
    }
}

/// Arguments of one inbound control call.
#[derive(Debug, Clone)]
pub struct ControlArgs {
    /// Domain the request was addressed to.
    pub domain: String,
    /// Operation name within the domain.
    pub operation: String,
    /// Raw (not yet validated) payload.
    pub data: Value,
    /// Identity of the calling peer, when known.
    pub caller: Option<Instance>,
    /// Correlation id of the underlying request, when one exists.
    pub command_id: Option<CommandId>,
}

/// Per-controller slice of the resolved platform configuration.
#[derive(Debug, Clone, Default)]
pub struct ControllerConfig {
    /// Domain-specific settings, already layered (call-site > remote > defaults).
    pub settings: Value,
    /// Environment name the platform resolved at startup.
    pub environment: String,
}

/// Lifecycle status of a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerStatus {
    /// Not yet started.
    Stopped,
    /// `start` is in progress.
    Starting,
    /// Serving requests.
    Running,
    /// Soft-optional controller that disabled itself.
    Disabled,
    /// Startup or runtime failure.
    Failed,
}

/// The contract every domain module implements.
#[async_trait]
pub trait LibController: Send + Sync {
    /// Domain this controller serves (unique per platform).
    fn domain(&self) -> &'static str;

    /// Current lifecycle status.
    fn status(&self) -> ControllerStatus {
        ControllerStatus::Running
    }

    /// Start the controller. Called once, in platform dependency order.
    async fn start(&self, config: &ControllerConfig) -> Result<(), ControllerError>;

    /// Serve one control call: look up the operation, decode, execute,
    /// validate the result, return it.
    async fn handle_control(&self, args: ControlArgs) -> Result<Value, ControllerError>;

    /// A peer window went away; release anything held on its behalf.
    async fn handle_client_unloaded(&self, window_id: &str) {
        let _ = window_id;
    }
}
