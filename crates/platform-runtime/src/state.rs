//! # Platform Lifecycle State
//!
//! The `NotStarted → Starting → Started` state machine (terminal once
//! started) and the process-scoped `StartRegistry` that enforces at most
//! one platform per window. The registry is an explicit, injected object
//! rather than a global flag, so tests and embedders control its scope.

use crate::config::ConfigError;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use wm_02_bridge::BridgeError;

/// Platform startup and lifecycle errors.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// A platform already started (or is starting) for this window.
    #[error("platform already started for window '{window_id}'")]
    AlreadyStarted { window_id: String },

    /// Configuration or plugin validation failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The transport never reported a login.
    #[error("transport did not log in within the init window")]
    LoginTimeout,

    /// A required controller failed to start; the platform aborts.
    #[error("controller '{domain}' failed to start: {message}")]
    ControllerFailed { domain: String, message: String },

    /// A required controller did not start within the init window.
    #[error("controller '{domain}' start timed out")]
    StartupTimeout { domain: String },

    /// A critical plugin failed.
    #[error("plugin '{plugin}' failed: {message}")]
    PluginFailed { plugin: String, message: String },

    /// The bridge refused to start.
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

/// Lifecycle of one platform instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformState {
    NotStarted,
    Starting,
    Started,
}

/// Guarded state transitions; `Started` is terminal.
pub(crate) struct StateMachine {
    state: Mutex<PlatformState>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PlatformState::NotStarted),
        }
    }

    /// `NotStarted → Starting`; any other state is a re-entry error.
    pub fn begin(&self, window_id: &str) -> Result<(), PlatformError> {
        let mut state = self.state.lock();
        match *state {
            PlatformState::NotStarted => {
                *state = PlatformState::Starting;
                Ok(())
            }
            _ => Err(PlatformError::AlreadyStarted {
                window_id: window_id.to_string(),
            }),
        }
    }

    /// `Starting → Started`.
    pub fn complete(&self) {
        *self.state.lock() = PlatformState::Started;
    }

    /// Failed startup returns to `NotStarted` so a retry is possible.
    pub fn abort(&self) {
        *self.state.lock() = PlatformState::NotStarted;
    }

    pub fn current(&self) -> PlatformState {
        *self.state.lock()
    }
}

/// Process-scoped ledger of started windows.
pub struct StartRegistry {
    started: Mutex<HashSet<String>>,
}

impl StartRegistry {
    /// Create a registry; share one per process.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            started: Mutex::new(HashSet::new()),
        })
    }

    /// Claim a window. The second claim for the same window fails
    /// without disturbing the first.
    pub fn acquire(&self, window_id: &str) -> Result<(), PlatformError> {
        let mut started = self.started.lock();
        if !started.insert(window_id.to_string()) {
            return Err(PlatformError::AlreadyStarted {
                window_id: window_id.to_string(),
            });
        }
        Ok(())
    }

    /// Give a window back after a failed startup.
    pub fn release(&self, window_id: &str) {
        self.started.lock().remove(window_id);
    }

    /// Whether a window holds a claim.
    #[must_use]
    pub fn is_started(&self, window_id: &str) -> bool {
        self.started.lock().contains(window_id)
    }
}
