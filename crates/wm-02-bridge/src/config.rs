//! # Bridge Configuration
//!
//! Timeout classes for the three kinds of round trips the platform makes,
//! plus the sweep interval for reaping abandoned commands.

use std::time::Duration;

/// Which timeout window a call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutClass {
    /// Short control calls (invoke, subscribe, context ops).
    Control,
    /// Window open / acknowledge round trips.
    Window,
    /// Full platform or client initialization.
    Init,
}

/// Bridge timing configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Timeout for short control calls.
    pub control_timeout: Duration,
    /// Timeout for window open/acknowledge calls.
    pub window_timeout: Duration,
    /// Timeout for platform/client initialization.
    pub init_timeout: Duration,
    /// Interval of the abandoned-command sweep.
    pub sweep_interval: Duration,
}

impl BridgeConfig {
    /// The timeout for a given class of call.
    #[must_use]
    pub fn timeout_for(&self, class: TimeoutClass) -> Duration {
        match class {
            TimeoutClass::Control => self.control_timeout,
            TimeoutClass::Window => self.window_timeout,
            TimeoutClass::Init => self.init_timeout,
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            control_timeout: Duration::from_millis(3000),
            window_timeout: Duration::from_millis(10_000),
            init_timeout: Duration::from_millis(30_000),
            sweep_interval: Duration::from_millis(5000),
        }
    }
}
