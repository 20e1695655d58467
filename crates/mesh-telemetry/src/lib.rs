//! # Mesh Telemetry
//!
//! Tracing initialization for Window-Mesh processes.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mesh_telemetry::{TelemetryConfig, init_telemetry};
//!
//! fn main() {
//!     let _guard = init_telemetry(TelemetryConfig::from_env()).expect("telemetry");
//!     // Platform code runs here; spans and events are emitted.
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable          | Default | Description                         |
//! |-------------------|---------|-------------------------------------|
//! | `MESH_LOG_LEVEL`  | `info`  | Level filter (tracing env-filter)   |
//! | `MESH_LOG_FORMAT` | `text`  | `text` or `json` event formatting   |

mod config;

pub use config::{LogFormat, TelemetryConfig};

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Telemetry initialization errors.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global subscriber is already installed.
    #[error("telemetry already initialized")]
    AlreadyInitialized,
}

/// Held for the lifetime of the process; a marker today, a flush guard
/// once an exporter needs one.
pub struct TelemetryGuard {
    _private: (),
}

/// Install the global tracing subscriber.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = match config.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    installed.map_err(|_| TelemetryError::AlreadyInitialized)?;
    Ok(TelemetryGuard { _private: () })
}
