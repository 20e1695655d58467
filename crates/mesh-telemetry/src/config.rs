//! # Telemetry Configuration

/// How log events are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable terminal output.
    #[default]
    Text,
    /// One JSON object per event, for log shippers.
    Json,
}

/// Telemetry configuration.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Level filter in tracing env-filter syntax.
    pub level: String,
    /// Event formatting.
    pub format: LogFormat,
}

impl TelemetryConfig {
    /// Read configuration from `MESH_LOG_LEVEL` / `MESH_LOG_FORMAT`.
    #[must_use]
    pub fn from_env() -> Self {
        let level = std::env::var("MESH_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let format = match std::env::var("MESH_LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };
        Self { level, format }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}
