//! # Platform Configuration
//!
//! Typed settings per controller domain, resolved once at startup by
//! layering: explicit call-site config > remotely-fetched defaults >
//! built-in defaults. The launch shape is a tagged enum decided at
//! configuration-build time, with no runtime shape probing.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_types::ControllerConfig;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// The layered configuration did not deserialize.
    #[error("invalid platform configuration: {0}")]
    Invalid(String),

    /// One or more plugin definitions are unusable. Every offender is
    /// listed, not just the first.
    #[error("invalid plugin definitions (missing start): {}", plugins.join(", "))]
    InvalidPlugins { plugins: Vec<String> },
}

/// How this window was launched; resolved once, never re-probed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum LaunchMode {
    /// Plain browser window, no platform host.
    Browser,
    /// Hosted by a desktop platform shell.
    Desktop,
    /// Same-process peer (tests, demos).
    #[default]
    Inprocess,
}

/// Window management settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WindowSettings {
    pub default_width: u32,
    pub default_height: u32,
    pub allow_popups: bool,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            default_width: 800,
            default_height: 600,
            allow_popups: true,
        }
    }
}

/// One named channel with its display color.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelDefinition {
    pub name: String,
    pub color: String,
}

/// Channel controller settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChannelSettings {
    pub definitions: Vec<ChannelDefinition>,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        let definitions = [
            ("Red", "#ff3b30"),
            ("Green", "#34c759"),
            ("Blue", "#007aff"),
            ("Yellow", "#ffcc00"),
            ("Orange", "#ff9500"),
            ("Purple", "#af52de"),
        ]
        .into_iter()
        .map(|(name, color)| ChannelDefinition {
            name: name.to_string(),
            color: color.to_string(),
        })
        .collect();
        Self { definitions }
    }
}

/// Notification controller settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NotificationSettings {
    pub enabled: bool,
    pub max_retained: usize,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retained: 100,
        }
    }
}

/// Workspace controller settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WorkspaceSettings {
    pub max_frames: usize,
}

impl Default for WorkspaceSettings {
    fn default() -> Self {
        Self { max_frames: 8 }
    }
}

/// Extension controller settings (soft-optional domain).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct ExtensionSettings {
    pub enabled: bool,
    /// Whether the hosting platform can run the extension at all.
    pub platform_supported: bool,
}

/// The resolved platform configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlatformConfig {
    pub environment: String,
    pub launch: LaunchMode,
    pub windows: WindowSettings,
    pub channels: ChannelSettings,
    pub notifications: NotificationSettings,
    pub workspaces: WorkspaceSettings,
    pub extension: ExtensionSettings,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            environment: "local".to_string(),
            launch: LaunchMode::default(),
            windows: WindowSettings::default(),
            channels: ChannelSettings::default(),
            notifications: NotificationSettings::default(),
            workspaces: WorkspaceSettings::default(),
            extension: ExtensionSettings::default(),
        }
    }
}

impl PlatformConfig {
    /// Layer call-site config over remote defaults over built-ins.
    pub fn resolve(user: Option<Value>, remote: Option<Value>) -> Result<Self, ConfigError> {
        let mut layered = serde_json::to_value(Self::default())
            .map_err(|err| ConfigError::Invalid(err.to_string()))?;
        if let Some(remote) = remote {
            deep_merge(&mut layered, &remote);
        }
        if let Some(user) = user {
            deep_merge(&mut layered, &user);
        }
        serde_json::from_value(layered).map_err(|err| ConfigError::Invalid(err.to_string()))
    }

    /// The per-domain slice handed to a controller's `start`.
    #[must_use]
    pub fn controller_config(&self, domain: &str) -> ControllerConfig {
        let settings = match domain {
            "system" => serde_json::to_value(self).unwrap_or(Value::Null),
            "channels" => serde_json::to_value(&self.channels).unwrap_or(Value::Null),
            "notifications" => serde_json::to_value(&self.notifications).unwrap_or(Value::Null),
            "workspaces" => serde_json::to_value(&self.workspaces).unwrap_or(Value::Null),
            "extension" => serde_json::to_value(&self.extension).unwrap_or(Value::Null),
            _ => Value::Null,
        };
        ControllerConfig {
            settings,
            environment: self.environment.clone(),
        }
    }
}

/// Recursive object merge: overlay keys win, objects merge, everything
/// else replaces.
fn deep_merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(slot) => deep_merge(slot, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

/// Future returned by a plugin's start function.
pub type PluginFuture = futures::future::BoxFuture<'static, Result<(), String>>;

/// Start function of one plugin.
pub type PluginStartFn = Arc<dyn Fn() -> PluginFuture + Send + Sync>;

/// A user-supplied plugin definition.
///
/// `start` is optional only so that malformed definitions can be
/// reported in aggregate; a `None` fails validation.
#[derive(Clone)]
pub struct PluginDef {
    pub name: String,
    pub start: Option<PluginStartFn>,
    /// Critical plugins abort platform startup on failure.
    pub critical: bool,
}

impl fmt::Debug for PluginDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDef")
            .field("name", &self.name)
            .field("has_start", &self.start.is_some())
            .field("critical", &self.critical)
            .finish()
    }
}

/// Validate every plugin definition eagerly; all offenders reported.
pub fn validate_plugins(plugins: &[PluginDef]) -> Result<(), ConfigError> {
    let offenders: Vec<String> = plugins
        .iter()
        .filter(|plugin| plugin.start.is_none())
        .map(|plugin| plugin.name.clone())
        .collect();

    if offenders.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::InvalidPlugins { plugins: offenders })
    }
}
