//! # Platform Runtime
//!
//! The platform controller of one window: configuration layering,
//! singleton enforcement, the `NotStarted → Starting → Started` state
//! machine, and dependency-ordered startup of the library controllers
//! over the core plumbing (bridge, interop bus, context engine).

pub mod config;
pub mod controllers;
pub mod platform;
pub mod state;

pub use config::{
    ChannelDefinition, ConfigError, ExtensionSettings, LaunchMode, PlatformConfig, PluginDef,
    PluginStartFn,
};
pub use platform::{Platform, PlatformOptions};
pub use state::{PlatformError, PlatformState, StartRegistry};
