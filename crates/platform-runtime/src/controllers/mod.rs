//! # Library Controllers
//!
//! The domain modules plugged into the platform through the uniform
//! `start`/`handle_control` contract. Each is boundary-thin: it consumes
//! the core primitives (interop, contexts, bridge notifies) and carries
//! no algorithmic weight of its own.

pub mod channels;
pub mod extension;
pub mod notifications;
pub mod system;
pub mod windows;
pub mod workspaces;

pub use channels::ChannelsController;
pub use extension::ExtensionController;
pub use notifications::NotificationsController;
pub use system::SystemController;
pub use windows::WindowsController;
pub use workspaces::WorkspacesController;
