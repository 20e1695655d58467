//! # Platform Flows
//!
//! Lifecycle, singleton enforcement and disconnect fan-out across
//! platform windows.

#[cfg(test)]
mod tests {
    use crate::integration::fixtures::{settle, start_window};
    use platform_runtime::{
        Platform, PlatformError, PlatformOptions, PlatformState, StartRegistry,
    };
    use serde_json::{json, Value};
    use shared_bus::{ConnectParams, InMemoryHub, Transport};
    use shared_types::ControllerStatus;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_two_windows_share_one_registry() {
        let hub = InMemoryHub::new();
        let registry = StartRegistry::new();

        let shell = start_window(&hub, &registry, "shell", "wnd-shell").await;
        let client = start_window(&hub, &registry, "client", "wnd-client").await;

        assert_eq!(shell.platform.state(), PlatformState::Started);
        assert_eq!(client.platform.state(), PlatformState::Started);
        assert!(registry.is_started("wnd-shell"));
        assert!(registry.is_started("wnd-client"));
    }

    #[tokio::test]
    async fn test_singleton_per_window_enforced() {
        let hub = InMemoryHub::new();
        let registry = StartRegistry::new();
        let _first = start_window(&hub, &registry, "shell", "wnd-shell").await;

        let connection = Arc::new(hub.connect(ConnectParams {
            application_name: Some("shell".to_string()),
            window_id: Some("wnd-shell".to_string()),
            ..ConnectParams::default()
        }));
        let err = Platform::start(
            connection as Arc<dyn Transport>,
            PlatformOptions::new(Arc::clone(&registry)),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, PlatformError::AlreadyStarted { .. }));
    }

    #[tokio::test]
    async fn test_extension_soft_optional_modes() {
        let hub = InMemoryHub::new();
        let registry = StartRegistry::new();

        // Default configuration: disabled, platform still starts.
        let plain = start_window(&hub, &registry, "plain", "wnd-plain").await;
        assert_eq!(
            plain.platform.controller_status("extension"),
            Some(ControllerStatus::Disabled)
        );

        // Enabled and supported: running.
        let connection = Arc::new(hub.connect(ConnectParams {
            application_name: Some("extended".to_string()),
            window_id: Some("wnd-extended".to_string()),
            ..ConnectParams::default()
        }));
        let mut options = PlatformOptions::new(Arc::clone(&registry));
        options.config = Some(json!({
            "extension": { "enabled": true, "platformSupported": true },
        }));
        let extended = Platform::start(connection as Arc<dyn Transport>, options)
            .await
            .unwrap();
        assert_eq!(
            extended.controller_status("extension"),
            Some(ControllerStatus::Running)
        );
    }

    #[tokio::test]
    async fn test_system_controller_uniform_control_contract() {
        let hub = InMemoryHub::new();
        let registry = StartRegistry::new();
        let shell = start_window(&hub, &registry, "shell", "wnd-shell").await;

        let environment = shell
            .platform
            .control("system", "getEnvironment", Value::Null)
            .await
            .unwrap();
        assert_eq!(environment["environment"], "local");

        let base = shell.platform.control("system", "getBase", Value::Null).await.unwrap();
        assert!(base["windows"]["defaultWidth"].is_number());
    }

    #[tokio::test]
    async fn test_windows_controller_tracks_peers() {
        let hub = InMemoryHub::new();
        let registry = StartRegistry::new();
        let shell = start_window(&hub, &registry, "shell", "wnd-shell").await;
        let _client = start_window(&hub, &registry, "client", "wnd-client").await;
        settle().await;

        let windows = shell.platform.control("windows", "list", Value::Null).await.unwrap();
        assert_eq!(windows.as_array().unwrap().len(), 2);

        let found = shell
            .platform
            .control("windows", "get", json!({ "windowId": "wnd-client" }))
            .await
            .unwrap();
        assert_eq!(found["applicationName"], "client");
    }

    #[tokio::test]
    async fn test_disconnect_fans_out_to_controllers() {
        let hub = InMemoryHub::new();
        let registry = StartRegistry::new();
        let shell = start_window(&hub, &registry, "shell", "wnd-shell").await;
        let client = start_window(&hub, &registry, "client", "wnd-client").await;
        settle().await;

        // The client registers a frame on the shell's workspace controller.
        shell
            .platform
            .control(
                "workspaces",
                "registerFrame",
                json!({ "frameId": "f1", "windowId": "wnd-client" }),
            )
            .await
            .unwrap();

        client.connection.close();
        settle().await;

        // Interop forgot the peer...
        let windows = shell.platform.control("windows", "list", Value::Null).await.unwrap();
        assert_eq!(windows.as_array().unwrap().len(), 1);

        // ...and the workspace controller dropped its frames.
        let frames = shell.platform.control("workspaces", "listFrames", Value::Null).await.unwrap();
        assert!(frames.as_array().unwrap().is_empty());
    }
}
