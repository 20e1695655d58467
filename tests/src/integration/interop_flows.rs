//! # Interop Flows
//!
//! Invocation and streaming across platform windows on one hub.

#[cfg(test)]
mod tests {
    use crate::integration::fixtures::{settle, start_window, AcceptAll, RejectAll};
    use platform_runtime::StartRegistry;
    use serde_json::json;
    use shared_bus::InMemoryHub;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;
    use wm_03_interop::{
        InstanceFilter, InteropError, MethodDefinition, StreamEvent, SubscribeOptions,
    };

    #[tokio::test]
    async fn test_invoke_across_windows() {
        let hub = InMemoryHub::new();
        let registry = StartRegistry::new();
        let shell = start_window(&hub, &registry, "shell", "wnd-shell").await;
        let client = start_window(&hub, &registry, "client", "wnd-client").await;
        settle().await;

        shell
            .platform
            .interop()
            .register(
                MethodDefinition::new("Shell.Version"),
                Arc::new(|_, _| Box::pin(async { Ok(json!({ "version": "0.1.0" })) })),
            )
            .unwrap();
        settle().await;

        let result = client
            .platform
            .interop()
            .invoke("Shell.Version", json!({}))
            .await
            .unwrap();
        assert_eq!(result["version"], "0.1.0");
    }

    #[tokio::test]
    async fn test_caller_identity_reaches_handler() {
        let hub = InMemoryHub::new();
        let registry = StartRegistry::new();
        let shell = start_window(&hub, &registry, "shell", "wnd-shell").await;
        let client = start_window(&hub, &registry, "client", "wnd-client").await;
        settle().await;

        shell
            .platform
            .interop()
            .register(
                MethodDefinition::new("WhoCalled"),
                Arc::new(|_, caller| {
                    Box::pin(async move {
                        Ok(json!({ "caller": caller.map(|c| c.application_name) }))
                    })
                }),
            )
            .unwrap();
        settle().await;

        let result = client
            .platform
            .interop()
            .invoke("WhoCalled", json!({}))
            .await
            .unwrap();
        assert_eq!(result["caller"], "client");
    }

    #[tokio::test]
    async fn test_invoke_filtered_targets_one_owner() {
        let hub = InMemoryHub::new();
        let registry = StartRegistry::new();
        let one = start_window(&hub, &registry, "one", "wnd-one").await;
        let two = start_window(&hub, &registry, "two", "wnd-two").await;
        let caller = start_window(&hub, &registry, "caller", "wnd-caller").await;
        settle().await;

        for (window, tag) in [(&one, "from-one"), (&two, "from-two")] {
            let tag = tag.to_string();
            window
                .platform
                .interop()
                .register(
                    MethodDefinition::new("Tagged"),
                    Arc::new(move |_, _| {
                        let tag = tag.clone();
                        Box::pin(async move { Ok(json!(tag)) })
                    }),
                )
                .unwrap();
        }
        settle().await;

        let result = caller
            .platform
            .interop()
            .invoke_filtered("Tagged", json!({}), InstanceFilter::application("two"))
            .await
            .unwrap();
        assert_eq!(result, json!("from-two"));

        let all = caller
            .platform
            .interop()
            .invoke_all("Tagged", json!({}))
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|entry| entry.result.is_ok()));
    }

    #[tokio::test]
    async fn test_remote_registry_projections_consistent() {
        let hub = InMemoryHub::new();
        let registry = StartRegistry::new();
        let shell = start_window(&hub, &registry, "shell", "wnd-shell").await;
        let observer = start_window(&hub, &registry, "observer", "wnd-observer").await;
        settle().await;

        shell
            .platform
            .interop()
            .register(
                MethodDefinition::new("Plain"),
                Arc::new(|_, _| Box::pin(async { Ok(json!(null)) })),
            )
            .unwrap();
        let _stream = shell
            .platform
            .interop()
            .create_stream(MethodDefinition::new("Feed"), Arc::new(AcceptAll { branch: None }))
            .unwrap();
        settle().await;

        let shell_id = shell.platform.instance().instance_id;
        let methods = observer.platform.interop().methods_for_instance(&shell_id);
        let streams = observer.platform.interop().streams_for_instance(&shell_id);

        assert_eq!(methods.len(), 2);
        assert_eq!(
            streams.len(),
            methods.iter().filter(|m| m.supports_streaming).count()
        );
        assert_eq!(streams.len(), 1);
    }

    #[tokio::test]
    async fn test_stream_branch_protocol_across_windows() {
        let hub = InMemoryHub::new();
        let registry = StartRegistry::new();
        let shell = start_window(&hub, &registry, "shell", "wnd-shell").await;
        let client = start_window(&hub, &registry, "client", "wnd-client").await;
        settle().await;

        let handle = shell
            .platform
            .interop()
            .create_stream(
                MethodDefinition::new("Prices"),
                Arc::new(AcceptAll { branch: Some("1".to_string()) }),
            )
            .unwrap();
        settle().await;

        let mut feed = client
            .platform
            .interop()
            .subscribe("Prices", SubscribeOptions { arguments: json!({ "symbol": "ACME" }), ..SubscribeOptions::default() })
            .await
            .unwrap();

        assert_eq!(feed.branch_key(), Some("1"));
        let subscriptions = handle.subscriptions();
        assert_eq!(subscriptions.len(), 1);
        assert_eq!(subscriptions[0].branch_key.as_deref(), Some("1"));
        assert_eq!(subscriptions[0].arguments["symbol"], "ACME");

        for tick in 0..3 {
            handle.push(json!({ "tick": tick }), Some("1"));
        }
        for tick in 0..3 {
            let event = timeout(Duration::from_millis(500), feed.recv())
                .await
                .expect("timeout")
                .expect("event");
            assert_eq!(event, StreamEvent::Data(json!({ "tick": tick })));
        }
    }

    #[tokio::test]
    async fn test_rejection_and_unregister_closure() {
        let hub = InMemoryHub::new();
        let registry = StartRegistry::new();
        let shell = start_window(&hub, &registry, "shell", "wnd-shell").await;
        let client = start_window(&hub, &registry, "client", "wnd-client").await;
        settle().await;

        let _vault = shell
            .platform
            .interop()
            .create_stream(MethodDefinition::new("Vault"), Arc::new(RejectAll))
            .unwrap();
        let _feed = shell
            .platform
            .interop()
            .create_stream(MethodDefinition::new("Feed"), Arc::new(AcceptAll { branch: None }))
            .unwrap();
        settle().await;

        let err = client
            .platform
            .interop()
            .subscribe("Vault", SubscribeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, InteropError::SubscriptionRejected { .. }));

        let mut feed = client
            .platform
            .interop()
            .subscribe("Feed", SubscribeOptions::default())
            .await
            .unwrap();

        // Unregistering the stream notifies subscribers before removal.
        shell.platform.interop().unregister("Feed").unwrap();
        let event = timeout(Duration::from_millis(500), feed.recv())
            .await
            .expect("timeout")
            .expect("event");
        assert!(matches!(event, StreamEvent::Closed { .. }));

        settle().await;
        let shell_id = shell.platform.instance().instance_id;
        assert!(client
            .platform
            .interop()
            .streams_for_instance(&shell_id)
            .iter()
            .all(|def| def.name != "Feed"));
    }

    #[tokio::test]
    async fn test_handler_error_is_not_swallowed() {
        let hub = InMemoryHub::new();
        let registry = StartRegistry::new();
        let shell = start_window(&hub, &registry, "shell", "wnd-shell").await;
        let client = start_window(&hub, &registry, "client", "wnd-client").await;
        settle().await;

        shell
            .platform
            .interop()
            .register(
                MethodDefinition::new("Fails"),
                Arc::new(|_, _| Box::pin(async { Err("intentional".to_string()) })),
            )
            .unwrap();
        settle().await;

        let err = client
            .platform
            .interop()
            .invoke("Fails", json!({}))
            .await
            .unwrap_err();
        match err {
            InteropError::HandlerFailed { message, .. } => assert_eq!(message, "intentional"),
            other => panic!("expected HandlerFailed, got {other:?}"),
        }
    }
}
