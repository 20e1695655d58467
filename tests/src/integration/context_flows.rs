//! # Context Flows
//!
//! Context sync, channel pub/sub and ordering guarantees across windows.

#[cfg(test)]
mod tests {
    use crate::integration::fixtures::{settle, start_window};
    use platform_runtime::StartRegistry;
    use serde_json::{json, Value};
    use shared_bus::InMemoryHub;
    use std::time::Duration;
    use tokio::time::timeout;
    use wm_04_contexts::Entries;

    fn entries(value: Value) -> Entries {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn test_subscribe_before_create_across_windows() {
        let hub = InMemoryHub::new();
        let registry = StartRegistry::new();
        let writer = start_window(&hub, &registry, "writer", "wnd-writer").await;
        let reader = start_window(&hub, &registry, "reader", "wnd-reader").await;
        settle().await;

        // Subscribed before any write, on a different window than the writer.
        let mut subscription = reader.platform.contexts().subscribe("Portfolio");

        writer
            .platform
            .contexts()
            .update("Portfolio", json!({ "positions": 3 }))
            .unwrap();

        let event = timeout(Duration::from_millis(500), subscription.recv())
            .await
            .expect("timeout")
            .expect("event");
        assert_eq!(event.context, "Portfolio");
        assert_eq!(event.delta.added, entries(json!({ "positions": 3 })));
    }

    #[tokio::test]
    async fn test_mirrors_converge_after_update_and_set() {
        let hub = InMemoryHub::new();
        let registry = StartRegistry::new();
        let writer = start_window(&hub, &registry, "writer", "wnd-writer").await;
        let reader = start_window(&hub, &registry, "reader", "wnd-reader").await;
        settle().await;

        writer.platform.contexts().update("X", json!({ "a": 1 })).unwrap();
        writer.platform.contexts().update("X", json!({ "b": 2 })).unwrap();
        writer.platform.contexts().set("X", json!({ "b": 2 })).unwrap();
        settle().await;

        assert_eq!(reader.platform.contexts().get("X").unwrap(), json!({ "b": 2 }));
        assert!(reader.platform.contexts().all().contains(&"X".to_string()));
    }

    #[tokio::test]
    async fn test_channel_publish_reaches_other_window() {
        let hub = InMemoryHub::new();
        let registry = StartRegistry::new();
        let publisher = start_window(&hub, &registry, "publisher", "wnd-pub").await;
        let observer = start_window(&hub, &registry, "observer", "wnd-obs").await;
        settle().await;

        // The observer watches the Red channel's backing context.
        let mut red = observer
            .platform
            .contexts()
            .subscribe("___channel___Red");

        publisher
            .platform
            .control("channels", "join", json!({ "name": "Red" }))
            .await
            .unwrap();
        publisher
            .platform
            .control("channels", "publish", json!({ "data": { "client": "acme" } }))
            .await
            .unwrap();

        // Skip deltas until the published data arrives (channel seeding
        // may interleave).
        let event = loop {
            let event = timeout(Duration::from_millis(500), red.recv())
                .await
                .expect("timeout")
                .expect("event");
            if event.entries.contains_key("data") {
                break event;
            }
        };
        assert_eq!(event.entries["data"]["client"], "acme");
    }

    #[tokio::test]
    async fn test_single_writer_ordering_across_windows() {
        let hub = InMemoryHub::new();
        let registry = StartRegistry::new();
        let writer = start_window(&hub, &registry, "writer", "wnd-writer").await;
        let reader = start_window(&hub, &registry, "reader", "wnd-reader").await;
        settle().await;

        let mut subscription = reader.platform.contexts().subscribe("Ticker");
        for i in 0..25 {
            writer
                .platform
                .contexts()
                .set("Ticker", json!({ "seq": i }))
                .unwrap();
        }

        for i in 0..25 {
            let event = timeout(Duration::from_millis(500), subscription.recv())
                .await
                .expect("timeout")
                .expect("event");
            assert_eq!(event.entries["seq"], json!(i), "deltas must apply in issue order");
        }
    }

    #[tokio::test]
    async fn test_late_window_sees_existing_contexts() {
        let hub = InMemoryHub::new();
        let registry = StartRegistry::new();
        let writer = start_window(&hub, &registry, "writer", "wnd-writer").await;
        writer
            .platform
            .contexts()
            .set("Layout", json!({ "cols": 2 }))
            .unwrap();
        settle().await;

        let late = start_window(&hub, &registry, "late", "wnd-late").await;
        settle().await;

        assert_eq!(late.platform.contexts().get("Layout").unwrap(), json!({ "cols": 2 }));
    }
}
