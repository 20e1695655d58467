//! # Workspaces Controller
//!
//! Frame registration and workspace/layout bookkeeping. Pure in-memory
//! model: the visual tiling lives in the frame application; the core only
//! tracks which frames exist and which workspaces they host.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared_types::{
    error_codes, BridgeOperation, ControlArgs, ControllerConfig, ControllerError,
    ControllerStatus, LibController, ObjectDecoder, OperationRegistry, ValueKind,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::WorkspaceSettings;

/// Domain name.
pub const DOMAIN: &str = "workspaces";

/// One registered frame window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameRecord {
    pub frame_id: String,
    pub window_id: String,
}

/// One workspace inside a frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceRecord {
    pub id: u64,
    pub name: String,
    pub frame_id: String,
    #[serde(default)]
    pub layout: Value,
}

struct Inner {
    frames: RwLock<Vec<FrameRecord>>,
    workspaces: RwLock<Vec<WorkspaceRecord>>,
    max_frames: AtomicU64,
    next_id: AtomicU64,
    status: RwLock<ControllerStatus>,
}

/// Serves frame and workspace bookkeeping.
pub struct WorkspacesController {
    inner: Arc<Inner>,
    operations: OperationRegistry,
}

impl WorkspacesController {
    /// Build the controller.
    #[must_use]
    pub fn new() -> Arc<Self> {
        let inner = Arc::new(Inner {
            frames: RwLock::new(Vec::new()),
            workspaces: RwLock::new(Vec::new()),
            max_frames: AtomicU64::new(8),
            next_id: AtomicU64::new(1),
            status: RwLock::new(ControllerStatus::Stopped),
        });

        let register_inner = Arc::clone(&inner);
        let register_frame = BridgeOperation::new("registerFrame")
            .accepts(
                ObjectDecoder::new()
                    .required("frameId", ValueKind::String)
                    .required("windowId", ValueKind::String)
                    .shared(),
            )
            .handler(move |data, _| {
                let inner = Arc::clone(&register_inner);
                Box::pin(async move {
                    let frame_id = data["frameId"].as_str().unwrap_or_default().to_string();
                    let window_id = data["windowId"].as_str().unwrap_or_default().to_string();

                    let mut frames = inner.frames.write();
                    if frames.iter().any(|frame| frame.frame_id == frame_id) {
                        return Err(ControllerError::domain(
                            error_codes::EXECUTION,
                            format!("frame '{frame_id}' already registered"),
                        ));
                    }
                    let max = inner.max_frames.load(Ordering::Relaxed) as usize;
                    if frames.len() >= max {
                        return Err(ControllerError::domain(
                            error_codes::EXECUTION,
                            format!("frame limit reached ({max})"),
                        ));
                    }
                    frames.push(FrameRecord { frame_id: frame_id.clone(), window_id });
                    Ok(json!({ "registered": frame_id }))
                })
            });

        let frames_inner = Arc::clone(&inner);
        let list_frames = BridgeOperation::new("listFrames").handler(move |_, _| {
            let inner = Arc::clone(&frames_inner);
            Box::pin(async move {
                serde_json::to_value(inner.frames.read().clone())
                    .map_err(|err| ControllerError::Execution(err.to_string()))
            })
        });

        let create_inner = Arc::clone(&inner);
        let create = BridgeOperation::new("createWorkspace")
            .accepts(
                ObjectDecoder::new()
                    .required("name", ValueKind::String)
                    .required("frameId", ValueKind::String)
                    .optional("layout", ValueKind::Object)
                    .shared(),
            )
            .handler(move |data, _| {
                let inner = Arc::clone(&create_inner);
                Box::pin(async move {
                    let frame_id = data["frameId"].as_str().unwrap_or_default().to_string();
                    if !inner.frames.read().iter().any(|frame| frame.frame_id == frame_id) {
                        return Err(ControllerError::domain(
                            error_codes::EXECUTION,
                            format!("unknown frame '{frame_id}'"),
                        ));
                    }

                    let record = WorkspaceRecord {
                        id: inner.next_id.fetch_add(1, Ordering::Relaxed),
                        name: data["name"].as_str().unwrap_or_default().to_string(),
                        frame_id,
                        layout: data.get("layout").cloned().unwrap_or(Value::Null),
                    };
                    inner.workspaces.write().push(record.clone());
                    Ok(json!({ "id": record.id }))
                })
            });

        let list_inner = Arc::clone(&inner);
        let get_workspaces = BridgeOperation::new("getWorkspaces").handler(move |_, _| {
            let inner = Arc::clone(&list_inner);
            Box::pin(async move {
                serde_json::to_value(inner.workspaces.read().clone())
                    .map_err(|err| ControllerError::Execution(err.to_string()))
            })
        });

        let close_inner = Arc::clone(&inner);
        let close = BridgeOperation::new("closeWorkspace")
            .accepts(ObjectDecoder::new().required("id", ValueKind::Number).shared())
            .handler(move |data, _| {
                let inner = Arc::clone(&close_inner);
                Box::pin(async move {
                    let id = data["id"].as_u64().unwrap_or_default();
                    let mut workspaces = inner.workspaces.write();
                    let before = workspaces.len();
                    workspaces.retain(|workspace| workspace.id != id);
                    if workspaces.len() == before {
                        return Err(ControllerError::domain(
                            error_codes::EXECUTION,
                            format!("unknown workspace {id}"),
                        ));
                    }
                    Ok(json!({ "closed": id }))
                })
            });

        Arc::new(Self {
            inner,
            operations: OperationRegistry::new(DOMAIN)
                .with(register_frame)
                .with(list_frames)
                .with(create)
                .with(get_workspaces)
                .with(close),
        })
    }
}

#[async_trait]
impl LibController for WorkspacesController {
    fn domain(&self) -> &'static str {
        DOMAIN
    }

    fn status(&self) -> ControllerStatus {
        *self.inner.status.read()
    }

    async fn start(&self, config: &ControllerConfig) -> Result<(), ControllerError> {
        let settings: WorkspaceSettings = serde_json::from_value(config.settings.clone())
            .map_err(|err| ControllerError::Execution(format!("bad workspace settings: {err}")))?;

        self.inner
            .max_frames
            .store(settings.max_frames as u64, Ordering::Relaxed);
        *self.inner.status.write() = ControllerStatus::Running;
        info!(max_frames = settings.max_frames, "Workspaces controller started");
        Ok(())
    }

    async fn handle_control(&self, args: ControlArgs) -> Result<Value, ControllerError> {
        if *self.inner.status.read() != ControllerStatus::Running {
            return Err(ControllerError::Unavailable {
                domain: DOMAIN.to_string(),
                reason: "not started".to_string(),
            });
        }
        self.operations.handle(args).await
    }

    async fn handle_client_unloaded(&self, window_id: &str) {
        let removed_frames: Vec<String> = {
            let mut frames = self.inner.frames.write();
            let removed = frames
                .iter()
                .filter(|frame| frame.window_id == window_id)
                .map(|frame| frame.frame_id.clone())
                .collect::<Vec<_>>();
            frames.retain(|frame| frame.window_id != window_id);
            removed
        };

        if !removed_frames.is_empty() {
            self.inner
                .workspaces
                .write()
                .retain(|workspace| !removed_frames.contains(&workspace.frame_id));
            debug!(window = window_id, frames = removed_frames.len(), "Dropped frames of unloaded window");
        }
    }
}
