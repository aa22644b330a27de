//! Route handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::{Form, Json};
use serde::{Deserialize, Serialize};

use mdm_core::registry::{task_id_for, DownloadTask, TaskId, TaskUpdate};
use mdm_core::storage::{list_downloads, StoredFile};
use mdm_core::task::{execute, TaskContext};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct DownloadForm {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Submitted {
    pub task_id: TaskId,
}

#[derive(Debug, Serialize)]
pub struct Listing {
    pub videos: Vec<StoredFile>,
}

/// `POST /download`: registers the task and starts it on a blocking worker.
pub async fn submit_download(
    State(state): State<AppState>,
    Form(form): Form<DownloadForm>,
) -> ApiResult<Json<Submitted>> {
    let url = form.url.trim().to_string();
    if url.is_empty() {
        return Err(ApiError::bad_request("form field `url` is required"));
    }
    let task_id = task_id_for(&url);
    state.registry.create(&task_id);
    tracing::info!(task_id = %task_id, url = %url, "download submitted");

    spawn_worker(&state, task_id.clone(), url);

    Ok(Json(Submitted { task_id }))
}

/// Runs the task on a blocking thread. A worker that dies without reaching a
/// terminal state (a panic) is recorded as failed so pollers never hang.
fn spawn_worker(state: &AppState, task_id: TaskId, url: String) {
    let ctx = TaskContext::new(task_id, Arc::clone(&state.registry));
    let backend = Arc::clone(&state.backend);
    let registry = Arc::clone(&ctx.registry);
    let id = ctx.id.clone();
    let worker = tokio::task::spawn_blocking(move || execute(backend.as_ref(), &ctx, &url));
    tokio::spawn(async move {
        if let Err(e) = worker.await {
            tracing::error!(task_id = %id, error = %e, "download worker died");
            registry.update(&id, TaskUpdate::Failed(format!("download worker died: {e}")));
        }
    });
}

/// `GET /status/{task_id}`: current snapshot, `pending` for unknown ids.
pub async fn task_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Json<DownloadTask> {
    Json(state.registry.get(&task_id))
}

/// `GET /`: finished files in the download directory.
pub async fn list_files(State(state): State<AppState>) -> ApiResult<Json<Listing>> {
    let dir = state.backend.download_dir().to_path_buf();
    let videos = tokio::task::spawn_blocking(move || match list_downloads(&dir) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        other => other,
    })
    .await
    .map_err(ApiError::internal)?
    .map_err(ApiError::internal)?;
    Ok(Json(Listing { videos }))
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy" }))
}
