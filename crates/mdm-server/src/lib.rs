//! HTTP surface: submit a page URL, poll its task, browse and fetch results.

mod error;
mod handlers;

pub use error::{ApiError, ApiResult};
pub use handlers::{DownloadForm, Listing, Submitted};

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use tokio::signal;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use mdm_core::pipeline::DownloadBackend;
use mdm_core::registry::TaskRegistry;

/// Shared by every handler. The registry is the only state workers touch.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<TaskRegistry>,
    pub backend: Arc<dyn DownloadBackend>,
}

impl AppState {
    pub fn new(backend: Arc<dyn DownloadBackend>) -> Self {
        Self {
            registry: Arc::new(TaskRegistry::new()),
            backend,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let files = ServeDir::new(state.backend.download_dir());
    Router::new()
        .route("/", get(handlers::list_files))
        .route("/download", post(handlers::submit_download))
        .route("/status/{task_id}", get(handlers::task_status))
        .route("/health", get(handlers::health))
        .nest_service("/downloads", files)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves until Ctrl+C.
pub async fn serve(state: AppState, addr: SocketAddr) -> Result<()> {
    std::fs::create_dir_all(state.backend.download_dir()).with_context(|| {
        format!(
            "creating download dir {}",
            state.backend.download_dir().display()
        )
    })?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {}", addr))?;
    tracing::info!(%addr, download_dir = %state.backend.download_dir().display(), "listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running HTTP server")?;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to install Ctrl+C handler");
    }
}
