//! `mdm serve` – run the HTTP service.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use mdm_core::config::MdmConfig;
use mdm_core::pipeline::backend_from_config;
use mdm_server::AppState;

/// Default output directory of the service when none is configured.
const DEFAULT_SERVE_DIR: &str = "downloads";

pub async fn run_serve(
    cfg: &MdmConfig,
    bind: Option<String>,
    download_dir: Option<PathBuf>,
) -> Result<()> {
    let bind = bind.unwrap_or_else(|| cfg.bind_addr.clone());
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid listen address {bind:?}"))?;
    let download_dir = download_dir
        .or_else(|| cfg.download_dir.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SERVE_DIR));

    let backend = backend_from_config(cfg, download_dir)?;
    println!("Serving on http://{addr} (Ctrl+C to stop)");
    mdm_server::serve(AppState::new(backend), addr).await
}
