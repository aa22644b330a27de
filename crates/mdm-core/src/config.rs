use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::discovery::ScanStrategy;
use crate::resolver::ResolveStrategy;

/// Browser-like identity sent with every request.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Which downloader drives a submitted URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Discovery → resolution → encoder / direct download.
    #[default]
    Pipeline,
    /// Hand the page URL to yt-dlp.
    Ytdlp,
}

/// Global configuration loaded from `~/.config/mdm/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MdmConfig {
    /// Output directory. When unset, the server uses `./downloads` and the CLI the current dir.
    #[serde(default)]
    pub download_dir: Option<PathBuf>,
    /// Listen address of the HTTP service.
    pub bind_addr: String,
    /// User-Agent header for page, subtitle and media requests.
    pub user_agent: String,
    /// Connect timeout applied to every request.
    pub connect_timeout_secs: u64,
    /// Total timeout for page and subtitle fetches.
    pub page_timeout_secs: u64,
    /// Total timeout for streaming media bytes.
    pub media_timeout_secs: u64,
    /// Pages larger than this are treated as fetch failures.
    pub max_page_bytes: u64,
    /// Cap on direct media downloads (None = no cap).
    #[serde(default)]
    pub max_filesize_bytes: Option<u64>,
    /// Read buffer size for streamed media bytes (None = library default).
    #[serde(default)]
    pub download_buffer_bytes: Option<usize>,
    /// Path to ffmpeg. When unset, `ffmpeg` is looked up on PATH.
    #[serde(default)]
    pub encoder_path: Option<PathBuf>,
    /// Downloader used for submitted URLs.
    #[serde(default)]
    pub backend: BackendKind,
    /// Path to yt-dlp. When unset, `yt-dlp` is looked up on PATH.
    #[serde(default)]
    pub ytdlp_path: Option<PathBuf>,
    /// Ordered scanner strategies; if missing, built-in order is used.
    #[serde(default)]
    pub scan_strategies: Option<Vec<ScanStrategy>>,
    /// Ordered resolver strategies; if missing, built-in order is used.
    #[serde(default)]
    pub resolve_strategies: Option<Vec<ResolveStrategy>>,
}

impl Default for MdmConfig {
    fn default() -> Self {
        Self {
            download_dir: None,
            bind_addr: "127.0.0.1:8000".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            connect_timeout_secs: 15,
            page_timeout_secs: 30,
            media_timeout_secs: 3600,
            max_page_bytes: 5 * 1024 * 1024,
            max_filesize_bytes: Some(50 * 1024 * 1024),
            download_buffer_bytes: Some(8192),
            encoder_path: None,
            backend: BackendKind::Pipeline,
            ytdlp_path: None,
            scan_strategies: None,
            resolve_strategies: None,
        }
    }
}

impl MdmConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }

    pub fn media_timeout(&self) -> Duration {
        Duration::from_secs(self.media_timeout_secs)
    }

    pub fn scan_order(&self) -> Vec<ScanStrategy> {
        self.scan_strategies
            .clone()
            .unwrap_or_else(|| ScanStrategy::DEFAULT_ORDER.to_vec())
    }

    pub fn resolve_order(&self) -> Vec<ResolveStrategy> {
        self.resolve_strategies
            .clone()
            .unwrap_or_else(|| ResolveStrategy::DEFAULT_ORDER.to_vec())
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("mdm")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<MdmConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = MdmConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: MdmConfig = toml::from_str(&data)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        bind_addr = "0.0.0.0:9000"
        user_agent = "test-agent"
        connect_timeout_secs = 5
        page_timeout_secs = 10
        media_timeout_secs = 600
        max_page_bytes = 1024
    "#;

    #[test]
    fn default_config_values() {
        let cfg = MdmConfig::default();
        assert_eq!(cfg.bind_addr, "127.0.0.1:8000");
        assert_eq!(cfg.max_filesize_bytes, Some(50 * 1024 * 1024));
        assert_eq!(cfg.backend, BackendKind::Pipeline);
        assert_eq!(cfg.scan_order(), ScanStrategy::DEFAULT_ORDER.to_vec());
        assert_eq!(cfg.resolve_order(), ResolveStrategy::DEFAULT_ORDER.to_vec());
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = MdmConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: MdmConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.bind_addr, cfg.bind_addr);
        assert_eq!(parsed.user_agent, cfg.user_agent);
        assert_eq!(parsed.max_page_bytes, cfg.max_page_bytes);
        assert_eq!(parsed.max_filesize_bytes, cfg.max_filesize_bytes);
    }

    #[test]
    fn config_toml_minimal_uses_defaults_for_optional_sections() {
        let cfg: MdmConfig = toml::from_str(MINIMAL).unwrap();
        assert_eq!(cfg.bind_addr, "0.0.0.0:9000");
        assert_eq!(cfg.page_timeout(), Duration::from_secs(10));
        assert!(cfg.download_dir.is_none());
        assert!(cfg.encoder_path.is_none());
        assert!(cfg.max_filesize_bytes.is_none());
        assert_eq!(cfg.backend, BackendKind::Pipeline);
    }

    #[test]
    fn config_toml_backend_and_strategy_order() {
        let toml = format!(
            "{MINIMAL}\nbackend = \"ytdlp\"\nscan_strategies = [\"raw-html\", \"dom-elements\"]\nresolve_strategies = [\"query-parameter\"]\n"
        );
        let cfg: MdmConfig = toml::from_str(&toml).unwrap();
        assert_eq!(cfg.backend, BackendKind::Ytdlp);
        assert_eq!(
            cfg.scan_order(),
            vec![ScanStrategy::RawHtml, ScanStrategy::DomElements]
        );
        assert_eq!(cfg.resolve_order(), vec![ResolveStrategy::QueryParameter]);
    }
}
