//! The default download backend: discovery → resolution → download.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::{BackendKind, MdmConfig};
use crate::discovery::{discover, CandidateScanner};
use crate::encoder::{Encoder, FfmpegEncoder};
use crate::error::PipelineError;
use crate::fetch::{CurlFetcher, FetchOptions, Fetcher};
use crate::orchestrator::DownloadOrchestrator;
use crate::progress::ProgressSink;
use crate::resolver::StreamResolver;
use crate::ytdlp::YtDlpDownloader;

/// Files produced by one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub outputs: Vec<PathBuf>,
    /// Candidates that failed while at least one other may have succeeded.
    pub failures: usize,
}

/// Something that turns a submitted page URL into files in a download directory.
pub trait DownloadBackend: Send + Sync {
    fn name(&self) -> &str;

    fn download_dir(&self) -> &Path;

    /// Blocking; runs on a worker thread. `Ok` means at least one file was written.
    fn run(&self, url: &str, progress: &dyn ProgressSink) -> Result<RunSummary, PipelineError>;
}

pub struct Pipeline {
    fetcher: Arc<dyn Fetcher>,
    scanner: CandidateScanner,
    orchestrator: DownloadOrchestrator,
    download_dir: PathBuf,
}

impl Pipeline {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        scanner: CandidateScanner,
        orchestrator: DownloadOrchestrator,
        download_dir: PathBuf,
    ) -> Self {
        tracing::debug!(
            scan = ?scanner.strategies(),
            resolve = ?orchestrator.resolver().strategies(),
            "strategy order"
        );
        Self {
            fetcher,
            scanner,
            orchestrator,
            download_dir,
        }
    }

    /// Wires the curl fetcher and the given encoder per `cfg`.
    pub fn with_encoder(cfg: &MdmConfig, encoder: Arc<dyn Encoder>, download_dir: PathBuf) -> Self {
        let fetcher: Arc<dyn Fetcher> = Arc::new(CurlFetcher::new(FetchOptions::from_config(cfg)));
        let resolver = StreamResolver::new(fetcher.clone(), cfg.resolve_order());
        let orchestrator = DownloadOrchestrator::new(
            fetcher.clone(),
            resolver,
            encoder,
            cfg.max_filesize_bytes,
            cfg.download_buffer_bytes,
        );
        Self::new(fetcher, CandidateScanner::new(cfg.scan_order()), orchestrator, download_dir)
    }

    /// Like [`Pipeline::with_encoder`], locating the encoder binary now.
    pub fn from_config(cfg: &MdmConfig, download_dir: PathBuf) -> Result<Self> {
        let encoder = FfmpegEncoder::locate(cfg.encoder_path.as_deref(), &cfg.user_agent)
            .context("locating the external encoder")?;
        Ok(Self::with_encoder(cfg, Arc::new(encoder), download_dir))
    }
}

impl DownloadBackend for Pipeline {
    fn name(&self) -> &str {
        "pipeline"
    }

    fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    fn run(&self, url: &str, progress: &dyn ProgressSink) -> Result<RunSummary, PipelineError> {
        std::fs::create_dir_all(&self.download_dir).map_err(|e| {
            PipelineError::Backend(format!(
                "cannot create download dir {}: {e}",
                self.download_dir.display()
            ))
        })?;

        let found = discover(self.fetcher.as_ref(), &self.scanner, url)?;
        if found.media.is_empty() {
            return Err(PipelineError::NoMedia);
        }
        let subtitles = found.subtitles.as_slice();

        let mut summary = RunSummary::default();
        let mut last_error = None;
        for candidate in found.media.iter() {
            match self
                .orchestrator
                .process(candidate, subtitles, &self.download_dir, progress)
            {
                Ok(path) => summary.outputs.push(path),
                Err(e) => {
                    tracing::warn!(candidate = %candidate.url, error = %e, "candidate failed");
                    summary.failures += 1;
                    last_error = Some(e.to_string());
                }
            }
        }

        if summary.outputs.is_empty() {
            return Err(PipelineError::NothingDownloaded {
                attempted: summary.failures,
                last_error: last_error.unwrap_or_default(),
            });
        }
        Ok(summary)
    }
}

/// Builds the configured backend, resolving its external tool up front.
pub fn backend_from_config(cfg: &MdmConfig, download_dir: PathBuf) -> Result<Arc<dyn DownloadBackend>> {
    let backend: Arc<dyn DownloadBackend> = match cfg.backend {
        BackendKind::Pipeline => Arc::new(Pipeline::from_config(cfg, download_dir)?),
        BackendKind::Ytdlp => Arc::new(YtDlpDownloader::from_config(cfg, download_dir)?),
    };
    tracing::info!(
        backend = backend.name(),
        download_dir = %backend.download_dir().display(),
        "download backend ready"
    );
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::MockFetcher;
    use crate::orchestrator::testing::{FailingEncoder, FakeEncoder};
    use crate::discovery::ScanStrategy;
    use crate::progress::NoProgress;
    use crate::resolver::ResolveStrategy;

    const PAGE: &str = "https://site.example/watch/1";

    fn pipeline(fetcher: MockFetcher, encoder: Arc<dyn Encoder>, dir: &Path) -> Pipeline {
        let fetcher: Arc<dyn Fetcher> = Arc::new(fetcher);
        let resolver = StreamResolver::with_default_order(fetcher.clone());
        let orchestrator = DownloadOrchestrator::new(fetcher.clone(), resolver, encoder, None, None);
        Pipeline::new(fetcher, CandidateScanner::default(), orchestrator, dir.to_path_buf())
    }

    #[test]
    fn configured_strategy_order_reaches_scanner_and_resolver() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = MdmConfig {
            scan_strategies: Some(vec![ScanStrategy::RawHtml, ScanStrategy::DomElements]),
            resolve_strategies: Some(vec![ResolveStrategy::QueryParameter]),
            ..MdmConfig::default()
        };
        let p = Pipeline::with_encoder(&cfg, Arc::new(FakeEncoder::default()), dir.path().to_path_buf());
        assert_eq!(
            p.scanner.strategies(),
            &[ScanStrategy::RawHtml, ScanStrategy::DomElements]
        );
        assert_eq!(
            p.orchestrator.resolver().strategies(),
            &[ResolveStrategy::QueryParameter]
        );
    }

    #[test]
    fn page_without_media_is_no_media() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(
            MockFetcher::new().with(PAGE, "<html><p>nothing</p></html>"),
            Arc::new(FakeEncoder::default()),
            dir.path(),
        );
        let err = p.run(PAGE, &NoProgress).unwrap_err();
        assert!(matches!(err, PipelineError::NoMedia));
        assert_eq!(err.to_string(), "no media candidates found");
    }

    #[test]
    fn unreachable_page_is_fetch_error() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(MockFetcher::new(), Arc::new(FakeEncoder::default()), dir.path());
        assert!(matches!(p.run(PAGE, &NoProgress), Err(PipelineError::Fetch(_))));
    }

    #[test]
    fn one_good_candidate_is_enough() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = MockFetcher::new()
            .with(
                PAGE,
                r#"<video src="https://cdn.example/gone.mp4"></video>
                   <video src="https://cdn.example/ok.mp4"></video>"#,
            )
            .with("https://cdn.example/ok.mp4", "bytes");
        let p = pipeline(fetcher, Arc::new(FakeEncoder::default()), dir.path());
        let summary = p.run(PAGE, &NoProgress).unwrap();
        assert_eq!(summary.outputs, vec![dir.path().join("ok.mp4")]);
        assert_eq!(summary.failures, 1);
    }

    #[test]
    fn all_candidates_failing_reports_last_error() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = MockFetcher::new().with(PAGE, r#"<video src="/live/a.m3u8"></video>"#);
        let p = pipeline(fetcher, Arc::new(FailingEncoder), dir.path());
        match p.run(PAGE, &NoProgress) {
            Err(PipelineError::NothingDownloaded { attempted, last_error }) => {
                assert_eq!(attempted, 1);
                assert!(last_error.contains("403"), "{last_error}");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
