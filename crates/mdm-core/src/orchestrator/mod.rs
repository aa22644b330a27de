//! Per-candidate download: resolve, then encode a stream or copy an opaque
//! file, then fetch the page's subtitles beside the result.

mod opaque;
mod stream;

pub use stream::SCRATCH_PREFIX;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::discovery::{MediaCandidate, SubtitleCandidate};
use crate::encoder::Encoder;
use crate::error::DownloadError;
use crate::fetch::Fetcher;
use crate::progress::ProgressSink;
use crate::resolver::{Resolution, StreamResolver};
use crate::subtitle::SubtitleFetcher;

pub struct DownloadOrchestrator {
    fetcher: Arc<dyn Fetcher>,
    resolver: StreamResolver,
    encoder: Arc<dyn Encoder>,
    /// Cap for the opaque-file path; `None` disables it.
    max_filesize: Option<u64>,
    buffer_size: Option<usize>,
}

impl DownloadOrchestrator {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        resolver: StreamResolver,
        encoder: Arc<dyn Encoder>,
        max_filesize: Option<u64>,
        buffer_size: Option<usize>,
    ) -> Self {
        Self {
            fetcher,
            resolver,
            encoder,
            max_filesize,
            buffer_size,
        }
    }

    pub fn resolver(&self) -> &StreamResolver {
        &self.resolver
    }

    /// Downloads one candidate into `dest_dir` and returns the video path.
    ///
    /// Subtitles are fetched only after the video succeeded; their failures
    /// are logged and never fail the candidate.
    pub fn process(
        &self,
        candidate: &MediaCandidate,
        subtitles: &[SubtitleCandidate],
        dest_dir: &Path,
        progress: &dyn ProgressSink,
    ) -> Result<PathBuf, DownloadError> {
        let output = match self.resolver.resolve(&candidate.url) {
            Resolution::Stream(stream_url) => stream::download_stream(
                self.encoder.as_ref(),
                &candidate.url,
                &stream_url,
                dest_dir,
                progress,
            )?,
            Resolution::NotFound => opaque::download_file(
                self.fetcher.as_ref(),
                &candidate.url,
                dest_dir,
                self.max_filesize,
                self.buffer_size,
                progress,
            )?,
        };
        tracing::info!(candidate = %candidate.url, output = %output.display(), "download finished");
        if !subtitles.is_empty() {
            SubtitleFetcher::new(self.fetcher.as_ref()).fetch_all(subtitles, &output);
        }
        Ok(output)
    }
}
