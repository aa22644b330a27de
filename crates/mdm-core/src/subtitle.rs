//! Subtitle download next to a finished video.

use std::path::{Path, PathBuf};

use crate::discovery::SubtitleCandidate;
use crate::error::DownloadError;
use crate::fetch::Fetcher;

/// `.vtt` when the subtitle URL mentions "vtt" anywhere, `.srt` otherwise.
pub fn subtitle_extension(url: &str) -> &'static str {
    if url.to_ascii_lowercase().contains("vtt") {
        "vtt"
    } else {
        "srt"
    }
}

/// Path of the subtitle file beside `video`: same stem, inferred extension.
pub fn subtitle_path(video: &Path, subtitle_url: &str) -> PathBuf {
    video.with_extension(subtitle_extension(subtitle_url))
}

pub struct SubtitleFetcher<'a> {
    fetcher: &'a dyn Fetcher,
}

impl<'a> SubtitleFetcher<'a> {
    pub fn new(fetcher: &'a dyn Fetcher) -> Self {
        Self { fetcher }
    }

    /// Downloads one subtitle file beside `video` and returns its path.
    pub fn fetch(&self, subtitle: &SubtitleCandidate, video: &Path) -> Result<PathBuf, DownloadError> {
        let body = self.fetcher.fetch_bytes(&subtitle.url)?;
        let path = subtitle_path(video, &subtitle.url);
        std::fs::write(&path, &body).map_err(|e| DownloadError::io("writing", &path, e))?;
        tracing::info!(
            subtitle = %subtitle.url,
            label = %subtitle.label,
            language = %subtitle.language,
            path = %path.display(),
            "saved subtitle"
        );
        Ok(path)
    }

    /// Fetches every subtitle for `video`. Failures are logged and skipped.
    pub fn fetch_all(&self, subtitles: &[SubtitleCandidate], video: &Path) -> Vec<PathBuf> {
        subtitles
            .iter()
            .filter_map(|sub| match self.fetch(sub, video) {
                Ok(path) => Some(path),
                Err(e) => {
                    tracing::warn!(subtitle = %sub.url, error = %e, "subtitle download failed");
                    None
                }
            })
            .collect()
    }
}
