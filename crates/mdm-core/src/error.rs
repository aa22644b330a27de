//! Error types for a download run.
//!
//! [`DownloadError`] is scoped to one candidate; the pipeline contains it and
//! moves on. [`PipelineError`] is what ends a task in the `Error` state.

use std::path::PathBuf;

use thiserror::Error;

use crate::encoder::EncoderError;
use crate::fetch::FetchError;

/// Failure of one candidate download.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Encoder(#[from] EncoderError),
    #[error("{context} {}: {source}", path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DownloadError {
    pub(crate) fn io(context: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DownloadError::Io {
            context,
            path: path.into(),
            source,
        }
    }
}

/// Failure that leaves a task without any output.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("could not fetch page: {0}")]
    Fetch(#[from] FetchError),
    #[error("no media candidates found")]
    NoMedia,
    #[error("no file downloaded ({attempted} candidate(s) failed): {last_error}")]
    NothingDownloaded { attempted: usize, last_error: String },
    #[error("{0}")]
    Backend(String),
}
