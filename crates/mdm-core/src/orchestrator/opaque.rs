//! Opaque branch: stream the candidate's bytes straight to disk.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::error::DownloadError;
use crate::fetch::Fetcher;
use crate::progress::{ProgressSink, ProgressStats};
use crate::storage::PartFile;
use crate::url_model::derive_filename;

/// Minimum gap between two progress events on the byte path.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

pub(super) fn download_file(
    fetcher: &dyn Fetcher,
    url: &str,
    dest_dir: &Path,
    max_filesize: Option<u64>,
    buffer_size: Option<usize>,
    progress: &dyn ProgressSink,
) -> Result<PathBuf, DownloadError> {
    let final_path = dest_dir.join(derive_filename(url));
    let mut part = PartFile::create(&final_path, buffer_size)
        .map_err(|e| DownloadError::io("creating", &final_path, e))?;
    tracing::info!(url, output = %final_path.display(), "downloading file");

    let started = Instant::now();
    let mut last_emit: Option<Instant> = None;
    let mut on_bytes = |done: u64, total: Option<u64>| {
        let finished = total.is_some_and(|t| t > 0 && done >= t);
        if !finished && last_emit.is_some_and(|t| t.elapsed() < PROGRESS_INTERVAL) {
            return;
        }
        last_emit = Some(Instant::now());
        let stats = ProgressStats {
            bytes_done: done,
            total_bytes: total,
            elapsed_secs: started.elapsed().as_secs_f64(),
        };
        progress.on_progress(&stats.to_event());
    };

    // Dropping `part` on error removes the partial file.
    let written = fetcher.stream_to(url, &mut part, max_filesize, &mut on_bytes)?;
    let out = part
        .finalize()
        .map_err(|e| DownloadError::io("finalizing", &final_path, e))?;
    tracing::debug!(url, bytes = written, "file complete");
    Ok(out)
}
