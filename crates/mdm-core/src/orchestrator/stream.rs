//! Stream branch: remux a playlist through the encoder via a scratch directory.

use std::path::{Path, PathBuf};

use crate::encoder::Encoder;
use crate::error::DownloadError;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::url_model::stream_title;

/// Name prefix of per-invocation scratch directories inside the download dir.
pub const SCRATCH_PREFIX: &str = ".mdm-scratch-";

/// Encodes `stream_url` to `<dest_dir>/<title>.mp4`, title taken from the
/// candidate's `t` parameter. The scratch directory is removed whether the
/// encoder succeeded or not.
pub(super) fn download_stream(
    encoder: &dyn Encoder,
    candidate_url: &str,
    stream_url: &str,
    dest_dir: &Path,
    progress: &dyn ProgressSink,
) -> Result<PathBuf, DownloadError> {
    let file_name = format!("{}.mp4", stream_title(candidate_url));
    let final_path = dest_dir.join(&file_name);

    let scratch = tempfile::Builder::new()
        .prefix(SCRATCH_PREFIX)
        .tempdir_in(dest_dir)
        .map_err(|e| DownloadError::io("creating scratch dir in", dest_dir, e))?;
    let scratch_path = scratch.path().to_path_buf();

    progress.on_progress(&ProgressEvent::reported("0%"));
    tracing::info!(
        stream = stream_url,
        encoder = encoder.name(),
        output = %final_path.display(),
        "encoding stream"
    );

    let result = encode_into(
        encoder,
        stream_url,
        &scratch_path.join(&file_name),
        &final_path,
        progress,
    );

    if let Err(e) = scratch.close() {
        tracing::warn!(scratch = %scratch_path.display(), error = %e, "could not remove scratch dir");
    }
    result
}

fn encode_into(
    encoder: &dyn Encoder,
    stream_url: &str,
    scratch_output: &Path,
    final_path: &Path,
    progress: &dyn ProgressSink,
) -> Result<PathBuf, DownloadError> {
    encoder.remux(stream_url, scratch_output, progress)?;
    std::fs::rename(scratch_output, final_path)
        .map_err(|e| DownloadError::io("moving encoded output to", final_path, e))?;
    Ok(final_path.to_path_buf())
}
