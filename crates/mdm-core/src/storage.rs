//! Output file lifecycle in the download directory.
//!
//! Opaque downloads are written to `<name>.part` and renamed to the final
//! name only after the body completed. An unfinished `.part` is removed when
//! its [`PartFile`] is dropped.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Temporary file suffix used before rename.
pub const TEMP_SUFFIX: &str = ".part";

/// Path for the temp file: appends `.part` to the final path (e.g. `v.mp4` → `v.mp4.part`).
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    PathBuf::from(o)
}

/// Buffered writer for a `.part` file that becomes `final_path` on [`PartFile::finalize`].
pub struct PartFile {
    writer: Option<BufWriter<File>>,
    temp_path: PathBuf,
    final_path: PathBuf,
}

impl PartFile {
    /// Creates (truncating) `<final_path>.part`.
    pub fn create(final_path: &Path, buffer_size: Option<usize>) -> io::Result<Self> {
        let temp_path = temp_path(final_path);
        let file = File::options()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)?;
        let writer = match buffer_size {
            Some(n) if n > 0 => BufWriter::with_capacity(n, file),
            _ => BufWriter::new(file),
        };
        Ok(Self {
            writer: Some(writer),
            temp_path,
            final_path: final_path.to_path_buf(),
        })
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Flushes, syncs and renames the temp file to the final path.
    pub fn finalize(mut self) -> io::Result<PathBuf> {
        if let Some(writer) = self.writer.take() {
            let file = writer.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
        }
        std::fs::rename(&self.temp_path, &self.final_path)?;
        Ok(self.final_path.clone())
    }
}

impl Write for PartFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.writer.as_mut() {
            Some(w) => w.write(buf),
            None => Err(io::Error::new(io::ErrorKind::Other, "part file already finalized")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(w) => w.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if self.writer.take().is_some() {
            if let Err(e) = std::fs::remove_file(&self.temp_path) {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::warn!(path = %self.temp_path.display(), error = %e, "could not remove partial file");
                }
            }
        }
    }
}

/// A finished file in the download directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredFile {
    pub filename: String,
    /// Path under the `/downloads` route.
    pub path: String,
    /// Human size, e.g. `"12.3 MB"`.
    pub size: String,
}

/// Formats a byte count in mebibytes with one decimal.
pub fn format_size_mb(bytes: u64) -> String {
    format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
}

/// Lists finished files in `dir`, sorted by name. Hidden entries (scratch
/// directories) and `.part` files are skipped.
pub fn list_downloads(dir: &Path) -> io::Result<Vec<StoredFile>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        if name.starts_with('.') || name.ends_with(TEMP_SUFFIX) {
            continue;
        }
        files.push(StoredFile {
            path: format!("/downloads/{name}"),
            filename: name,
            size: format_size_mb(meta.len()),
        });
    }
    files.sort_by(|a, b| a.filename.cmp(&b.filename));
    Ok(files)
}
