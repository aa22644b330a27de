//! `mdm grab` – discover and download everything on one page, in the foreground.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use mdm_core::config::MdmConfig;
use mdm_core::pipeline::{backend_from_config, DownloadBackend};
use mdm_core::progress::{ProgressEvent, ProgressSink};

/// Minimum gap between two console progress lines.
const REDRAW_INTERVAL: Duration = Duration::from_millis(200);

/// Prints one self-overwriting progress line.
#[derive(Default)]
struct ConsoleProgress {
    last: Mutex<Option<Instant>>,
}

impl ProgressSink for ConsoleProgress {
    fn on_progress(&self, event: &ProgressEvent) {
        let percent = event.percent();
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        if percent < 100.0 && last.is_some_and(|t| t.elapsed() < REDRAW_INTERVAL) {
            return;
        }
        *last = Some(Instant::now());
        print!(
            "\r  {:>5.1}%  {:>12}  ETA {:<8}",
            percent,
            event.speed_or_unknown(),
            event.eta_or_unknown()
        );
        let _ = io::stdout().flush();
    }
}

fn prompt_url() -> Result<String> {
    print!("Page URL: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("reading URL from stdin")?;
    Ok(line.trim().to_string())
}

pub async fn run_grab(cfg: &MdmConfig, url: Option<String>, output: Option<PathBuf>) -> Result<()> {
    let url = match url {
        Some(u) => u.trim().to_string(),
        None => prompt_url()?,
    };
    if url.is_empty() {
        bail!("no URL given");
    }
    let download_dir = match output.or_else(|| cfg.download_dir.clone()) {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    let backend = backend_from_config(cfg, download_dir)?;

    println!("Scanning {url}");
    let summary = tokio::task::spawn_blocking(move || {
        let progress = ConsoleProgress::default();
        backend.run(&url, &progress)
    })
    .await
    .context("download worker panicked")?;
    println!();

    let summary = summary?;
    for path in &summary.outputs {
        println!("Saved {}", path.display());
    }
    if summary.failures > 0 {
        println!("{} candidate(s) failed; see the log for details.", summary.failures);
    }
    Ok(())
}
