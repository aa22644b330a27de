//! Alternative backend: hand the page URL to `yt-dlp` and follow its output.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

use crate::config::MdmConfig;
use crate::encoder::locate_tool;
use crate::error::PipelineError;
use crate::pipeline::{DownloadBackend, RunSummary};
use crate::progress::{ProgressEvent, ProgressSink};

pub const DEFAULT_YTDLP: &str = "yt-dlp";

/// `[download]  12.5% of ~ 310.04MiB at  374.36KiB/s ETA 11:59 (frag 56/454)`
static PROGRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\[download\]\s+(\d+(?:\.\d+)?%)\s+of\s+~?\s*\S+(?:\s+at\s+(\S+))?(?:\s+ETA\s+(\S+))?",
    )
    .expect("valid yt-dlp progress regex")
});

static DESTINATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[download\]\s+Destination:\s+(.+)$").expect("valid destination regex")
});

static MERGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\[Merger\]\s+Merging formats into\s+"(.+)"$"#).expect("valid merge regex")
});

static ALREADY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[download\]\s+(.+?) has already been downloaded").expect("valid already regex")
});

/// A line of `yt-dlp --newline` output we care about.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputLine {
    Progress(ProgressEvent),
    /// A file yt-dlp is writing (or merged into, or already had).
    Output(PathBuf),
}

pub fn parse_line(line: &str) -> Option<OutputLine> {
    let line = line.trim();
    if let Some(caps) = DESTINATION_RE.captures(line) {
        return Some(OutputLine::Output(PathBuf::from(caps[1].trim())));
    }
    if let Some(caps) = MERGE_RE.captures(line) {
        return Some(OutputLine::Output(PathBuf::from(&caps[1])));
    }
    if let Some(caps) = ALREADY_RE.captures(line) {
        return Some(OutputLine::Output(PathBuf::from(caps[1].trim())));
    }
    let caps = PROGRESS_RE.captures(line)?;
    let field = |i: usize| {
        caps.get(i)
            .map(|m| m.as_str().to_string())
            .filter(|s| s != "Unknown" && s != "N/A")
    };
    Some(OutputLine::Progress(ProgressEvent {
        percent: field(1),
        speed: field(2),
        eta: field(3),
        ..ProgressEvent::default()
    }))
}

#[derive(Debug, Clone)]
pub struct YtDlpDownloader {
    program: PathBuf,
    download_dir: PathBuf,
    max_filesize: Option<u64>,
}

impl YtDlpDownloader {
    pub fn new(program: PathBuf, download_dir: PathBuf, max_filesize: Option<u64>) -> Self {
        Self {
            program,
            download_dir,
            max_filesize,
        }
    }

    pub fn from_config(cfg: &MdmConfig, download_dir: PathBuf) -> Result<Self> {
        let program = locate_tool(cfg.ytdlp_path.as_deref(), DEFAULT_YTDLP, "ytdlp_path")
            .context("locating yt-dlp")?;
        tracing::info!(ytdlp = %program.display(), "using yt-dlp backend");
        Ok(Self::new(program, download_dir, cfg.max_filesize_bytes))
    }

    fn args(&self, url: &str) -> Vec<String> {
        let template = self.download_dir.join("%(title)s.%(ext)s");
        let mut args = vec![
            "--newline".to_string(),
            "--no-playlist".to_string(),
            "-f".to_string(),
            "best".to_string(),
            "--merge-output-format".to_string(),
            "mp4".to_string(),
        ];
        if let Some(max) = self.max_filesize {
            args.push("--max-filesize".to_string());
            args.push(max.to_string());
        }
        args.push("-o".to_string());
        args.push(template.to_string_lossy().into_owned());
        args.push(url.to_string());
        args
    }
}

impl DownloadBackend for YtDlpDownloader {
    fn name(&self) -> &str {
        "ytdlp"
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
        tracing::info!(url, "starting yt-dlp");
        let mut child = Command::new(&self.program)
            .args(self.args(url))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| PipelineError::Backend(format!("failed to start yt-dlp: {e}")))?;

        let stderr = child.stderr.take();
        let stderr_reader = std::thread::spawn(move || {
            stderr
                .map(|s| {
                    BufReader::new(s)
                        .lines()
                        .map_while(Result::ok)
                        .collect::<Vec<_>>()
                        .join("\n")
                })
                .unwrap_or_default()
        });

        let mut outputs: Vec<PathBuf> = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            for line in BufReader::new(stdout).lines().map_while(Result::ok) {
                match parse_line(&line) {
                    Some(OutputLine::Progress(event)) => progress.on_progress(&event),
                    Some(OutputLine::Output(path)) => {
                        tracing::debug!(path = %path.display(), "yt-dlp output");
                        outputs.push(path);
                    }
                    None => {}
                }
            }
        }

        let status = child
            .wait()
            .map_err(|e| PipelineError::Backend(format!("waiting for yt-dlp: {e}")))?;
        let stderr = stderr_reader.join().unwrap_or_default();
        if !status.success() {
            let reason = stderr
                .lines()
                .rev()
                .find(|l| l.trim_start().starts_with("ERROR:"))
                .or_else(|| stderr.lines().rev().find(|l| !l.trim().is_empty()))
                .unwrap_or("no error output")
                .trim()
                .to_string();
            return Err(PipelineError::Backend(format!("yt-dlp failed ({status}): {reason}")));
        }

        // Intermediate format files are gone after a merge; keep what exists.
        outputs.dedup();
        let outputs: Vec<PathBuf> = match outputs.last().filter(|p| p.is_file()).cloned() {
            Some(last) => vec![last],
            None => outputs.into_iter().filter(|p| p.is_file()).collect(),
        };
        if outputs.is_empty() {
            return Err(PipelineError::NothingDownloaded {
                attempted: 1,
                last_error: "yt-dlp finished without producing a file".to_string(),
            });
        }
        Ok(RunSummary {
            outputs,
            failures: 0,
        })
    }
}
