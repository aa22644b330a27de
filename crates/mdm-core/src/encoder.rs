//! External encoder invocation (remux a playlist into a single `.mp4`).

use std::ffi::OsString;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;

use thiserror::Error;

use crate::progress::{ProgressEvent, ProgressSink, ProgressStats};

/// Binary looked up on `PATH` when no encoder path is configured.
pub const DEFAULT_ENCODER: &str = "ffmpeg";

/// Longest stderr excerpt kept in an [`EncoderError::Exit`] message.
const STDERR_EXCERPT_CHARS: usize = 500;

#[derive(Debug, Error)]
pub enum EncoderError {
    #[error("{tool} not found (looked for {looked_for}); set `{config_key}` in the config file")]
    Missing {
        tool: String,
        looked_for: String,
        config_key: &'static str,
    },
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("encoder exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },
    #[error("encoder reported success but produced no output at {0}")]
    NoOutput(PathBuf),
}

/// Turns a stream URL into a finished media file at `output`.
pub trait Encoder: Send + Sync {
    fn name(&self) -> &str;

    /// Blocks until the encoder exits. Success means `output` exists.
    fn remux(
        &self,
        stream_url: &str,
        output: &Path,
        progress: &dyn ProgressSink,
    ) -> Result<(), EncoderError>;
}

/// Folds `ffmpeg -progress` key=value lines into progress events.
///
/// ffmpeg writes a block of keys per report, closed by `progress=continue`
/// (or `progress=end`). Playlists carry no total, so the event has bytes
/// written and a rate but no percentage.
#[derive(Debug, Default)]
pub struct FfmpegProgress {
    total_size: u64,
}

impl FfmpegProgress {
    /// Feeds one line; returns an event when a report block closes.
    pub fn feed(&mut self, line: &str, elapsed_secs: f64) -> Option<ProgressEvent> {
        let (key, value) = line.trim().split_once('=')?;
        match key {
            "total_size" => {
                if let Ok(bytes) = value.trim().parse() {
                    self.total_size = bytes;
                }
                None
            }
            "progress" => Some(
                ProgressStats {
                    bytes_done: self.total_size,
                    total_bytes: None,
                    elapsed_secs,
                }
                .to_event(),
            ),
            _ => None,
        }
    }
}

/// `ffmpeg -i <stream> -c copy <output>`.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    program: PathBuf,
    user_agent: String,
}

impl FfmpegEncoder {
    pub fn new(program: PathBuf, user_agent: impl Into<String>) -> Self {
        Self {
            program,
            user_agent: user_agent.into(),
        }
    }

    /// Resolves the encoder location once; fails fast when it is absent.
    pub fn locate(configured: Option<&Path>, user_agent: &str) -> Result<Self, EncoderError> {
        let program = locate_tool(configured, DEFAULT_ENCODER, "encoder_path")?;
        tracing::info!(encoder = %program.display(), "using encoder");
        Ok(Self::new(program, user_agent))
    }

    fn args(&self, stream_url: &str, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "-hide_banner",
            "-loglevel",
            "error",
            "-y",
            "-nostats",
            "-progress",
            "pipe:1",
            "-user_agent",
            self.user_agent.as_str(),
            "-i",
            stream_url,
            "-c",
            "copy",
            "-bsf:a",
            "aac_adtstoasc",
        ]
        .into_iter()
        .map(OsString::from)
        .collect();
        args.push(output.as_os_str().to_owned());
        args
    }
}

impl Encoder for FfmpegEncoder {
    fn name(&self) -> &str {
        DEFAULT_ENCODER
    }

    fn remux(
        &self,
        stream_url: &str,
        output: &Path,
        progress: &dyn ProgressSink,
    ) -> Result<(), EncoderError> {
        tracing::debug!(stream = stream_url, output = %output.display(), "starting encoder");
        let spawn_err = |source| EncoderError::Spawn {
            program: self.program.display().to_string(),
            source,
        };
        let mut child = Command::new(&self.program)
            .args(self.args(stream_url, output))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_err)?;

        let stderr = child.stderr.take();
        let stderr_reader = std::thread::spawn(move || {
            let mut buf = String::new();
            if let Some(mut s) = stderr {
                let _ = s.read_to_string(&mut buf);
            }
            buf
        });

        let started = Instant::now();
        let mut parser = FfmpegProgress::default();
        if let Some(stdout) = child.stdout.take() {
            for line in BufReader::new(stdout).lines().map_while(Result::ok) {
                if let Some(event) = parser.feed(&line, started.elapsed().as_secs_f64()) {
                    progress.on_progress(&event);
                }
            }
        }

        let status = child.wait().map_err(spawn_err)?;
        let stderr = stderr_reader.join().unwrap_or_default();
        if !status.success() {
            let excerpt: String = stderr.trim().chars().take(STDERR_EXCERPT_CHARS).collect();
            return Err(EncoderError::Exit {
                status: status.to_string(),
                stderr: excerpt,
            });
        }
        if !output.is_file() {
            return Err(EncoderError::NoOutput(output.to_path_buf()));
        }
        Ok(())
    }
}

/// Finds an external tool: the configured path if set (must exist), else
/// `default_name` searched on `PATH`.
pub fn locate_tool(
    configured: Option<&Path>,
    default_name: &str,
    config_key: &'static str,
) -> Result<PathBuf, EncoderError> {
    if let Some(path) = configured {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        return Err(EncoderError::Missing {
            tool: default_name.to_string(),
            looked_for: path.display().to_string(),
            config_key,
        });
    }
    let path_var = std::env::var_os("PATH").unwrap_or_default();
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(default_name))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| EncoderError::Missing {
            tool: default_name.to_string(),
            looked_for: format!("{default_name} on PATH"),
            config_key,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<ProgressEvent>>);

    impl ProgressSink for Recorder {
        fn on_progress(&self, event: &ProgressEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn progress_block_becomes_one_event() {
        let mut p = FfmpegProgress::default();
        assert_eq!(p.feed("frame=120", 2.0), None);
        assert_eq!(p.feed("total_size=2097152", 2.0), None);
        assert_eq!(p.feed("out_time=00:00:04.000000", 2.0), None);
        let ev = p.feed("progress=continue", 2.0).unwrap();
        assert_eq!(ev.downloaded_bytes, 2_097_152);
        assert_eq!(ev.speed.as_deref(), Some("1.0MiB/s"));
        assert_eq!(ev.eta_or_unknown(), "--");
        assert_eq!(ev.percent(), 0.0);
    }

    #[test]
    fn unparseable_size_keeps_last_value() {
        let mut p = FfmpegProgress::default();
        p.feed("total_size=1024", 1.0);
        p.feed("total_size=N/A", 1.0);
        assert_eq!(p.feed("progress=end", 1.0).unwrap().downloaded_bytes, 1024);
        assert_eq!(p.feed("not a key value line", 1.0), None);
    }

    #[cfg(unix)]
    #[test]
    fn progress_lines_from_the_encoder_reach_the_sink() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("fake-ffmpeg");
        std::fs::write(
            &tool,
            "#!/bin/sh\n\
             for a; do out=\"$a\"; done\n\
             printf 'total_size=1024\\nprogress=continue\\n'\n\
             printf 'total_size=4096\\nprogress=end\\n'\n\
             : > \"$out\"\n",
        )
        .unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

        let enc = FfmpegEncoder::new(tool, "UA");
        let out = dir.path().join("out.mp4");
        let recorder = Recorder::default();
        // A freshly written script can briefly be busy while other tests fork.
        for attempt in 0.. {
            match enc.remux("https://cdn/x.m3u8", &out, &recorder) {
                Err(EncoderError::Spawn { ref source, .. })
                    if source.raw_os_error() == Some(26) && attempt < 20 =>
                {
                    std::thread::sleep(std::time::Duration::from_millis(50));
                }
                other => {
                    other.unwrap();
                    break;
                }
            }
        }

        assert!(out.is_file());
        let bytes: Vec<u64> = recorder
            .0
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.downloaded_bytes)
            .collect();
        assert_eq!(bytes, vec![1024, 4096]);
    }

    #[test]
    fn args_copy_stream_into_output() {
        let enc = FfmpegEncoder::new(PathBuf::from("/usr/bin/ffmpeg"), "UA/1.0");
        let args: Vec<String> = enc
            .args("https://cdn/x.m3u8", Path::new("/tmp/out.mp4"))
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        let i = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[i + 1], "https://cdn/x.m3u8");
        let ua = args.iter().position(|a| a == "-user_agent").unwrap();
        assert_eq!(args[ua + 1], "UA/1.0");
        assert!(args.windows(2).any(|w| w[0] == "-c" && w[1] == "copy"));
        assert!(args.windows(2).any(|w| w[0] == "-progress" && w[1] == "pipe:1"));
        assert_eq!(args.last().unwrap(), "/tmp/out.mp4");
    }

    #[test]
    fn configured_path_must_exist() {
        let err = locate_tool(
            Some(Path::new("/definitely/not/here/ffmpeg")),
            DEFAULT_ENCODER,
            "encoder_path",
        )
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("ffmpeg not found"), "{msg}");
        assert!(msg.contains("encoder_path"), "{msg}");
    }

    #[test]
    fn configured_existing_path_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("my-ffmpeg");
        std::fs::write(&tool, b"#!/bin/sh\n").unwrap();
        let found = locate_tool(Some(&tool), DEFAULT_ENCODER, "encoder_path").unwrap();
        assert_eq!(found, tool);
    }

    #[test]
    fn missing_tool_on_path_fails_fast() {
        let err = locate_tool(None, "mdm-no-such-tool-xyz", "encoder_path").unwrap_err();
        assert!(matches!(err, EncoderError::Missing { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_is_reported() {
        let enc = FfmpegEncoder::new(PathBuf::from("/bin/false"), "UA");
        let dir = tempfile::tempdir().unwrap();
        let err = enc
            .remux("https://cdn/x.m3u8", &dir.path().join("out.mp4"), &NoProgress)
            .unwrap_err();
        assert!(matches!(err, EncoderError::Exit { .. }), "{err}");
    }

    #[cfg(unix)]
    #[test]
    fn success_without_output_is_an_error() {
        let enc = FfmpegEncoder::new(PathBuf::from("/bin/true"), "UA");
        let dir = tempfile::tempdir().unwrap();
        let err = enc
            .remux("https://cdn/x.m3u8", &dir.path().join("out.mp4"), &NoProgress)
            .unwrap_err();
        assert!(matches!(err, EncoderError::NoOutput(_)), "{err}");
    }
}
