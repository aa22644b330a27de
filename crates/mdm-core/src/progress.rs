//! Progress reporting for downloads (percent, rate, ETA).
//!
//! Download code reports [`ProgressEvent`]s to a [`ProgressSink`]; the sink
//! decides where they go (task registry, console, nowhere).

/// Placeholder for unknown speed / ETA values.
pub const UNKNOWN_FIELD: &str = "--";

/// One progress callback from a downloader.
///
/// The percentage comes from `percent` when the downloader reports one,
/// otherwise from `downloaded_bytes / total_bytes`, otherwise 0.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressEvent {
    /// Reported percentage string, e.g. `" 12.5%"`.
    pub percent: Option<String>,
    pub downloaded_bytes: u64,
    pub total_bytes: Option<u64>,
    pub speed: Option<String>,
    pub eta: Option<String>,
}

impl ProgressEvent {
    /// Event carrying only a reported percentage string.
    pub fn reported(percent: impl Into<String>) -> Self {
        Self {
            percent: Some(percent.into()),
            ..Self::default()
        }
    }

    /// Percentage in [0, 100], rounded to one decimal.
    pub fn percent(&self) -> f64 {
        let reported = self
            .percent
            .as_deref()
            .and_then(|p| p.trim().trim_end_matches('%').trim().parse::<f64>().ok())
            .filter(|p| p.is_finite());
        let raw = match (reported, self.total_bytes) {
            (Some(p), _) => p,
            (None, Some(total)) if total > 0 => self.downloaded_bytes as f64 / total as f64 * 100.0,
            _ => 0.0,
        };
        (raw.clamp(0.0, 100.0) * 10.0).round() / 10.0
    }

    pub fn speed_or_unknown(&self) -> &str {
        self.speed.as_deref().unwrap_or(UNKNOWN_FIELD)
    }

    pub fn eta_or_unknown(&self) -> &str {
        self.eta.as_deref().unwrap_or(UNKNOWN_FIELD)
    }
}

/// Receiver of progress events. Called from the download worker thread.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&self, _event: &ProgressEvent) {}
}

/// Snapshot of a byte transfer used to derive rate and ETA.
#[derive(Debug, Clone)]
pub struct ProgressStats {
    /// Bytes written so far.
    pub bytes_done: u64,
    /// Total size in bytes, if announced.
    pub total_bytes: Option<u64>,
    /// Elapsed time since download start (seconds).
    pub elapsed_secs: f64,
}

impl ProgressStats {
    /// Download rate in bytes per second (0 if elapsed is 0).
    pub fn bytes_per_sec(&self) -> f64 {
        if self.elapsed_secs <= 0.0 {
            return 0.0;
        }
        self.bytes_done as f64 / self.elapsed_secs
    }

    /// Estimated seconds remaining (None if total unknown or rate is 0).
    pub fn eta_secs(&self) -> Option<f64> {
        let total = self.total_bytes?;
        let remaining = total.saturating_sub(self.bytes_done);
        if remaining == 0 {
            return Some(0.0);
        }
        let rate = self.bytes_per_sec();
        if rate <= 0.0 {
            return None;
        }
        Some(remaining as f64 / rate)
    }

    /// Converts the snapshot into an event with formatted speed and ETA.
    pub fn to_event(&self) -> ProgressEvent {
        let rate = self.bytes_per_sec();
        ProgressEvent {
            percent: None,
            downloaded_bytes: self.bytes_done,
            total_bytes: self.total_bytes,
            speed: (rate > 0.0).then(|| format_rate(rate)),
            eta: self.eta_secs().map(format_eta),
        }
    }
}

/// Formats a byte rate like `"1.2MiB/s"`.
pub fn format_rate(bytes_per_sec: f64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes_per_sec;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1}{}/s", value, UNITS[unit])
}

/// Formats seconds as `MM:SS`, or `H:MM:SS` past an hour.
pub fn format_eta(secs: f64) -> String {
    let total = secs.max(0.0).round() as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}
