//! URL modeling and filename derivation.
//!
//! Normalizes discovered links to absolute form, derives output names from
//! query parameters or the URL path, and sanitizes them for any filesystem.

mod path;
mod sanitize;

pub use path::{filename_from_url_path, path_has_extension};
pub use sanitize::{sanitize_filename, MAX_FILENAME_CHARS};

use url::Url;

/// Default filename when the URL path yields nothing usable.
const DEFAULT_FILENAME: &str = "download.bin";

/// Title used for stream outputs when the candidate carries no `t` parameter.
pub const DEFAULT_TITLE: &str = "video";

/// Normalizes `raw` to an absolute URL string.
///
/// - `//host/x` becomes `https://host/x`
/// - `http(s)://...` is parsed as-is
/// - anything else is joined against `base`
///
/// Returns `None` when the result is not a parseable http(s) URL.
pub fn normalize_url(raw: &str, base: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let parsed = if let Some(rest) = raw.strip_prefix("//") {
        Url::parse(&format!("https://{rest}")).ok()?
    } else if has_http_scheme(raw) {
        Url::parse(raw).ok()?
    } else {
        let base = normalize_base(base)?;
        base.join(raw).ok()?
    };
    match parsed.scheme() {
        "http" | "https" => Some(parsed.to_string()),
        _ => None,
    }
}

/// Canonical form of a submitted source URL (used for task ids).
pub fn normalize_source_url(raw: &str) -> String {
    let trimmed = raw.trim();
    match normalize_url(trimmed, trimmed) {
        Some(u) => u,
        None => trimmed.to_string(),
    }
}

fn normalize_base(base: &str) -> Option<Url> {
    let base = base.trim();
    if let Some(rest) = base.strip_prefix("//") {
        return Url::parse(&format!("https://{rest}")).ok();
    }
    Url::parse(base).ok()
}

fn has_http_scheme(s: &str) -> bool {
    let lower = s.get(..8).unwrap_or(s).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// First value of query parameter `name` in `url` (percent-decoded).
pub fn query_param(url: &str, name: &str) -> Option<String> {
    let parsed = normalize_base(url)?;
    parsed
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

/// Sanitized output title for a stream candidate: its `t` parameter or [`DEFAULT_TITLE`].
pub fn stream_title(candidate_url: &str) -> String {
    let raw = query_param(candidate_url, "t")
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_TITLE.to_string());
    let sanitized = sanitize_filename(&raw);
    if sanitized.trim().is_empty() {
        DEFAULT_TITLE.to_string()
    } else {
        sanitized
    }
}

/// Derives a safe filename for a directly downloaded file from the last URL path segment.
///
/// # Examples
///
/// - `derive_filename("https://cdn.example.com/v.mp4")` → `"v.mp4"`
/// - `derive_filename("https://example.com/")` → `"download.bin"`
pub fn derive_filename(url: &str) -> String {
    let raw = match filename_from_url_path(url) {
        Some(c) => c,
        None => return DEFAULT_FILENAME.to_string(),
    };

    let sanitized = sanitize_filename(&raw);
    let bare = sanitized.trim();
    if bare.is_empty() || bare == "." || bare == ".." {
        DEFAULT_FILENAME.to_string()
    } else {
        sanitized
    }
}
