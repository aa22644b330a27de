//! Stream resolution: turn a raw candidate into a fetchable playlist URL.
//!
//! Strategies run in configured order and the first hit wins. Cheap checks
//! (URL suffix, query parameters) come before the one that costs a fetch.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::fetch::Fetcher;
use crate::url_model::{normalize_url, path_has_extension};

/// Query parameters that commonly carry the real playlist URL, in lookup order.
pub const STREAM_QUERY_PARAMS: [&str; 4] = ["src", "source", "url", "video"];

/// Extensions of single-file media; such candidates are never fetched for a page scan.
pub const OPAQUE_MEDIA_EXTENSIONS: [&str; 10] = [
    ".mp4", ".webm", ".mkv", ".mov", ".m4v", ".avi", ".flv", ".mp3", ".m4a", ".ts",
];

static PLAYLIST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:https?:)?//[^\s<>"']+?\.m3u8[^\s<>"']*"#).expect("valid playlist regex")
});

/// Named resolution strategies, applied in configured order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolveStrategy {
    /// The candidate path already ends in `.m3u8`.
    DirectSuffix,
    /// A `src`/`source`/`url`/`video` query value containing `.m3u8`.
    QueryParameter,
    /// Fetch the candidate and take the first playlist URL in its body.
    PageScan,
}

impl ResolveStrategy {
    pub const DEFAULT_ORDER: [ResolveStrategy; 3] = [
        ResolveStrategy::DirectSuffix,
        ResolveStrategy::QueryParameter,
        ResolveStrategy::PageScan,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ResolveStrategy::DirectSuffix => "direct-suffix",
            ResolveStrategy::QueryParameter => "query-parameter",
            ResolveStrategy::PageScan => "page-scan",
        }
    }
}

/// Outcome of [`StreamResolver::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A playlist URL to hand to the encoder.
    Stream(String),
    /// No playlist found; treat the candidate as an opaque file.
    NotFound,
}

pub struct StreamResolver {
    fetcher: Arc<dyn Fetcher>,
    strategies: Vec<ResolveStrategy>,
}

impl StreamResolver {
    pub fn new(fetcher: Arc<dyn Fetcher>, strategies: Vec<ResolveStrategy>) -> Self {
        Self { fetcher, strategies }
    }

    pub fn with_default_order(fetcher: Arc<dyn Fetcher>) -> Self {
        Self::new(fetcher, ResolveStrategy::DEFAULT_ORDER.to_vec())
    }

    pub fn strategies(&self) -> &[ResolveStrategy] {
        &self.strategies
    }

    pub fn resolve(&self, candidate: &str) -> Resolution {
        let Some(candidate) = normalize_url(candidate, candidate) else {
            tracing::debug!(candidate, "candidate is not an absolute URL; not resolvable");
            return Resolution::NotFound;
        };
        for &strategy in &self.strategies {
            let hit = match strategy {
                ResolveStrategy::DirectSuffix => direct_suffix(&candidate),
                ResolveStrategy::QueryParameter => query_parameter(&candidate),
                ResolveStrategy::PageScan => self.page_scan(&candidate),
            };
            if let Some(stream) = hit {
                tracing::debug!(
                    candidate = %candidate,
                    stream = %stream,
                    strategy = strategy.name(),
                    "resolved stream"
                );
                return Resolution::Stream(stream);
            }
        }
        tracing::debug!(candidate = %candidate, "no stream found; opaque file");
        Resolution::NotFound
    }

    fn page_scan(&self, candidate: &str) -> Option<String> {
        if path_has_extension(candidate, &OPAQUE_MEDIA_EXTENSIONS) {
            return None;
        }
        let page = match self.fetcher.fetch_page(candidate) {
            Ok(page) => page,
            Err(e) => {
                tracing::debug!(candidate, error = %e, "page scan fetch failed");
                return None;
            }
        };
        let text = page.html.replace("\\/", "/");
        PLAYLIST_RE
            .find_iter(&text)
            .find_map(|m| normalize_url(m.as_str(), &page.url))
    }
}

fn direct_suffix(candidate: &str) -> Option<String> {
    path_has_extension(candidate, &[".m3u8"]).then(|| candidate.to_string())
}

fn query_parameter(candidate: &str) -> Option<String> {
    let parsed = url::Url::parse(candidate).ok()?;
    STREAM_QUERY_PARAMS.iter().find_map(|name| {
        let (_, value) = parsed.query_pairs().find(|(k, _)| k == name)?;
        if !value.contains(".m3u8") {
            return None;
        }
        normalize_url(&value, candidate)
    })
}
