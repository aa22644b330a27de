//! Media and subtitle discovery on arbitrary web pages.
//!
//! A page is fetched once, scanned with an ordered list of [`ScanStrategy`]s,
//! and every iframe at depth 0 is fetched and scanned too (depth 1). Deeper
//! iframes are never followed. Results are deduplicated by normalized URL;
//! the first occurrence keeps its origin and hint.

mod iframe;
mod scan;

pub use iframe::IframeResolver;
pub use scan::CandidateScanner;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::fetch::{FetchError, Fetcher};

/// Deepest iframe level that is ever fetched.
pub const MAX_DEPTH: u8 = 1;

/// Document a candidate was found in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRef {
    pub url: String,
    /// 0 = requested page, 1 = iframe inside it.
    pub depth: u8,
}

impl DocumentRef {
    pub fn root(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            depth: 0,
        }
    }

    pub fn nested(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            depth: MAX_DEPTH,
        }
    }
}

/// Which extraction route produced a media candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateHint {
    IframeSrc,
    VideoTag,
    RegexScan,
    ScriptJson,
}

/// A URL that might reference playable media.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaCandidate {
    pub url: String,
    pub origin: DocumentRef,
    pub hint: CandidateHint,
}

/// Default label/language for subtitle tracks that do not declare one.
pub const UNKNOWN: &str = "Unknown";

/// A URL that might reference a subtitle track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleCandidate {
    pub url: String,
    pub label: String,
    pub language: String,
}

impl SubtitleCandidate {
    pub fn new(url: impl Into<String>, label: Option<&str>, language: Option<&str>) -> Self {
        let or_unknown = |v: Option<&str>| {
            v.map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(UNKNOWN)
                .to_string()
        };
        Self {
            url: url.into(),
            label: or_unknown(label),
            language: or_unknown(language),
        }
    }
}

/// Anything deduplicated by its normalized URL.
pub trait Candidate {
    fn url(&self) -> &str;
}

impl Candidate for MediaCandidate {
    fn url(&self) -> &str {
        &self.url
    }
}

impl Candidate for SubtitleCandidate {
    fn url(&self) -> &str {
        &self.url
    }
}

/// Insertion-ordered set keyed by candidate URL; the first insert wins.
#[derive(Debug, Clone)]
pub struct CandidateSet<T> {
    items: Vec<T>,
    seen: HashSet<String>,
}

impl<T> Default for CandidateSet<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            seen: HashSet::new(),
        }
    }
}

impl<T: PartialEq> PartialEq for CandidateSet<T> {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

impl<T: Candidate> CandidateSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `item` unless its URL is already present. Returns true if inserted.
    pub fn insert(&mut self, item: T) -> bool {
        if self.seen.contains(item.url()) {
            return false;
        }
        self.seen.insert(item.url().to_string());
        self.items.push(item);
        true
    }

    pub fn extend(&mut self, other: CandidateSet<T>) {
        for item in other.items {
            self.insert(item);
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }
}

/// Media and subtitle candidates found for one page (root plus iframes).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Discovery {
    pub media: CandidateSet<MediaCandidate>,
    pub subtitles: CandidateSet<SubtitleCandidate>,
}

impl Discovery {
    pub fn merge(&mut self, other: Discovery) {
        self.media.extend(other.media);
        self.subtitles.extend(other.subtitles);
    }
}

/// Named extraction strategies, applied in configured order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScanStrategy {
    /// `<track>`, `<video src>` and `<video><source src>` elements.
    DomElements,
    /// Player-looking iframe `src` values (depth 0 only).
    IframeSources,
    /// Absolute `.m3u8`/`.vtt`/`.srt` URLs anywhere in the raw HTML.
    RawHtml,
    /// Inline scripts: strict JSON first, assignment/literal patterns as fallback.
    InlineScripts,
}

impl ScanStrategy {
    pub const DEFAULT_ORDER: [ScanStrategy; 4] = [
        ScanStrategy::DomElements,
        ScanStrategy::IframeSources,
        ScanStrategy::RawHtml,
        ScanStrategy::InlineScripts,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ScanStrategy::DomElements => "dom-elements",
            ScanStrategy::IframeSources => "iframe-sources",
            ScanStrategy::RawHtml => "raw-html",
            ScanStrategy::InlineScripts => "inline-scripts",
        }
    }
}

/// Fetches `url`, scans it and its iframes, and returns the merged candidates.
///
/// Only a failure to fetch the requested page itself is an error; iframe
/// failures are skipped.
pub fn discover(
    fetcher: &dyn Fetcher,
    scanner: &CandidateScanner,
    url: &str,
) -> Result<Discovery, FetchError> {
    let page = fetcher.fetch_page(url)?;
    let document = page.document();

    let mut found = scanner.scan(&page.html, &document, &DocumentRef::root(page.url.clone()));
    let nested = IframeResolver::new(fetcher, scanner).expand(&document, &page.url);
    found.merge(nested);

    tracing::info!(
        url,
        media = found.media.len(),
        subtitles = found.subtitles.len(),
        "discovery finished"
    );
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::MockFetcher;

    fn media(url: &str, hint: CandidateHint) -> MediaCandidate {
        MediaCandidate {
            url: url.to_string(),
            origin: DocumentRef::root("https://a.com/"),
            hint,
        }
    }

    #[test]
    fn candidate_set_first_insert_wins() {
        let mut set = CandidateSet::new();
        assert!(set.insert(media("https://a.com/x.m3u8", CandidateHint::VideoTag)));
        assert!(!set.insert(media("https://a.com/x.m3u8", CandidateHint::RegexScan)));
        assert_eq!(set.len(), 1);
        assert_eq!(set.as_slice()[0].hint, CandidateHint::VideoTag);
    }

    #[test]
    fn subtitle_defaults_to_unknown() {
        let sub = SubtitleCandidate::new("https://a.com/en.vtt", None, Some("  "));
        assert_eq!(sub.label, UNKNOWN);
        assert_eq!(sub.language, UNKNOWN);
    }

    #[test]
    fn discover_single_video_page() {
        let fetcher = MockFetcher::new().with(
            "https://site.example/watch",
            r#"<html><body><video src="//cdn/v.mp4"></video></body></html>"#,
        );
        let scanner = CandidateScanner::default();
        let found = discover(&fetcher, &scanner, "https://site.example/watch").unwrap();
        assert_eq!(found.media.len(), 1);
        let candidate = &found.media.as_slice()[0];
        assert_eq!(candidate.url, "https://cdn/v.mp4");
        assert_eq!(candidate.hint, CandidateHint::VideoTag);
        assert_eq!(candidate.origin.depth, 0);
        assert!(found.subtitles.is_empty());
    }

    #[test]
    fn discover_fails_when_root_page_unreachable() {
        let fetcher = MockFetcher::new();
        let scanner = CandidateScanner::default();
        let err = discover(&fetcher, &scanner, "https://gone.example/").unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
    }

    #[test]
    fn iframe_player_subtitle_resolves_against_iframe_base() {
        let fetcher = MockFetcher::new()
            .with(
                "https://site.example/show",
                r#"<html><body><iframe src="https://player.example/embed/7"></iframe></body></html>"#,
            )
            .with(
                "https://player.example/embed/7",
                r#"<html><script>var subtitleUrl = "/subs/en.vtt";</script></html>"#,
            );
        let scanner = CandidateScanner::default();
        let found = discover(&fetcher, &scanner, "https://site.example/show").unwrap();

        assert_eq!(found.subtitles.len(), 1);
        let sub = &found.subtitles.as_slice()[0];
        assert_eq!(sub.url, "https://player.example/subs/en.vtt");
        assert_eq!(sub.language, UNKNOWN);
    }

    #[test]
    fn discovery_is_idempotent() {
        let html = r#"<html><body>
            <video src="/a.mp4"><source src="https://cdn.example/b.m3u8"><track src="en.vtt" srclang="en"></video>
            <p>https://cdn.example/b.m3u8 https://cdn.example/c.srt</p>
        </body></html>"#;
        let fetcher = MockFetcher::new().with("https://site.example/p", html);
        let scanner = CandidateScanner::default();
        let first = discover(&fetcher, &scanner, "https://site.example/p").unwrap();
        let second = discover(&fetcher, &scanner, "https://site.example/p").unwrap();
        assert_eq!(first, second);
        assert_eq!(first.media.len(), 2);
        assert_eq!(first.subtitles.len(), 2);
    }
}
