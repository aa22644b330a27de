//! Candidate extraction from a single document.
//!
//! Strategies are unioned in configured order; the order only decides which
//! hint a URL found by several strategies keeps. A strategy that cannot parse
//! its input contributes nothing.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;

use super::{
    CandidateHint, DocumentRef, Discovery, MediaCandidate, ScanStrategy, SubtitleCandidate,
};
use crate::url_model::normalize_url;

const PAGE_LABEL: &str = "Found in page";
const PLAYER_LABEL: &str = "Found in player";

static PAGE_STREAM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://[^\s<>"']+?\.m3u8[^\s<>"']*"#).expect("valid stream regex")
});

static PAGE_SUBTITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://[^\s<>"']+?\.(?:vtt|srt)[^\s<>"']*"#).expect("valid subtitle regex")
});

static SCRIPT_STREAM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"["']([^"'\s]+?\.m3u8(?:\?[^"'\s]*)?)["']"#).expect("valid script stream regex")
});

static SCRIPT_ASSIGN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:subtitleUrl|captionFile)\s*[=:]\s*["']([^"']+)["']"#)
        .expect("valid assignment regex")
});

static SCRIPT_SUBTITLE_LITERAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"["']([^"'\s]+\.(?:vtt|srt)(?:\?[^"'\s]*)?)["']"#)
        .expect("valid subtitle literal regex")
});

/// Substrings that mark an inline script as carrying subtitle data.
const SUBTITLE_MARKERS: [&str; 2] = ["subtitle", "caption"];

/// Iframe `src` substrings that suggest an embedded player.
const PLAYER_MARKERS: [&str; 3] = ["m3u8", "video", "player"];

/// Runs the configured [`ScanStrategy`] list over one document.
#[derive(Debug, Clone)]
pub struct CandidateScanner {
    strategies: Vec<ScanStrategy>,
}

impl Default for CandidateScanner {
    fn default() -> Self {
        Self::new(ScanStrategy::DEFAULT_ORDER.to_vec())
    }
}

impl CandidateScanner {
    pub fn new(strategies: Vec<ScanStrategy>) -> Self {
        Self { strategies }
    }

    pub fn strategies(&self) -> &[ScanStrategy] {
        &self.strategies
    }

    /// Scans `document` (parsed from `html`) found at `origin`.
    ///
    /// Relative links are joined against `origin.url`. Iframe sources are only
    /// taken as candidates at depth 0.
    pub fn scan(&self, html: &str, document: &Html, origin: &DocumentRef) -> Discovery {
        let mut found = Discovery::default();
        for &strategy in &self.strategies {
            if strategy == ScanStrategy::IframeSources && origin.depth > 0 {
                continue;
            }
            let (media_before, subs_before) = (found.media.len(), found.subtitles.len());
            match strategy {
                ScanStrategy::DomElements => scan_dom_elements(&mut found, document, origin),
                ScanStrategy::IframeSources => scan_iframe_sources(&mut found, document, origin),
                ScanStrategy::RawHtml => scan_raw_html(&mut found, html, origin),
                ScanStrategy::InlineScripts => scan_inline_scripts(&mut found, document, origin),
            }
            tracing::trace!(
                strategy = strategy.name(),
                document = %origin.url,
                depth = origin.depth,
                media = found.media.len() - media_before,
                subtitles = found.subtitles.len() - subs_before,
                "scan strategy done"
            );
        }
        found
    }
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn push_media(found: &mut Discovery, raw: &str, origin: &DocumentRef, hint: CandidateHint) {
    if let Some(url) = normalize_url(&unescape(raw), &origin.url) {
        found.media.insert(MediaCandidate {
            url,
            origin: origin.clone(),
            hint,
        });
    }
}

fn push_subtitle(
    found: &mut Discovery,
    raw: &str,
    origin: &DocumentRef,
    label: Option<&str>,
    language: Option<&str>,
) {
    if let Some(url) = normalize_url(&unescape(raw), &origin.url) {
        found
            .subtitles
            .insert(SubtitleCandidate::new(url, label, language));
    }
}

/// Undo the escaping commonly found around URLs in markup and inline JSON.
fn unescape(raw: &str) -> String {
    raw.replace("\\/", "/").replace("&amp;", "&")
}

fn scan_dom_elements(found: &mut Discovery, document: &Html, origin: &DocumentRef) {
    if let Some(tracks) = selector("track[src]") {
        for el in document.select(&tracks) {
            let el = el.value();
            if let Some(src) = el.attr("src") {
                push_subtitle(found, src, origin, el.attr("label"), el.attr("srclang"));
            }
        }
    }
    for css in ["video[src]", "video source[src]"] {
        let Some(sel) = selector(css) else { continue };
        for el in document.select(&sel) {
            if let Some(src) = el.value().attr("src") {
                push_media(found, src, origin, CandidateHint::VideoTag);
            }
        }
    }
}

fn scan_iframe_sources(found: &mut Discovery, document: &Html, origin: &DocumentRef) {
    let Some(sel) = selector("iframe[src]") else { return };
    for el in document.select(&sel) {
        let Some(src) = el.value().attr("src") else { continue };
        let lower = src.to_ascii_lowercase();
        if PLAYER_MARKERS.iter().any(|m| lower.contains(m)) {
            push_media(found, src, origin, CandidateHint::IframeSrc);
        }
    }
}

fn scan_raw_html(found: &mut Discovery, html: &str, origin: &DocumentRef) {
    let text = html.replace("\\/", "/");
    for m in PAGE_STREAM_RE.find_iter(&text) {
        push_media(found, m.as_str(), origin, CandidateHint::RegexScan);
    }
    for m in PAGE_SUBTITLE_RE.find_iter(&text) {
        push_subtitle(found, m.as_str(), origin, Some(PAGE_LABEL), None);
    }
}

fn scan_inline_scripts(found: &mut Discovery, document: &Html, origin: &DocumentRef) {
    let Some(sel) = selector("script") else { return };
    for el in document.select(&sel) {
        let text: String = el.text().collect();
        let text = text.trim();
        if text.is_empty() {
            continue;
        }

        for cap in SCRIPT_STREAM_RE.captures_iter(text) {
            push_media(found, &cap[1], origin, CandidateHint::ScriptJson);
        }

        let lower = text.to_lowercase();
        if !SUBTITLE_MARKERS.iter().any(|m| lower.contains(m)) {
            continue;
        }
        match serde_json::from_str::<Value>(text) {
            Ok(value) => scan_script_json(found, &value, origin),
            Err(_) => scan_script_patterns(found, text, origin),
        }
    }
}

/// Strict-JSON script: `subtitles: [{url,label,language}]` and `sources: [..]`.
fn scan_script_json(found: &mut Discovery, value: &Value, origin: &DocumentRef) {
    if let Some(subtitles) = value.get("subtitles").and_then(Value::as_array) {
        for sub in subtitles {
            let Some(url) = sub.get("url").and_then(Value::as_str) else { continue };
            push_subtitle(
                found,
                url,
                origin,
                sub.get("label").and_then(Value::as_str),
                sub.get("language").and_then(Value::as_str),
            );
        }
    }
    if let Some(sources) = value.get("sources").and_then(Value::as_array) {
        for source in sources {
            let url = source.as_str().or_else(|| {
                ["src", "file", "url"]
                    .iter()
                    .find_map(|k| source.get(*k).and_then(Value::as_str))
            });
            if let Some(url) = url {
                push_media(found, url, origin, CandidateHint::ScriptJson);
            }
        }
    }
}

/// Non-JSON script: `subtitleUrl = "..."`, `captionFile = "..."`, and bare `.vtt`/`.srt` literals.
fn scan_script_patterns(found: &mut Discovery, text: &str, origin: &DocumentRef) {
    for re in [&*SCRIPT_ASSIGN_RE, &*SCRIPT_SUBTITLE_LITERAL_RE] {
        for cap in re.captures_iter(text) {
            push_subtitle(found, &cap[1], origin, Some(PLAYER_LABEL), None);
        }
    }
}
