//! One-level iframe expansion.

use scraper::{Html, Selector};

use super::{CandidateScanner, Discovery, DocumentRef};
use crate::fetch::Fetcher;
use crate::url_model::normalize_url;

/// Fetches every iframe of a depth-0 document and scans it at depth 1.
///
/// Iframes inside a fetched iframe are never followed.
pub struct IframeResolver<'a> {
    fetcher: &'a dyn Fetcher,
    scanner: &'a CandidateScanner,
}

impl<'a> IframeResolver<'a> {
    pub fn new(fetcher: &'a dyn Fetcher, scanner: &'a CandidateScanner) -> Self {
        Self { fetcher, scanner }
    }

    /// Absolute iframe sources of `document`, in document order, without duplicates.
    pub fn iframe_sources(document: &Html, base_url: &str) -> Vec<String> {
        let Ok(sel) = Selector::parse("iframe[src]") else {
            return Vec::new();
        };
        let mut out: Vec<String> = Vec::new();
        for el in document.select(&sel) {
            let Some(src) = el.value().attr("src") else { continue };
            match normalize_url(src, base_url) {
                Some(url) if !out.contains(&url) => out.push(url),
                Some(_) => {}
                None => tracing::debug!(src, "skipping iframe with unusable src"),
            }
        }
        out
    }

    /// Scans each iframe of the root document and merges the results.
    /// A failed iframe fetch is logged and skipped.
    pub fn expand(&self, root: &Html, root_url: &str) -> Discovery {
        let mut found = Discovery::default();
        for src in Self::iframe_sources(root, root_url) {
            let page = match self.fetcher.fetch_page(&src) {
                Ok(page) => page,
                Err(e) => {
                    tracing::warn!(iframe = %src, error = %e, "iframe fetch failed; skipping");
                    continue;
                }
            };
            let document = page.document();
            let origin = DocumentRef::nested(page.url.clone());
            let nested = self.scanner.scan(&page.html, &document, &origin);
            tracing::debug!(
                iframe = %src,
                media = nested.media.len(),
                subtitles = nested.subtitles.len(),
                "scanned iframe"
            );
            found.merge(nested);
        }
        found
    }
}
