//! HTTP fetching: pages, small bodies, and streamed media bytes.
//!
//! Every component that touches the network goes through the [`Fetcher`]
//! trait so the discovery and resolution chains can be driven by fakes in
//! tests. The production implementation is [`CurlFetcher`].

mod curl_fetcher;

pub use curl_fetcher::CurlFetcher;

use std::io::Write;
use std::time::Duration;

use scraper::Html;
use thiserror::Error;

use crate::config::MdmConfig;

/// Failure of a single fetch. Non-fatal at candidate/iframe granularity.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("GET {url} returned HTTP {status}")]
    Status { url: String, status: u32 },
    #[error("GET {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: curl::Error,
    },
    #[error("GET {url} exceeded the size limit of {limit} bytes")]
    SizeLimitExceeded { url: String, limit: u64 },
    #[error("writing body of {url}: {source}")]
    Io {
        url: String,
        #[source]
        source: std::io::Error,
    },
}

/// A fetched HTML document.
#[derive(Debug, Clone)]
pub struct Page {
    /// Final URL after redirects; base for relative links.
    pub url: String,
    pub html: String,
}

impl Page {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
        }
    }

    /// Parses the body into a DOM. Parsing never fails; malformed markup is repaired.
    pub fn document(&self) -> Html {
        Html::parse_document(&self.html)
    }
}

/// Called with `(bytes_done, total_bytes)` while media bytes stream in.
pub type ByteProgress<'a> = &'a mut dyn FnMut(u64, Option<u64>);

/// Blocking HTTP access used by the discovery, resolution and download stages.
///
/// Implementations never retry; a failed request is reported once.
pub trait Fetcher: Send + Sync {
    /// GET a page with the browser identity header; non-2xx is an error.
    fn fetch_page(&self, url: &str) -> Result<Page, FetchError>;

    /// GET a small body (subtitles) into memory.
    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError>;

    /// Stream a body into `sink`, aborting once more than `limit` bytes arrive.
    /// Returns the number of bytes written.
    fn stream_to(
        &self,
        url: &str,
        sink: &mut dyn Write,
        limit: Option<u64>,
        progress: ByteProgress<'_>,
    ) -> Result<u64, FetchError>;
}

/// Request limits shared by every fetch.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub user_agent: String,
    pub connect_timeout: Duration,
    pub page_timeout: Duration,
    pub media_timeout: Duration,
    pub max_page_bytes: u64,
    pub buffer_size: Option<usize>,
}

impl FetchOptions {
    pub fn from_config(cfg: &MdmConfig) -> Self {
        Self {
            user_agent: cfg.user_agent.clone(),
            connect_timeout: cfg.connect_timeout(),
            page_timeout: cfg.page_timeout(),
            media_timeout: cfg.media_timeout(),
            max_page_bytes: cfg.max_page_bytes,
            buffer_size: cfg.download_buffer_bytes,
        }
    }
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self::from_config(&MdmConfig::default())
    }
}
