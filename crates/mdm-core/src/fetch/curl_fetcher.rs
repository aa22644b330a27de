//! libcurl-backed [`Fetcher`].
//!
//! Runs in the current thread; call from `spawn_blocking` if used from async code.

use std::cell::Cell;
use std::io::Write;
use std::time::Duration;

use curl::easy::Easy;

use super::{ByteProgress, FetchError, FetchOptions, Fetcher, Page};

/// Bytes written plus the final URL after redirects.
struct Transferred {
    bytes: u64,
    effective_url: Option<String>,
}

/// Blocking fetcher with explicit timeouts, a browser User-Agent and no retries.
#[derive(Debug, Clone, Default)]
pub struct CurlFetcher {
    opts: FetchOptions,
}

fn transport(url: &str, source: curl::Error) -> FetchError {
    FetchError::Transport {
        url: url.to_string(),
        source,
    }
}

impl CurlFetcher {
    pub fn new(opts: FetchOptions) -> Self {
        Self { opts }
    }

    fn easy(&self, url: &str, timeout: Duration, track_progress: bool) -> Result<Easy, FetchError> {
        let mut easy = Easy::new();
        let setup = |easy: &mut Easy| -> Result<(), curl::Error> {
            easy.url(url)?;
            easy.useragent(&self.opts.user_agent)?;
            easy.follow_location(true)?;
            easy.max_redirections(10)?;
            easy.connect_timeout(self.opts.connect_timeout)?;
            easy.timeout(timeout)?;
            // 4xx/5xx bodies are never written to the sink.
            easy.fail_on_error(true)?;
            if track_progress {
                easy.progress(true)?;
            }
            Ok(())
        };
        setup(&mut easy).map_err(|e| transport(url, e))?;
        Ok(easy)
    }

    fn perform(
        &self,
        url: &str,
        mut easy: Easy,
        limit: Option<u64>,
        sink: &mut dyn Write,
        mut progress: Option<ByteProgress<'_>>,
    ) -> Result<Transferred, FetchError> {
        let written = Cell::new(0u64);
        let over_limit = Cell::new(false);
        let mut io_error: Option<std::io::Error> = None;
        let track_progress = limit.is_some() || progress.is_some();

        let result = {
            let mut transfer = easy.transfer();
            transfer
                .write_function(|data| {
                    let next = written.get() + data.len() as u64;
                    if limit.is_some_and(|limit| next > limit) {
                        over_limit.set(true);
                        return Ok(0); // abort transfer
                    }
                    if let Err(e) = sink.write_all(data) {
                        io_error = Some(e);
                        return Ok(0);
                    }
                    written.set(next);
                    Ok(data.len())
                })
                .map_err(|e| transport(url, e))?;
            if track_progress {
                transfer
                    .progress_function(|dltotal, dlnow, _, _| {
                        // Announced Content-Length already over the cap: stop before the body.
                        if limit.is_some_and(|limit| dltotal > limit as f64) {
                            over_limit.set(true);
                            return false;
                        }
                        if let Some(cb) = progress.as_deref_mut() {
                            let total = (dltotal > 0.0).then_some(dltotal as u64);
                            cb(dlnow as u64, total);
                        }
                        true
                    })
                    .map_err(|e| transport(url, e))?;
            }
            transfer.perform()
        };

        if over_limit.get() {
            return Err(FetchError::SizeLimitExceeded {
                url: url.to_string(),
                limit: limit.unwrap_or_default(),
            });
        }
        if let Some(source) = io_error {
            return Err(FetchError::Io {
                url: url.to_string(),
                source,
            });
        }
        if let Err(e) = result {
            if e.is_http_returned_error() {
                let status = easy.response_code().unwrap_or(0);
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status,
                });
            }
            return Err(transport(url, e));
        }

        let status = easy.response_code().map_err(|e| transport(url, e))?;
        if !(200..300).contains(&status) {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        let effective_url = easy.effective_url().ok().flatten().map(str::to_string);
        Ok(Transferred {
            bytes: written.get(),
            effective_url,
        })
    }

    fn fetch_small(&self, url: &str) -> Result<(Vec<u8>, Option<String>), FetchError> {
        let easy = self.easy(url, self.opts.page_timeout, true)?;
        let mut body = Vec::new();
        let done = self.perform(url, easy, Some(self.opts.max_page_bytes), &mut body, None)?;
        Ok((body, done.effective_url))
    }
}

impl Fetcher for CurlFetcher {
    fn fetch_page(&self, url: &str) -> Result<Page, FetchError> {
        let (body, effective_url) = self.fetch_small(url)?;
        let final_url = effective_url.unwrap_or_else(|| url.to_string());
        tracing::debug!(url, final_url = %final_url, bytes = body.len(), "fetched page");
        Ok(Page::new(final_url, String::from_utf8_lossy(&body).into_owned()))
    }

    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let (body, _) = self.fetch_small(url)?;
        tracing::debug!(url, bytes = body.len(), "fetched body");
        Ok(body)
    }

    fn stream_to(
        &self,
        url: &str,
        sink: &mut dyn Write,
        limit: Option<u64>,
        progress: ByteProgress<'_>,
    ) -> Result<u64, FetchError> {
        let mut easy = self.easy(url, self.opts.media_timeout, true)?;
        if let Some(size) = self.opts.buffer_size {
            easy.buffer_size(size).map_err(|e| transport(url, e))?;
        }
        let done = self.perform(url, easy, limit, sink, Some(progress))?;
        sink.flush().map_err(|source| FetchError::Io {
            url: url.to_string(),
            source,
        })?;
        tracing::debug!(url, bytes = done.bytes, "streamed body");
        Ok(done.bytes)
    }
}
