//! Social preview metadata scraping.
//!
//! [`ScrapeClient`] is the seam the enrichment worker depends on; [`OgScraper`]
//! is the HTTP implementation. A scrape never returns an `Err`: transport and
//! policy failures come back as [`ScrapeOutcome::Failed`] so callers must
//! decide explicitly what a failure means for their job.

mod og;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::util::UrlValidationError;

pub use og::{extract_preview_image, OgScraper};

/// Bounds for a single scrape call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeOptions {
    pub follow_redirects: bool,
    pub max_redirects: usize,
    /// Budget for the whole call, redirects included
    pub timeout: Duration,
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self {
            follow_redirects: true,
            max_redirects: 20,
            timeout: Duration::from_millis(3000),
        }
    }
}

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] UrlValidationError),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
    #[error("Stopped after {0} redirects")]
    TooManyRedirects(usize),
    #[error("Redirect without a usable Location header")]
    BadRedirect,
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
}

/// Result of one scrape.
#[derive(Debug)]
pub enum ScrapeOutcome {
    /// Absolute URL of the preview image
    Found(String),
    /// Page fetched but it advertises no preview image
    NotFound,
    Failed(ScrapeError),
}

#[async_trait]
pub trait ScrapeClient: Send + Sync {
    async fn scrape(&self, url: &str, options: &ScrapeOptions) -> ScrapeOutcome;
}
