use async_trait::async_trait;
use futures::StreamExt;
use scraper::{Html, Selector};
use std::time::Duration;
use url::Url;

use super::{ScrapeClient, ScrapeError, ScrapeOptions, ScrapeOutcome};
use crate::util::check_url;

const MAX_PAGE_SIZE: usize = 2 * 1024 * 1024; // 2MB

/// Meta keys consulted for the preview image, in priority order
const IMAGE_KEYS: [&str; 4] = [
    "og:image",
    "og:image:secure_url",
    "og:image:url",
    "twitter:image",
];

/// Open Graph scraper over plain HTTP.
///
/// Redirects are followed by hand so that every hop passes the SSRF policy
/// in [`check_url`]. `allow_private_hosts` lifts that policy (local
/// development and tests).
#[derive(Clone)]
pub struct OgScraper {
    client: reqwest::Client,
    allow_private_hosts: bool,
}

impl OgScraper {
    /// Build a scraper with its own redirect-less client.
    pub fn new(allow_private_hosts: bool) -> Result<Self, ScrapeError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("feedcast/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            allow_private_hosts,
        })
    }

    fn check(&self, url: &Url) -> Result<(), ScrapeError> {
        if self.allow_private_hosts {
            match url.scheme() {
                "http" | "https" => Ok(()),
                other => Err(ScrapeError::InvalidUrl(
                    crate::util::UrlValidationError::UnsupportedScheme(other.to_owned()),
                )),
            }
        } else {
            check_url(url).map_err(ScrapeError::from)
        }
    }

    async fn fetch_page(
        &self,
        url: &str,
        options: &ScrapeOptions,
    ) -> Result<Option<String>, ScrapeError> {
        let mut current = Url::parse(url).map_err(|e| ScrapeError::InvalidUrl(e.into()))?;
        let mut hops = 0;

        loop {
            self.check(&current)?;

            let response = self
                .client
                .get(current.clone())
                .header(reqwest::header::ACCEPT, "text/html,application/xhtml+xml")
                .send()
                .await?;
            let status = response.status();

            if status.is_redirection() {
                if !options.follow_redirects {
                    return Err(ScrapeError::HttpStatus(status.as_u16()));
                }
                if hops >= options.max_redirects {
                    return Err(ScrapeError::TooManyRedirects(hops));
                }
                let next = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|location| current.join(location).ok())
                    .ok_or(ScrapeError::BadRedirect)?;
                tracing::debug!(from = %current, to = %next, hop = hops + 1, "Following redirect");
                current = next;
                hops += 1;
                continue;
            }

            if !status.is_success() {
                return Err(ScrapeError::HttpStatus(status.as_u16()));
            }

            if !is_html(&response) {
                tracing::debug!(url = %current, "Not an HTML page, nothing to scrape");
                return Ok(None);
            }

            let body = read_limited_text(response, MAX_PAGE_SIZE).await?;
            return Ok(extract_preview_image(&body, &current));
        }
    }
}

#[async_trait]
impl ScrapeClient for OgScraper {
    async fn scrape(&self, url: &str, options: &ScrapeOptions) -> ScrapeOutcome {
        match tokio::time::timeout(options.timeout, self.fetch_page(url, options)).await {
            Ok(Ok(Some(image))) => ScrapeOutcome::Found(image),
            Ok(Ok(None)) => ScrapeOutcome::NotFound,
            Ok(Err(e)) => ScrapeOutcome::Failed(e),
            Err(_) => ScrapeOutcome::Failed(ScrapeError::Timeout(options.timeout)),
        }
    }
}

fn is_html(response: &reqwest::Response) -> bool {
    match response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
    {
        Some(content_type) => {
            let content_type = content_type.to_ascii_lowercase();
            content_type.contains("html") || content_type.starts_with("text/")
        }
        // Servers that omit the header still often serve HTML
        None => true,
    }
}

async fn read_limited_text(response: reqwest::Response, limit: usize) -> Result<String, ScrapeError> {
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(ScrapeError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(ScrapeError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Find the preview image advertised by an HTML page, resolved against `page_url`.
///
/// Both `property=` (Open Graph) and `name=` (Twitter cards) attributes are
/// accepted; empty `content` values are ignored.
pub fn extract_preview_image(html: &str, page_url: &Url) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("meta[content]").ok()?;

    let metas: Vec<(String, &str)> = document
        .select(&selector)
        .filter_map(|el| {
            let element = el.value();
            let key = element.attr("property").or_else(|| element.attr("name"))?;
            let content = element.attr("content")?.trim();
            if content.is_empty() {
                return None;
            }
            Some((key.trim().to_ascii_lowercase(), content))
        })
        .collect();

    IMAGE_KEYS
        .iter()
        .find_map(|wanted| metas.iter().find(|(key, _)| key.as_str() == *wanted))
        .and_then(|(_, content)| page_url.join(content).ok())
        .map(String::from)
}
