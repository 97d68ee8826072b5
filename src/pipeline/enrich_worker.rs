use async_trait::async_trait;
use std::sync::Arc;

use crate::queue::{EnrichmentJob, JobError, JobHandler, ENRICHMENT_QUEUE};
use crate::scrape::{ScrapeClient, ScrapeOptions, ScrapeOutcome};
use crate::services::{EntityStore, ErrorContext, ErrorReporter};
use crate::util::normalize_url;

/// Why an enrichment job finished without scraping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No entity of the job's type matches its URL
    NotFound,
    /// The entity already has a preview image
    AlreadyEnriched,
    /// Audio files have no page to scrape
    AudioFile,
}

/// Successful results of an enrichment job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrichOutcome {
    Skipped(SkipReason),
    /// Scraped, but the page advertises no image
    NoImage,
    /// Image persisted (normalized URL)
    Stored(String),
    /// Another delivery stored an image between lookup and write
    LostRace,
}

/// Consumer of the `og` queue.
pub struct ImageEnrichmentConsumer {
    store: Arc<dyn EntityStore>,
    scraper: Arc<dyn ScrapeClient>,
    reporter: Arc<dyn ErrorReporter>,
    options: ScrapeOptions,
}

impl ImageEnrichmentConsumer {
    pub fn new(
        store: Arc<dyn EntityStore>,
        scraper: Arc<dyn ScrapeClient>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        Self {
            store,
            scraper,
            reporter,
            options: ScrapeOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ScrapeOptions) -> Self {
        self.options = options;
        self
    }

    pub async fn enrich(&self, job: EnrichmentJob) -> Result<EnrichOutcome, JobError> {
        // The job URL is used as stored; entities normalize on creation
        let url = job.url.as_str();
        let context = ErrorContext {
            queue: ENRICHMENT_QUEUE,
            url: job.url.clone(),
            podcast_id: job.podcast,
            kind: Some(job.kind.as_str()),
        };
        tracing::info!(kind = %job.kind, url = %url, "Processing preview image");

        let target = match self.store.find_enrichment_target(job.kind, url).await {
            Ok(Some(target)) => target,
            Ok(None) => {
                tracing::debug!(kind = %job.kind, url = %url, "No matching entity, skipping");
                return Ok(EnrichOutcome::Skipped(SkipReason::NotFound));
            }
            Err(e) => {
                self.reporter.report(&e, &context);
                return Err(JobError::Storage(e.to_string()));
            }
        };

        if target.og_image.is_some() {
            tracing::debug!(kind = %job.kind, id = target.id, "Preview image already set");
            return Ok(EnrichOutcome::Skipped(SkipReason::AlreadyEnriched));
        }
        if url.ends_with(".mp3") {
            tracing::debug!(url = %url, "Audio URL, skipping scrape");
            return Ok(EnrichOutcome::Skipped(SkipReason::AudioFile));
        }

        let image = match self.scraper.scrape(url, &self.options).await {
            ScrapeOutcome::Found(image) => image,
            ScrapeOutcome::NotFound => {
                tracing::info!(url = %url, "Didn't find image");
                return Ok(EnrichOutcome::NoImage);
            }
            ScrapeOutcome::Failed(e) => {
                self.reporter.report(&e, &context);
                return Err(JobError::Scrape(e.to_string()));
            }
        };

        let image = match normalize_url(&image) {
            Ok(image) => image,
            Err(e) => {
                self.reporter.report(&e, &context);
                return Err(JobError::Scrape(e.to_string()));
            }
        };

        match self.store.set_og_image(target.kind, target.id, &image).await {
            Ok(true) => {
                tracing::info!(kind = %job.kind, id = target.id, image = %image, "Found an image");
                Ok(EnrichOutcome::Stored(image))
            }
            Ok(false) => {
                tracing::debug!(kind = %job.kind, id = target.id, "Preview image set concurrently");
                Ok(EnrichOutcome::LostRace)
            }
            Err(e) => {
                self.reporter.report(&e, &context);
                Err(JobError::Storage(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl JobHandler for ImageEnrichmentConsumer {
    type Job = EnrichmentJob;

    fn queue(&self) -> &'static str {
        ENRICHMENT_QUEUE
    }

    async fn handle(&self, job: EnrichmentJob) -> Result<(), JobError> {
        self.enrich(job).await.map(|_| ())
    }
}
