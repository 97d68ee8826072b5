use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use super::{FanOut, FanOutReport, ReconcileReport, Reconciler};
use crate::feed::FeedSource;
use crate::queue::{FeedJob, JobError, JobHandler, FEED_QUEUE};
use crate::services::{EntityStore, ErrorContext, ErrorReporter};

/// What one feed job did.
#[derive(Debug, Clone, Default)]
pub struct FeedReport {
    pub reconcile: ReconcileReport,
    pub fan_out: FanOutReport,
}

/// Consumer of the `podcast` queue: fetch, reconcile, fan out, stamp.
pub struct FeedFetchConsumer {
    store: Arc<dyn EntityStore>,
    source: Arc<dyn FeedSource>,
    reconciler: Reconciler,
    fan_out: FanOut,
    reporter: Arc<dyn ErrorReporter>,
}

impl FeedFetchConsumer {
    pub fn new(
        store: Arc<dyn EntityStore>,
        source: Arc<dyn FeedSource>,
        reconciler: Reconciler,
        fan_out: FanOut,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        Self {
            store,
            source,
            reconciler,
            fan_out,
            reporter,
        }
    }

    pub async fn process(&self, job: FeedJob) -> Result<FeedReport, JobError> {
        tracing::info!(podcast_id = job.podcast, url = %job.url, "Processing podcast");

        let podcast = self
            .store
            .find_podcast(job.podcast)
            .await
            .map_err(|e| JobError::Storage(e.to_string()))?
            .ok_or_else(|| JobError::NotFound(format!("podcast {}", job.podcast)))?;

        let document = match self.source.fetch(&job.url).await {
            Ok(document) => document,
            Err(e) => {
                tracing::error!(
                    podcast_id = podcast.id,
                    url = %job.url,
                    error = %e,
                    "Feed fetch failed"
                );
                self.reporter.report(
                    &e,
                    &ErrorContext {
                        queue: FEED_QUEUE,
                        url: job.url.clone(),
                        podcast_id: Some(podcast.id),
                        kind: None,
                    },
                );
                self.stamp_last_scraped(podcast.id).await;
                return Err(JobError::Fetch(e.to_string()));
            }
        };

        let reconcile = self
            .reconciler
            .reconcile(podcast.id, document.episodes)
            .await;
        let fan_out = self
            .fan_out
            .fan_out(podcast.id, reconcile.new_episodes())
            .await;

        self.stamp_last_scraped(podcast.id).await;

        tracing::info!(
            podcast_id = podcast.id,
            url = %job.url,
            created = reconcile.created.len(),
            updated = reconcile.updated,
            failed = reconcile.failed,
            skipped = reconcile.skipped,
            batches = fan_out.batches_published,
            "Completed podcast"
        );

        Ok(FeedReport { reconcile, fan_out })
    }

    /// Failure here is logged only; it never changes the job outcome.
    async fn stamp_last_scraped(&self, podcast_id: i64) {
        if let Err(e) = self.store.mark_podcast_scraped(podcast_id, Utc::now()).await {
            tracing::warn!(podcast_id = podcast_id, error = %e, "Failed to update lastScraped");
        }
    }
}

#[async_trait]
impl JobHandler for FeedFetchConsumer {
    type Job = FeedJob;

    fn queue(&self) -> &'static str {
        FEED_QUEUE
    }

    async fn handle(&self, job: FeedJob) -> Result<(), JobError> {
        self.process(job).await.map(|_| ())
    }
}
