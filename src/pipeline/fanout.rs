use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::Arc;

use crate::queue::{enqueue_job, EnrichmentJob, JobOptions, JobQueue, ENRICHMENT_QUEUE};
use crate::services::{
    Activity, ActivityFeed, CollectionsSync, SearchDocument, SearchIndex, PODCAST_FEED_GROUP,
};
use crate::storage::{EntityKind, Episode};

/// Largest activity batch the feed service accepts in one call
pub const DEFAULT_ACTIVITY_BATCH: usize = 100;

/// Per-call tallies of one fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanOutReport {
    pub indexed: usize,
    pub index_failures: usize,
    pub enqueued: usize,
    pub enqueue_failures: usize,
    pub batches_published: usize,
    pub batches_failed: usize,
    pub sync_failures: usize,
}

/// Propagates newly created episodes downstream.
///
/// Every call is independent: a failure is logged, counted in the report and
/// never stops the remaining calls.
#[derive(Clone)]
pub struct FanOut {
    search: Arc<dyn SearchIndex>,
    queue: Arc<dyn JobQueue>,
    activity: Arc<dyn ActivityFeed>,
    collections: Arc<dyn CollectionsSync>,
    batch_size: usize,
    concurrency: usize,
}

impl FanOut {
    pub fn new(
        search: Arc<dyn SearchIndex>,
        queue: Arc<dyn JobQueue>,
        activity: Arc<dyn ActivityFeed>,
        collections: Arc<dyn CollectionsSync>,
    ) -> Self {
        Self {
            search,
            queue,
            activity,
            collections,
            batch_size: DEFAULT_ACTIVITY_BATCH,
            concurrency: 8,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Fan out `episodes`, which must all have been created by this pass.
    pub async fn fan_out(&self, podcast_id: i64, episodes: &[Episode]) -> FanOutReport {
        let mut report = FanOutReport::default();
        if episodes.is_empty() {
            return report;
        }

        // Built up front: the stream must not hold a borrowing closure across
        // the await, or the handler future stops being Send.
        let pending: Vec<_> = episodes
            .iter()
            .map(|episode| self.propagate(episode))
            .collect();
        let outcomes: Vec<(bool, bool)> = stream::iter(pending)
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for (indexed, enqueued) in outcomes {
            if indexed {
                report.indexed += 1;
            } else {
                report.index_failures += 1;
            }
            if enqueued {
                report.enqueued += 1;
            } else {
                report.enqueue_failures += 1;
            }
        }

        let now = Utc::now();
        for (index, batch) in episodes.chunks(self.batch_size).enumerate() {
            let activities: Vec<Activity> = batch
                .iter()
                .map(|episode| Activity::new_episode(episode, now))
                .collect();

            match self
                .activity
                .add_activities(PODCAST_FEED_GROUP, podcast_id, &activities)
                .await
            {
                Ok(()) => {
                    report.batches_published += 1;
                    if let Err(e) = self.collections.sync_podcast(podcast_id).await {
                        tracing::warn!(
                            podcast_id = podcast_id,
                            error = %e,
                            "Collections sync failed"
                        );
                        report.sync_failures += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        podcast_id = podcast_id,
                        batch = index,
                        size = activities.len(),
                        error = %e,
                        "Activity batch publish failed"
                    );
                    report.batches_failed += 1;
                }
            }
        }

        tracing::debug!(podcast_id = podcast_id, ?report, "Fan-out finished");
        report
    }

    /// Search write and enrichment enqueue for one episode, run together.
    async fn propagate(&self, episode: &Episode) -> (bool, bool) {
        let document = SearchDocument::for_episode(episode);
        let job = EnrichmentJob {
            kind: EntityKind::Episode,
            url: episode.url.clone(),
            podcast: None,
        };

        let (indexed, enqueued) = tokio::join!(
            self.search.index(&document),
            enqueue_job(self.queue.as_ref(), ENRICHMENT_QUEUE, &job, JobOptions::discard()),
        );

        if let Err(e) = &indexed {
            tracing::warn!(episode_id = episode.id, error = %e, "Search index write failed");
        }
        if let Err(e) = &enqueued {
            tracing::warn!(episode_id = episode.id, error = %e, "Enrichment enqueue failed");
        }

        (indexed.is_ok(), enqueued.is_ok())
    }
}
