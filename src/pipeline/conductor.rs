use anyhow::Result;
use chrono::{Duration, Utc};
use std::collections::HashSet;

use crate::queue::{enqueue_job, FeedJob, JobOptions, JobQueue, FEED_QUEUE};
use crate::storage::Database;

/// Feed jobs are kept on failure for inspection, dropped on success
pub const FEED_JOB_OPTIONS: JobOptions = JobOptions {
    remove_on_complete: true,
    remove_on_fail: false,
    max_attempts: 1,
};

/// Upper bound on podcasts scheduled per conductor run
const MAX_SCHEDULED: i64 = 10_000;

/// Enqueue a feed job for every podcast that is due.
///
/// A podcast is due when it was never scraped or was last scraped more than
/// `older_than` ago. Podcasts that already have a waiting feed job are left
/// alone. Returns the number of jobs enqueued.
pub async fn enqueue_due_podcasts(
    db: &Database,
    queue: &dyn JobQueue,
    older_than: Duration,
) -> Result<usize> {
    let cutoff = Utc::now() - older_than;
    let due = db.get_podcasts_due(cutoff, MAX_SCHEDULED).await?;

    let pending: HashSet<i64> = db
        .waiting_payloads(FEED_QUEUE)
        .await?
        .iter()
        .filter_map(|payload| serde_json::from_str::<FeedJob>(payload).ok())
        .map(|job| job.podcast)
        .collect();

    let mut enqueued = 0;
    for podcast in due {
        if pending.contains(&podcast.id) {
            tracing::debug!(podcast_id = podcast.id, "Feed job already waiting");
            continue;
        }
        let job = FeedJob {
            podcast: podcast.id,
            url: podcast.feed_url,
        };
        enqueue_job(queue, FEED_QUEUE, &job, FEED_JOB_OPTIONS).await?;
        enqueued += 1;
    }

    tracing::info!(enqueued = enqueued, pending = pending.len(), "Scheduled due podcasts");
    Ok(enqueued)
}
