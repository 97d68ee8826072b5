//! At-least-once job queue: payload types, the backend trait and workers.
//!
//! # Architecture
//!
//! ```text
//! trigger ──enqueue──► [podcast] ──Worker<FeedFetchConsumer>──► reconcile + fan-out
//!                                                                   │
//!                       [og] ◄──────────────enqueue─────────────────┘
//!                         │
//!                         └──Worker<ImageEnrichmentConsumer>──► scrape + persist
//! ```
//!
//! Each queue is drained by its own [`Worker`] with its own concurrency, so the
//! two job types never block each other. A claimed job is leased; if the lease
//! expires before acknowledgement the job becomes claimable again, which is
//! where at-least-once delivery (and the need for idempotent handlers) comes from.

mod job;
mod worker;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use crate::storage::Database;

pub use job::{
    ClaimedJob, EnrichmentJob, FailDisposition, FeedJob, JobError, JobOptions, ENRICHMENT_QUEUE,
    FEED_QUEUE,
};
pub use worker::{JobHandler, Worker, WorkerConfig};

/// Backend contract of the job queue.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Add a job, returning its id
    async fn enqueue(
        &self,
        queue: &str,
        payload: &serde_json::Value,
        options: JobOptions,
    ) -> Result<i64>;

    /// Lease the next available job of `queue`, if any
    async fn claim(&self, queue: &str, lease: Duration) -> Result<Option<ClaimedJob>>;

    /// Acknowledge success
    async fn complete(&self, job_id: i64) -> Result<()>;

    /// Acknowledge failure; `retryable` allows remaining attempts to be used
    async fn fail(&self, job_id: i64, reason: &str, retryable: bool) -> Result<FailDisposition>;
}

/// Serialize `job` and add it to `queue`.
pub async fn enqueue_job<T: Serialize + Sync>(
    backend: &dyn JobQueue,
    queue: &str,
    job: &T,
    options: JobOptions,
) -> Result<i64> {
    let payload = serde_json::to_value(job)?;
    backend.enqueue(queue, &payload, options).await
}

#[async_trait]
impl JobQueue for Database {
    async fn enqueue(
        &self,
        queue: &str,
        payload: &serde_json::Value,
        options: JobOptions,
    ) -> Result<i64> {
        self.enqueue_job(queue, &payload.to_string(), options).await
    }

    async fn claim(&self, queue: &str, lease: Duration) -> Result<Option<ClaimedJob>> {
        self.claim_job(queue, lease).await
    }

    async fn complete(&self, job_id: i64) -> Result<()> {
        self.complete_job(job_id).await
    }

    async fn fail(&self, job_id: i64, reason: &str, retryable: bool) -> Result<FailDisposition> {
        self.fail_job(job_id, reason, retryable).await
    }
}
