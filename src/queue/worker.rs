use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::Instrument;

use super::{ClaimedJob, FailDisposition, JobError, JobQueue};

/// A consumer of one queue.
///
/// Handlers return a result instead of acknowledging jobs themselves; the
/// [`Worker`] turns it into complete/fail calls on the backend.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    /// Payload type the queue's JSON decodes into
    type Job: DeserializeOwned + Send + 'static;

    /// Name of the queue this handler consumes
    fn queue(&self) -> &'static str;

    async fn handle(&self, job: Self::Job) -> Result<(), JobError>;
}

/// Configuration for a queue worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Jobs processed in parallel
    pub concurrency: usize,
    /// Sleep between polls when the queue is empty
    pub poll_interval: Duration,
    /// How long a claimed job stays invisible to other consumers
    pub lease: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            poll_interval: Duration::from_millis(500),
            lease: Duration::from_secs(300),
        }
    }
}

/// Polls one queue and runs its handler with bounded concurrency.
pub struct Worker<H: JobHandler> {
    queue: Arc<dyn JobQueue>,
    handler: Arc<H>,
    config: WorkerConfig,
}

impl<H: JobHandler> Worker<H> {
    pub fn new(queue: Arc<dyn JobQueue>, handler: Arc<H>, config: WorkerConfig) -> Self {
        Self {
            queue,
            handler,
            config,
        }
    }

    /// Run until `shutdown` flips to true, then wait for in-flight jobs.
    ///
    /// A semaphore permit is taken before each claim, so at most
    /// `concurrency` jobs are leased by this worker at any time.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let queue_name = self.handler.queue();
        let concurrency = self.config.concurrency.max(1);
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut tasks = JoinSet::new();

        tracing::info!(queue = queue_name, concurrency, "Worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            while let Some(finished) = tasks.try_join_next() {
                if let Err(e) = finished {
                    tracing::error!(queue = queue_name, error = %e, "Job task panicked");
                }
            }

            let permit = tokio::select! {
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = shutdown.changed() => break,
            };

            match self.queue.claim(queue_name, self.config.lease).await {
                Ok(Some(job)) => {
                    let queue = Arc::clone(&self.queue);
                    let handler = Arc::clone(&self.handler);
                    tasks.spawn(async move {
                        let _permit = permit;
                        process_job(queue.as_ref(), handler.as_ref(), job).await;
                    });
                }
                Ok(None) => {
                    drop(permit);
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                        _ = shutdown.changed() => {}
                    }
                }
                Err(e) => {
                    drop(permit);
                    tracing::warn!(queue = queue_name, error = %e, "Failed to claim job, backing off");
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.poll_interval * 4) => {}
                        _ = shutdown.changed() => {}
                    }
                }
            }
        }

        tracing::info!(
            queue = queue_name,
            in_flight = tasks.len(),
            "Worker stopping, waiting for in-flight jobs"
        );
        while let Some(finished) = tasks.join_next().await {
            if let Err(e) = finished {
                tracing::error!(queue = queue_name, error = %e, "Job task panicked");
            }
        }
        tracing::info!(queue = queue_name, "Worker stopped");
    }

    /// Process jobs until the queue has nothing claimable, returning how many
    /// deliveries were handled.
    ///
    /// Jobs are claimed in rounds of up to `concurrency` and each round runs
    /// concurrently. Requeued failures are picked up again by later rounds.
    pub async fn drain(&self) -> anyhow::Result<usize> {
        let queue_name = self.handler.queue();
        let concurrency = self.config.concurrency.max(1);
        let mut processed = 0;

        loop {
            let mut round = Vec::with_capacity(concurrency);
            while round.len() < concurrency {
                match self.queue.claim(queue_name, self.config.lease).await? {
                    Some(job) => round.push(job),
                    None => break,
                }
            }
            if round.is_empty() {
                return Ok(processed);
            }
            processed += round.len();

            futures::future::join_all(
                round
                    .into_iter()
                    .map(|job| process_job(self.queue.as_ref(), self.handler.as_ref(), job)),
            )
            .await;
        }
    }
}

/// Decode, handle and acknowledge one delivery.
async fn process_job<H: JobHandler>(queue: &dyn JobQueue, handler: &H, job: ClaimedJob) {
    let span = tracing::info_span!(
        "job",
        queue = %job.queue,
        job_id = job.id,
        attempt = job.attempts
    );

    async move {
        let result = match serde_json::from_str::<H::Job>(&job.payload) {
            Ok(payload) => handler.handle(payload).await,
            Err(e) => Err(JobError::InvalidPayload(e.to_string())),
        };

        match result {
            Ok(()) => {
                if let Err(e) = queue.complete(job.id).await {
                    // The lease will expire and the job is delivered again
                    tracing::error!(error = %e, "Failed to acknowledge completed job");
                }
            }
            Err(err) => {
                tracing::warn!(kind = err.kind(), error = %err, "Job failed");
                match queue.fail(job.id, &err.to_string(), err.is_retryable()).await {
                    Ok(FailDisposition::Requeued) => {
                        tracing::debug!(max_attempts = job.max_attempts, "Job requeued")
                    }
                    Ok(disposition) => tracing::debug!(?disposition, "Job finished as failed"),
                    Err(e) => tracing::error!(error = %e, "Failed to record job failure"),
                }
            }
        }
    }
    .instrument(span)
    .await
}
