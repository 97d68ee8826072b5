use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::EntityKind;

/// Queue consumed by the feed reconciliation worker
pub const FEED_QUEUE: &str = "podcast";

/// Queue consumed by the preview-image enrichment worker
pub const ENRICHMENT_QUEUE: &str = "og";

/// Payload of a feed-fetch job: `{ podcast, url }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedJob {
    pub podcast: i64,
    pub url: String,
}

/// Payload of an enrichment job: `{ type, url, podcast? }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentJob {
    #[serde(rename = "type", default)]
    pub kind: EntityKind,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub podcast: Option<i64>,
}

/// Per-job delivery options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobOptions {
    /// Delete the job once it completes instead of keeping it as completed
    pub remove_on_complete: bool,
    /// Delete the job once it finally fails instead of keeping it as failed
    pub remove_on_fail: bool,
    /// Deliveries allowed for retryable failures (at least 1)
    pub max_attempts: u32,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            remove_on_complete: false,
            remove_on_fail: false,
            max_attempts: 1,
        }
    }
}

impl JobOptions {
    /// Single attempt, not retained after completion or failure.
    pub fn discard() -> Self {
        Self {
            remove_on_complete: true,
            remove_on_fail: true,
            max_attempts: 1,
        }
    }
}

/// A job leased to one consumer
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub id: i64,
    pub queue: String,
    /// JSON payload as enqueued
    pub payload: String,
    /// Deliveries so far, including this one
    pub attempts: i64,
    pub max_attempts: i64,
}

/// What the queue did with a failed job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailDisposition {
    /// Back to waiting for another attempt
    Requeued,
    /// Kept with status failed
    Failed,
    /// Deleted (remove on fail)
    Removed,
}

/// Tagged failure returned by job handlers.
///
/// The worker translates it into the queue's acknowledgement: the error text
/// is stored on the job and [`JobError::is_retryable`] decides whether any
/// remaining attempts are used.
#[derive(Debug, Error)]
pub enum JobError {
    /// Referenced podcast or entity does not exist
    #[error("{0} not found")]
    NotFound(String),
    /// Feed could not be fetched or parsed
    #[error("feed fetch failed: {0}")]
    Fetch(String),
    /// Entity store read or write failed
    #[error("storage error: {0}")]
    Storage(String),
    /// Preview scrape failed
    #[error("scrape failed: {0}")]
    Scrape(String),
    /// Payload did not decode into the handler's job type
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

impl JobError {
    pub fn is_retryable(&self) -> bool {
        match self {
            JobError::Fetch(_) | JobError::Storage(_) | JobError::Scrape(_) => true,
            JobError::NotFound(_) | JobError::InvalidPayload(_) => false,
        }
    }

    /// Short machine-readable tag for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::NotFound(_) => "not_found",
            JobError::Fetch(_) => "fetch",
            JobError::Storage(_) => "storage",
            JobError::Scrape(_) => "scrape",
            JobError::InvalidPayload(_) => "invalid_payload",
        }
    }
}
