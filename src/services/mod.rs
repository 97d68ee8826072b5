//! Collaborators the pipeline talks to, expressed as traits.
//!
//! Every worker receives these as `Arc<dyn Trait>` built once in `main`.
//! Production implementations live next to the traits:
//!
//! - [`EntityStore`] is implemented by [`Database`](crate::storage::Database)
//! - [`SearchIndex`], [`ActivityFeed`] and [`CollectionsSync`] by the JSON
//!   adapters in [`http`]
//! - [`ErrorReporter`] by [`TracingReporter`]

mod http;
mod reporter;
mod store;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::storage::{EnrichmentTarget, EntityKind, Episode, EpisodeUpsert, Podcast, UpsertOutcome};

pub use http::{HttpActivityFeed, HttpCollectionsSync, HttpSearchIndex};
pub use reporter::{ErrorContext, ErrorReporter, TracingReporter};

/// Feed group activities for podcasts are published to
pub const PODCAST_FEED_GROUP: &str = "podcast";

/// Verb carried by every new-episode activity
pub const EPISODE_VERB: &str = "podcast_episode";

/// Persistence operations the workers need.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn find_podcast(&self, podcast_id: i64) -> Result<Option<Podcast>>;

    /// Stamp the podcast's last scrape time
    async fn mark_podcast_scraped(&self, podcast_id: i64, at: DateTime<Utc>) -> Result<()>;

    /// Atomic find-or-create-or-update keyed by (podcast, url)
    async fn upsert_episode(&self, podcast_id: i64, episode: &EpisodeUpsert)
        -> Result<UpsertOutcome>;

    /// Look up the entity an enrichment job points at
    async fn find_enrichment_target(
        &self,
        kind: EntityKind,
        url: &str,
    ) -> Result<Option<EnrichmentTarget>>;

    /// Set the preview image if none is stored yet; false when nothing changed
    async fn set_og_image(&self, kind: EntityKind, id: i64, image_url: &str) -> Result<bool>;
}

/// Search projection of a new episode
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchDocument {
    #[serde(rename = "_id")]
    pub id: i64,
    pub description: Option<String>,
    pub podcast: i64,
    pub publication_date: Option<DateTime<Utc>>,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
}

impl SearchDocument {
    pub fn for_episode(episode: &Episode) -> Self {
        Self {
            id: episode.id,
            description: episode.description.clone(),
            podcast: episode.podcast_id,
            publication_date: episode.publication_date,
            title: episode.title.clone(),
            kind: "episode",
        }
    }
}

#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn index(&self, document: &SearchDocument) -> Result<()>;
}

/// One record of the social activity feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Activity {
    pub actor: String,
    pub foreign_id: String,
    pub object: String,
    /// ISO 8601
    pub time: String,
    pub verb: String,
}

impl Activity {
    /// New-episode activity; `time` falls back to `now` for undated episodes.
    pub fn new_episode(episode: &Episode, now: DateTime<Utc>) -> Self {
        let time = episode.publication_date.unwrap_or(now);
        Self {
            actor: episode.podcast_id.to_string(),
            foreign_id: format!("episodes:{}", episode.id),
            object: episode.id.to_string(),
            time: time.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            verb: EPISODE_VERB.to_string(),
        }
    }
}

#[async_trait]
pub trait ActivityFeed: Send + Sync {
    /// Publish a batch of activities to feed `group:id` in one call
    async fn add_activities(&self, group: &str, id: i64, activities: &[Activity]) -> Result<()>;
}

/// Keeps the external collections service in step with a podcast's episodes
#[async_trait]
pub trait CollectionsSync: Send + Sync {
    async fn sync_podcast(&self, podcast_id: i64) -> Result<()>;
}
