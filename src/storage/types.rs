use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with operator-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another worker process holds a lock the migration could not wait out
    #[error("Database is locked by another process. Retry once it has finished migrating.")]
    Locked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_message(&err.to_string()) {
            return DatabaseError::Locked;
        }
        DatabaseError::Other(err)
    }
}

/// SQLITE_BUSY (5), SQLITE_LOCKED (6), SQLITE_CANTOPEN (14)
pub(crate) fn is_lock_message(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("sqlite_busy")
        || message.contains("sqlite_locked")
        || message.contains("unable to open database file")
}

// ============================================================================
// Entity Kinds
// ============================================================================

/// The closed set of entities an enrichment job can target.
///
/// Job payloads carry the kind as a free-form `type` string: `"episode"` and
/// `"podcast"` select those stores, anything else (or a missing field) falls
/// back to [`EntityKind::Article`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Episode,
    Podcast,
    #[default]
    #[serde(other)]
    Article,
}

impl EntityKind {
    /// Table holding entities of this kind.
    pub fn table(self) -> &'static str {
        match self {
            EntityKind::Episode => "episodes",
            EntityKind::Podcast => "podcasts",
            EntityKind::Article => "articles",
        }
    }

    /// Column an enrichment job's `url` is matched against.
    ///
    /// Podcasts are enriched from their website, not their feed URL.
    pub fn key_column(self) -> &'static str {
        match self {
            EntityKind::Podcast => "link",
            EntityKind::Episode | EntityKind::Article => "url",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Episode => "episode",
            EntityKind::Podcast => "podcast",
            EntityKind::Article => "article",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Input Types
// ============================================================================

/// Media attachment of an episode as advertised by the feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enclosure {
    pub url: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
}

/// One episode as it comes out of the feed parser, before reconciliation
#[derive(Debug, Clone, PartialEq)]
pub struct RawEpisode {
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    /// Duration in seconds
    pub duration: Option<i64>,
    pub publication_date: Option<DateTime<Utc>>,
    pub enclosure: Option<Enclosure>,
    pub link: Option<String>,
    pub image: Option<String>,
}

/// Mutable episode fields written by the reconciler's upsert.
///
/// `url` must already be normalized; it is part of the (podcast, url) key.
#[derive(Debug, Clone)]
pub struct EpisodeUpsert {
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    pub duration: Option<i64>,
    pub publication_date: Option<DateTime<Utc>>,
    pub enclosure: Option<Enclosure>,
    pub link: Option<String>,
    pub image: Option<String>,
}

/// A podcast registered for ingestion
#[derive(Debug, Clone)]
pub struct NewPodcast {
    pub title: String,
    pub feed_url: String,
    pub link: Option<String>,
}

// ============================================================================
// Row Types
// ============================================================================

/// Internal row type for podcast queries (used by sqlx FromRow)
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PodcastRow {
    pub id: i64,
    pub title: String,
    pub feed_url: String,
    pub link: Option<String>,
    pub last_scraped: Option<String>,
    pub og_image: Option<String>,
}

impl PodcastRow {
    pub(crate) fn into_podcast(self) -> Podcast {
        Podcast {
            id: self.id,
            title: self.title,
            feed_url: self.feed_url,
            link: self.link,
            last_scraped: self.last_scraped.as_deref().and_then(parse_timestamp),
            og_image: self.og_image,
        }
    }
}

/// Internal row type for episode queries
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct EpisodeRow {
    pub id: i64,
    pub podcast_id: i64,
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    pub duration: Option<i64>,
    pub publication_date: Option<String>,
    pub enclosure: Option<String>,
    pub link: Option<String>,
    pub image: Option<String>,
    pub og_image: Option<String>,
}

impl EpisodeRow {
    pub(crate) fn into_episode(self) -> Episode {
        let enclosure = self.enclosure.as_deref().and_then(|json| {
            serde_json::from_str(json)
                .map_err(|e| {
                    tracing::warn!(episode_id = self.id, error = %e, "Discarding unreadable enclosure");
                })
                .ok()
        });
        Episode {
            id: self.id,
            podcast_id: self.podcast_id,
            url: self.url,
            title: self.title,
            description: self.description,
            duration: self.duration,
            publication_date: self.publication_date.as_deref().and_then(parse_timestamp),
            enclosure,
            link: self.link,
            image: self.image,
            og_image: self.og_image,
        }
    }
}

/// Internal row type for article queries
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ArticleRow {
    pub id: i64,
    pub url: String,
    pub title: String,
    pub og_image: Option<String>,
}

impl ArticleRow {
    pub(crate) fn into_article(self) -> Article {
        Article {
            id: self.id,
            url: self.url,
            title: self.title,
            og_image: self.og_image,
        }
    }
}

pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

// ============================================================================
// Data Structures
// ============================================================================

/// Podcast data from database
#[derive(Debug, Clone)]
pub struct Podcast {
    pub id: i64,
    pub title: String,
    pub feed_url: String,
    /// Website of the show; the key for podcast enrichment jobs
    pub link: Option<String>,
    pub last_scraped: Option<DateTime<Utc>>,
    pub og_image: Option<String>,
}

/// Episode data from database
#[derive(Debug, Clone, PartialEq)]
pub struct Episode {
    pub id: i64,
    pub podcast_id: i64,
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    pub duration: Option<i64>,
    pub publication_date: Option<DateTime<Utc>>,
    pub enclosure: Option<Enclosure>,
    pub link: Option<String>,
    /// Artwork advertised by the feed itself
    pub image: Option<String>,
    /// Preview image discovered by enrichment
    pub og_image: Option<String>,
}

/// Article data from database
#[derive(Debug, Clone)]
pub struct Article {
    pub id: i64,
    pub url: String,
    pub title: String,
    pub og_image: Option<String>,
}

/// Result of the atomic find-or-create-or-update primitive
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub episode: Episode,
    /// True when the row did not exist before this call
    pub created: bool,
}

/// The slice of any entity the enrichment consumer needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentTarget {
    pub kind: EntityKind,
    pub id: i64,
    pub og_image: Option<String>,
}

/// Per-status job counts for one queue
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub waiting: i64,
    pub active: i64,
    pub completed: i64,
    pub failed: i64,
}

impl QueueStats {
    pub fn total(&self) -> i64 {
        self.waiting + self.active + self.completed + self.failed
    }
}
