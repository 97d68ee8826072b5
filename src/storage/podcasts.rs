use anyhow::Result;
use chrono::{DateTime, Utc};

use super::schema::Database;
use super::types::{format_timestamp, NewPodcast, Podcast, PodcastRow};

const PODCAST_COLUMNS: &str = "id, title, feed_url, link, last_scraped, og_image";

impl Database {
    // ========================================================================
    // Podcast Operations
    // ========================================================================

    /// Register a podcast, returning its id.
    ///
    /// Re-registering an existing feed URL updates title and link and returns
    /// the existing id (ON CONFLICT DO UPDATE).
    pub async fn insert_podcast(&self, podcast: &NewPodcast) -> Result<i64> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
                INSERT INTO podcasts (title, feed_url, link) VALUES (?, ?, ?)
                ON CONFLICT(feed_url) DO UPDATE SET title = excluded.title, link = excluded.link
                RETURNING id
            "#,
        )
        .bind(&podcast.title)
        .bind(&podcast.feed_url)
        .bind(&podcast.link)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn get_podcast(&self, podcast_id: i64) -> Result<Option<Podcast>> {
        let row: Option<PodcastRow> =
            sqlx::query_as(&format!("SELECT {PODCAST_COLUMNS} FROM podcasts WHERE id = ?"))
                .bind(podcast_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(PodcastRow::into_podcast))
    }

    /// Stamp `last_scraped` for a podcast.
    ///
    /// Returns false when no podcast has that id.
    pub async fn set_last_scraped(&self, podcast_id: i64, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query("UPDATE podcasts SET last_scraped = ? WHERE id = ?")
            .bind(format_timestamp(at))
            .bind(podcast_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Podcasts never scraped, or last scraped before `cutoff`, oldest first.
    pub async fn get_podcasts_due(&self, cutoff: DateTime<Utc>, limit: i64) -> Result<Vec<Podcast>> {
        let rows: Vec<PodcastRow> = sqlx::query_as(&format!(
            r#"
                SELECT {PODCAST_COLUMNS} FROM podcasts
                WHERE last_scraped IS NULL OR last_scraped < ?
                ORDER BY last_scraped IS NOT NULL, last_scraped, id
                LIMIT ?
            "#
        ))
        .bind(format_timestamp(cutoff))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(PodcastRow::into_podcast).collect())
    }
}
