use anyhow::Result;

use super::schema::Database;
use super::types::{format_timestamp, Episode, EpisodeRow, EpisodeUpsert, UpsertOutcome};

const EPISODE_COLUMNS: &str = "id, podcast_id, url, title, description, duration, publication_date, enclosure, link, image, og_image";

/// Hard cap on episodes returned by a listing query (OOM protection)
const MAX_EPISODES: i64 = 5000;

impl Database {
    // ========================================================================
    // Episode Operations
    // ========================================================================

    /// Find-or-create-or-update one episode keyed by (podcast, url).
    ///
    /// Uses a two-phase write inside one transaction: `INSERT OR IGNORE`
    /// followed by `changes()` tells whether this call created the row, then an
    /// `UPDATE` overwrites every mutable field. The transaction takes the
    /// write lock on its first statement, so two concurrent calls for the same
    /// key cannot both report `created`.
    ///
    /// `og_image` is never touched here; it belongs to enrichment.
    pub async fn upsert_episode(
        &self,
        podcast_id: i64,
        episode: &EpisodeUpsert,
    ) -> Result<UpsertOutcome> {
        let now = format_timestamp(chrono::Utc::now());
        let publication_date = episode.publication_date.map(format_timestamp);
        let enclosure = episode
            .enclosure
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
                INSERT OR IGNORE INTO episodes
                    (podcast_id, url, title, description, duration, publication_date,
                     enclosure, link, image, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(podcast_id)
        .bind(&episode.url)
        .bind(&episode.title)
        .bind(&episode.description)
        .bind(episode.duration)
        .bind(&publication_date)
        .bind(&enclosure)
        .bind(&episode.link)
        .bind(&episode.image)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        let (changes,): (i64,) = sqlx::query_as("SELECT changes()")
            .fetch_one(&mut *tx)
            .await?;
        let created = changes > 0;

        if !created {
            sqlx::query(
                r#"
                    UPDATE episodes SET
                        title = ?, description = ?, duration = ?, publication_date = ?,
                        enclosure = ?, link = ?, image = ?, url = ?, updated_at = ?
                    WHERE podcast_id = ? AND url = ?
                "#,
            )
            .bind(&episode.title)
            .bind(&episode.description)
            .bind(episode.duration)
            .bind(&publication_date)
            .bind(&enclosure)
            .bind(&episode.link)
            .bind(&episode.image)
            .bind(&episode.url)
            .bind(&now)
            .bind(podcast_id)
            .bind(&episode.url)
            .execute(&mut *tx)
            .await?;
        }

        let row: EpisodeRow = sqlx::query_as(&format!(
            "SELECT {EPISODE_COLUMNS} FROM episodes WHERE podcast_id = ? AND url = ?"
        ))
        .bind(podcast_id)
        .bind(&episode.url)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(UpsertOutcome {
            episode: row.into_episode(),
            created,
        })
    }

    pub async fn get_episode(&self, episode_id: i64) -> Result<Option<Episode>> {
        let row: Option<EpisodeRow> =
            sqlx::query_as(&format!("SELECT {EPISODE_COLUMNS} FROM episodes WHERE id = ?"))
                .bind(episode_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(EpisodeRow::into_episode))
    }

    /// Episodes of one podcast, newest publication first.
    pub async fn get_episodes_for_podcast(&self, podcast_id: i64) -> Result<Vec<Episode>> {
        let rows: Vec<EpisodeRow> = sqlx::query_as(&format!(
            r#"
                SELECT {EPISODE_COLUMNS} FROM episodes
                WHERE podcast_id = ?
                ORDER BY publication_date DESC, id
                LIMIT ?
            "#
        ))
        .bind(podcast_id)
        .bind(MAX_EPISODES)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(EpisodeRow::into_episode).collect())
    }
}
