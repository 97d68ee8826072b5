use anyhow::Result;

use super::schema::Database;
use super::types::{format_timestamp, Article, ArticleRow};

impl Database {
    // ========================================================================
    // Article Operations
    // ========================================================================

    /// Store an article by URL, returning its id.
    ///
    /// Articles are written by the RSS ingestion path; this pipeline only
    /// enriches them. An existing URL keeps its id and gets the new title.
    pub async fn insert_article(&self, url: &str, title: &str) -> Result<i64> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
                INSERT INTO articles (url, title, created_at) VALUES (?, ?, ?)
                ON CONFLICT(url) DO UPDATE SET title = excluded.title
                RETURNING id
            "#,
        )
        .bind(url)
        .bind(title)
        .bind(format_timestamp(chrono::Utc::now()))
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn get_article(&self, article_id: i64) -> Result<Option<Article>> {
        let row: Option<ArticleRow> =
            sqlx::query_as("SELECT id, url, title, og_image FROM articles WHERE id = ?")
                .bind(article_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(ArticleRow::into_article))
    }
}
