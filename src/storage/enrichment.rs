use anyhow::Result;

use super::schema::Database;
use super::types::{EnrichmentTarget, EntityKind};

impl Database {
    // ========================================================================
    // Enrichment Operations
    // ========================================================================

    /// Look up the entity an enrichment job refers to.
    ///
    /// Matches `url` against the kind's key column (`link` for podcasts,
    /// `url` otherwise). The same episode URL can exist under several
    /// podcasts; the oldest row wins.
    pub async fn find_enrichment_target(
        &self,
        kind: EntityKind,
        url: &str,
    ) -> Result<Option<EnrichmentTarget>> {
        let sql = format!(
            "SELECT id, og_image FROM {} WHERE {} = ? ORDER BY id LIMIT 1",
            kind.table(),
            kind.key_column()
        );
        let row: Option<(i64, Option<String>)> = sqlx::query_as(&sql)
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(id, og_image)| EnrichmentTarget { kind, id, og_image }))
    }

    /// Set `og_image` on one entity, leaving every other column untouched.
    ///
    /// Only writes when the field is still empty, so of two racing enrichment
    /// jobs the first write wins. Returns whether a row changed.
    pub async fn set_og_image(&self, kind: EntityKind, id: i64, image_url: &str) -> Result<bool> {
        let sql = format!(
            "UPDATE {} SET og_image = ? WHERE id = ? AND og_image IS NULL",
            kind.table()
        );
        let result = sqlx::query(&sql)
            .bind(image_url)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
