use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::EntityStore;
use crate::storage::{
    Database, EnrichmentTarget, EntityKind, EpisodeUpsert, Podcast, UpsertOutcome,
};

#[async_trait]
impl EntityStore for Database {
    async fn find_podcast(&self, podcast_id: i64) -> Result<Option<Podcast>> {
        self.get_podcast(podcast_id).await
    }

    async fn mark_podcast_scraped(&self, podcast_id: i64, at: DateTime<Utc>) -> Result<()> {
        if !self.set_last_scraped(podcast_id, at).await? {
            tracing::warn!(podcast_id = podcast_id, "Podcast vanished before lastScraped update");
        }
        Ok(())
    }

    async fn upsert_episode(
        &self,
        podcast_id: i64,
        episode: &EpisodeUpsert,
    ) -> Result<UpsertOutcome> {
        Database::upsert_episode(self, podcast_id, episode).await
    }

    async fn find_enrichment_target(
        &self,
        kind: EntityKind,
        url: &str,
    ) -> Result<Option<EnrichmentTarget>> {
        Database::find_enrichment_target(self, kind, url).await
    }

    async fn set_og_image(&self, kind: EntityKind, id: i64, image_url: &str) -> Result<bool> {
        Database::set_og_image(self, kind, id, image_url).await
    }
}
