use futures::stream::{self, StreamExt};
use std::sync::Arc;

use crate::services::EntityStore;
use crate::storage::{Episode, EpisodeUpsert, RawEpisode};
use crate::util::normalize_url;

/// Outcome of reconciling one feed document against the store.
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    /// Episodes this pass created, in feed order
    pub created: Vec<Episode>,
    /// Episodes that already existed and were overwritten
    pub updated: usize,
    /// Episodes whose upsert failed (logged, excluded)
    pub failed: usize,
    /// Episodes whose URL could not be normalized
    pub skipped: usize,
}

impl ReconcileReport {
    /// The only episodes that may be fanned out.
    pub fn new_episodes(&self) -> &[Episode] {
        &self.created
    }
}

/// Merges a parsed feed into stored episodes.
///
/// Each episode is upserted independently by (podcast, normalized url), up to
/// `concurrency` at a time. Replaying the same document creates nothing.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn EntityStore>,
    concurrency: usize,
}

impl Reconciler {
    pub fn new(store: Arc<dyn EntityStore>, concurrency: usize) -> Self {
        Self {
            store,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn reconcile(&self, podcast_id: i64, episodes: Vec<RawEpisode>) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        let mut upserts = Vec::with_capacity(episodes.len());
        for raw in episodes {
            match normalize_url(&raw.url) {
                Ok(url) => upserts.push(into_upsert(url, raw)),
                Err(e) => {
                    tracing::warn!(
                        podcast_id = podcast_id,
                        url = %raw.url,
                        error = %e,
                        "Skipping episode with unusable URL"
                    );
                    report.skipped += 1;
                }
            }
        }

        let store = &self.store;
        let results: Vec<_> = stream::iter(upserts)
            .map(|upsert| async move {
                let result = store.upsert_episode(podcast_id, &upsert).await;
                (upsert.url, result)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        for (url, result) in results {
            match result {
                Ok(outcome) if outcome.created => {
                    tracing::debug!(podcast_id = podcast_id, url = %url, "Episode created");
                    report.created.push(outcome.episode);
                }
                Ok(_) => report.updated += 1,
                Err(e) => {
                    tracing::warn!(
                        podcast_id = podcast_id,
                        url = %url,
                        error = %e,
                        "Episode upsert failed"
                    );
                    report.failed += 1;
                }
            }
        }

        report
    }
}

fn into_upsert(url: String, raw: RawEpisode) -> EpisodeUpsert {
    EpisodeUpsert {
        url,
        title: raw.title,
        description: raw.description,
        duration: raw.duration,
        publication_date: raw.publication_date,
        enclosure: raw.enclosure,
        link: raw.link,
        image: raw.image,
    }
}
