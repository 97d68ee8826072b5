//! Shared test doubles for the collaborator traits.
//!
//! Every double records its calls behind a `Mutex` so tests can assert on
//! exactly which side effects happened.
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use feedcast::feed::{FeedDocument, FeedSource, FetchError};
use feedcast::pipeline::{FanOut, FeedFetchConsumer, Reconciler};
use feedcast::queue::{ClaimedJob, FailDisposition, JobOptions, JobQueue};
use feedcast::scrape::{ScrapeClient, ScrapeError, ScrapeOptions, ScrapeOutcome};
use feedcast::services::{
    Activity, ActivityFeed, CollectionsSync, EntityStore, ErrorContext, ErrorReporter,
    SearchDocument, SearchIndex,
};
use feedcast::storage::{
    Database, EnrichmentTarget, EntityKind, Episode, EpisodeUpsert, NewPodcast, Podcast, RawEpisode,
    UpsertOutcome,
};

pub async fn test_db() -> Database {
    Database::open(":memory:").await.unwrap()
}

pub async fn add_podcast(db: &Database, link: Option<&str>) -> i64 {
    db.insert_podcast(&NewPodcast {
        title: "Test Show".to_string(),
        feed_url: "https://show.example.com/rss".to_string(),
        link: link.map(str::to_string),
    })
    .await
    .unwrap()
}

/// Store `count` episodes for `podcast` and return them as created.
pub async fn stored_episodes(db: &Database, podcast: i64, count: usize) -> Vec<Episode> {
    let mut episodes = Vec::with_capacity(count);
    for i in 0..count {
        let outcome = db
            .upsert_episode(
                podcast,
                &EpisodeUpsert {
                    url: format!("http://show.example.com/ep/{i}"),
                    title: format!("Episode {i}"),
                    description: None,
                    duration: None,
                    publication_date: None,
                    enclosure: None,
                    link: None,
                    image: None,
                },
            )
            .await
            .unwrap();
        episodes.push(outcome.episode);
    }
    episodes
}

pub fn raw_episode(url: &str, title: &str) -> RawEpisode {
    RawEpisode {
        url: url.to_string(),
        title: title.to_string(),
        description: Some(format!("About {title}")),
        duration: Some(600),
        publication_date: None,
        enclosure: None,
        link: Some(url.to_string()),
        image: None,
    }
}

// ============================================================================
// Feed source
// ============================================================================

/// Serves a fixed document, or fails every fetch.
pub struct StaticFeedSource {
    episodes: Mutex<Option<Vec<RawEpisode>>>,
    pub calls: AtomicUsize,
}

impl StaticFeedSource {
    pub fn serving(episodes: Vec<RawEpisode>) -> Self {
        Self {
            episodes: Mutex::new(Some(episodes)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            episodes: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_episodes(&self, episodes: Vec<RawEpisode>) {
        *self.episodes.lock().unwrap() = Some(episodes);
    }
}

#[async_trait]
impl FeedSource for StaticFeedSource {
    async fn fetch(&self, _url: &str) -> Result<FeedDocument, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.episodes.lock().unwrap().clone() {
            Some(episodes) => Ok(FeedDocument {
                episodes,
                skipped: 0,
            }),
            None => Err(FetchError::HttpStatus(502)),
        }
    }
}

// ============================================================================
// Downstream services
// ============================================================================

/// Records indexed documents; ids in `fail_ids` return an error instead.
#[derive(Default)]
pub struct RecordingSearch {
    pub documents: Mutex<Vec<SearchDocument>>,
    pub fail_ids: HashSet<i64>,
}

impl RecordingSearch {
    pub fn failing_for(ids: impl IntoIterator<Item = i64>) -> Self {
        Self {
            fail_ids: ids.into_iter().collect(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl SearchIndex for RecordingSearch {
    async fn index(&self, document: &SearchDocument) -> Result<()> {
        if self.fail_ids.contains(&document.id) {
            return Err(anyhow!("search cluster unavailable"));
        }
        self.documents.lock().unwrap().push(document.clone());
        Ok(())
    }
}

/// Records batches; the batch numbers in `fail_batches` (0-based, by call
/// order) return an error instead.
#[derive(Default)]
pub struct RecordingActivity {
    pub batches: Mutex<Vec<(String, i64, Vec<Activity>)>>,
    pub fail_batches: HashSet<usize>,
    calls: AtomicUsize,
}

impl RecordingActivity {
    pub fn failing_on(batches: impl IntoIterator<Item = usize>) -> Self {
        Self {
            fail_batches: batches.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, activities)| activities.len())
            .collect()
    }

    pub fn total(&self) -> usize {
        self.batch_sizes().iter().sum()
    }
}

#[async_trait]
impl ActivityFeed for RecordingActivity {
    async fn add_activities(&self, group: &str, id: i64, activities: &[Activity]) -> Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_batches.contains(&call) {
            return Err(anyhow!("activity service unavailable"));
        }
        self.batches
            .lock()
            .unwrap()
            .push((group.to_string(), id, activities.to_vec()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingCollections {
    pub synced: Mutex<Vec<i64>>,
    pub fail: bool,
}

impl RecordingCollections {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl CollectionsSync for RecordingCollections {
    async fn sync_podcast(&self, podcast_id: i64) -> Result<()> {
        if self.fail {
            return Err(anyhow!("collections service unavailable"));
        }
        self.synced.lock().unwrap().push(podcast_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingReporter {
    pub reports: Mutex<Vec<(String, ErrorContext)>>,
}

impl RecordingReporter {
    pub fn count(&self) -> usize {
        self.reports.lock().unwrap().len()
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, error: &(dyn fmt::Display + Send + Sync), context: &ErrorContext) {
        self.reports
            .lock()
            .unwrap()
            .push((error.to_string(), context.clone()));
    }
}

// ============================================================================
// Scrape client
// ============================================================================

/// Answers every scrape with the same configured result.
pub struct StubScraper {
    image: Option<String>,
    fail: bool,
    pub calls: Mutex<Vec<String>>,
}

impl StubScraper {
    pub fn finding(image: &str) -> Self {
        Self {
            image: Some(image.to_string()),
            fail: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn finding_nothing() -> Self {
        Self {
            image: None,
            fail: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            image: None,
            fail: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ScrapeClient for StubScraper {
    async fn scrape(&self, url: &str, _options: &ScrapeOptions) -> ScrapeOutcome {
        self.calls.lock().unwrap().push(url.to_string());
        if self.fail {
            return ScrapeOutcome::Failed(ScrapeError::HttpStatus(500));
        }
        match &self.image {
            Some(image) => ScrapeOutcome::Found(image.clone()),
            None => ScrapeOutcome::NotFound,
        }
    }
}

// ============================================================================
// Store wrapper
// ============================================================================

/// Delegates to a real database but fails upserts for chosen URLs, and
/// optionally every enrichment lookup or image write.
pub struct FlakyStore {
    inner: Database,
    fail_urls: HashSet<String>,
    fail_lookup: bool,
    fail_persist: bool,
}

impl FlakyStore {
    pub fn new(inner: Database, fail_urls: &[&str]) -> Self {
        Self {
            inner,
            fail_urls: fail_urls.iter().map(|u| u.to_string()).collect(),
            fail_lookup: false,
            fail_persist: false,
        }
    }

    pub fn failing_lookup(mut self) -> Self {
        self.fail_lookup = true;
        self
    }

    pub fn failing_persist(mut self) -> Self {
        self.fail_persist = true;
        self
    }
}

#[async_trait]
impl EntityStore for FlakyStore {
    async fn find_podcast(&self, podcast_id: i64) -> Result<Option<Podcast>> {
        self.inner.get_podcast(podcast_id).await
    }

    async fn mark_podcast_scraped(&self, podcast_id: i64, at: DateTime<Utc>) -> Result<()> {
        self.inner.set_last_scraped(podcast_id, at).await.map(|_| ())
    }

    async fn upsert_episode(&self, podcast_id: i64, episode: &EpisodeUpsert) -> Result<UpsertOutcome> {
        if self.fail_urls.contains(&episode.url) {
            return Err(anyhow!("disk I/O error"));
        }
        self.inner.upsert_episode(podcast_id, episode).await
    }

    async fn find_enrichment_target(
        &self,
        kind: EntityKind,
        url: &str,
    ) -> Result<Option<EnrichmentTarget>> {
        if self.fail_lookup {
            return Err(anyhow!("database is locked"));
        }
        self.inner.find_enrichment_target(kind, url).await
    }

    async fn set_og_image(&self, kind: EntityKind, id: i64, image_url: &str) -> Result<bool> {
        if self.fail_persist {
            return Err(anyhow!("disk I/O error"));
        }
        self.inner.set_og_image(kind, id, image_url).await
    }
}

// ============================================================================
// Queue wrapper
// ============================================================================

/// Delegates to a real database but refuses enqueues whose payload `url` is
/// in `fail_urls`.
pub struct FlakyQueue {
    inner: Database,
    fail_urls: HashSet<String>,
}

impl FlakyQueue {
    pub fn new(inner: Database, fail_urls: &[&str]) -> Self {
        Self {
            inner,
            fail_urls: fail_urls.iter().map(|u| u.to_string()).collect(),
        }
    }
}

#[async_trait]
impl JobQueue for FlakyQueue {
    async fn enqueue(
        &self,
        queue: &str,
        payload: &serde_json::Value,
        options: JobOptions,
    ) -> Result<i64> {
        let url = payload.get("url").and_then(|u| u.as_str()).unwrap_or_default();
        if self.fail_urls.contains(url) {
            return Err(anyhow!("queue backend unavailable"));
        }
        self.inner.enqueue(queue, payload, options).await
    }

    async fn claim(&self, queue: &str, lease: Duration) -> Result<Option<ClaimedJob>> {
        self.inner.claim(queue, lease).await
    }

    async fn complete(&self, job_id: i64) -> Result<()> {
        self.inner.complete(job_id).await
    }

    async fn fail(&self, job_id: i64, reason: &str, retryable: bool) -> Result<FailDisposition> {
        self.inner.fail(job_id, reason, retryable).await
    }
}

// ============================================================================
// Assembled feed consumer
// ============================================================================

pub struct FeedHarness {
    pub db: Database,
    pub source: Arc<StaticFeedSource>,
    pub search: Arc<RecordingSearch>,
    pub activity: Arc<RecordingActivity>,
    pub collections: Arc<RecordingCollections>,
    pub reporter: Arc<RecordingReporter>,
    pub consumer: FeedFetchConsumer,
}

impl FeedHarness {
    pub fn new(db: Database, source: StaticFeedSource) -> Self {
        let store: Arc<dyn EntityStore> = Arc::new(db.clone());
        Self::build(db, store, source, RecordingActivity::default())
    }

    pub fn build(
        db: Database,
        store: Arc<dyn EntityStore>,
        source: StaticFeedSource,
        activity: RecordingActivity,
    ) -> Self {
        let source = Arc::new(source);
        let search = Arc::new(RecordingSearch::default());
        let activity = Arc::new(activity);
        let collections = Arc::new(RecordingCollections::default());
        let reporter = Arc::new(RecordingReporter::default());
        let queue: Arc<dyn JobQueue> = Arc::new(db.clone());

        let fan_out = FanOut::new(
            search.clone(),
            queue,
            activity.clone(),
            collections.clone(),
        );
        let consumer = FeedFetchConsumer::new(
            store.clone(),
            source.clone(),
            Reconciler::new(store, 4),
            fan_out,
            reporter.clone(),
        );

        Self {
            db,
            source,
            search,
            activity,
            collections,
            reporter,
            consumer,
        }
    }

    pub fn search_writes(&self) -> usize {
        self.search.documents.lock().unwrap().len()
    }

    pub async fn og_jobs_waiting(&self) -> i64 {
        self.db
            .queue_stats(feedcast::queue::ENRICHMENT_QUEUE)
            .await
            .unwrap()
            .waiting
    }
}
