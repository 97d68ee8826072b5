//! End-to-end tests for the feed worker: reconciliation, fan-out and the
//! job queue, each against its own in-memory database.

mod common;

use pretty_assertions::assert_eq;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use feedcast::pipeline::{FanOut, ImageEnrichmentConsumer, FEED_JOB_OPTIONS};
use feedcast::queue::{
    enqueue_job, FeedJob, JobError, JobQueue, Worker, WorkerConfig, ENRICHMENT_QUEUE, FEED_QUEUE,
};
use feedcast::services::{ActivityFeed, CollectionsSync, EntityStore, SearchIndex};

fn job(podcast: i64) -> FeedJob {
    FeedJob {
        podcast,
        url: "https://show.example.com/rss".to_string(),
    }
}

fn many_episodes(count: usize) -> Vec<feedcast::storage::RawEpisode> {
    (0..count)
        .map(|i| raw_episode(&format!("http://show.example.com/ep/{i}"), &format!("Episode {i}")))
        .collect()
}

#[tokio::test]
async fn test_replayed_feed_has_no_further_side_effects() {
    let db = test_db().await;
    let podcast = add_podcast(&db, None).await;
    let harness = FeedHarness::new(
        db.clone(),
        StaticFeedSource::serving(vec![
            raw_episode("http://show.example.com/1", "One"),
            raw_episode("http://show.example.com/2", "Two"),
        ]),
    );

    let first = harness.consumer.process(job(podcast)).await.unwrap();
    assert_eq!(first.reconcile.created.len(), 2);
    assert_eq!(harness.search_writes(), 2);
    assert_eq!(harness.og_jobs_waiting().await, 2);
    assert_eq!(harness.activity.total(), 2);

    let second = harness.consumer.process(job(podcast)).await.unwrap();
    assert!(second.reconcile.created.is_empty());
    assert_eq!(second.reconcile.updated, 2);
    assert_eq!(harness.search_writes(), 2);
    assert_eq!(harness.og_jobs_waiting().await, 2);
    assert_eq!(harness.activity.total(), 2);
    assert_eq!(db.get_episodes_for_podcast(podcast).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_250_new_episodes_publish_three_batches() {
    let db = test_db().await;
    let podcast = add_podcast(&db, None).await;
    let harness = FeedHarness::new(db.clone(), StaticFeedSource::serving(many_episodes(250)));

    let report = harness.consumer.process(job(podcast)).await.unwrap();

    assert_eq!(report.fan_out.batches_published, 3);
    assert_eq!(harness.activity.batch_sizes(), vec![100, 100, 50]);
    assert_eq!(harness.search_writes(), 250);
    assert_eq!(harness.og_jobs_waiting().await, 250);
    assert_eq!(*harness.collections.synced.lock().unwrap(), vec![podcast; 3]);

    let batches = harness.activity.batches.lock().unwrap();
    for (group, id, activities) in batches.iter() {
        assert_eq!(group, "podcast");
        assert_eq!(*id, podcast);
        assert!(activities.iter().all(|a| a.verb == "podcast_episode"));
        assert!(activities.iter().all(|a| a.foreign_id.starts_with("episodes:")));
    }
}

#[tokio::test]
async fn test_failed_batch_does_not_stop_later_batches() {
    let db = test_db().await;
    let podcast = add_podcast(&db, None).await;
    let store: Arc<dyn EntityStore> = Arc::new(db.clone());
    let harness = FeedHarness::build(
        db.clone(),
        store,
        StaticFeedSource::serving(many_episodes(250)),
        RecordingActivity::failing_on([1]),
    );

    let report = harness.consumer.process(job(podcast)).await.unwrap();

    assert_eq!(report.fan_out.batches_failed, 1);
    assert_eq!(report.fan_out.batches_published, 2);
    assert_eq!(harness.activity.batch_sizes(), vec![100, 50]);
    assert_eq!(harness.collections.synced.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_changed_title_updates_without_fan_out() {
    let db = test_db().await;
    let podcast = add_podcast(&db, None).await;
    let harness = FeedHarness::new(
        db.clone(),
        StaticFeedSource::serving(vec![raw_episode("http://show.example.com/1", "Draft title")]),
    );
    harness.consumer.process(job(podcast)).await.unwrap();

    harness
        .source
        .set_episodes(vec![raw_episode("http://show.example.com/1", "Final title")]);
    let report = harness.consumer.process(job(podcast)).await.unwrap();

    assert!(report.reconcile.created.is_empty());
    assert_eq!(report.reconcile.updated, 1);
    let episodes = db.get_episodes_for_podcast(podcast).await.unwrap();
    assert_eq!(episodes.len(), 1);
    assert_eq!(episodes[0].title, "Final title");
    assert_eq!(harness.search_writes(), 1);
    assert_eq!(harness.activity.total(), 1);
}

#[tokio::test]
async fn test_path_case_distinguishes_episodes() {
    let db = test_db().await;
    let podcast = add_podcast(&db, None).await;
    let harness = FeedHarness::new(
        db.clone(),
        StaticFeedSource::serving(vec![
            raw_episode("http://x.example.com/1.mp3", "Lower"),
            raw_episode("http://x.example.com/1.MP3", "Upper"),
        ]),
    );

    let report = harness.consumer.process(job(podcast)).await.unwrap();
    assert_eq!(report.reconcile.created.len(), 2);
}

#[tokio::test]
async fn test_host_case_is_folded() {
    let db = test_db().await;
    let podcast = add_podcast(&db, None).await;
    let harness = FeedHarness::new(
        db.clone(),
        StaticFeedSource::serving(vec![
            raw_episode("http://x.example.com/1.mp3", "Lower"),
            raw_episode("http://X.EXAMPLE.com/1.mp3", "Upper"),
        ]),
    );

    let report = harness.consumer.process(job(podcast)).await.unwrap();
    assert_eq!(report.reconcile.created.len(), 1);
    assert_eq!(report.reconcile.updated, 1);
}

#[tokio::test]
async fn test_missing_podcast_is_not_found() {
    let db = test_db().await;
    let harness = FeedHarness::new(db, StaticFeedSource::serving(many_episodes(1)));

    let err = harness.consumer.process(job(999)).await.unwrap_err();
    assert!(matches!(err, JobError::NotFound(_)));
    assert!(!err.is_retryable());
    assert_eq!(harness.source.calls.load(Ordering::SeqCst), 0);
    assert_eq!(harness.search_writes(), 0);
}

#[tokio::test]
async fn test_fetch_failure_stamps_and_reports() {
    let db = test_db().await;
    let podcast = add_podcast(&db, None).await;
    let harness = FeedHarness::new(db.clone(), StaticFeedSource::failing());

    let err = harness.consumer.process(job(podcast)).await.unwrap_err();
    assert!(matches!(err, JobError::Fetch(_)));
    assert_eq!(harness.reporter.count(), 1);

    let stored = db.get_podcast(podcast).await.unwrap().unwrap();
    assert!(stored.last_scraped.is_some());
}

#[tokio::test]
async fn test_success_stamps_last_scraped() {
    let db = test_db().await;
    let podcast = add_podcast(&db, None).await;
    let harness = FeedHarness::new(db.clone(), StaticFeedSource::serving(Vec::new()));

    let report = harness.consumer.process(job(podcast)).await.unwrap();
    assert!(report.reconcile.created.is_empty());
    assert_eq!(report.fan_out.batches_published, 0);
    assert!(db.get_podcast(podcast).await.unwrap().unwrap().last_scraped.is_some());
}

#[tokio::test]
async fn test_failed_upsert_excluded_from_fan_out() {
    let db = test_db().await;
    let podcast = add_podcast(&db, None).await;
    let store: Arc<dyn EntityStore> =
        Arc::new(FlakyStore::new(db.clone(), &["http://show.example.com/2"]));
    let harness = FeedHarness::build(
        db.clone(),
        store,
        StaticFeedSource::serving(vec![
            raw_episode("http://show.example.com/1", "One"),
            raw_episode("http://show.example.com/2", "Two"),
            raw_episode("http://show.example.com/3", "Three"),
        ]),
        RecordingActivity::default(),
    );

    let report = harness.consumer.process(job(podcast)).await.unwrap();

    assert_eq!(report.reconcile.failed, 1);
    assert_eq!(report.reconcile.created.len(), 2);
    assert_eq!(harness.search_writes(), 2);
    assert_eq!(harness.og_jobs_waiting().await, 2);
    assert_eq!(harness.activity.total(), 2);
}

#[tokio::test]
async fn test_enrichment_jobs_carry_episode_urls() {
    let db = test_db().await;
    let podcast = add_podcast(&db, None).await;
    let harness = FeedHarness::new(
        db.clone(),
        StaticFeedSource::serving(vec![raw_episode("HTTP://WWW.Show.Example.com/Ep/1/", "One")]),
    );
    harness.consumer.process(job(podcast)).await.unwrap();

    let payloads = db.waiting_payloads(ENRICHMENT_QUEUE).await.unwrap();
    let payload: serde_json::Value = serde_json::from_str(&payloads[0]).unwrap();
    assert_eq!(
        payload,
        serde_json::json!({"type": "episode", "url": "http://show.example.com/Ep/1"})
    );
}

#[tokio::test]
async fn test_workers_drain_both_queues() {
    let db = test_db().await;
    let podcast = add_podcast(&db, None).await;
    let harness = FeedHarness::new(db.clone(), StaticFeedSource::serving(many_episodes(3)));
    let queue: Arc<dyn JobQueue> = Arc::new(db.clone());
    let config = WorkerConfig {
        concurrency: 2,
        poll_interval: Duration::from_millis(10),
        lease: Duration::from_secs(30),
    };

    enqueue_job(queue.as_ref(), FEED_QUEUE, &job(podcast), FEED_JOB_OPTIONS)
        .await
        .unwrap();
    let feed_worker = Worker::new(queue.clone(), Arc::new(harness.consumer), config.clone());
    assert_eq!(feed_worker.drain().await.unwrap(), 1);
    assert_eq!(db.queue_stats(FEED_QUEUE).await.unwrap().total(), 0);

    let scraper = Arc::new(StubScraper::finding("https://cdn.example.com/art.png"));
    let enrichment = ImageEnrichmentConsumer::new(
        Arc::new(db.clone()),
        scraper.clone(),
        Arc::new(RecordingReporter::default()),
    );
    let og_worker = Worker::new(queue, Arc::new(enrichment), config);
    assert_eq!(og_worker.drain().await.unwrap(), 3);
    assert_eq!(scraper.call_count(), 3);
    assert_eq!(db.queue_stats(ENRICHMENT_QUEUE).await.unwrap().total(), 0);

    let episodes = db.get_episodes_for_podcast(podcast).await.unwrap();
    assert!(episodes
        .iter()
        .all(|e| e.og_image.as_deref() == Some("https://cdn.example.com/art.png")));
}

#[tokio::test]
async fn test_failed_feed_job_kept_as_failed() {
    let db = test_db().await;
    let podcast = add_podcast(&db, None).await;
    let harness = FeedHarness::new(db.clone(), StaticFeedSource::failing());
    let queue: Arc<dyn JobQueue> = Arc::new(db.clone());

    enqueue_job(queue.as_ref(), FEED_QUEUE, &job(podcast), FEED_JOB_OPTIONS)
        .await
        .unwrap();
    let worker = Worker::new(queue, Arc::new(harness.consumer), WorkerConfig::default());
    worker.drain().await.unwrap();

    let stats = db.queue_stats(FEED_QUEUE).await.unwrap();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.total(), 1);
}

// ============================================================================
// Fan-out failure paths
// ============================================================================

struct FanOutRig {
    search: Arc<RecordingSearch>,
    activity: Arc<RecordingActivity>,
    collections: Arc<RecordingCollections>,
    fan_out: FanOut,
}

fn fan_out_rig(
    queue: Arc<dyn JobQueue>,
    search: RecordingSearch,
    collections: RecordingCollections,
) -> FanOutRig {
    let search = Arc::new(search);
    let activity = Arc::new(RecordingActivity::default());
    let collections = Arc::new(collections);
    let fan_out = FanOut::new(
        search.clone() as Arc<dyn SearchIndex>,
        queue,
        activity.clone() as Arc<dyn ActivityFeed>,
        collections.clone() as Arc<dyn CollectionsSync>,
    )
    .with_concurrency(2);
    FanOutRig {
        search,
        activity,
        collections,
        fan_out,
    }
}

#[tokio::test]
async fn test_search_failures_do_not_stop_fan_out() {
    let db = test_db().await;
    let podcast = add_podcast(&db, None).await;
    let episodes = stored_episodes(&db, podcast, 5).await;
    let failing: Vec<i64> = episodes.iter().map(|e| e.id).filter(|id| id % 2 == 0).collect();
    let rig = fan_out_rig(
        Arc::new(db.clone()),
        RecordingSearch::failing_for(failing.clone()),
        RecordingCollections::default(),
    );

    let report = rig.fan_out.fan_out(podcast, &episodes).await;

    assert_eq!(report.index_failures, failing.len());
    assert_eq!(report.indexed, 5 - failing.len());
    assert_eq!(report.enqueued, 5);
    assert_eq!(report.batches_published, 1);
    assert_eq!(rig.search.documents.lock().unwrap().len(), 5 - failing.len());
    assert_eq!(rig.activity.total(), 5);
    assert_eq!(
        db.queue_stats(ENRICHMENT_QUEUE).await.unwrap().waiting,
        5
    );
}

#[tokio::test]
async fn test_enqueue_failures_do_not_stop_fan_out() {
    let db = test_db().await;
    let podcast = add_podcast(&db, None).await;
    let episodes = stored_episodes(&db, podcast, 4).await;
    let queue = FlakyQueue::new(db.clone(), &[episodes[1].url.as_str()]);
    let rig = fan_out_rig(
        Arc::new(queue),
        RecordingSearch::default(),
        RecordingCollections::default(),
    );

    let report = rig.fan_out.fan_out(podcast, &episodes).await;

    assert_eq!(report.enqueue_failures, 1);
    assert_eq!(report.enqueued, 3);
    assert_eq!(report.indexed, 4);
    assert_eq!(rig.activity.total(), 4);
    assert_eq!(
        db.queue_stats(ENRICHMENT_QUEUE).await.unwrap().waiting,
        3
    );
}

#[tokio::test]
async fn test_collections_failure_is_counted() {
    let db = test_db().await;
    let podcast = add_podcast(&db, None).await;
    let episodes = stored_episodes(&db, podcast, 3).await;
    let rig = fan_out_rig(
        Arc::new(db.clone()),
        RecordingSearch::default(),
        RecordingCollections::failing(),
    );

    let report = rig.fan_out.fan_out(podcast, &episodes).await;

    assert_eq!(report.batches_published, 1);
    assert_eq!(report.sync_failures, 1);
    assert_eq!(rig.activity.total(), 3);
    assert!(rig.collections.synced.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_fan_out_on_spawned_task() {
    let db = test_db().await;
    let podcast = add_podcast(&db, None).await;
    let episodes = stored_episodes(&db, podcast, 6).await;
    let rig = fan_out_rig(
        Arc::new(db.clone()),
        RecordingSearch::default(),
        RecordingCollections::default(),
    );
    let fan_out = Arc::new(rig.fan_out);

    let report = tokio::spawn({
        let fan_out = Arc::clone(&fan_out);
        async move { fan_out.fan_out(podcast, &episodes).await }
    })
    .await
    .unwrap();

    assert_eq!(report.indexed, 6);
    assert_eq!(report.enqueued, 6);
    assert_eq!(rig.search.documents.lock().unwrap().len(), 6);
}
