use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

use feedcast::config::Config;
use feedcast::feed::HttpFeedSource;
use feedcast::pipeline::{
    enqueue_due_podcasts, FanOut, FeedFetchConsumer, ImageEnrichmentConsumer, Reconciler,
    FEED_JOB_OPTIONS,
};
use feedcast::queue::{
    enqueue_job, EnrichmentJob, FeedJob, JobOptions, JobQueue, Worker, ENRICHMENT_QUEUE,
    FEED_QUEUE,
};
use feedcast::scrape::OgScraper;
use feedcast::services::{
    ErrorReporter, HttpActivityFeed, HttpCollectionsSync, HttpSearchIndex, TracingReporter,
};
use feedcast::storage::{Database, DatabaseError, EntityKind, NewPodcast};
use feedcast::util::{normalize_url, validate_url};

#[derive(Parser, Debug)]
#[command(
    name = "feedcast",
    about = "Podcast feed reconciliation and preview-image enrichment workers"
)]
struct Args {
    /// Config file
    #[arg(long, value_name = "FILE", default_value = "feedcast.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run queue workers until Ctrl-C
    Work {
        #[arg(long, value_enum, default_value_t = QueueChoice::All)]
        queue: QueueChoice,
    },
    /// Register a podcast feed
    AddPodcast {
        #[arg(long)]
        title: String,
        #[arg(long)]
        feed_url: String,
        /// Website of the show
        #[arg(long)]
        link: Option<String>,
    },
    /// Enqueue a feed job for one podcast
    EnqueuePodcast { id: i64 },
    /// Enqueue a preview-image job
    EnqueueOg {
        /// episode, podcast or anything else for articles
        #[arg(long = "type", default_value = "article")]
        kind: String,
        #[arg(long)]
        url: String,
    },
    /// Enqueue feed jobs for podcasts not scraped recently
    Conduct {
        #[arg(long, default_value_t = 15)]
        older_than_minutes: i64,
    },
    /// Show per-status job counts
    QueueStats,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum QueueChoice {
    Podcast,
    Og,
    All,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    tracing::debug!(?config, "Configuration");

    let db = match Database::open(&config.database_path).await {
        Ok(db) => db,
        Err(DatabaseError::Locked) => {
            eprintln!(
                "Error: database {} is locked by another process. Try again shortly.",
                config.database_path
            );
            std::process::exit(1);
        }
        Err(e) => return Err(e).context("Failed to open database"),
    };

    let result = run(args.command, &config, &db).await;
    db.close().await;
    result
}

async fn run(command: Command, config: &Config, db: &Database) -> Result<()> {
    match command {
        Command::Work { queue } => work(queue, config, db).await,
        Command::AddPodcast {
            title,
            feed_url,
            link,
        } => {
            let feed_url = validate_url(&feed_url)
                .with_context(|| format!("Invalid feed URL: {feed_url}"))?
                .to_string();
            // Enrichment matches podcasts by link, so store it normalized
            let link = link
                .map(|l| normalize_url(&l))
                .transpose()
                .context("Invalid link")?;
            let id = db
                .insert_podcast(&NewPodcast {
                    title,
                    feed_url,
                    link,
                })
                .await
                .context("Failed to register podcast")?;
            println!("Podcast {id} registered");
            Ok(())
        }
        Command::EnqueuePodcast { id } => {
            let podcast = db
                .get_podcast(id)
                .await?
                .with_context(|| format!("Podcast {id} not found"))?;
            let job = FeedJob {
                podcast: podcast.id,
                url: podcast.feed_url,
            };
            let job_id = enqueue_job(db, FEED_QUEUE, &job, FEED_JOB_OPTIONS).await?;
            println!("Enqueued feed job {job_id} for podcast {id}");
            Ok(())
        }
        Command::EnqueueOg { kind, url } => {
            let kind: EntityKind = serde_json::from_value(serde_json::Value::String(kind))
                .context("Invalid entity type")?;
            let job = EnrichmentJob {
                kind,
                url,
                podcast: None,
            };
            let job_id = enqueue_job(db, ENRICHMENT_QUEUE, &job, JobOptions::discard()).await?;
            println!("Enqueued {kind} enrichment job {job_id}");
            Ok(())
        }
        Command::Conduct { older_than_minutes } => {
            let count = enqueue_due_podcasts(
                db,
                db,
                chrono::Duration::minutes(older_than_minutes.max(0)),
            )
            .await
            .context("Failed to schedule podcasts")?;
            println!("Enqueued {count} feed jobs");
            Ok(())
        }
        Command::QueueStats => {
            for queue in [FEED_QUEUE, ENRICHMENT_QUEUE] {
                let stats = db.queue_stats(queue).await?;
                println!(
                    "{queue:<8} waiting={} active={} completed={} failed={}",
                    stats.waiting, stats.active, stats.completed, stats.failed
                );
            }
            Ok(())
        }
    }
}

async fn work(choice: QueueChoice, config: &Config, db: &Database) -> Result<()> {
    let http = reqwest::Client::builder()
        .user_agent(concat!("feedcast/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to create HTTP client")?;

    let queue: Arc<dyn JobQueue> = Arc::new(db.clone());
    let store = Arc::new(db.clone());
    let reporter: Arc<dyn ErrorReporter> = Arc::new(TracingReporter);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut workers = tokio::task::JoinSet::new();

    if matches!(choice, QueueChoice::Podcast | QueueChoice::All) {
        let fan_out = FanOut::new(
            Arc::new(HttpSearchIndex::new(http.clone(), config.search_url.clone())),
            Arc::clone(&queue),
            Arc::new(HttpActivityFeed::new(
                http.clone(),
                config.activity_url.clone(),
                config.activity_api_key(),
            )),
            Arc::new(HttpCollectionsSync::new(
                http.clone(),
                config.collections_url.clone(),
            )),
        )
        .with_batch_size(config.activity_batch_size)
        .with_concurrency(config.fanout_concurrency);

        let consumer = FeedFetchConsumer::new(
            store.clone(),
            Arc::new(HttpFeedSource::new(http.clone())),
            Reconciler::new(store.clone(), config.reconcile_concurrency),
            fan_out,
            Arc::clone(&reporter),
        );
        let worker = Worker::new(
            Arc::clone(&queue),
            Arc::new(consumer),
            config.feed_worker(),
        );
        let rx = shutdown_rx.clone();
        workers.spawn(async move { worker.run(rx).await });
    }

    if matches!(choice, QueueChoice::Og | QueueChoice::All) {
        let scraper = OgScraper::new(config.allow_private_hosts)
            .context("Failed to create scraper HTTP client")?;
        let consumer =
            ImageEnrichmentConsumer::new(store.clone(), Arc::new(scraper), Arc::clone(&reporter));
        let worker = Worker::new(
            Arc::clone(&queue),
            Arc::new(consumer),
            config.enrichment_worker(),
        );
        let rx = shutdown_rx.clone();
        workers.spawn(async move { worker.run(rx).await });
    }

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            tracing::info!("Shutdown requested, draining in-flight jobs");
        }
        _ = async { while workers.join_next().await.is_some() {} } => {
            tracing::warn!("Workers exited on their own");
        }
    }

    // Receivers may already be gone if workers exited
    let _ = shutdown_tx.send(true);
    while let Some(finished) = workers.join_next().await {
        if let Err(e) = finished {
            tracing::error!(error = %e, "Worker task panicked");
        }
    }
    Ok(())
}
