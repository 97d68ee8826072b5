//! Worker configuration loaded from `feedcast.toml`.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde but logged as warnings, since they are
//! usually typos.
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::queue::WorkerConfig;

/// Environment variable that overrides `activity_api_key`
pub const ACTIVITY_KEY_ENV: &str = "FEEDCAST_ACTIVITY_API_KEY";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level worker configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// The custom Debug impl masks `activity_api_key`.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file.
    pub database_path: String,

    /// Sleep between polls of an empty queue.
    pub poll_interval_ms: u64,

    /// How long a claimed job stays invisible before it is redelivered.
    pub job_lease_secs: u64,

    /// Feed jobs processed in parallel.
    pub feed_concurrency: usize,

    /// Enrichment jobs processed in parallel.
    pub enrichment_concurrency: usize,

    /// Episode upserts in flight per feed job.
    pub reconcile_concurrency: usize,

    /// Search/enqueue pairs in flight per feed job.
    pub fanout_concurrency: usize,

    /// Activities per publish call.
    pub activity_batch_size: usize,

    /// Search index endpoint; unset disables indexing.
    pub search_url: Option<String>,

    /// Activity feed API base; unset disables publishing.
    pub activity_url: Option<String>,

    /// Activity feed API key. The env var takes precedence.
    pub activity_api_key: Option<String>,

    /// Collections service endpoint; unset disables sync.
    pub collections_url: Option<String>,

    /// Let the scraper reach loopback and private addresses.
    pub allow_private_hosts: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "feedcast.db".to_string(),
            poll_interval_ms: 1000,
            job_lease_secs: 300,
            feed_concurrency: 4,
            enrichment_concurrency: 8,
            reconcile_concurrency: 8,
            fanout_concurrency: 8,
            activity_batch_size: 100,
            search_url: None,
            activity_url: None,
            activity_api_key: None,
            collections_url: None,
            allow_private_hosts: false,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("job_lease_secs", &self.job_lease_secs)
            .field("feed_concurrency", &self.feed_concurrency)
            .field("enrichment_concurrency", &self.enrichment_concurrency)
            .field("reconcile_concurrency", &self.reconcile_concurrency)
            .field("fanout_concurrency", &self.fanout_concurrency)
            .field("activity_batch_size", &self.activity_batch_size)
            .field("search_url", &self.search_url)
            .field("activity_url", &self.activity_url)
            .field(
                "activity_api_key",
                &self.activity_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("collections_url", &self.collections_url)
            .field("allow_private_hosts", &self.allow_private_hosts)
            .finish()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 13] = [
        "database_path",
        "poll_interval_ms",
        "job_lease_secs",
        "feed_concurrency",
        "enrichment_concurrency",
        "reconcile_concurrency",
        "fanout_concurrency",
        "activity_batch_size",
        "search_url",
        "activity_url",
        "activity_api_key",
        "collections_url",
        "allow_private_hosts",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            database = %config.database_path,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Activity API key, with the environment overriding the file.
    pub fn activity_api_key(&self) -> Option<SecretString> {
        std::env::var(ACTIVITY_KEY_ENV)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| self.activity_api_key.clone())
            .map(SecretString::from)
    }

    pub fn lease(&self) -> Duration {
        Duration::from_secs(self.job_lease_secs.max(1))
    }

    pub fn feed_worker(&self) -> WorkerConfig {
        WorkerConfig {
            concurrency: self.feed_concurrency.max(1),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            lease: self.lease(),
        }
    }

    pub fn enrichment_worker(&self) -> WorkerConfig {
        WorkerConfig {
            concurrency: self.enrichment_concurrency.max(1),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            lease: self.lease(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
