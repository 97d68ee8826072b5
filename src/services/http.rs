//! JSON-over-HTTP adapters for the downstream services.
//!
//! Each adapter takes an optional endpoint. Without one it logs at debug
//! level and reports success, which lets a single worker run without the
//! full set of downstream services.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::time::Duration;

use super::{Activity, ActivityFeed, CollectionsSync, SearchDocument, SearchIndex};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

async fn post_json<T: Serialize + ?Sized>(
    request: reqwest::RequestBuilder,
    body: &T,
    what: &str,
) -> Result<()> {
    let response = tokio::time::timeout(REQUEST_TIMEOUT, request.json(body).send())
        .await
        .with_context(|| format!("{what} request timed out"))?
        .with_context(|| format!("{what} request failed"))?;

    let status = response.status();
    if !status.is_success() {
        bail!("{what} returned HTTP {}", status.as_u16());
    }
    Ok(())
}

fn join_endpoint(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Search index writer: `POST {endpoint}` with the document as body.
#[derive(Clone)]
pub struct HttpSearchIndex {
    client: reqwest::Client,
    endpoint: Option<String>,
}

impl HttpSearchIndex {
    pub fn new(client: reqwest::Client, endpoint: Option<String>) -> Self {
        Self { client, endpoint }
    }
}

#[async_trait]
impl SearchIndex for HttpSearchIndex {
    async fn index(&self, document: &SearchDocument) -> Result<()> {
        let Some(endpoint) = &self.endpoint else {
            tracing::debug!(episode_id = document.id, "No search endpoint configured, skipping");
            return Ok(());
        };
        post_json(self.client.post(endpoint), document, "Search index").await
    }
}

#[derive(Serialize)]
struct ActivityBatch<'a> {
    activities: &'a [Activity],
}

/// Activity feed publisher: `POST {endpoint}/feed/{group}/{id}/`.
pub struct HttpActivityFeed {
    client: reqwest::Client,
    endpoint: Option<String>,
    api_key: Option<SecretString>,
}

impl HttpActivityFeed {
    pub fn new(
        client: reqwest::Client,
        endpoint: Option<String>,
        api_key: Option<SecretString>,
    ) -> Self {
        Self {
            client,
            endpoint,
            api_key,
        }
    }
}

#[async_trait]
impl ActivityFeed for HttpActivityFeed {
    async fn add_activities(&self, group: &str, id: i64, activities: &[Activity]) -> Result<()> {
        let Some(endpoint) = &self.endpoint else {
            tracing::debug!(
                feed = %format!("{group}:{id}"),
                count = activities.len(),
                "No activity endpoint configured, skipping"
            );
            return Ok(());
        };

        let url = join_endpoint(endpoint, &format!("feed/{group}/{id}/"));
        let mut request = self.client.post(url);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key.expose_secret()));
        }
        post_json(request, &ActivityBatch { activities }, "Activity feed").await
    }
}

#[derive(Serialize)]
struct CollectionsEvent {
    #[serde(rename = "type")]
    kind: &'static str,
    id: i64,
}

/// Collections notifier: `POST {endpoint}` with `{type: "podcast", id}`.
#[derive(Clone)]
pub struct HttpCollectionsSync {
    client: reqwest::Client,
    endpoint: Option<String>,
}

impl HttpCollectionsSync {
    pub fn new(client: reqwest::Client, endpoint: Option<String>) -> Self {
        Self { client, endpoint }
    }
}

#[async_trait]
impl CollectionsSync for HttpCollectionsSync {
    async fn sync_podcast(&self, podcast_id: i64) -> Result<()> {
        let Some(endpoint) = &self.endpoint else {
            tracing::debug!(podcast_id = podcast_id, "No collections endpoint configured, skipping");
            return Ok(());
        };
        let event = CollectionsEvent {
            kind: "podcast",
            id: podcast_id,
        };
        post_json(self.client.post(endpoint), &event, "Collections").await
    }
}
