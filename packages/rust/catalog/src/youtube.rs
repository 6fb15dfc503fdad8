//! YouTube Data API search client.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, instrument};
use url::Url;

use flashnotes_shared::{
    CATALOG_MAX_RESULTS_CAP, CatalogItem, FlashnotesError, HttpConfig, Result, SourceConfig,
    parse_url,
};

use crate::CatalogSource;

/// User-Agent string for catalog requests.
const USER_AGENT: &str = concat!("Flashnotes/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
    snippet: Option<Snippet>,
}

#[derive(Debug, Deserialize)]
struct SearchItemId {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Snippet {
    #[serde(default)]
    title: String,
    #[serde(rename = "publishedAt")]
    published_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Lists the most recent uploads of one channel, newest first.
pub struct YouTubeCatalog {
    client: Client,
    search_url: Url,
    channel_id: String,
    max_results: u32,
    api_key: String,
}

impl YouTubeCatalog {
    /// Build a client from the `[source]` section and a resolved API key.
    ///
    /// `max_results` is clamped to the service cap.
    pub fn new(config: &SourceConfig, api_key: String, http: &HttpConfig) -> Result<Self> {
        let base = parse_url("source.base_url", &config.base_url)?;
        let search_url = base
            .join("youtube/v3/search")
            .map_err(|e| FlashnotesError::config(format!("source.base_url: {e}")))?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(http.timeout_secs))
            .build()
            .map_err(|e| {
                FlashnotesError::SourceUnavailable(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            search_url,
            channel_id: config.channel_id.clone(),
            max_results: config.max_results.clamp(1, CATALOG_MAX_RESULTS_CAP),
            api_key,
        })
    }

    pub fn max_results(&self) -> u32 {
        self.max_results
    }
}

#[async_trait]
impl CatalogSource for YouTubeCatalog {
    #[instrument(skip_all, fields(channel = %self.channel_id, max_results = self.max_results))]
    async fn list_recent(&self) -> Result<Vec<CatalogItem>> {
        let max_results = self.max_results.to_string();
        let response = self
            .client
            .get(self.search_url.clone())
            .query(&[
                ("part", "snippet"),
                ("channelId", self.channel_id.as_str()),
                ("maxResults", max_results.as_str()),
                ("order", "date"),
                ("type", "video"),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| FlashnotesError::SourceUnavailable(e.without_url().to_string()))?;

        let status = response.status();
        if status == StatusCode::FORBIDDEN {
            return Err(FlashnotesError::SourceUnauthorized(
                "catalog API returned 403; the API key is invalid or not authorized".into(),
            ));
        }
        if !status.is_success() {
            return Err(FlashnotesError::SourceUnavailable(format!(
                "catalog API returned HTTP {status}"
            )));
        }

        let body: SearchResponse = response.json().await.map_err(|e| {
            FlashnotesError::SourceUnavailable(format!("malformed catalog response: {e}"))
        })?;

        let items = into_catalog_items(body);
        info!(count = items.len(), "catalog listed");
        Ok(items)
    }
}

/// Keep video results only, ranking them by their position in the response.
fn into_catalog_items(body: SearchResponse) -> Vec<CatalogItem> {
    body.items
        .into_iter()
        .filter_map(|item| {
            let Some(id) = item.id.video_id else {
                debug!("skipping non-video search result");
                return None;
            };
            let (title, published_at) = match item.snippet {
                Some(snippet) => (decode_entities(&snippet.title), snippet.published_at),
                None => (String::new(), None),
            };
            Some((id, title, published_at))
        })
        .enumerate()
        .map(|(rank, (id, title, published_at))| CatalogItem {
            id,
            title,
            publish_rank: rank,
            published_at,
        })
        .collect()
}

/// The search API HTML-escapes snippet titles.
fn decode_entities(raw: &str) -> String {
    raw.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
