//! Caption track client for the `timedtext` endpoint (`fmt=json3`).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use flashnotes_shared::{FlashnotesError, HttpConfig, Result, TranscriptConfig, parse_url};

use crate::TranscriptSource;

const USER_AGENT: &str = concat!("Flashnotes/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct Track {
    #[serde(default)]
    events: Vec<Event>,
}

#[derive(Debug, Deserialize)]
struct Event {
    #[serde(default)]
    segs: Vec<Segment>,
}

#[derive(Debug, Deserialize)]
struct Segment {
    #[serde(default)]
    utf8: String,
}

/// Fetches caption tracks over HTTP.
pub struct TimedTextClient {
    client: Client,
    endpoint: Url,
    language: String,
}

impl TimedTextClient {
    pub fn new(config: &TranscriptConfig, http: &HttpConfig) -> Result<Self> {
        let base = parse_url("transcript.base_url", &config.base_url)?;
        let endpoint = base
            .join("api/timedtext")
            .map_err(|e| FlashnotesError::config(format!("transcript.base_url: {e}")))?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(http.timeout_secs))
            .build()
            .map_err(|e| FlashnotesError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            language: config.language.clone(),
        })
    }
}

#[async_trait]
impl TranscriptSource for TimedTextClient {
    #[instrument(skip(self), fields(lang = %self.language))]
    async fn fetch_fragments(&self, item_id: &str) -> Result<Vec<String>> {
        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&[
                ("v", item_id),
                ("lang", self.language.as_str()),
                ("fmt", "json3"),
            ])
            .send()
            .await
            .map_err(|e| FlashnotesError::extraction(item_id, e.without_url().to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FlashnotesError::extraction(item_id, "no caption track"));
        }
        if !status.is_success() {
            return Err(FlashnotesError::extraction(
                item_id,
                format!("caption service returned HTTP {status}"),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FlashnotesError::extraction(item_id, e.to_string()))?;

        // Disabled or missing captions come back as an empty 200.
        if body.trim().is_empty() {
            return Err(FlashnotesError::extraction(item_id, "no transcript available"));
        }

        let track: Track = serde_json::from_str(&body).map_err(|e| {
            FlashnotesError::extraction(item_id, format!("malformed caption track: {e}"))
        })?;

        let fragments = into_fragments(track);
        debug!(item_id, count = fragments.len(), "caption fragments fetched");
        Ok(fragments)
    }
}

/// One fragment per event: its segments concatenated, then trimmed.
fn into_fragments(track: Track) -> Vec<String> {
    track
        .events
        .into_iter()
        .map(|event| {
            event
                .segs
                .iter()
                .map(|s| s.utf8.as_str())
                .collect::<String>()
                .trim()
                .to_string()
        })
        .filter(|fragment| !fragment.is_empty())
        .collect()
}
