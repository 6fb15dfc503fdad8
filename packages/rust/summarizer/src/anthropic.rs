//! Anthropic Messages API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use url::Url;

use flashnotes_shared::{FlashnotesError, HttpConfig, Result, SummarizerConfig, parse_url};

use crate::Summarizer;
use crate::prompt::build_prompt;

const API_VERSION: &str = "2023-06-01";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    model: String,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct AnthropicSummarizer {
    client: Client,
    endpoint: Url,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicSummarizer {
    pub fn new(config: &SummarizerConfig, api_key: String, http: &HttpConfig) -> Result<Self> {
        let base = parse_url("summarizer.base_url", &config.base_url)?;
        let endpoint = base
            .join("v1/messages")
            .map_err(|e| FlashnotesError::config(format!("summarizer.base_url: {e}")))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(http.timeout_secs))
            .build()
            .map_err(|e| FlashnotesError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl Summarizer for AnthropicSummarizer {
    #[instrument(skip_all, fields(model = %self.model, chars = text.len()))]
    async fn summarize(&self, text: &str) -> Result<String> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: vec![Message {
                role: "user",
                content: build_prompt(text),
            }],
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| FlashnotesError::SummarizationFailed(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FlashnotesError::SummarizationFailed(format!(
                "HTTP {status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let reply: MessagesResponse = response.json().await.map_err(|e| {
            FlashnotesError::SummarizationFailed(format!("malformed response: {e}"))
        })?;

        if let Some(usage) = &reply.usage {
            info!(
                model = %reply.model,
                tokens_in = usage.input_tokens,
                tokens_out = usage.output_tokens,
                "summary generated"
            );
        }

        reply
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .find(|text| !text.trim().is_empty())
            .ok_or_else(|| FlashnotesError::SummarizationFailed("response contained no text".into()))
    }
}
