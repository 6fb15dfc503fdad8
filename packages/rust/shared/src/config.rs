//! Application configuration for Flashnotes.
//!
//! User config lives at `~/.flashnotes/flashnotes.toml`.
//! CLI flags override config file values, which override defaults.
//! Secrets are never stored in the file: each section names the environment
//! variable that holds its credential.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{FlashnotesError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "flashnotes.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".flashnotes";

/// Upper bound the catalog service accepts for `maxResults`.
pub const CATALOG_MAX_RESULTS_CAP: u32 = 50;

// ---------------------------------------------------------------------------
// Config structs (matching flashnotes.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub filter: FilterConfig,

    #[serde(default)]
    pub transcript: TranscriptConfig,

    #[serde(default)]
    pub summarizer: SummarizerConfig,

    #[serde(default)]
    pub sink: SinkConfig,

    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub http: HttpConfig,
}

/// `[source]` section: the channel whose uploads are polled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Channel (collection) identifier.
    #[serde(default = "default_channel_id")]
    pub channel_id: String,

    /// How many of the most recent items to list per run.
    #[serde(default = "default_max_results")]
    pub max_results: u32,

    /// Name of the env var holding the catalog API key.
    #[serde(default = "default_source_key_env")]
    pub api_key_env: String,

    /// Catalog API origin.
    #[serde(default = "default_source_base_url")]
    pub base_url: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            channel_id: default_channel_id(),
            max_results: default_max_results(),
            api_key_env: default_source_key_env(),
            base_url: default_source_base_url(),
        }
    }
}

fn default_channel_id() -> String {
    "UCcgaoWXUKFl-P3rdNXCuWjg".into()
}
fn default_max_results() -> u32 {
    CATALOG_MAX_RESULTS_CAP
}
fn default_source_key_env() -> String {
    "YOUTUBE_API_KEY".into()
}
fn default_source_base_url() -> String {
    "https://www.googleapis.com".into()
}

/// `[filter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Case-sensitive substring a title must contain.
    #[serde(default = "default_marker")]
    pub marker: String,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            marker: default_marker(),
        }
    }
}

fn default_marker() -> String {
    "ITPM Flash".into()
}

/// `[transcript]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptConfig {
    /// Origin serving caption tracks.
    #[serde(default = "default_transcript_base_url")]
    pub base_url: String,

    /// Caption language code.
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            base_url: default_transcript_base_url(),
            language: default_language(),
        }
    }
}

fn default_transcript_base_url() -> String {
    "https://www.youtube.com".into()
}
fn default_language() -> String {
    "en".into()
}

/// `[summarizer]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_summarizer_key_env")]
    pub api_key_env: String,

    /// Model used for summaries.
    #[serde(default = "default_model")]
    pub model: String,

    /// Output-length bound sent with every request.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// API origin.
    #[serde(default = "default_summarizer_base_url")]
    pub base_url: String,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_summarizer_key_env(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            base_url: default_summarizer_base_url(),
        }
    }
}

fn default_summarizer_key_env() -> String {
    "ANTHROPIC_API_KEY".into()
}
fn default_model() -> String {
    "claude-3-5-sonnet-latest".into()
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_summarizer_base_url() -> String {
    "https://api.anthropic.com".into()
}

/// Which destination store backs the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkBackend {
    /// CouchDB-compatible HTTP document store.
    #[default]
    Couchdb,
    /// Local libSQL database file.
    Libsql,
}

/// `[sink]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    #[serde(default)]
    pub backend: SinkBackend,

    /// CouchDB server origin.
    #[serde(default = "default_sink_endpoint")]
    pub endpoint: String,

    /// CouchDB database name.
    #[serde(default = "default_database")]
    pub database: String,

    /// CouchDB user; anonymous access when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Name of the env var holding the CouchDB password.
    #[serde(default = "default_password_env")]
    pub password_env: String,

    /// Database file for the `libsql` backend.
    #[serde(default = "default_local_path")]
    pub local_path: PathBuf,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            backend: SinkBackend::default(),
            endpoint: default_sink_endpoint(),
            database: default_database(),
            username: None,
            password_env: default_password_env(),
            local_path: default_local_path(),
        }
    }
}

fn default_sink_endpoint() -> String {
    "http://127.0.0.1:5984".into()
}
fn default_database() -> String {
    "flashnotes".into()
}
fn default_password_env() -> String {
    "COUCHDB_PASSWORD".into()
}
fn default_local_path() -> PathBuf {
    PathBuf::from("flashnotes.db")
}

/// `[ledger]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// File holding the ids of already-summarized items.
    #[serde(default = "default_ledger_path")]
    pub path: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
        }
    }
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("processed_videos.json")
}

/// `[http]` section, shared by every outbound client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    60
}

impl AppConfig {
    /// Check values that would otherwise fail later in the run.
    pub fn validate(&self) -> Result<()> {
        if self.source.channel_id.trim().is_empty() {
            return Err(FlashnotesError::config("source.channel_id must not be empty"));
        }
        if self.source.max_results == 0 {
            return Err(FlashnotesError::config("source.max_results must be at least 1"));
        }
        if self.filter.marker.is_empty() {
            return Err(FlashnotesError::config("filter.marker must not be empty"));
        }
        if self.summarizer.max_tokens == 0 {
            return Err(FlashnotesError::config("summarizer.max_tokens must be at least 1"));
        }
        parse_url("source.base_url", &self.source.base_url)?;
        parse_url("transcript.base_url", &self.transcript.base_url)?;
        parse_url("summarizer.base_url", &self.summarizer.base_url)?;
        if self.sink.backend == SinkBackend::Couchdb {
            parse_url("sink.endpoint", &self.sink.endpoint)?;
            if self.sink.database.trim().is_empty() {
                return Err(FlashnotesError::config("sink.database must not be empty"));
            }
        }
        Ok(())
    }
}

/// Parse a configured URL, naming the offending key on failure.
pub fn parse_url(key: &str, value: &str) -> Result<Url> {
    Url::parse(value).map_err(|e| FlashnotesError::config(format!("{key} '{value}': {e}")))
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.flashnotes/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| FlashnotesError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.flashnotes/flashnotes.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| FlashnotesError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        FlashnotesError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| FlashnotesError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| FlashnotesError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| FlashnotesError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read a credential from the env var named by the config. Empty counts as missing.
pub fn require_env(var_name: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(FlashnotesError::config(format!(
            "credential not found. Set the {var_name} environment variable."
        ))),
    }
}
