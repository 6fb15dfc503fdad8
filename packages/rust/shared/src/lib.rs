//! Shared types, error model, and configuration for Flashnotes.
//!
//! This crate is the foundation depended on by all other Flashnotes crates.
//! It provides:
//! - [`FlashnotesError`]: the unified error type and its fatal/per-item split
//! - Domain types ([`CatalogItem`], [`IndexEntry`], [`ContentLeaf`], [`Document`], [`RunId`])
//! - Configuration ([`AppConfig`] and its sections, config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CATALOG_MAX_RESULTS_CAP, FilterConfig, HttpConfig, LedgerConfig, SinkBackend,
    SinkConfig, SourceConfig, SummarizerConfig, TranscriptConfig, config_dir, config_file_path,
    init_config, load_config, load_config_from, parse_url, require_env,
};
pub use error::{FlashnotesError, Result};
pub use types::{CatalogItem, ContentLeaf, Document, IndexEntry, LEAF_ID_PREFIX, RunId};
