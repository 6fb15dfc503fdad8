//! Error types for Flashnotes.
//!
//! Library crates use [`FlashnotesError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Variants fall into two classes, see [`FlashnotesError::is_fatal`]:
//! setup failures abort the whole run, everything else is scoped to one item.

use std::path::PathBuf;

/// Top-level error type for all Flashnotes operations.
#[derive(Debug, thiserror::Error)]
pub enum FlashnotesError {
    /// Configuration loading or validation error (includes missing credentials).
    #[error("config error: {message}")]
    Config { message: String },

    /// The content catalog could not be queried (network, status, body).
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// The content catalog rejected our credentials (HTTP 403). Not retryable.
    #[error("source unauthorized: {0}")]
    SourceUnauthorized(String),

    /// No transcript could be retrieved for an item.
    #[error("extraction failed for {item_id}: {reason}")]
    ExtractionFailed { item_id: String, reason: String },

    /// The summarization service errored or returned nothing usable.
    #[error("summarization failed: {0}")]
    SummarizationFailed(String),

    /// The destination store cannot be reached or refused our credentials.
    #[error("sink unavailable: {0}")]
    SinkUnavailable(String),

    /// A single write was rejected because the stored revision moved.
    #[error("write conflict on {key}")]
    SinkConflict { key: String },

    /// A write still conflicted after the merge-and-retry.
    #[error("write conflict on {key} persisted after retry")]
    SinkConflictUnresolved { key: String },

    /// Any other destination store error (bad response, decode failure, SQL error).
    #[error("storage error: {0}")]
    Storage(String),

    /// The processed-set ledger could not be durably rewritten.
    #[error("ledger flush failed at {path:?}: {source}")]
    LedgerFlush {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, FlashnotesError>;

impl FlashnotesError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an extraction error for `item_id`.
    pub fn extraction(item_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ExtractionFailed {
            item_id: item_id.into(),
            reason: reason.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error must end the run instead of failing a single item.
    ///
    /// Setup failures (bad config, unreachable or unauthorized source or sink)
    /// are fatal; extraction, summarization, conflicts and ledger flushes are not.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config { .. }
                | Self::SourceUnavailable(_)
                | Self::SourceUnauthorized(_)
                | Self::SinkUnavailable(_)
        )
    }
}
