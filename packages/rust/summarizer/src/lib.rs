//! Transcript summarization for Flashnotes.
//!
//! One fixed instruction template wraps the transcript; the request goes to
//! the Anthropic Messages API and the first text block of the reply is the
//! summary.

pub mod anthropic;
pub mod prompt;

use async_trait::async_trait;

use flashnotes_shared::Result;

pub use anthropic::AnthropicSummarizer;
pub use prompt::build_prompt;

/// Turns a normalized transcript into a markdown summary.
///
/// Failures are [`FlashnotesError::SummarizationFailed`] and scoped to one item.
///
/// [`FlashnotesError::SummarizationFailed`]: flashnotes_shared::FlashnotesError::SummarizationFailed
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<String>;
}
