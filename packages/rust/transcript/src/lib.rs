//! Transcript retrieval and normalization for Flashnotes.
//!
//! A [`TranscriptSource`] returns raw caption fragments for an item;
//! [`normalize_fragments`] turns them into the plain text handed to the
//! summarizer. [`extract`] does both.

pub mod timedtext;

use async_trait::async_trait;
use tracing::debug;

use flashnotes_shared::{FlashnotesError, Result};

pub use timedtext::TimedTextClient;

/// Caption fragments that carry no speech and are dropped.
pub const NON_SPEECH_MARKERS: &[&str] = &["[Music]", "[Applause]", "[Laughter]"];

/// Raw caption fragments for one item, in playback order.
///
/// Any failure is [`FlashnotesError::ExtractionFailed`] and scoped to that item.
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    async fn fetch_fragments(&self, item_id: &str) -> Result<Vec<String>>;
}

/// Join fragments with a single space, skipping non-speech markers.
pub fn normalize_fragments(fragments: &[String]) -> String {
    fragments
        .iter()
        .map(String::as_str)
        .filter(|f| !NON_SPEECH_MARKERS.contains(f))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Fetch and normalize the transcript of `item_id`.
///
/// An empty normalized transcript counts as a failed extraction.
pub async fn extract(source: &dyn TranscriptSource, item_id: &str) -> Result<String> {
    let fragments = source.fetch_fragments(item_id).await?;
    let text = normalize_fragments(&fragments);
    if text.trim().is_empty() {
        return Err(FlashnotesError::extraction(
            item_id,
            "transcript contains no speech",
        ));
    }
    debug!(item_id, fragments = fragments.len(), chars = text.len(), "transcript extracted");
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<&'static str>);

    #[async_trait]
    impl TranscriptSource for Fixed {
        async fn fetch_fragments(&self, _item_id: &str) -> Result<Vec<String>> {
            Ok(self.0.iter().map(|s| s.to_string()).collect())
        }
    }

    fn owned(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn markers_are_removed_and_words_joined() {
        let fragments = owned(&["[Music]", "Hello", "world", "[Applause]"]);
        assert_eq!(normalize_fragments(&fragments), "Hello world");
    }

    #[test]
    fn markers_only_match_whole_fragments() {
        let fragments = owned(&["[Music] intro", "[Laughter]", "done"]);
        assert_eq!(normalize_fragments(&fragments), "[Music] intro done");
    }

    #[test]
    fn no_fragments_is_empty() {
        assert_eq!(normalize_fragments(&[]), "");
    }

    #[tokio::test]
    async fn extract_returns_normalized_text() {
        let source = Fixed(vec!["Rates", "[Music]", "held"]);
        let text = extract(&source, "vid1").await.unwrap();
        assert_eq!(text, "Rates held");
    }

    #[tokio::test]
    async fn markers_only_transcript_fails() {
        let source = Fixed(vec!["[Music]", "[Applause]"]);
        let err = extract(&source, "vid1").await.unwrap_err();
        match err {
            FlashnotesError::ExtractionFailed { item_id, .. } => assert_eq!(item_id, "vid1"),
            other => panic!("expected ExtractionFailed, got {other:?}"),
        }
    }
}
