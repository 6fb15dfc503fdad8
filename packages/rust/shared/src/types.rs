//! Core domain types for Flashnotes runs and stored summaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix for generated content leaf ids.
pub const LEAF_ID_PREFIX: &str = "leaf:";

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one pipeline run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// CatalogItem
// ---------------------------------------------------------------------------

/// One item listed by the content catalog. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    /// Opaque source-assigned identifier (a video id).
    pub id: String,
    /// Display title as published.
    pub title: String,
    /// Position in the newest-first listing (0 = most recent).
    pub publish_rank: usize,
    /// Publish timestamp when the source reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Stored documents
// ---------------------------------------------------------------------------

/// Parent document: one per distinct title, pointing at its content leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Deterministic key derived from the title; also the document id.
    #[serde(rename = "path")]
    pub key: String,
    /// Leaf ids holding the current content, in order.
    pub children: Vec<String>,
    #[serde(rename = "ctime", with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "mtime", with = "chrono::serde::ts_milliseconds")]
    pub modified_at: DateTime<Utc>,
    /// Content length in bytes.
    #[serde(rename = "size")]
    pub byte_size: usize,
}

impl IndexEntry {
    /// A fresh entry for `key` with no children yet.
    pub fn new(key: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            children: Vec::new(),
            created_at: now,
            modified_at: now,
            byte_size: 0,
        }
    }
}

/// Child document holding the generated text. Owned by exactly one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentLeaf {
    pub leaf_id: String,
    pub data: String,
}

impl ContentLeaf {
    /// Build a leaf with a freshly generated unique id.
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            leaf_id: format!("{LEAF_ID_PREFIX}{}", Uuid::now_v7()),
            data: data.into(),
        }
    }
}

/// A document as persisted in the destination store, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Document {
    Markdown(IndexEntry),
    Leaf(ContentLeaf),
}

impl Document {
    /// The id this document is stored under.
    pub fn id(&self) -> &str {
        match self {
            Self::Markdown(entry) => &entry.key,
            Self::Leaf(leaf) => &leaf.leaf_id,
        }
    }

    /// Short kind label, matching the serialized `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Markdown(_) => "markdown",
            Self::Leaf(_) => "leaf",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn run_id_roundtrip() {
        let id = RunId::new();
        let parsed: RunId = id.to_string().parse().expect("parse RunId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn entry_serializes_with_store_field_names() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 9, 30, 0).single().unwrap();
        let mut entry = IndexEntry::new("weekly itpm flash update.md", now);
        entry.children = vec!["leaf:1".into()];
        entry.byte_size = 42;

        let json = serde_json::to_value(Document::Markdown(entry)).expect("serialize");
        assert_eq!(json["type"], "markdown");
        assert_eq!(json["path"], "weekly itpm flash update.md");
        assert_eq!(json["ctime"], now.timestamp_millis());
        assert_eq!(json["size"], 42);
        assert_eq!(json["children"][0], "leaf:1");
    }

    #[test]
    fn leaf_deserializes_from_tagged_json() {
        let json = r##"{"type":"leaf","leaf_id":"leaf:abc","data":"# Summary","_rev":"2-x"}"##;
        let doc: Document = serde_json::from_str(json).expect("deserialize");
        match doc {
            Document::Leaf(leaf) => {
                assert_eq!(leaf.leaf_id, "leaf:abc");
                assert_eq!(leaf.data, "# Summary");
            }
            other => panic!("expected leaf, got {other:?}"),
        }
    }

    #[test]
    fn leaf_ids_are_unique() {
        let a = ContentLeaf::new("x");
        let b = ContentLeaf::new("x");
        assert_ne!(a.leaf_id, b.leaf_id);
        assert!(a.leaf_id.starts_with(LEAF_ID_PREFIX));
    }
}
