//! Summary sink: one index entry per title, pointing at one content leaf.
//!
//! The leaf is written before the entry that references it, so a crash
//! between the two leaves at worst an unreferenced leaf, never a dangling
//! reference. A write that loses a revision race is merged onto the fresh
//! revision and retried once.

use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::{debug, info, instrument, warn};

use flashnotes_shared::{ContentLeaf, Document, FlashnotesError, IndexEntry, Result};

use crate::{DocumentStore, Revision};

/// Key used when a title normalizes to nothing.
const UNTITLED_STEM: &str = "untitled";

/// Deterministic document key for `title`.
///
/// Trims and lowercases the title, replaces characters that are unsafe in
/// file names with `_`, strips leading `_` and `.`, and appends `.md`.
pub fn document_key(title: &str) -> String {
    static UNSAFE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"[\\/:*?"<>|\x00-\x1F\x7F]"#).expect("valid regex")
    });

    let lowered = title.trim().to_lowercase();
    let replaced = UNSAFE_RE.replace_all(&lowered, "_");
    let stem = replaced.trim_start_matches(['_', '.']);
    let stem = if stem.is_empty() { UNTITLED_STEM } else { stem };
    format!("{stem}.md")
}

/// Writes summaries into a [`DocumentStore`].
#[derive(Clone)]
pub struct Sink {
    store: Arc<dyn DocumentStore>,
}

impl Sink {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Probe the store. Failure is [`FlashnotesError::SinkUnavailable`].
    pub async fn connect(&self) -> Result<()> {
        self.store.ping().await.map_err(|e| match e {
            FlashnotesError::SinkUnavailable(_) => e,
            other => FlashnotesError::SinkUnavailable(other.to_string()),
        })?;
        debug!("document store reachable");
        Ok(())
    }

    /// Create or replace the summary stored under `title`. Returns its key.
    ///
    /// On success the entry references exactly the new leaf. Leaves it used
    /// to reference are deleted afterwards; a failed delete is only logged.
    #[instrument(skip(self, content), fields(key = tracing::field::Empty, bytes = content.len()))]
    pub async fn upsert(&self, title: &str, content: &str) -> Result<String> {
        let key = document_key(title);
        tracing::Span::current().record("key", key.as_str());
        let now = Utc::now();

        let (mut entry, entry_rev) = match self.store.get(&key).await? {
            Some((Document::Markdown(entry), rev)) => (entry, Some(rev)),
            Some((other, _)) => {
                return Err(FlashnotesError::Storage(format!(
                    "{key} holds a {} document, not an entry",
                    other.kind()
                )));
            }
            None => (IndexEntry::new(key.clone(), now), None),
        };
        let mut stale_leaves = std::mem::take(&mut entry.children);

        let leaf = ContentLeaf::new(content);
        let leaf_id = leaf.leaf_id.clone();
        let (leaf_rev, _) = self.put_resolving(Document::Leaf(leaf), None, now).await?;

        entry.children = vec![leaf_id.clone()];
        entry.modified_at = now;
        entry.byte_size = content.len();

        let displaced = match self
            .put_resolving(Document::Markdown(entry), entry_rev, now)
            .await
        {
            Ok((_, displaced)) => displaced,
            Err(e) => {
                self.remove_quietly(&leaf_id, Some(leaf_rev)).await;
                return Err(e);
            }
        };

        stale_leaves.extend(displaced);
        stale_leaves.sort();
        stale_leaves.dedup();
        for stale in stale_leaves.iter().filter(|id| **id != leaf_id) {
            self.remove_quietly(stale, None).await;
        }

        info!(key = %key, leaf = %leaf_id, "summary stored");
        Ok(key)
    }

    /// Write `doc` at `rev`; on a conflict merge onto the current revision and
    /// retry once. Returns the new revision and, for entries, the children of
    /// the revision the merge displaced.
    async fn put_resolving(
        &self,
        doc: Document,
        rev: Option<Revision>,
        now: DateTime<Utc>,
    ) -> Result<(Revision, Vec<String>)> {
        match self.store.put(&doc, rev.as_deref()).await {
            Ok(new_rev) => return Ok((new_rev, Vec::new())),
            Err(FlashnotesError::SinkConflict { key }) => {
                warn!(key = %key, "write conflict, merging onto current revision");
            }
            Err(e) => return Err(e),
        }

        let current = self.store.get(doc.id()).await?;
        let (current_doc, current_rev) = match current {
            Some((doc, rev)) => (Some(doc), Some(rev)),
            None => (None, None),
        };
        let (merged, displaced) = merge(doc, current_doc, now);

        match self.store.put(&merged, current_rev.as_deref()).await {
            Ok(new_rev) => Ok((new_rev, displaced)),
            Err(FlashnotesError::SinkConflict { key }) => {
                Err(FlashnotesError::SinkConflictUnresolved { key })
            }
            Err(e) => Err(e),
        }
    }

    /// Best-effort delete; leaves an unreferenced document behind on failure.
    async fn remove_quietly(&self, id: &str, rev: Option<Revision>) {
        let rev = match rev {
            Some(rev) => rev,
            None => match self.store.get(id).await {
                Ok(Some((_, rev))) => rev,
                Ok(None) => return,
                Err(e) => {
                    warn!(id, error = %e, "could not look up stale document");
                    return;
                }
            },
        };
        match self.store.delete(id, &rev).await {
            Ok(()) => debug!(id, "stale document removed"),
            Err(e) => warn!(id, error = %e, "could not remove stale document"),
        }
    }
}

/// Lay this call's intended fields over the stored revision.
///
/// An entry keeps the stored `created_at` and takes everything else from the
/// intended write; the stored children are returned as displaced. A leaf is
/// overwritten outright.
fn merge(
    intended: Document,
    current: Option<Document>,
    now: DateTime<Utc>,
) -> (Document, Vec<String>) {
    match (intended, current) {
        (Document::Markdown(mut entry), Some(Document::Markdown(stored))) => {
            entry.created_at = stored.created_at;
            entry.modified_at = now;
            (Document::Markdown(entry), stored.children)
        }
        (intended, _) => (intended, Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use chrono::TimeZone;

    fn sink_with_store() -> (Sink, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (Sink::new(store.clone()), store)
    }

    fn entry_of(store: &MemoryStore, key: &str) -> IndexEntry {
        match store.document(key) {
            Some(Document::Markdown(entry)) => entry,
            other => panic!("expected entry at {key}, got {other:?}"),
        }
    }

    fn leaf_data(store: &MemoryStore, id: &str) -> String {
        match store.document(id) {
            Some(Document::Leaf(leaf)) => leaf.data,
            other => panic!("expected leaf at {id}, got {other:?}"),
        }
    }

    // -----------------------------------------------------------------------
    // Keys
    // -----------------------------------------------------------------------

    #[test]
    fn key_is_lowercased_and_suffixed() {
        assert_eq!(document_key("My Title!"), "my title!.md");
        assert_eq!(
            document_key("  Weekly ITPM Flash Update  "),
            "weekly itpm flash update.md"
        );
    }

    #[test]
    fn unsafe_characters_are_replaced() {
        assert_eq!(document_key("Rates: 2026/Q1?"), "rates_ 2026_q1_.md");
        assert_eq!(document_key(r#"a\b*c"d<e>f|g"#), "a_b_c_d_e_f_g.md");
        assert_eq!(document_key("tab\there"), "tab_here.md");
    }

    #[test]
    fn leading_separators_are_stripped() {
        assert_eq!(document_key(".hidden"), "hidden.md");
        assert_eq!(document_key("/etc/passwd"), "etc_passwd.md");
        assert_eq!(document_key("___"), "untitled.md");
        assert_eq!(document_key(""), "untitled.md");
    }

    #[test]
    fn key_is_stable() {
        assert_eq!(document_key("My Title!"), document_key("My Title!"));
        assert_eq!(document_key("My Title!"), document_key("my title!"));
    }

    // -----------------------------------------------------------------------
    // Upsert
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn first_write_creates_entry_and_leaf() {
        let (sink, store) = sink_with_store();
        let key = sink.upsert("My Title!", "c1").await.unwrap();

        let entry = entry_of(&store, &key);
        assert_eq!(entry.children.len(), 1);
        assert_eq!(entry.byte_size, 2);
        assert_eq!(leaf_data(&store, &entry.children[0]), "c1");
        assert_eq!(store.leaf_ids(), entry.children);
    }

    #[tokio::test]
    async fn rewriting_a_title_replaces_its_content() {
        let (sink, store) = sink_with_store();
        let first = sink.upsert("My Title!", "c1").await.unwrap();
        let created = entry_of(&store, &first).created_at;
        let second = sink.upsert("My Title!", "c2").await.unwrap();
        assert_eq!(first, second);

        let entry = entry_of(&store, &second);
        assert_eq!(entry.children.len(), 1);
        assert_eq!(leaf_data(&store, &entry.children[0]), "c2");
        assert_eq!(entry.created_at, created);

        // The leaf holding c1 is gone.
        assert_eq!(store.leaf_ids(), entry.children);
        assert_eq!(store.ids().len(), 2);
    }

    #[tokio::test]
    async fn single_conflict_is_merged_and_retried() {
        let (sink, store) = sink_with_store();
        let created = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).single().unwrap();
        let mut existing = IndexEntry::new("my title!.md", created);
        let old_leaf = ContentLeaf::new("c0");
        existing.children = vec![old_leaf.leaf_id.clone()];
        store.seed(Document::Leaf(old_leaf));
        store.seed(Document::Markdown(existing));

        store.inject_conflicts("my title!.md", 1);
        let key = sink.upsert("My Title!", "c1").await.unwrap();

        let entry = entry_of(&store, &key);
        assert_eq!(entry.created_at, created);
        assert_eq!(leaf_data(&store, &entry.children[0]), "c1");
        assert_eq!(store.leaf_ids(), entry.children);
    }

    #[tokio::test]
    async fn second_conflict_is_unresolved() {
        let (sink, store) = sink_with_store();
        store.seed(Document::Markdown(IndexEntry::new("my title!.md", Utc::now())));
        store.inject_conflicts("my title!.md", 2);

        let err = sink.upsert("My Title!", "c1").await.unwrap_err();
        match err {
            FlashnotesError::SinkConflictUnresolved { key } => assert_eq!(key, "my title!.md"),
            other => panic!("expected unresolved conflict, got {other:?}"),
        }
        assert!(!FlashnotesError::SinkConflictUnresolved { key: String::new() }.is_fatal());

        // The leaf written for the failed attempt was cleaned up.
        assert!(store.leaf_ids().is_empty());
    }

    #[tokio::test]
    async fn conflict_on_missing_entry_creates_it() {
        let (sink, store) = sink_with_store();
        store.inject_conflicts("fresh.md", 1);

        let key = sink.upsert("Fresh", "body").await.unwrap();
        let entry = entry_of(&store, &key);
        assert_eq!(leaf_data(&store, &entry.children[0]), "body");
    }

    #[tokio::test]
    async fn leaf_conflict_overwrites_stored_leaf() {
        let (sink, store) = sink_with_store();
        let mut stale = ContentLeaf::new("stale");
        stale.leaf_id = "leaf:fixed".into();
        store.seed(Document::Leaf(stale));
        store.inject_conflicts("leaf:fixed", 1);

        let mut fresh = ContentLeaf::new("fresh");
        fresh.leaf_id = "leaf:fixed".into();
        let (rev, displaced) = sink
            .put_resolving(Document::Leaf(fresh), None, Utc::now())
            .await
            .unwrap();

        // Seeded at 1, bumped to 2 by the conflict, written at 3.
        assert_eq!(rev, "3");
        assert!(displaced.is_empty());
        assert_eq!(leaf_data(&store, "leaf:fixed"), "fresh");
    }

    #[tokio::test]
    async fn entry_retry_over_a_leaf_replaces_it() {
        let (sink, store) = sink_with_store();
        let mut squatter = ContentLeaf::new("x");
        squatter.leaf_id = "odd.md".into();
        store.seed(Document::Leaf(squatter));

        let mut entry = IndexEntry::new("odd.md", Utc::now());
        entry.children = vec!["leaf:1".into()];
        let (_, displaced) = sink
            .put_resolving(Document::Markdown(entry), None, Utc::now())
            .await
            .unwrap();

        assert!(displaced.is_empty());
        assert_eq!(entry_of(&store, "odd.md").children, vec!["leaf:1"]);
    }

    #[tokio::test]
    async fn key_holding_a_leaf_is_rejected() {
        let (sink, store) = sink_with_store();
        let mut leaf = ContentLeaf::new("x");
        leaf.leaf_id = "odd.md".into();
        store.seed(Document::Leaf(leaf));

        let err = sink.upsert("Odd", "y").await.unwrap_err();
        assert!(matches!(err, FlashnotesError::Storage(_)));
    }

    #[tokio::test]
    async fn unavailable_store_fails_connect_and_upsert() {
        let (sink, store) = sink_with_store();
        store.set_unavailable(true);

        assert!(matches!(
            sink.connect().await,
            Err(FlashnotesError::SinkUnavailable(_))
        ));
        let err = sink.upsert("Any", "x").await.unwrap_err();
        assert!(err.is_fatal());
    }
}
