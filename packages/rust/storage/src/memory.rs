//! In-process [`DocumentStore`] for tests.
//!
//! Revisions are integers rendered as strings. Conflicts and outages can be
//! injected to drive the sink's retry and abort paths.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use flashnotes_shared::{Document, FlashnotesError, Result};

use crate::{DocumentStore, Revision};

#[derive(Debug, Default)]
struct State {
    docs: BTreeMap<String, (Document, u64)>,
    /// Remaining injected conflicts per document id.
    conflicts: HashMap<String, usize>,
    unavailable: bool,
    puts: usize,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `doc` directly, bypassing revision checks.
    pub fn seed(&self, doc: Document) {
        let mut state = self.state();
        let rev = state.docs.get(doc.id()).map_or(1, |(_, r)| r + 1);
        state.docs.insert(doc.id().to_string(), (doc, rev));
    }

    /// The next `count` writes to `id` fail as if another writer got there first.
    ///
    /// Each injected conflict bumps the stored revision, so the caller has to
    /// re-read before it can win.
    pub fn inject_conflicts(&self, id: &str, count: usize) {
        self.state().conflicts.insert(id.to_string(), count);
    }

    /// Make every call fail with `SinkUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
    }

    pub fn document(&self, id: &str) -> Option<Document> {
        self.state().docs.get(id).map(|(doc, _)| doc.clone())
    }

    pub fn ids(&self) -> Vec<String> {
        self.state().docs.keys().cloned().collect()
    }

    /// Ids of every stored content leaf.
    pub fn leaf_ids(&self) -> Vec<String> {
        self.state()
            .docs
            .iter()
            .filter(|(_, (doc, _))| matches!(doc, Document::Leaf(_)))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Number of write attempts seen, including rejected ones.
    pub fn put_count(&self) -> usize {
        self.state().puts
    }
}

fn check_available(state: &State) -> Result<()> {
    if state.unavailable {
        return Err(FlashnotesError::SinkUnavailable("memory store offline".into()));
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn ping(&self) -> Result<()> {
        check_available(&self.state())
    }

    async fn get(&self, id: &str) -> Result<Option<(Document, Revision)>> {
        let state = self.state();
        check_available(&state)?;
        Ok(state
            .docs
            .get(id)
            .map(|(doc, rev)| (doc.clone(), rev.to_string())))
    }

    async fn put(&self, doc: &Document, rev: Option<&str>) -> Result<Revision> {
        let mut guard = self.state();
        let state = &mut *guard;
        check_available(state)?;
        state.puts += 1;
        let id = doc.id().to_string();

        if let Some(remaining) = state.conflicts.get_mut(&id).filter(|n| **n > 0) {
            *remaining -= 1;
            if let Some((_, stored_rev)) = state.docs.get_mut(&id) {
                *stored_rev += 1;
            }
            return Err(FlashnotesError::SinkConflict { key: id });
        }

        let current = state.docs.get(&id).map(|(_, r)| *r);
        let expected = rev.map(|r| r.parse::<u64>().ok());
        let next = match (current, expected) {
            (None, None) => 1,
            (Some(stored), Some(Some(given))) if stored == given => stored + 1,
            _ => return Err(FlashnotesError::SinkConflict { key: id }),
        };
        state.docs.insert(id, (doc.clone(), next));
        Ok(next.to_string())
    }

    async fn delete(&self, id: &str, rev: &str) -> Result<()> {
        let mut state = self.state();
        check_available(&state)?;
        match state.docs.get(id).map(|(_, r)| r.to_string()) {
            None => Ok(()),
            Some(stored) if stored == rev => {
                state.docs.remove(id);
                Ok(())
            }
            Some(_) => Err(FlashnotesError::SinkConflict { key: id.to_string() }),
        }
    }
}
