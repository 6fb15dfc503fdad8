//! Persistence for Flashnotes: the processed-set ledger and the document sink.
//!
//! - [`Ledger`] is the local dedup authority, a JSON file rewritten atomically.
//! - [`Sink`] writes summaries as an entry plus content leaf into any
//!   [`DocumentStore`]: CouchDB ([`CouchStore`]), a local libSQL file
//!   ([`LocalStore`]), or memory for tests.

pub mod couch;
pub mod ledger;
pub mod local;
#[cfg(any(test, feature = "test-support"))]
pub mod memory;
mod migrations;
pub mod sink;

use async_trait::async_trait;

use flashnotes_shared::{Document, Result};

pub use couch::CouchStore;
pub use ledger::Ledger;
pub use local::LocalStore;
#[cfg(any(test, feature = "test-support"))]
pub use memory::MemoryStore;
pub use sink::{Sink, document_key};

/// Opaque revision token returned by every successful write.
pub type Revision = String;

/// A revisioned key/document store.
///
/// Overwriting an existing document requires the revision it was read at;
/// a stale or missing revision fails with [`FlashnotesError::SinkConflict`].
/// Reachability and credential problems are [`FlashnotesError::SinkUnavailable`].
///
/// [`FlashnotesError::SinkConflict`]: flashnotes_shared::FlashnotesError::SinkConflict
/// [`FlashnotesError::SinkUnavailable`]: flashnotes_shared::FlashnotesError::SinkUnavailable
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Check that the store is reachable and accepts our credentials.
    async fn ping(&self) -> Result<()>;

    /// Fetch a document and its current revision.
    async fn get(&self, id: &str) -> Result<Option<(Document, Revision)>>;

    /// Create (`rev = None`) or overwrite a document. Returns the new revision.
    async fn put(&self, doc: &Document, rev: Option<&str>) -> Result<Revision>;

    /// Remove a document at `rev`. Removing a missing document succeeds.
    async fn delete(&self, id: &str, rev: &str) -> Result<()>;
}
