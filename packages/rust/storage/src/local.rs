//! Local libSQL document store (offline mode).
//!
//! Every document is one row with an integer revision. Writes are
//! compare-and-swap on that revision, mirroring the remote store's rules.

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database, params};
use tracing::{debug, info};

use flashnotes_shared::{Document, FlashnotesError, Result};

use crate::{DocumentStore, Revision, migrations};

/// Document store backed by a local libSQL file.
pub struct LocalStore {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl LocalStore {
    /// Open or create the database at `path` and apply pending migrations.
    ///
    /// Any failure here means there is nowhere to write, so it surfaces as
    /// [`FlashnotesError::SinkUnavailable`].
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| FlashnotesError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| FlashnotesError::SinkUnavailable(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| FlashnotesError::SinkUnavailable(e.to_string()))?;

        let store = Self { db, conn };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        FlashnotesError::SinkUnavailable(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 before the first migration.
    async fn schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            Err(_) => 0,
        }
    }
}

fn parse_rev(id: &str, rev: &str) -> Result<i64> {
    rev.parse::<i64>().map_err(|_| FlashnotesError::SinkConflict {
        key: id.to_string(),
    })
}

#[async_trait]
impl DocumentStore for LocalStore {
    async fn ping(&self) -> Result<()> {
        self.conn
            .query("SELECT 1", params![])
            .await
            .map_err(|e| FlashnotesError::SinkUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<(Document, Revision)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT body, rev FROM documents WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(|e| FlashnotesError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let body: String = row
                    .get(0)
                    .map_err(|e| FlashnotesError::Storage(e.to_string()))?;
                let rev: i64 = row
                    .get(1)
                    .map_err(|e| FlashnotesError::Storage(e.to_string()))?;
                let doc: Document = serde_json::from_str(&body).map_err(|e| {
                    FlashnotesError::Storage(format!("document {id} is unreadable: {e}"))
                })?;
                Ok(Some((doc, rev.to_string())))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(FlashnotesError::Storage(e.to_string())),
        }
    }

    async fn put(&self, doc: &Document, rev: Option<&str>) -> Result<Revision> {
        let id = doc.id();
        let body =
            serde_json::to_string(doc).map_err(|e| FlashnotesError::Storage(e.to_string()))?;
        let now = Utc::now().to_rfc3339();

        let (changed, next) = match rev {
            None => {
                let changed = self
                    .conn
                    .execute(
                        "INSERT INTO documents (id, rev, kind, body, updated_at)
                         VALUES (?1, 1, ?2, ?3, ?4)
                         ON CONFLICT(id) DO NOTHING",
                        params![id, doc.kind(), body.as_str(), now.as_str()],
                    )
                    .await
                    .map_err(|e| FlashnotesError::Storage(e.to_string()))?;
                (changed, 1)
            }
            Some(rev) => {
                let expected = parse_rev(id, rev)?;
                let changed = self
                    .conn
                    .execute(
                        "UPDATE documents
                         SET rev = rev + 1, kind = ?3, body = ?4, updated_at = ?5
                         WHERE id = ?1 AND rev = ?2",
                        params![id, expected, doc.kind(), body.as_str(), now.as_str()],
                    )
                    .await
                    .map_err(|e| FlashnotesError::Storage(e.to_string()))?;
                (changed, expected + 1)
            }
        };

        if changed == 0 {
            debug!(id, "revision mismatch");
            return Err(FlashnotesError::SinkConflict { key: id.to_string() });
        }
        Ok(next.to_string())
    }

    async fn delete(&self, id: &str, rev: &str) -> Result<()> {
        let expected = parse_rev(id, rev)?;
        let changed = self
            .conn
            .execute(
                "DELETE FROM documents WHERE id = ?1 AND rev = ?2",
                params![id, expected],
            )
            .await
            .map_err(|e| FlashnotesError::Storage(e.to_string()))?;

        if changed == 0 && self.get(id).await?.is_some() {
            return Err(FlashnotesError::SinkConflict { key: id.to_string() });
        }
        Ok(())
    }
}
