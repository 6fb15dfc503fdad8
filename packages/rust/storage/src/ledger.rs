//! Processed-set ledger: the ids already summarized and stored.
//!
//! The file is a JSON array of id strings. Every commit rewrites the whole
//! file through a temp file and an atomic rename, so a crash leaves either
//! the previous or the next set on disk, never a torn one.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use uuid::Uuid;

use flashnotes_shared::{FlashnotesError, Result};

#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    /// Commit order, as written to disk.
    ids: Vec<String>,
    index: HashSet<String>,
}

impl Ledger {
    /// Load the ledger at `path`. A missing file is an empty ledger;
    /// duplicate ids in the file collapse to one.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(?path, "no ledger file yet, starting empty");
                return Ok(Self::empty(path));
            }
            Err(e) => return Err(FlashnotesError::io(&path, e)),
        };

        let stored: Vec<String> = if raw.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&raw).map_err(|e| {
                FlashnotesError::Storage(format!(
                    "ledger {} is not a JSON array of ids: {e}",
                    path.display()
                ))
            })?
        };

        let mut ledger = Self::empty(path);
        for id in stored {
            if ledger.index.insert(id.clone()) {
                ledger.ids.push(id);
            }
        }
        info!(path = ?ledger.path, count = ledger.ids.len(), "ledger loaded");
        Ok(ledger)
    }

    fn empty(path: PathBuf) -> Self {
        Self {
            path,
            ids: Vec::new(),
            index: HashSet::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains(id)
    }

    /// Committed ids in commit order.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Durably record `id`.
    ///
    /// Returns `false` without touching the file when `id` is already present.
    /// The in-memory set only changes after the new file is in place, so a
    /// failed flush leaves `contains(id)` false.
    pub async fn commit(&mut self, id: &str) -> Result<bool> {
        if self.contains(id) {
            return Ok(false);
        }

        let mut next = self.ids.clone();
        next.push(id.to_string());
        self.flush(&next).await?;

        self.index.insert(id.to_string());
        self.ids = next;
        debug!(id, count = self.ids.len(), "ledger committed");
        Ok(true)
    }

    async fn flush(&self, ids: &[String]) -> Result<()> {
        let flush_err = |source| FlashnotesError::LedgerFlush {
            path: self.path.clone(),
            source,
        };

        let body = serde_json::to_vec_pretty(ids)
            .map_err(|e| flush_err(std::io::Error::new(ErrorKind::InvalidData, e)))?;

        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).await.map_err(flush_err)?;

        let temp_path = parent.join(format!(".ledger.{}.tmp", Uuid::now_v7()));
        let written = write_synced(&temp_path, &body).await;
        let renamed = match written {
            Ok(()) => fs::rename(&temp_path, &self.path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = renamed {
            let _ = fs::remove_file(&temp_path).await;
            return Err(flush_err(e));
        }
        sync_dir(&parent).await.map_err(flush_err)
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(path)
        .await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await
}

/// Persist the rename itself by syncing the directory that holds it.
#[cfg(unix)]
async fn sync_dir(dir: &Path) -> std::io::Result<()> {
    fs::File::open(dir).await?.sync_all().await
}

/// No directory sync off unix.
#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_ledger_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("fn_ledger_{}", Uuid::now_v7()))
            .join("processed_videos.json")
    }

    #[tokio::test]
    async fn missing_file_is_empty() {
        let ledger = Ledger::load(temp_ledger_path()).await.unwrap();
        assert!(ledger.is_empty());
        assert!(!ledger.contains("abc"));
    }

    #[tokio::test]
    async fn commit_persists_across_loads() {
        let path = temp_ledger_path();
        let mut ledger = Ledger::load(&path).await.unwrap();
        assert!(ledger.commit("vid-1").await.unwrap());
        assert!(ledger.commit("vid-2").await.unwrap());

        let reloaded = Ledger::load(&path).await.unwrap();
        assert_eq!(reloaded.ids(), ["vid-1", "vid-2"]);

        let raw = std::fs::read_to_string(&path).unwrap();
        let parsed: Vec<String> = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, vec!["vid-1", "vid-2"]);
    }

    #[tokio::test]
    async fn recommit_is_a_noop() {
        let path = temp_ledger_path();
        let mut ledger = Ledger::load(&path).await.unwrap();
        assert!(ledger.commit("vid-1").await.unwrap());
        assert!(!ledger.commit("vid-1").await.unwrap());
        assert_eq!(ledger.len(), 1);

        let reloaded = Ledger::load(&path).await.unwrap();
        assert_eq!(reloaded.len(), 1);
    }

    #[tokio::test]
    async fn duplicates_in_file_collapse() {
        let path = temp_ledger_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"["a","b","a","c","b"]"#).unwrap();

        let ledger = Ledger::load(&path).await.unwrap();
        assert_eq!(ledger.ids(), ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn corrupt_file_is_rejected() {
        let path = temp_ledger_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{not json").unwrap();

        let err = Ledger::load(&path).await.unwrap_err();
        assert!(err.to_string().contains("JSON array"));
    }

    #[tokio::test]
    async fn failed_flush_leaves_id_uncommitted() {
        let path = temp_ledger_path();
        let mut ledger = Ledger::load(&path).await.unwrap();

        // A non-empty directory now sits where the file goes; the rename fails.
        std::fs::create_dir_all(path.join("child")).unwrap();

        let err = ledger.commit("vid-1").await.unwrap_err();
        assert!(matches!(err, FlashnotesError::LedgerFlush { .. }));
        assert!(!err.is_fatal());
        assert!(!ledger.contains("vid-1"));
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn no_temp_files_left_behind() {
        let path = temp_ledger_path();
        let mut ledger = Ledger::load(&path).await.unwrap();
        ledger.commit("vid-1").await.unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn commit_syncs_the_ledger_directory() {
        let path = temp_ledger_path();
        let mut ledger = Ledger::load(&path).await.unwrap();
        ledger.commit("vid-1").await.unwrap();

        let dir = path.parent().unwrap();
        sync_dir(dir).await.unwrap();
        assert!(sync_dir(&dir.join("missing")).await.is_err());
    }
}
