//! Session persistence: the slice of feed state that survives restarts.
//!
//! Only the sort choice, the last-seen cursor and the durable filter
//! predicate are written out. The text filter is deliberately ephemeral and
//! is stripped on capture, and cached posts are never persisted.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

use crate::application::cache::PostCacheStore;
use crate::application::query::{QueryStore, SortOption};
use crate::domain::query::PostWhereInput;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("session file io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode session state: {0}")]
    Encode(serde_json::Error),
    #[error("failed to decode session state: {0}")]
    Decode(serde_json::Error),
    #[error("background write failed: {0}")]
    Background(String),
}

/// Top-level persisted document; versioned by shape, not by number.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistedSession {
    pub feed: FeedSnapshot,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeedSnapshot {
    pub sort: SortOption,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen_cursor: Option<String>,
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub predicate: Option<PostWhereInput>,
}

impl FeedSnapshot {
    /// Snapshot the persistable slice of the two stores.
    pub fn capture(query: &QueryStore, cache: &PostCacheStore) -> Self {
        let predicate = query.args().r#where.map(|mut predicate| {
            predicate.title_contains = None;
            predicate
        });
        Self {
            sort: query.sort(),
            last_seen_cursor: cache.last_seen_cursor(),
            predicate,
        }
    }

    /// Push the snapshot back into fresh stores. The cursor lands first so
    /// the "last seen" sort can seed its starting point from it.
    pub fn restore(self, query: &QueryStore, cache: &PostCacheStore) {
        cache.set_last_seen_cursor(self.last_seen_cursor);
        query.restore_predicate(self.predicate);
        query.set_sort(self.sort);
    }
}

/// Reads and atomically rewrites the session file.
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load the persisted session, treating a missing file as a fresh start.
    pub async fn load(&self) -> Result<Option<PersistedSession>, PersistError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no session file, starting fresh");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };
        let session = serde_json::from_slice(&bytes).map_err(PersistError::Decode)?;
        Ok(Some(session))
    }

    /// Write the session via a temporary file in the same directory, so a
    /// crash mid-write never truncates the previous state.
    pub async fn save(&self, session: &PersistedSession) -> Result<(), PersistError> {
        let bytes = serde_json::to_vec_pretty(session).map_err(PersistError::Encode)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<(), PersistError> {
            let dir = path
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let mut tmp = NamedTempFile::new_in(dir)?;
            tmp.write_all(&bytes)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path).map_err(|err| PersistError::Io(err.error))?;
            Ok(())
        })
        .await
        .map_err(|err| PersistError::Background(err.to_string()))?
    }
}
