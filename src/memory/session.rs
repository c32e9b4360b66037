//! Per-session transcript storage.
//!
//! Each session owns an append-only `sessions/<id>.jsonl` log (the source of
//! truth) plus a `sessions/<id>.json` snapshot holding only the most recent
//! turns. Snapshots are cached in memory; appends for one session are
//! serialised by a per-session lock so concurrent turns never interleave.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::memory::classifier::MemoryCategory;
use crate::utils::sanitize::safe_id;
use crate::Ah32Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One message in a session transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub role: TurnRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<MemoryCategory>,
}

impl TurnRecord {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
            timestamp: Utc::now(),
            category: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            category: None,
        }
    }

    pub fn with_category(mut self, category: MemoryCategory) -> Self {
        self.category = Some(category);
        self
    }
}

/// Bounded view over the tail of a session log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub updated_at: Option<DateTime<Utc>>,
    /// Total turns ever appended, not just those in `tail`.
    pub turn_count: u64,
    /// Most recent turns, oldest first.
    pub tail: Vec<TurnRecord>,
}

pub struct SessionStore {
    dir: PathBuf,
    tail_limit: usize,
    cache: Cache<String, Arc<SessionSnapshot>>,
    /// Never evicted: dropping a lock while a writer holds it would let a
    /// second writer in.
    locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionStore {
    /// Create a store rooted at `<storage>/sessions`.
    ///
    /// The directory is created lazily on first write.
    pub fn new(dir: impl Into<PathBuf>, tail_limit: usize) -> Self {
        Self {
            dir: dir.into(),
            tail_limit: tail_limit.max(1),
            cache: Cache::builder()
                .max_capacity(1_000)
                .time_to_idle(Duration::from_secs(30 * 60))
                .build(),
            locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn stem(session_id: &str) -> String {
        safe_id(session_id, "session")
    }

    fn log_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", Self::stem(session_id)))
    }

    fn snapshot_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", Self::stem(session_id)))
    }

    fn lock_for(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks
            .entry(Self::stem(session_id))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Append turns to the session log and refresh the snapshot.
    ///
    /// # Arguments
    ///
    /// * `session_id` - Session to append to (sanitised for the filesystem)
    /// * `turns` - Turns in chronological order
    ///
    /// # Returns
    ///
    /// The updated snapshot.
    pub async fn append(
        &self,
        session_id: &str,
        turns: &[TurnRecord],
    ) -> Result<Arc<SessionSnapshot>, Ah32Error> {
        let lock = self.lock_for(session_id);
        let _guard = lock.lock().await;

        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            Ah32Error::Storage(format!("Failed to create session directory: {}", e))
        })?;

        let mut lines = String::new();
        for turn in turns {
            lines.push_str(&serde_json::to_string(turn)?);
            lines.push('\n');
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path(session_id))
            .await
            .map_err(|e| Ah32Error::Storage(format!("Failed to open session log: {}", e)))?;
        file.write_all(lines.as_bytes())
            .await
            .map_err(|e| Ah32Error::Storage(format!("Failed to append session log: {}", e)))?;
        file.flush().await?;

        let mut snapshot = (*self.load_snapshot(session_id).await?).clone();
        snapshot.session_id = session_id.to_string();
        snapshot.turn_count += turns.len() as u64;
        snapshot.tail.extend(turns.iter().cloned());
        if snapshot.tail.len() > self.tail_limit {
            let excess = snapshot.tail.len() - self.tail_limit;
            snapshot.tail.drain(..excess);
        }
        snapshot.updated_at = Some(Utc::now());

        let json = serde_json::to_string_pretty(&snapshot)?;
        let path = self.snapshot_path(session_id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| Ah32Error::Storage(format!("Failed to write session snapshot: {}", e)))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| Ah32Error::Storage(format!("Failed to replace session snapshot: {}", e)))?;

        let snapshot = Arc::new(snapshot);
        self.cache
            .insert(Self::stem(session_id), snapshot.clone())
            .await;
        debug!(session_id, turns = turns.len(), "Appended session turns");
        Ok(snapshot)
    }

    /// Load the snapshot for a session, rebuilding it from the log when the
    /// snapshot file is missing or unreadable.
    pub async fn load_snapshot(&self, session_id: &str) -> Result<Arc<SessionSnapshot>, Ah32Error> {
        let key = Self::stem(session_id);
        if let Some(cached) = self.cache.get(&key).await {
            return Ok(cached);
        }

        let snapshot_path = self.snapshot_path(session_id);
        let snapshot = match tokio::fs::read_to_string(&snapshot_path).await {
            Ok(json) => match serde_json::from_str::<SessionSnapshot>(&json) {
                Ok(s) => s,
                Err(e) => {
                    warn!(session_id, error = %e, "Session snapshot unreadable, rebuilding from log");
                    self.rebuild_from_log(session_id).await?
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.rebuild_from_log(session_id).await?
            }
            Err(e) => {
                return Err(Ah32Error::Storage(format!(
                    "Failed to read session snapshot: {}",
                    e
                )))
            }
        };

        let snapshot = Arc::new(snapshot);
        self.cache.insert(key, snapshot.clone()).await;
        Ok(snapshot)
    }

    async fn rebuild_from_log(&self, session_id: &str) -> Result<SessionSnapshot, Ah32Error> {
        let content = match tokio::fs::read_to_string(self.log_path(session_id)).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(SessionSnapshot {
                    session_id: session_id.to_string(),
                    ..Default::default()
                })
            }
            Err(e) => {
                return Err(Ah32Error::Storage(format!("Failed to read session log: {}", e)))
            }
        };

        let mut turns = Vec::new();
        for (n, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<TurnRecord>(line) {
                Ok(turn) => turns.push(turn),
                Err(e) => warn!(session_id, line = n + 1, error = %e, "Skipping corrupt session log line"),
            }
        }
        let turn_count = turns.len() as u64;
        let updated_at = turns.last().map(|t| t.timestamp);
        if turns.len() > self.tail_limit {
            let excess = turns.len() - self.tail_limit;
            turns.drain(..excess);
        }
        Ok(SessionSnapshot {
            session_id: session_id.to_string(),
            updated_at,
            turn_count,
            tail: turns,
        })
    }

    /// Up to `limit` most recent turns, oldest first.
    pub async fn recent(&self, session_id: &str, limit: usize) -> Result<Vec<TurnRecord>, Ah32Error> {
        let snapshot = self.load_snapshot(session_id).await?;
        let skip = snapshot.tail.len().saturating_sub(limit);
        Ok(snapshot.tail[skip..].to_vec())
    }

    /// Remove a session's log and snapshot. Missing files are not an error.
    pub async fn clear(&self, session_id: &str) -> Result<(), Ah32Error> {
        let lock = self.lock_for(session_id);
        let _guard = lock.lock().await;
        for path in [self.log_path(session_id), self.snapshot_path(session_id)] {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(Ah32Error::Storage(format!(
                        "Failed to remove {}: {}",
                        path.display(),
                        e
                    )))
                }
            }
        }
        self.cache.invalidate(&Self::stem(session_id)).await;
        Ok(())
    }
}
