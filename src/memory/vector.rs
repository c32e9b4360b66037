//! File-backed vector memory.
//!
//! Each collection lives in `vectors/<collection>.json`. Collection names are
//! salted with the embedding model and dimension so that switching models
//! never mixes incompatible vectors. Writes (embedding plus upsert) are
//! serialised behind one process-wide mutex; in async mode they run in a
//! background task off the request path.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::embedding::EmbeddingService;
use crate::utils::math::top_k_similar;
use crate::utils::sanitize::{safe_id, sha256_hex};
use crate::Ah32Error;

/// Records kept per collection before the oldest are dropped.
pub const DEFAULT_MAX_RECORDS: usize = 5_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VectorWriteMode {
    #[default]
    Async,
    Sync,
}

impl VectorWriteMode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "async" => Some(VectorWriteMode::Async),
            "sync" => Some(VectorWriteMode::Sync),
            _ => None,
        }
    }
}

pub type Metadata = BTreeMap<String, String>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub metadata: Metadata,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CollectionFile {
    name: String,
    model: String,
    dimensions: usize,
    records: Vec<VectorRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorHit {
    pub id: String,
    pub text: String,
    pub score: f32,
    pub metadata: Metadata,
}

struct Inner {
    dir: PathBuf,
    embedder: Arc<dyn EmbeddingService>,
    mode: VectorWriteMode,
    max_records: usize,
    write_lock: Mutex<()>,
    pending: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

/// Handle to the vector store. Cheap to clone.
#[derive(Clone)]
pub struct VectorMemory {
    inner: Arc<Inner>,
}

impl VectorMemory {
    pub fn new(
        dir: impl Into<PathBuf>,
        embedder: Arc<dyn EmbeddingService>,
        mode: VectorWriteMode,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                dir: dir.into(),
                embedder,
                mode,
                max_records: DEFAULT_MAX_RECORDS,
                write_lock: Mutex::new(()),
                pending: std::sync::Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn is_available(&self) -> bool {
        self.inner.embedder.is_available()
    }

    pub fn mode(&self) -> VectorWriteMode {
        self.inner.mode
    }

    /// Collection name for `purpose`, salted by model and vector dimension.
    pub fn collection_name(&self, purpose: &str, dimensions: usize) -> String {
        let salt = sha256_hex(&format!("{}|{}", self.inner.embedder.model_name(), dimensions));
        format!("{}_{}", safe_id(purpose, "memory"), &salt[..10])
    }

    fn collection_path(&self, name: &str) -> PathBuf {
        self.inner.dir.join(format!("{}.json", name))
    }

    /// Insert or replace a record.
    ///
    /// In async mode the write is queued and this returns immediately;
    /// failures are logged, never returned. An unavailable embedder makes
    /// this a no-op.
    pub async fn upsert(
        &self,
        purpose: &str,
        id: &str,
        text: &str,
        metadata: Metadata,
    ) -> Result<(), Ah32Error> {
        if !self.is_available() {
            debug!(purpose, "Embedding unavailable, skipping vector write");
            return Ok(());
        }
        match self.inner.mode {
            VectorWriteMode::Sync => self.write(purpose, id, text, metadata).await,
            VectorWriteMode::Async => {
                let this = self.clone();
                let (purpose, id, text) = (purpose.to_string(), id.to_string(), text.to_string());
                let handle = tokio::spawn(async move {
                    if let Err(e) = this.write(&purpose, &id, &text, metadata).await {
                        warn!(purpose = %purpose, error = %e, "Background vector write failed");
                    }
                });
                let mut pending = match self.inner.pending.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                pending.retain(|h| !h.is_finished());
                pending.push(handle);
                Ok(())
            }
        }
    }

    async fn write(
        &self,
        purpose: &str,
        id: &str,
        text: &str,
        metadata: Metadata,
    ) -> Result<(), Ah32Error> {
        let _guard = self.inner.write_lock.lock().await;
        let embedding = self.inner.embedder.embed_text(text).await?;
        let name = self.collection_name(purpose, embedding.len());
        let mut collection = self.load(&name).await?;
        if collection.records.is_empty() {
            collection.name = name.clone();
            collection.model = self.inner.embedder.model_name().to_string();
            collection.dimensions = embedding.len();
        }

        let record = VectorRecord {
            id: id.to_string(),
            text: text.to_string(),
            embedding,
            metadata,
            updated_at: Utc::now(),
        };
        match collection.records.iter_mut().find(|r| r.id == id) {
            Some(existing) => *existing = record,
            None => collection.records.push(record),
        }
        if collection.records.len() > self.inner.max_records {
            collection
                .records
                .sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
            let excess = collection.records.len() - self.inner.max_records;
            collection.records.drain(..excess);
        }

        tokio::fs::create_dir_all(&self.inner.dir).await.map_err(|e| {
            Ah32Error::Storage(format!("Failed to create vector directory: {}", e))
        })?;
        let path = self.collection_path(&name);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec(&collection)?)
            .await
            .map_err(|e| Ah32Error::Storage(format!("Failed to write vector collection: {}", e)))?;
        tokio::fs::rename(&tmp, &path).await.map_err(|e| {
            Ah32Error::Storage(format!("Failed to replace vector collection: {}", e))
        })?;
        debug!(collection = %name, records = collection.records.len(), "Vector record upserted");
        Ok(())
    }

    async fn load(&self, name: &str) -> Result<CollectionFile, Ah32Error> {
        match tokio::fs::read(self.collection_path(name)).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(collection) => Ok(collection),
                Err(e) => {
                    warn!(collection = name, error = %e, "Vector collection unreadable, starting fresh");
                    Ok(CollectionFile::default())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CollectionFile::default()),
            Err(e) => Err(Ah32Error::Storage(format!(
                "Failed to read vector collection: {}",
                e
            ))),
        }
    }

    /// Cosine-similarity search within one collection.
    ///
    /// # Arguments
    ///
    /// * `purpose` - Logical collection (e.g. `memory`)
    /// * `query` - Text to embed and compare
    /// * `k` - Maximum hits
    /// * `filter` - Metadata pairs a record must match exactly
    ///
    /// # Returns
    ///
    /// Hits with positive scores, best first. Empty when embeddings are
    /// unavailable.
    pub async fn search(
        &self,
        purpose: &str,
        query: &str,
        k: usize,
        filter: &[(&str, &str)],
    ) -> Result<Vec<VectorHit>, Ah32Error> {
        if !self.is_available() || query.trim().is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let query_vec = self.inner.embedder.embed_text(query).await?;
        let collection = self
            .load(&self.collection_name(purpose, query_vec.len()))
            .await?;

        let candidates: Vec<&VectorRecord> = collection
            .records
            .iter()
            .filter(|r| {
                filter
                    .iter()
                    .all(|(key, value)| r.metadata.get(*key).map(String::as_str) == Some(*value))
            })
            .collect();
        let embeddings: Vec<&[f32]> = candidates.iter().map(|r| r.embedding.as_slice()).collect();

        Ok(top_k_similar(&query_vec, &embeddings, k)
            .into_iter()
            .filter(|(_, score)| *score > 0.0)
            .map(|(i, score)| {
                let r = candidates[i];
                VectorHit {
                    id: r.id.clone(),
                    text: r.text.clone(),
                    score,
                    metadata: r.metadata.clone(),
                }
            })
            .collect())
    }

    /// Wait for queued background writes to finish.
    pub async fn flush(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut pending = match self.inner.pending.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            pending.drain(..).collect()
        };
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Vector write task panicked");
            }
        }
    }
}
