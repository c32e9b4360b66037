//! Notes keyed by document identity, shared across every session on that
//! document.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::memory::classifier::MemoryCategory;
use crate::memory::identity::document_file_stem;
use crate::memory::notes::{NoteBook, MAX_NOTES_PER_CATEGORY};
use crate::Ah32Error;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentNotes {
    pub document_key: String,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: NoteBook,
}

pub struct CrossSessionStore {
    dir: PathBuf,
    max_per_category: usize,
    write_lock: Mutex<()>,
}

impl CrossSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            max_per_category: MAX_NOTES_PER_CATEGORY,
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_max_per_category(mut self, max: usize) -> Self {
        self.max_per_category = max.max(1);
        self
    }

    fn path(&self, document_key: &str) -> PathBuf {
        self.dir
            .join(format!("{}.json", document_file_stem(document_key)))
    }

    /// Load notes for a document. Missing or corrupt files yield empty notes.
    pub async fn load(&self, document_key: &str) -> Result<DocumentNotes, Ah32Error> {
        let path = self.path(document_key);
        match tokio::fs::read_to_string(&path).await {
            Ok(json) => match serde_json::from_str::<DocumentNotes>(&json) {
                Ok(notes) => Ok(notes),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Document notes unreadable, starting fresh");
                    Ok(Self::empty(document_key))
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::empty(document_key)),
            Err(e) => Err(Ah32Error::Storage(format!(
                "Failed to read document notes: {}",
                e
            ))),
        }
    }

    fn empty(document_key: &str) -> DocumentNotes {
        DocumentNotes {
            document_key: document_key.to_string(),
            ..Default::default()
        }
    }

    /// Record a note against a document and persist it.
    ///
    /// # Returns
    ///
    /// `true` if the note was new rather than a refreshed duplicate.
    pub async fn add(
        &self,
        document_key: &str,
        category: MemoryCategory,
        text: &str,
        session_id: Option<&str>,
    ) -> Result<bool, Ah32Error> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.load(document_key).await?;
        let added = doc
            .notes
            .add(category, text, session_id, self.max_per_category);
        doc.updated_at = Some(Utc::now());

        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            Ah32Error::Storage(format!("Failed to create documents directory: {}", e))
        })?;
        let json = serde_json::to_string_pretty(&doc)?;
        tokio::fs::write(self.path(document_key), json)
            .await
            .map_err(|e| Ah32Error::Storage(format!("Failed to write document notes: {}", e)))?;
        debug!(category = category.as_str(), added, "Recorded document note");
        Ok(added)
    }

    pub async fn clear(&self, document_key: &str) -> Result<(), Ah32Error> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(self.path(document_key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Ah32Error::Storage(format!(
                "Failed to remove document notes: {}",
                e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_notes_shared_by_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = CrossSessionStore::new(dir.path());
        store
            .add("path:c:/bid.docx", MemoryCategory::Commercial, "报价九折", Some("s1"))
            .await
            .unwrap();
        store
            .add("path:c:/bid.docx", MemoryCategory::Timeline, "5月1日截止", Some("s2"))
            .await
            .unwrap();
        let doc = store.load("path:c:/bid.docx").await.unwrap();
        assert_eq!(doc.notes.len(), 2);
        assert_eq!(
            doc.notes.get(MemoryCategory::Commercial)[0].session_id.as_deref(),
            Some("s1")
        );
        assert!(store.load("path:c:/other.docx").await.unwrap().notes.is_empty());
    }

    #[tokio::test]
    async fn test_bounded_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = CrossSessionStore::new(dir.path()).with_max_per_category(2);
        for i in 0..4 {
            store
                .add("doc:1", MemoryCategory::Technical, &format!("参数{}", i), None)
                .await
                .unwrap();
        }
        assert_eq!(store.load("doc:1").await.unwrap().notes.len(), 2);
        store.clear("doc:1").await.unwrap();
        assert!(store.load("doc:1").await.unwrap().notes.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let store = CrossSessionStore::new(dir.path());
        std::fs::write(
            dir.path().join(format!("{}.json", document_file_stem("doc:x"))),
            "{not json",
        )
        .unwrap();
        let doc = store.load("doc:x").await.unwrap();
        assert_eq!(doc.document_key, "doc:x");
        assert!(doc.notes.is_empty());
    }
}
