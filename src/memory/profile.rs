use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::memory::classifier::MemoryCategory;
use crate::memory::notes::{NoteBook, MAX_NOTES_PER_CATEGORY};
use crate::Ah32Error;

/// The single user profile shared by every session and document.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserProfile {
    /// When the profile last changed (None until the first fact)
    pub updated_at: Option<DateTime<Utc>>,
    /// Identity, qualification and preference facts
    #[serde(default)]
    pub facts: NoteBook,
}

/// Manages the global profile persisted to `global_profile.json`.
pub struct GlobalProfileStore {
    /// Path to the profile JSON file
    profile_path: PathBuf,
    /// Current profile
    profile: Arc<RwLock<UserProfile>>,
    max_per_category: usize,
    /// Serialises file writes
    save_lock: Mutex<()>,
}

impl GlobalProfileStore {
    /// Load the profile from disk or start an empty one.
    pub fn load_or_create(path: &Path) -> Result<Self, Ah32Error> {
        let profile = if path.exists() {
            let json = std::fs::read_to_string(path)
                .map_err(|e| Ah32Error::Storage(format!("Failed to read user profile: {}", e)))?;

            serde_json::from_str(&json)
                .map_err(|e| Ah32Error::Storage(format!("Failed to parse user profile: {}", e)))?
        } else {
            UserProfile::default()
        };

        Ok(Self {
            profile_path: path.to_path_buf(),
            profile: Arc::new(RwLock::new(profile)),
            max_per_category: MAX_NOTES_PER_CATEGORY,
            save_lock: Mutex::new(()),
        })
    }

    /// Persist the current profile to disk.
    pub async fn save(&self) -> Result<(), Ah32Error> {
        let _guard = self.save_lock.lock().await;
        let profile = self.profile.read().await;
        let json = serde_json::to_string_pretty(&*profile)?;

        if let Some(parent) = self.profile_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Ah32Error::Storage(format!("Failed to create storage directory: {}", e))
            })?;
        }

        tokio::fs::write(&self.profile_path, json)
            .await
            .map_err(|e| Ah32Error::Storage(format!("Failed to write user profile: {}", e)))?;

        Ok(())
    }

    /// Record a fact and persist.
    ///
    /// Returns `true` if the fact was new.
    pub async fn add_fact(
        &self,
        category: MemoryCategory,
        text: &str,
        session_id: Option<&str>,
    ) -> Result<bool, Ah32Error> {
        let added = {
            let mut profile = self.profile.write().await;
            let added = profile
                .facts
                .add(category, text, session_id, self.max_per_category);
            profile.updated_at = Some(Utc::now());
            added
        };
        self.save().await?;
        Ok(added)
    }

    /// Snapshot of the current profile.
    pub async fn get(&self) -> UserProfile {
        self.profile.read().await.clone()
    }

    /// Forget every fact and persist the empty profile.
    pub async fn clear(&self) -> Result<(), Ah32Error> {
        {
            let mut profile = self.profile.write().await;
            *profile = UserProfile::default();
        }
        self.save().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_profile_persists_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("global_profile.json");
        let store = GlobalProfileStore::load_or_create(&path).unwrap();
        assert!(!path.exists());
        store
            .add_fact(MemoryCategory::Identity, "我是张工", Some("s1"))
            .await
            .unwrap();

        let reloaded = GlobalProfileStore::load_or_create(&path).unwrap();
        let profile = reloaded.get().await;
        assert_eq!(profile.facts.get(MemoryCategory::Identity)[0].text, "我是张工");
        assert!(profile.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_clear_empties_profile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/global_profile.json");
        let store = GlobalProfileStore::load_or_create(&path).unwrap();
        store
            .add_fact(MemoryCategory::Preference, "正文用仿宋", None)
            .await
            .unwrap();
        store.clear().await.unwrap();
        assert!(store.get().await.facts.is_empty());
        assert!(GlobalProfileStore::load_or_create(&path)
            .unwrap()
            .get()
            .await
            .facts
            .is_empty());
    }

    #[test]
    fn test_corrupt_profile_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("global_profile.json");
        std::fs::write(&path, "[").unwrap();
        assert!(matches!(
            GlobalProfileStore::load_or_create(&path),
            Err(Ah32Error::Storage(_))
        ));
    }
}
