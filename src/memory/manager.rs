//! Ties the memory tiers together for one chat turn.

use std::path::Path;

use tracing::{debug, instrument, warn};

use crate::memory::classifier::{classify, is_memorable, Classification, MemoryTier};
use crate::memory::cross_session::CrossSessionStore;
use crate::memory::profile::GlobalProfileStore;
use crate::memory::session::{SessionStore, TurnRecord, TurnRole};
use crate::memory::vector::{Metadata, VectorHit, VectorMemory};
use crate::utils::text::truncate_chars;
use crate::Ah32Error;

/// Vector collection used for turn mirroring.
pub const MEMORY_COLLECTION: &str = "memory";

#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Turns of transcript included in the prompt.
    pub recent_turns: usize,
    /// Newest notes per category included in the prompt.
    pub notes_per_category: usize,
    /// Vector hits included in the prompt.
    pub related_hits: usize,
    /// Characters kept per transcript turn in the prompt.
    pub turn_chars: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            recent_turns: 12,
            notes_per_category: 5,
            related_hits: 4,
            turn_chars: 400,
        }
    }
}

/// One finished exchange to persist.
#[derive(Debug, Clone)]
pub struct TurnContext<'a> {
    pub session_id: &'a str,
    pub document_key: Option<&'a str>,
    pub user_message: &'a str,
    pub assistant_message: &'a str,
}

/// Memory gathered for a prompt.
#[derive(Debug, Clone, Default)]
pub struct MemoryContext {
    pub recent_turns: Vec<TurnRecord>,
    pub profile_notes: String,
    pub document_notes: String,
    pub related: Vec<VectorHit>,
    turn_chars: usize,
}

impl MemoryContext {
    pub fn is_empty(&self) -> bool {
        self.recent_turns.is_empty()
            && self.profile_notes.is_empty()
            && self.document_notes.is_empty()
            && self.related.is_empty()
    }

    /// Transcript as `role: content` lines, used by the writeback router.
    pub fn transcript(&self) -> String {
        self.recent_turns
            .iter()
            .map(|t| {
                let role = match t.role {
                    TurnRole::User => "user",
                    TurnRole::Assistant => "assistant",
                };
                format!("{}: {}", role, t.content)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Render as a prompt section. Empty context renders as an empty string.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if !self.profile_notes.is_empty() {
            out.push_str("## User profile\n");
            out.push_str(&self.profile_notes);
            out.push('\n');
        }
        if !self.document_notes.is_empty() {
            out.push_str("## Document notes\n");
            out.push_str(&self.document_notes);
            out.push('\n');
        }
        if !self.related.is_empty() {
            out.push_str("## Related memory\n");
            for hit in &self.related {
                out.push_str(&format!("- {}\n", truncate_chars(&hit.text, self.turn_chars)));
            }
            out.push('\n');
        }
        if !self.recent_turns.is_empty() {
            out.push_str("## Recent conversation\n");
            for turn in &self.recent_turns {
                let role = match turn.role {
                    TurnRole::User => "user",
                    TurnRole::Assistant => "assistant",
                };
                out.push_str(&format!(
                    "{}: {}\n",
                    role,
                    truncate_chars(&turn.content, self.turn_chars)
                ));
            }
        }
        out.trim_end().to_string()
    }
}

pub struct MemoryManager {
    sessions: SessionStore,
    documents: CrossSessionStore,
    profile: GlobalProfileStore,
    vectors: VectorMemory,
    config: MemoryConfig,
}

impl MemoryManager {
    /// Open the memory tiers under `storage_root`.
    ///
    /// Nothing is created on disk until the first write.
    pub fn open(
        storage_root: &Path,
        session_tail_limit: usize,
        vectors: VectorMemory,
        config: MemoryConfig,
    ) -> Result<Self, Ah32Error> {
        Ok(Self {
            sessions: SessionStore::new(storage_root.join("sessions"), session_tail_limit),
            documents: CrossSessionStore::new(storage_root.join("documents")),
            profile: GlobalProfileStore::load_or_create(&storage_root.join("global_profile.json"))?,
            vectors,
            config,
        })
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn documents(&self) -> &CrossSessionStore {
        &self.documents
    }

    pub fn profile(&self) -> &GlobalProfileStore {
        &self.profile
    }

    pub fn vectors(&self) -> &VectorMemory {
        &self.vectors
    }

    /// Persist a finished exchange into every tier it belongs to.
    ///
    /// The transcript append is the only step whose failure is returned;
    /// note and vector writes are best-effort.
    #[instrument(skip(self, turn), fields(session_id = turn.session_id))]
    pub async fn record_turn(&self, turn: &TurnContext<'_>) -> Result<Classification, Ah32Error> {
        let classification = classify(turn.user_message);
        let snapshot = self
            .sessions
            .append(
                turn.session_id,
                &[
                    TurnRecord::user(turn.user_message).with_category(classification.category),
                    TurnRecord::assistant(turn.assistant_message),
                ],
            )
            .await?;

        match classification.tier {
            MemoryTier::Global => {
                if let Err(e) = self
                    .profile
                    .add_fact(classification.category, turn.user_message, Some(turn.session_id))
                    .await
                {
                    warn!(error = %e, "Failed to update user profile");
                }
            }
            MemoryTier::CrossSession => match turn.document_key {
                Some(key) => {
                    if let Err(e) = self
                        .documents
                        .add(key, classification.category, turn.user_message, Some(turn.session_id))
                        .await
                    {
                        warn!(error = %e, "Failed to update document notes");
                    }
                }
                None => debug!("No document identity, keeping note in session only"),
            },
            MemoryTier::Session => {}
        }

        // Small talk stays in the transcript only.
        if !is_memorable(turn.user_message) {
            debug!("Nothing memorable in turn, skipping vector mirror");
            return Ok(classification);
        }

        let mut metadata = Metadata::new();
        metadata.insert("session_id".into(), turn.session_id.to_string());
        metadata.insert("category".into(), classification.category.as_str().to_string());
        if let Some(key) = turn.document_key {
            metadata.insert("document_key".into(), key.to_string());
        }
        let record_id = format!("{}:{}", turn.session_id, snapshot.turn_count);
        if let Err(e) = self
            .vectors
            .upsert(MEMORY_COLLECTION, &record_id, turn.user_message, metadata)
            .await
        {
            warn!(error = %e, "Failed to mirror turn into vector memory");
        }

        Ok(classification)
    }

    /// Gather memory relevant to `query` for the next prompt.
    ///
    /// Related hits are scoped to the document when one is known, else to
    /// the session, and skip anything already in the recent transcript.
    #[instrument(skip(self, query))]
    pub async fn assemble_context(
        &self,
        session_id: &str,
        document_key: Option<&str>,
        query: &str,
    ) -> Result<MemoryContext, Ah32Error> {
        let recent_turns = self
            .sessions
            .recent(session_id, self.config.recent_turns)
            .await?;

        let profile_notes = self
            .profile
            .get()
            .await
            .facts
            .render(self.config.notes_per_category);

        let document_notes = match document_key {
            Some(key) => match self.documents.load(key).await {
                Ok(doc) => doc.notes.render(self.config.notes_per_category),
                Err(e) => {
                    warn!(error = %e, "Failed to load document notes");
                    String::new()
                }
            },
            None => String::new(),
        };

        let filter: Vec<(&str, &str)> = match document_key {
            Some(key) => vec![("document_key", key)],
            None => vec![("session_id", session_id)],
        };
        let related = match self
            .vectors
            .search(
                MEMORY_COLLECTION,
                query,
                self.config.related_hits + recent_turns.len(),
                &filter,
            )
            .await
        {
            Ok(hits) => hits
                .into_iter()
                .filter(|h| !recent_turns.iter().any(|t| t.content == h.text))
                .take(self.config.related_hits)
                .collect(),
            Err(e) => {
                warn!(error = %e, "Vector search failed, continuing without related memory");
                Vec::new()
            }
        };

        Ok(MemoryContext {
            recent_turns,
            profile_notes: profile_notes.trim_end().to_string(),
            document_notes: document_notes.trim_end().to_string(),
            related,
            turn_chars: self.config.turn_chars,
        })
    }

    pub async fn clear_session(&self, session_id: &str) -> Result<(), Ah32Error> {
        self.sessions.clear(session_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbeddingService;
    use crate::memory::classifier::MemoryCategory;
    use crate::memory::vector::VectorWriteMode;
    use std::sync::Arc;

    fn manager(root: &Path) -> MemoryManager {
        let vectors = VectorMemory::new(
            root.join("vectors"),
            Arc::new(HashEmbeddingService::new(64)),
            VectorWriteMode::Sync,
        );
        MemoryManager::open(root, 50, vectors, MemoryConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_record_turn_routes_tiers() {
        let dir = tempfile::tempdir().unwrap();
        let mem = manager(dir.path());

        let c = mem
            .record_turn(&TurnContext {
                session_id: "s1",
                document_key: Some("doc:bid"),
                user_message: "我是张工，负责这个标",
                assistant_message: "好的，张工。",
            })
            .await
            .unwrap();
        assert_eq!(c.tier, MemoryTier::Global);

        let c = mem
            .record_turn(&TurnContext {
                session_id: "s1",
                document_key: Some("doc:bid"),
                user_message: "报价按预算九折",
                assistant_message: "已记录。",
            })
            .await
            .unwrap();
        assert_eq!(c.category, MemoryCategory::Commercial);

        let doc = mem.documents().load("doc:bid").await.unwrap();
        assert_eq!(doc.notes.len(), 1);
        assert_eq!(mem.profile().get().await.facts.len(), 1);
        assert_eq!(mem.sessions().recent("s1", 10).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_document_notes_visible_from_other_session() {
        let dir = tempfile::tempdir().unwrap();
        let mem = manager(dir.path());
        mem.record_turn(&TurnContext {
            session_id: "s1",
            document_key: Some("doc:bid"),
            user_message: "投标截止日期是5月1日",
            assistant_message: "收到",
        })
        .await
        .unwrap();

        let ctx = mem
            .assemble_context("s2", Some("doc:bid"), "截止日期")
            .await
            .unwrap();
        assert!(ctx.recent_turns.is_empty());
        assert!(ctx.document_notes.contains("5月1日"));
        assert!(ctx.render().contains("## Document notes"));
        assert_eq!(ctx.related.len(), 1);
    }

    #[tokio::test]
    async fn test_small_talk_is_not_mirrored() {
        let dir = tempfile::tempdir().unwrap();
        let mem = manager(dir.path());
        for (i, msg) in ["今天天气不错", "工期是三个月"].iter().enumerate() {
            mem.record_turn(&TurnContext {
                session_id: "s",
                document_key: None,
                user_message: msg,
                assistant_message: &format!("reply {i}"),
            })
            .await
            .unwrap();
        }
        let hits = mem
            .vectors()
            .search(MEMORY_COLLECTION, "今天天气不错 工期是三个月", 10, &[])
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(mem.sessions().recent("s", 10).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_empty_context_renders_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mem = manager(dir.path());
        let ctx = mem.assemble_context("fresh", None, "你好").await.unwrap();
        assert!(ctx.is_empty());
        assert_eq!(ctx.render(), "");
    }

    #[tokio::test]
    async fn test_transcript_for_router() {
        let dir = tempfile::tempdir().unwrap();
        let mem = manager(dir.path());
        mem.record_turn(&TurnContext {
            session_id: "s",
            document_key: None,
            user_message: "写一段摘要",
            assistant_message: "```json\n{\"schema_version\":\"ah32.plan.v1\"}\n```",
        })
        .await
        .unwrap();
        let ctx = mem.assemble_context("s", None, "继续").await.unwrap();
        assert!(ctx.transcript().starts_with("user: 写一段摘要\nassistant: ```json"));
    }
}
