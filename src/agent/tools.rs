//! Agent tools invoked from the ReAct loop.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::memory::manager::MEMORY_COLLECTION;
use crate::memory::VectorMemory;
use crate::utils::text::truncate_chars;
use crate::Ah32Error;

/// Per-turn data a tool may read.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub session_id: String,
    pub document_key: Option<String>,
    /// Perception snapshot reported by the task pane.
    pub perception: String,
}

/// Abstract interface for agent tools.
///
/// Tools are looked up by [`Tool::name`] when the model emits a JSON tool
/// call. Errors are turned into observations by the loop, never surfaced to
/// the user directly.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique identifier the model uses to call the tool.
    fn name(&self) -> &str;

    /// One-line description listed in the system prompt.
    fn description(&self) -> &str;

    /// True for tools that may run without the user asking (research style).
    fn background(&self) -> bool {
        false
    }

    /// Execute the tool.
    ///
    /// # Arguments
    ///
    /// * `input` - The `action_input` object from the model's tool call
    /// * `ctx` - Turn context
    ///
    /// # Returns
    ///
    /// Observation text fed back to the model.
    async fn call(&self, input: &Value, ctx: &ToolContext) -> Result<String, Ah32Error>;
}

/// Read a required string argument.
pub fn parse_string(args: &Value, key: &str) -> Result<String, Ah32Error> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Ah32Error::Validation(format!("missing field: {}", key)))
}

/// Read an optional unsigned argument with a default.
pub fn parse_usize_or(args: &Value, key: &str, default: usize) -> usize {
    args.get(key)
        .and_then(Value::as_u64)
        .map(|v| v as usize)
        .unwrap_or(default)
}

#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// The subset of tools named in `names`. Unknown names are skipped.
    pub fn restricted_to(&self, names: &[String]) -> ToolRegistry {
        let mut out = ToolRegistry::new();
        for name in names {
            match self.get(name) {
                Some(tool) => out.register(tool),
                None => warn!(tool = %name, "Skill names an unregistered tool"),
            }
        }
        out
    }

    /// `- name: description` lines for the system prompt.
    pub fn describe(&self) -> String {
        self.tools
            .values()
            .map(|t| format!("- {}: {}", t.name(), t.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Semantic search over remembered conversation content.
pub struct SearchKnowledgeTool {
    vectors: VectorMemory,
}

impl SearchKnowledgeTool {
    pub fn new(vectors: VectorMemory) -> Self {
        Self { vectors }
    }
}

#[async_trait]
impl Tool for SearchKnowledgeTool {
    fn name(&self) -> &str {
        "search_knowledge"
    }

    fn description(&self) -> &str {
        "Search remembered notes for this document. Input: {\"query\": string, \"k\": number?}"
    }

    fn background(&self) -> bool {
        true
    }

    async fn call(&self, input: &Value, ctx: &ToolContext) -> Result<String, Ah32Error> {
        let query = parse_string(input, "query")?;
        let k = parse_usize_or(input, "k", 4).clamp(1, 10);
        let filter: Vec<(&str, &str)> = match &ctx.document_key {
            Some(key) => vec![("document_key", key.as_str())],
            None => vec![("session_id", ctx.session_id.as_str())],
        };
        let hits = self
            .vectors
            .search(MEMORY_COLLECTION, &query, k, &filter)
            .await?;
        if hits.is_empty() {
            return Ok("No matching knowledge found.".to_string());
        }
        Ok(hits
            .iter()
            .map(|h| format!("- ({:.2}) {}", h.score, truncate_chars(&h.text, 300)))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

/// Returns the perception snapshot of the open document.
pub struct DocumentContextTool;

#[async_trait]
impl Tool for DocumentContextTool {
    fn name(&self) -> &str {
        "document_context"
    }

    fn description(&self) -> &str {
        "Return the current document snapshot (selection, cursor, headings). Input: {}"
    }

    async fn call(&self, _input: &Value, ctx: &ToolContext) -> Result<String, Ah32Error> {
        if ctx.perception.trim().is_empty() {
            return Ok("No document context was provided by the task pane.".to_string());
        }
        Ok(ctx.perception.clone())
    }
}

/// Registry with the built-in tools.
pub fn builtin_tools(vectors: VectorMemory) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(SearchKnowledgeTool::new(vectors)));
    registry.register(Arc::new(DocumentContextTool));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbeddingService;
    use crate::memory::vector::{Metadata, VectorWriteMode};
    use serde_json::json;

    #[tokio::test]
    async fn test_document_context_tool() {
        let ctx = ToolContext {
            perception: "selection: 第一章".into(),
            ..Default::default()
        };
        let out = DocumentContextTool.call(&json!({}), &ctx).await.unwrap();
        assert_eq!(out, "selection: 第一章");
        let empty = DocumentContextTool
            .call(&json!({}), &ToolContext::default())
            .await
            .unwrap();
        assert!(empty.starts_with("No document context"));
    }

    #[tokio::test]
    async fn test_search_knowledge_scoped_to_session() {
        let dir = tempfile::tempdir().unwrap();
        let vectors = VectorMemory::new(
            dir.path(),
            Arc::new(HashEmbeddingService::new(64)),
            VectorWriteMode::Sync,
        );
        let mut meta = Metadata::new();
        meta.insert("session_id".into(), "s1".into());
        vectors
            .upsert(MEMORY_COLLECTION, "s1:1", "工期为90天", meta)
            .await
            .unwrap();

        let registry = builtin_tools(vectors);
        assert_eq!(registry.names(), vec!["document_context", "search_knowledge"]);
        let tool = registry.get("search_knowledge").unwrap();
        let ctx = ToolContext {
            session_id: "s1".into(),
            ..Default::default()
        };
        let out = tool.call(&json!({"query": "工期"}), &ctx).await.unwrap();
        assert!(out.contains("工期为90天"));

        let other = ToolContext {
            session_id: "s2".into(),
            ..Default::default()
        };
        let out = tool.call(&json!({"query": "工期"}), &other).await.unwrap();
        assert_eq!(out, "No matching knowledge found.");
    }

    #[tokio::test]
    async fn test_missing_query_is_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let vectors = VectorMemory::new(
            dir.path(),
            Arc::new(HashEmbeddingService::new(8)),
            VectorWriteMode::Sync,
        );
        let tool = SearchKnowledgeTool::new(vectors);
        assert!(matches!(
            tool.call(&json!({}), &ToolContext::default()).await,
            Err(Ah32Error::Validation(_))
        ));
    }
}
