//! Test data builders.
//!
//! Provides fluent API for chat requests, skill files and plan payloads.

use std::path::{Path, PathBuf};

use serde_json::{json, Value};

use ah32::agent::ChatRequest;
use ah32::memory::DocumentIdentity;

/// Builder for chat requests.
pub struct ChatRequestBuilder {
    req: ChatRequest,
}

impl ChatRequestBuilder {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            req: ChatRequest::new(message),
        }
    }

    pub fn session(mut self, id: impl Into<String>) -> Self {
        self.req.session_id = Some(id.into());
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.req.host_app = Some(host.into());
        self
    }

    pub fn document_name(mut self, name: impl Into<String>) -> Self {
        self.req.document = Some(DocumentIdentity {
            name: Some(name.into()),
            ..Default::default()
        });
        self
    }

    pub fn perception(mut self, perception: Value) -> Self {
        self.req.perception = Some(perception);
        self
    }

    pub fn show_thinking(mut self) -> Self {
        self.req.show_thinking = true;
        self
    }

    pub fn build(self) -> ChatRequest {
        self.req
    }
}

/// Builder for `SKILL.md` files.
pub struct SkillFileBuilder {
    name: String,
    triggers: Vec<String>,
    background_triggers: Vec<String>,
    background_tools: Vec<String>,
    default_writeback: Option<String>,
    body: String,
}

impl SkillFileBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            triggers: Vec::new(),
            background_triggers: Vec::new(),
            background_tools: Vec::new(),
            default_writeback: None,
            body: "Follow the house style.".into(),
        }
    }

    pub fn trigger(mut self, trigger: impl Into<String>) -> Self {
        self.triggers.push(trigger.into());
        self
    }

    pub fn background_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.background_triggers.push(trigger.into());
        self
    }

    pub fn background_tool(mut self, tool: impl Into<String>) -> Self {
        self.background_tools.push(tool.into());
        self
    }

    pub fn default_writeback(mut self, delivery: impl Into<String>) -> Self {
        self.default_writeback = Some(delivery.into());
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Write `<skills_dir>/<name>/SKILL.md` and return its path.
    pub fn write(self, skills_dir: &Path) -> PathBuf {
        let dir = skills_dir.join(&self.name);
        std::fs::create_dir_all(&dir).expect("Failed to create skill dir");
        let mut front = format!("name: {}\ndescription: {} skill\n", self.name, self.name);
        let list = |items: &[String]| {
            items
                .iter()
                .map(|t| format!("  - \"{}\"\n", t))
                .collect::<String>()
        };
        if !self.triggers.is_empty() {
            front.push_str(&format!("triggers:\n{}", list(&self.triggers)));
        }
        if !self.background_triggers.is_empty() {
            front.push_str(&format!(
                "background_triggers:\n{}",
                list(&self.background_triggers)
            ));
        }
        if !self.background_tools.is_empty() {
            front.push_str(&format!("background_tools:\n{}", list(&self.background_tools)));
        }
        if let Some(d) = &self.default_writeback {
            front.push_str(&format!("default_writeback: {}\n", d));
        }
        let path = dir.join("SKILL.md");
        std::fs::write(&path, format!("---\n{}---\n{}\n", front, self.body))
            .expect("Failed to write skill file");
        path
    }
}

/// A minimal valid plan with one upsert_block holding an insert_text.
pub fn plan_json(host: &str, text: &str) -> Value {
    json!({
        "schema_version": "ah32.plan.v1",
        "host_app": host,
        "actions": [{
            "id": "blk",
            "op": "upsert_block",
            "block_id": "model_block",
            "actions": [{ "id": "t1", "op": "insert_text", "text": text }]
        }]
    })
}

/// Model output: an explanation followed by a fenced plan.
pub fn fenced(explanation: &str, plan: &Value) -> String {
    format!("{}\n\n```json\n{}\n```", explanation, plan)
}
