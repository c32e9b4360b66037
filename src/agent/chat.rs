//! One chat turn, streamed as frames.
//!
//! The turn runs start to finish even if the receiver goes away, so a
//! disconnected task pane still gets its turn persisted.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::agent::react::{run_react, ReactConfig};
use crate::agent::tools::{ToolContext, ToolRegistry};
use crate::feedback::{CodeQualityStore, Telemetry};
use crate::llm::{ChatMessage, LlmClient, Usage};
use crate::memory::{DocumentIdentity, MemoryContext, MemoryManager, TurnContext};
use crate::plan::generator::{suggest_block_id, PlanGenerator, PlanRequest};
use crate::plan::guard::{guard_output, strip_plan_payloads};
use crate::plan::repair::{obtain_plan, RepairBudget};
use crate::plan::schema::HostApp;
use crate::routing::directives::{chat_only_directive, writeback_directive};
use crate::routing::{route, RouteInput, SkillHint, WritebackDecision};
use crate::skills::{SelectedSkill, SkillRegistry};
use crate::utils::text::{chunk_chars, truncate_chars};
use crate::Ah32Error;

const MAX_SKILLS_PER_TURN: usize = 3;
const MAX_PERCEPTION_CHARS: usize = 4_000;
const MAX_RULE_CHARS: usize = 4_000;
const QUALITY_HINTS_PER_TURN: usize = 3;

/// Appended when a turn asks to write but the host cannot take a Plan.
pub const UNSUPPORTED_HOST_MESSAGE: &str =
    "当前宿主应用不支持写回文档，本次只提供文字回答，文档未被修改。\
     (This host cannot receive writebacks; the document was not changed.)";

/// Chat request body posted by the task pane.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default, alias = "sessionId")]
    pub session_id: Option<String>,
    /// Defaults to `wps` when absent.
    #[serde(default, alias = "hostApp")]
    pub host_app: Option<String>,
    #[serde(default, alias = "clientId")]
    pub client_id: Option<String>,
    #[serde(default)]
    pub document: Option<DocumentIdentity>,
    /// Dynamic perception snapshot: cursor, selection, structure.
    #[serde(default, alias = "dynamicPerception")]
    pub perception: Option<Value>,
    #[serde(default, alias = "frontendCapabilities")]
    pub capabilities: Option<Value>,
    #[serde(default, alias = "showThinking")]
    pub show_thinking: bool,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    /// Host for routing. A missing host means Writer; an unknown one is
    /// unsupported and routes to chat.
    pub fn host(&self) -> Option<HostApp> {
        match self.host_app.as_deref().map(str::trim) {
            None | Some("") => Some(HostApp::Wps),
            Some(name) => HostApp::from_name(name),
        }
    }

    pub fn document_key(&self) -> Option<String> {
        self.document
            .clone()
            .map(DocumentIdentity::resolve_local)
            .and_then(|d| d.document_key())
    }

    /// Explicit session id, else one derived from the document identity.
    pub fn resolve_session_id(&self) -> String {
        match self.session_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => self
                .document
                .clone()
                .unwrap_or_default()
                .resolve_local()
                .session_id(self.host_app.as_deref(), self.client_id.as_deref()),
        }
    }

    fn perception_text(&self) -> String {
        match &self.perception {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => truncate_chars(s.trim(), MAX_PERCEPTION_CHARS),
            Some(other) => truncate_chars(
                &serde_json::to_string_pretty(other).unwrap_or_default(),
                MAX_PERCEPTION_CHARS,
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    Start,
    Phase,
    Thinking,
    RagMeta,
    Skills,
    Content,
    Done,
    Error,
}

/// One server-sent frame: `{type, session_id, content, ...data}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamFrame {
    #[serde(rename = "type")]
    pub kind: FrameKind,
    pub session_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub content: String,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl StreamFrame {
    pub fn new(kind: FrameKind, session_id: &str) -> Self {
        Self {
            kind,
            session_id: session_id.to_string(),
            content: String::new(),
            data: Map::new(),
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// Merge the fields of a JSON object into the frame.
    pub fn with_data(mut self, data: Value) -> Self {
        if let Value::Object(map) = data {
            self.data.extend(map);
        }
        self
    }
}

/// Result of a completed turn.
#[derive(Debug, Clone)]
pub struct TurnSummary {
    pub session_id: String,
    pub decision: WritebackDecision,
    /// False when a writeback turn could not produce a plan.
    pub want_writeback: bool,
    pub plan_repaired: bool,
    pub content: String,
    pub usage: Usage,
    pub tool_calls: usize,
}

#[derive(Debug, Clone)]
pub struct ChatOptions {
    /// Admin switch for thinking frames.
    pub show_thinking: bool,
    pub max_chunk_chars: usize,
    pub rule_files: Vec<PathBuf>,
    pub react: ReactConfig,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            show_thinking: false,
            max_chunk_chars: 600,
            rule_files: Vec::new(),
            react: ReactConfig::default(),
        }
    }
}

/// Services a chat turn calls into.
pub struct ChatDeps {
    pub llm: Arc<dyn LlmClient>,
    pub memory: Arc<MemoryManager>,
    pub skills: Arc<SkillRegistry>,
    pub tools: Arc<ToolRegistry>,
    pub plan_generator: Arc<PlanGenerator>,
    pub code_quality: Arc<CodeQualityStore>,
    pub telemetry: Arc<Telemetry>,
}

pub struct ChatAgent {
    deps: ChatDeps,
    options: ChatOptions,
}

/// Frame sink that ignores a closed receiver.
struct Frames<'a> {
    tx: &'a mpsc::Sender<StreamFrame>,
    session_id: &'a str,
}

impl Frames<'_> {
    async fn send(&self, frame: StreamFrame) {
        if self.tx.send(frame).await.is_err() {
            debug!(session_id = self.session_id, "Stream receiver closed, continuing turn");
        }
    }

    async fn emit(&self, kind: FrameKind, content: impl Into<String>, data: Value) {
        self.send(
            StreamFrame::new(kind, self.session_id)
                .with_content(content)
                .with_data(data),
        )
        .await;
    }

    async fn phase(&self, name: &str) {
        self.emit(FrameKind::Phase, "", json!({ "phase": name })).await;
    }
}

impl ChatAgent {
    pub fn new(deps: ChatDeps, options: ChatOptions) -> Self {
        Self { deps, options }
    }

    pub fn options(&self) -> &ChatOptions {
        &self.options
    }

    /// Run one turn, sending frames to `tx`.
    ///
    /// # Arguments
    ///
    /// * `req` - The task pane's chat request
    /// * `tx` - Frame sink; send failures are ignored
    ///
    /// # Returns
    ///
    /// The turn summary. On failure an `error` frame has already been sent
    /// and nothing is persisted.
    #[instrument(skip_all, fields(session_id = tracing::field::Empty, turn_id = tracing::field::Empty))]
    pub async fn run_turn(
        &self,
        req: ChatRequest,
        tx: mpsc::Sender<StreamFrame>,
    ) -> Result<TurnSummary, Ah32Error> {
        let session_id = req.resolve_session_id();
        let turn_id = Uuid::new_v4().to_string();
        let span = tracing::Span::current();
        span.record("session_id", session_id.as_str());
        span.record("turn_id", turn_id.as_str());
        let frames = Frames {
            tx: &tx,
            session_id: &session_id,
        };

        if req.message.trim().is_empty() {
            let err = Ah32Error::Validation("message must not be empty".into());
            frames.emit(FrameKind::Error, err.to_string(), json!({})).await;
            return Err(err);
        }

        frames
            .emit(FrameKind::Start, "", json!({ "turn_id": turn_id }))
            .await;
        match self.run_inner(&req, &session_id, &turn_id, &frames).await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                warn!(error = %e, "Chat turn failed");
                frames
                    .emit(
                        FrameKind::Error,
                        format!("本轮对话失败 (turn failed): {}", e),
                        json!({ "error_type": error_type(&e) }),
                    )
                    .await;
                self.deps
                    .telemetry
                    .emit(
                        "chat_turn_failed",
                        Some(&session_id),
                        &json!({ "turn_id": turn_id, "error": e.to_string() }),
                    )
                    .await;
                Err(e)
            }
        }
    }

    async fn run_inner(
        &self,
        req: &ChatRequest,
        session_id: &str,
        turn_id: &str,
        frames: &Frames<'_>,
    ) -> Result<TurnSummary, Ah32Error> {
        let host = req.host();
        let document_key = req.document_key();
        let perception = req.perception_text();

        frames.phase("skills").await;
        self.deps.skills.refresh_if_changed();
        let selected = self.deps.skills.select(&req.message, MAX_SKILLS_PER_TURN);
        let hints: Vec<SkillHint> = selected.iter().map(SelectedSkill::hint).collect();
        if !selected.is_empty() {
            frames
                .emit(
                    FrameKind::Skills,
                    "",
                    json!({ "skills": hints.iter().map(|h| h.name.as_str()).collect::<Vec<_>>() }),
                )
                .await;
        }

        frames.phase("memory").await;
        let memory = match self
            .deps
            .memory
            .assemble_context(session_id, document_key.as_deref(), &req.message)
            .await
        {
            Ok(memory) => memory,
            Err(e) => {
                warn!(error = %e, "Memory context unavailable, continuing without it");
                MemoryContext::default()
            }
        };

        let transcript = memory.transcript();
        let decision = route(&RouteInput {
            message: &req.message,
            prior_context: &transcript,
            host_app: host,
            skills: &hints,
        });
        info!(
            want_writeback = decision.want_writeback,
            reason = ?decision.reason,
            "Routed turn"
        );

        frames
            .emit(
                FrameKind::RagMeta,
                "",
                json!({
                    "recent_turns": memory.recent_turns.len(),
                    "related_hits": memory.related.len(),
                    "has_profile_notes": !memory.profile_notes.is_empty(),
                    "has_document_notes": !memory.document_notes.is_empty(),
                    "document_key": document_key,
                }),
            )
            .await;

        let block_id = suggest_block_id(session_id, &req.message);
        let host_for_plan = host.filter(|_| decision.want_writeback);
        let quality_hints = match host_for_plan {
            Some(h) => {
                self.deps
                    .code_quality
                    .hints(Some(h.as_str()), QUALITY_HINTS_PER_TURN)
                    .await
            }
            None => Vec::new(),
        };

        let tools = turn_tools(&self.deps.tools, &selected);
        let system = self
            .system_prompt(
                host,
                &perception,
                &selected,
                &memory,
                &tools,
                &decision,
                &block_id,
                &quality_hints,
            )
            .await;
        let messages = vec![ChatMessage::system(system), ChatMessage::user(req.message.clone())];

        frames.phase("generating").await;
        let tool_ctx = ToolContext {
            session_id: session_id.to_string(),
            document_key: document_key.clone(),
            perception: perception.clone(),
        };
        let outcome = run_react(
            self.deps.llm.clone(),
            &tools,
            messages,
            &tool_ctx,
            &self.options.react,
        )
        .await?;

        if self.options.show_thinking && req.show_thinking {
            if let Some(reasoning) = outcome.reasoning.as_deref().filter(|r| !r.trim().is_empty()) {
                frames.emit(FrameKind::Thinking, reasoning, json!({})).await;
            }
        }

        let guarded = guard_output(&outcome.answer, host_for_plan.is_some());
        let mut want_writeback = false;
        let mut plan_repaired = false;
        let content = match host_for_plan {
            Some(host) => {
                frames.phase("plan").await;
                let plan_req = PlanRequest {
                    session_id: session_id.to_string(),
                    user_query: req.message.clone(),
                    host_app: host,
                    capabilities: req.capabilities.clone(),
                    context: perception.clone(),
                    anchor: decision.anchor,
                    delivery: decision.delivery,
                    block_id: Some(block_id.clone()),
                    quality_hints,
                };
                let mut budget = RepairBudget::new();
                let explanation = strip_plan_payloads(&guarded);
                match obtain_plan(&self.deps.plan_generator, &plan_req, Some(&guarded), &mut budget)
                    .await
                {
                    Ok(outcome) => {
                        want_writeback = true;
                        plan_repaired = outcome.repaired;
                        let pretty = serde_json::to_string_pretty(&outcome.plan.to_value())?;
                        join_sections(&explanation, &format!("```json\n{}\n```", pretty))
                    }
                    Err(failure) => {
                        plan_repaired = failure.repaired;
                        warn!(error_type = failure.error.error_type(), "No plan for writeback turn");
                        join_sections(&explanation, &failure.user_message())
                    }
                }
            }
            None if decision.want_writeback => {
                let requested = req.host_app.as_deref().unwrap_or_default();
                warn!(host_app = requested, "Writeback requested on an unsupported host");
                join_sections(
                    &guarded,
                    &format!("{} [host_app: {}]", UNSUPPORTED_HOST_MESSAGE, requested),
                )
            }
            None => guarded,
        };

        for chunk in chunk_chars(&content, self.options.max_chunk_chars) {
            frames.emit(FrameKind::Content, chunk, json!({})).await;
        }

        if let Err(e) = self
            .deps
            .memory
            .record_turn(&TurnContext {
                session_id,
                document_key: document_key.as_deref(),
                user_message: &req.message,
                assistant_message: &content,
            })
            .await
        {
            warn!(error = %e, "Failed to persist chat turn");
        }

        self.deps
            .telemetry
            .emit(
                "chat_turn",
                Some(session_id),
                &json!({
                    "turn_id": turn_id,
                    "host_app": host.map(|h| h.as_str()),
                    "reason": decision.reason,
                    "want_writeback": want_writeback,
                    "plan_repaired": plan_repaired,
                    "tool_calls": outcome.steps.len(),
                    "skills": hints.iter().map(|h| h.name.as_str()).collect::<Vec<_>>(),
                    "total_tokens": outcome.usage.total_tokens,
                }),
            )
            .await;

        frames
            .emit(
                FrameKind::Done,
                "",
                json!({
                    "want_writeback": want_writeback,
                    "reason": decision.reason,
                    "usage": outcome.usage,
                    "plan_repaired": plan_repaired,
                }),
            )
            .await;

        Ok(TurnSummary {
            session_id: session_id.to_string(),
            decision,
            want_writeback,
            plan_repaired,
            content,
            usage: outcome.usage,
            tool_calls: outcome.steps.len(),
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn system_prompt(
        &self,
        host: Option<HostApp>,
        perception: &str,
        skills: &[SelectedSkill],
        memory: &MemoryContext,
        tools: &ToolRegistry,
        decision: &WritebackDecision,
        block_id: &str,
        quality_hints: &[String],
    ) -> String {
        let mut sections = vec![base_prompt(host)];

        if !perception.is_empty() {
            sections.push(format!("# Current document\n{}", perception));
        }

        let rules = self.load_rules().await;
        if !rules.is_empty() {
            sections.push(format!("# Conversation rules\n{}", rules));
        }

        for selected in skills {
            let mut text = format!("# Skill: {}\n", selected.skill.name);
            if !selected.skill.description.is_empty() {
                text.push_str(&selected.skill.description);
                text.push('\n');
            }
            text.push_str(selected.skill.body.trim());
            if selected.background {
                let note = if selected.skill.background_tools.is_empty() {
                    "\n(Background skill: use the tools to research, do not write to the document.)".to_string()
                } else {
                    format!(
                        "\n(Background skill: research with {} only, do not write to the document.)",
                        selected.skill.background_tools.join(", ")
                    )
                };
                text.push_str(&note);
            }
            sections.push(text);
        }

        let rendered = memory.render();
        if !rendered.is_empty() {
            sections.push(format!("# Memory\n{}", rendered));
        }

        if !tools.is_empty() {
            sections.push(format!(
                "# Tools\nTo call a tool, reply with only a JSON object \
                 {{\"tool\": \"<name>\", \"action_input\": {{...}}}}. Available tools:\n{}",
                tools.describe()
            ));
        }

        if !quality_hints.is_empty() {
            sections.push(format!(
                "# Known execution failures\n{}",
                quality_hints
                    .iter()
                    .map(|h| format!("- {}", h))
                    .collect::<Vec<_>>()
                    .join("\n")
            ));
        }

        let directive = match host {
            Some(h) if decision.want_writeback => writeback_directive(decision, h, block_id),
            _ => chat_only_directive().to_string(),
        };
        sections.push(format!("# This turn\n{}", directive));
        sections.join("\n\n")
    }

    /// Read the configured rule files. Missing files are skipped.
    async fn load_rules(&self) -> String {
        let mut parts = Vec::new();
        for path in &self.options.rule_files {
            match tokio::fs::read_to_string(path).await {
                Ok(text) if !text.trim().is_empty() => {
                    parts.push(truncate_chars(text.trim(), MAX_RULE_CHARS));
                }
                Ok(_) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Rule file unreadable"),
            }
        }
        parts.join("\n\n")
    }
}

fn base_prompt(host: Option<HostApp>) -> String {
    let host_line = match host {
        Some(h) => format!("The user is working in {}.", h.label()),
        None => "The user is working in an office host that cannot receive writebacks.".to_string(),
    };
    format!(
        "You are 阿蛤 (AH32), an office assistant embedded in a WPS task pane. \
         Answer in the user's language, concisely and accurately.\n{}\nToday is {}.",
        host_line,
        chrono::Local::now().format("%Y-%m-%d")
    )
}

fn join_sections(head: &str, tail: &str) -> String {
    let head = head.trim();
    if head.is_empty() {
        tail.to_string()
    } else {
        format!("{}\n\n{}", head, tail)
    }
}

fn error_type(err: &Ah32Error) -> &'static str {
    match err {
        Ah32Error::Config(_) => "config",
        Ah32Error::Llm(_) => "llm_error",
        Ah32Error::Timeout { .. } => "timeout",
        Ah32Error::Validation(_) => "validation",
        Ah32Error::Storage(_) => "storage",
        Ah32Error::NotFound { .. } => "not_found",
        Ah32Error::Conflict(_) => "conflict",
    }
}

/// Tools for this turn. A background skill that names its tools limits the
/// turn to them.
fn turn_tools(all: &ToolRegistry, selected: &[SelectedSkill]) -> ToolRegistry {
    let names: Vec<String> = selected
        .iter()
        .filter(|s| s.background)
        .flat_map(|s| s.skill.background_tools.iter().cloned())
        .collect();
    if names.is_empty() {
        all.clone()
    } else {
        all.restricted_to(&names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_frame_serialization_flattens_data() {
        let frame = StreamFrame::new(FrameKind::Done, "s1").with_data(json!({"want_writeback": true}));
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(
            value,
            json!({"type": "done", "session_id": "s1", "want_writeback": true})
        );
        let content = StreamFrame::new(FrameKind::Content, "s1").with_content("hi");
        assert_eq!(serde_json::to_value(&content).unwrap()["content"], "hi");
    }

    #[test]
    fn test_request_host_defaults() {
        let req: ChatRequest = serde_json::from_value(json!({"message": "你好"})).unwrap();
        assert_eq!(req.host(), Some(HostApp::Wps));
        let req: ChatRequest =
            serde_json::from_value(json!({"message": "x", "hostApp": "excel"})).unwrap();
        assert_eq!(req.host(), Some(HostApp::Et));
        let req: ChatRequest =
            serde_json::from_value(json!({"message": "x", "host_app": "notepad"})).unwrap();
        assert_eq!(req.host(), None);
    }

    #[test]
    fn test_session_id_explicit_or_derived() {
        let mut req = ChatRequest::new("x");
        req.session_id = Some("  my-session ".into());
        assert_eq!(req.resolve_session_id(), "my-session");

        let mut a = ChatRequest::new("x");
        a.document = Some(DocumentIdentity {
            name: Some("报告.docx".into()),
            ..Default::default()
        });
        let b = a.clone();
        assert_eq!(a.resolve_session_id(), b.resolve_session_id());
        assert!(a.resolve_session_id().starts_with("session_"));
    }

    #[test]
    fn test_join_sections() {
        assert_eq!(join_sections("  ", "plan"), "plan");
        assert_eq!(join_sections("说明", "plan"), "说明\n\nplan");
    }
}
