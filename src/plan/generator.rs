//! Dedicated plan generation: prompt the fast model, then finalise its output.
//!
//! Finalising is `extract -> normalize -> host check -> validate -> override`.
//! The router's block id and anchor always replace whatever the model wrote.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::llm::{ChatMessage, CompletionRequest, LlmClient};
use crate::plan::extract::extract_plan_json;
use crate::plan::normalize::normalize_plan_payload;
use crate::plan::prompts::{plan_generation_messages, plan_repair_messages};
use crate::plan::schema::{
    validate_plan, Action, ActionKind, BlockAnchor, HostApp, Plan, PlanValidationError,
};
use crate::routing::Delivery;
use crate::utils::sanitize::{safe_id, sha256_hex};
use crate::Ah32Error;

/// Deterministic block id for a request: repeated identical requests in one
/// session upsert the same block.
pub fn suggest_block_id(session_id: &str, query: &str) -> String {
    let digest = sha256_hex(&format!("{}|{}", session_id, query));
    format!("ah32_{}", &digest[..12])
}

/// Everything plan generation needs about one writeback turn.
#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub session_id: String,
    pub user_query: String,
    pub host_app: HostApp,
    /// Frontend-reported feature flags.
    pub capabilities: Option<Value>,
    /// Perception summary and retrieved context.
    pub context: String,
    pub anchor: BlockAnchor,
    pub delivery: Delivery,
    /// Block id to force onto the plan; `None` derives one from the query.
    pub block_id: Option<String>,
    pub quality_hints: Vec<String>,
}

impl PlanRequest {
    pub fn new(session_id: impl Into<String>, user_query: impl Into<String>, host_app: HostApp) -> Self {
        Self {
            session_id: session_id.into(),
            user_query: user_query.into(),
            host_app,
            capabilities: None,
            context: String::new(),
            anchor: BlockAnchor::Cursor,
            delivery: Delivery::Rewrite,
            block_id: None,
            quality_hints: Vec::new(),
        }
    }

    /// The block id forced onto the plan.
    pub fn effective_block_id(&self) -> String {
        match &self.block_id {
            Some(id) => safe_id(id, "block"),
            None => suggest_block_id(&self.session_id, &self.user_query),
        }
    }
}

/// Why a plan could not be produced.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("LLM call failed: {0}")]
    Llm(String),

    #[error("Plan generation timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Model response contained no JSON plan")]
    NoJson,

    #[error(transparent)]
    Invalid(#[from] PlanValidationError),

    #[error("Plan host_app '{found}' does not match request host '{expected}'")]
    HostMismatch { expected: HostApp, found: String },

    #[error("No plan was produced")]
    Missing,
}

impl PlanError {
    /// Short machine-readable tag quoted into the repair prompt.
    pub fn error_type(&self) -> &'static str {
        match self {
            PlanError::Llm(_) => "llm_error",
            PlanError::Timeout(_) => "timeout",
            PlanError::NoJson => "no_json",
            PlanError::Invalid(_) => "invalid_plan",
            PlanError::HostMismatch { .. } => "host_mismatch",
            PlanError::Missing => "missing_plan",
        }
    }
}

impl From<Ah32Error> for PlanError {
    fn from(err: Ah32Error) -> Self {
        PlanError::Llm(err.to_string())
    }
}

/// One model round trip and what became of it.
#[derive(Debug)]
pub struct PlanAttempt {
    /// Raw model text (empty when the call itself failed).
    pub raw: String,
    pub result: Result<Plan, PlanError>,
}

pub struct PlanGenerator {
    llm: Arc<dyn LlmClient>,
    timeout: Duration,
}

impl PlanGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    /// Generate a plan with the dedicated prompt.
    pub async fn generate(&self, req: &PlanRequest) -> Result<Plan, PlanError> {
        self.generate_attempt(req).await.result
    }

    /// Repair a failed plan with one additional call.
    pub async fn repair(
        &self,
        req: &PlanRequest,
        original: &str,
        error_type: &str,
        error_message: &str,
    ) -> Result<Plan, PlanError> {
        self.repair_attempt(req, original, error_type, error_message)
            .await
            .result
    }

    #[instrument(skip(self, req), fields(host = %req.host_app, session = %req.session_id))]
    pub async fn generate_attempt(&self, req: &PlanRequest) -> PlanAttempt {
        let messages = plan_generation_messages(req);
        self.attempt(req, messages).await
    }

    #[instrument(skip(self, req, original, error_message), fields(host = %req.host_app))]
    pub async fn repair_attempt(
        &self,
        req: &PlanRequest,
        original: &str,
        error_type: &str,
        error_message: &str,
    ) -> PlanAttempt {
        info!(error_type, "Repairing plan");
        let messages = plan_repair_messages(req, original, error_type, error_message);
        self.attempt(req, messages).await
    }

    async fn attempt(&self, req: &PlanRequest, messages: Vec<ChatMessage>) -> PlanAttempt {
        let request = CompletionRequest::new(messages).fast().with_temperature(0.1);
        let raw = match tokio::time::timeout(self.timeout, self.llm.complete(request)).await {
            Ok(Ok(completion)) => completion.content,
            Ok(Err(e)) => {
                warn!(error = %e, "Plan LLM call failed");
                return PlanAttempt {
                    raw: String::new(),
                    result: Err(e.into()),
                };
            }
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "Plan LLM call timed out");
                return PlanAttempt {
                    raw: String::new(),
                    result: Err(PlanError::Timeout(self.timeout)),
                };
            }
        };
        let result = finalise_plan(&raw, req);
        PlanAttempt { raw, result }
    }
}

/// Turn raw model text into a validated, overridden Plan.
pub fn finalise_plan(raw: &str, req: &PlanRequest) -> Result<Plan, PlanError> {
    if raw.trim().is_empty() {
        return Err(PlanError::Missing);
    }
    let value = extract_plan_json(raw).ok_or(PlanError::NoJson)?;
    let normalized = normalize_plan_payload(&value, Some(req.host_app));

    let found = normalized
        .get("host_app")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if found != req.host_app.as_str() {
        warn!(expected = %req.host_app, found, "Plan host_app mismatch");
        return Err(PlanError::HostMismatch {
            expected: req.host_app,
            found: found.to_string(),
        });
    }

    let mut plan = validate_plan(&normalized)?;
    apply_override(&mut plan, &req.effective_block_id(), req.anchor, req.delivery);
    debug!(actions = plan.actions.len(), "Plan finalised");
    Ok(plan)
}

/// Top-level ops that write fresh content at the insertion point.
fn is_bare_insert(kind: &ActionKind) -> bool {
    matches!(kind, ActionKind::InsertText { .. } | ActionKind::InsertTable { .. })
}

/// Force the router's decision onto a validated plan.
///
/// A plan made only of bare inserts is first wrapped in one `upsert_block`
/// so a rerun replaces the block instead of appending a duplicate. The first
/// `upsert_block` receives `block_id`, later ones get a numbered suffix;
/// every block gets `anchor`. A non-default delivery is recorded in
/// `meta.delivery`.
pub fn apply_override(plan: &mut Plan, block_id: &str, anchor: BlockAnchor, delivery: Delivery) {
    if !plan.actions.is_empty() && plan.actions.iter().all(|a| is_bare_insert(&a.kind)) {
        debug!(count = plan.actions.len(), "Wrapping bare inserts in a block");
        let children = std::mem::take(&mut plan.actions);
        plan.actions.push(Action {
            id: safe_id(&format!("{}_block", block_id), "block"),
            title: String::new(),
            kind: ActionKind::UpsertBlock {
                block_id: block_id.to_string(),
                anchor,
                freeze_cursor: true,
                actions: children,
            },
        });
    }

    let mut seen = 0usize;
    for action in plan.actions.iter_mut() {
        if let ActionKind::UpsertBlock {
            block_id: id,
            anchor: a,
            ..
        } = &mut action.kind
        {
            seen += 1;
            *id = if seen == 1 {
                block_id.to_string()
            } else {
                safe_id(&format!("{}_{}", block_id, seen), "block")
            };
            *a = anchor;
        }
    }
    if !delivery.as_str().is_empty() {
        plan.meta
            .insert("delivery".to_string(), Value::from(delivery.as_str()));
    } else if plan.meta.get("delivery").is_some() {
        plan.meta.remove("delivery");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlm;
    use pretty_assertions::assert_eq;

    fn wps_request() -> PlanRequest {
        let mut req = PlanRequest::new("session_1", "把这段话写到文档末尾", HostApp::Wps);
        req.anchor = BlockAnchor::End;
        req
    }

    const MODEL_PLAN: &str = r#"Here is the plan:
```json
{"schemaVersion": "ah32.plan.v1", "hostApp": "wps", "actions": [
  {"op": "upsertBlock", "blockId": "model_block", "anchor": "cursor", "content": "总结内容"}
]}
```"#;

    #[test]
    fn test_suggest_block_id_is_deterministic() {
        let a = suggest_block_id("s1", "q");
        assert_eq!(a, suggest_block_id("s1", "q"));
        assert_ne!(a, suggest_block_id("s2", "q"));
        assert!(a.starts_with("ah32_"));
        assert_eq!(a.len(), 5 + 12);
    }

    #[test]
    fn test_finalise_overrides_block_and_anchor() {
        let req = wps_request();
        let plan = finalise_plan(MODEL_PLAN, &req).unwrap();
        match &plan.actions[0].kind {
            ActionKind::UpsertBlock {
                block_id,
                anchor,
                actions,
                ..
            } => {
                assert_eq!(block_id, &req.effective_block_id());
                assert_eq!(*anchor, BlockAnchor::End);
                assert_eq!(actions.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(plan.meta.get("delivery").is_none());
    }

    #[test]
    fn test_host_mismatch_is_hard_failure() {
        let mut req = wps_request();
        req.host_app = HostApp::Et;
        let err = finalise_plan(MODEL_PLAN, &req).unwrap_err();
        assert_eq!(err.error_type(), "host_mismatch");
        assert!(err.to_string().contains("'wps'"));
    }

    #[test]
    fn test_finalise_error_types() {
        let req = wps_request();
        assert_eq!(finalise_plan("", &req).unwrap_err().error_type(), "missing_plan");
        assert_eq!(finalise_plan("no json here", &req).unwrap_err().error_type(), "no_json");
        let bad = r#"{"actions": [{"op": "frobnicate"}]}"#;
        assert_eq!(finalise_plan(bad, &req).unwrap_err().error_type(), "invalid_plan");
    }

    #[test]
    fn test_override_numbers_later_blocks_and_sets_delivery() {
        let raw = r#"{"host_app": "wps", "actions": [
            {"op": "upsert_block", "block_id": "a", "text": "1"},
            {"op": "upsert_block", "block_id": "b", "text": "2"}
        ]}"#;
        let mut req = wps_request();
        req.block_id = Some("review".into());
        req.delivery = Delivery::CompareTable;
        let plan = finalise_plan(raw, &req).unwrap();
        let ids: Vec<String> = plan
            .actions
            .iter()
            .filter_map(|a| match &a.kind {
                ActionKind::UpsertBlock { block_id, .. } => Some(block_id.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(ids, vec!["review", "review_2"]);
        assert_eq!(plan.meta["delivery"], "compare_table");
    }

    #[test]
    fn test_bare_inserts_are_wrapped_in_the_forced_block() {
        let raw = r#"{"host_app": "wps", "actions": [
            {"op": "insert_text", "text": "第一段"},
            {"op": "insert_table", "rows": 2, "cols": 2}
        ]}"#;
        let req = wps_request();
        let first = finalise_plan(raw, &req).unwrap();
        assert_eq!(first.actions.len(), 1);
        match &first.actions[0].kind {
            ActionKind::UpsertBlock {
                block_id,
                anchor,
                actions,
                ..
            } => {
                assert_eq!(block_id, &req.effective_block_id());
                assert_eq!(*anchor, BlockAnchor::End);
                let ops: Vec<&str> = actions.iter().map(|a| a.op()).collect();
                assert_eq!(ops, vec!["insert_text", "insert_table"]);
            }
            other => panic!("unexpected {:?}", other),
        }
        // Same request again targets the same block.
        assert_eq!(finalise_plan(raw, &req).unwrap(), first);
    }

    #[test]
    fn test_mixed_plans_are_not_wrapped() {
        let raw = r#"{"host_app": "wps", "actions": [
            {"op": "set_selection", "anchor": "end"},
            {"op": "insert_text", "text": "尾注"}
        ]}"#;
        let plan = finalise_plan(raw, &wps_request()).unwrap();
        let ops: Vec<&str> = plan.actions.iter().map(|a| a.op()).collect();
        assert_eq!(ops, vec!["set_selection", "insert_text"]);
    }

    #[tokio::test]
    async fn test_generate_uses_fast_model() {
        let llm = Arc::new(ScriptedLlm::new([MODEL_PLAN]));
        let generator = PlanGenerator::new(llm.clone(), Duration::from_secs(5));
        let plan = generator.generate(&wps_request()).await.unwrap();
        assert_eq!(plan.host_app, HostApp::Wps);
        let requests = llm.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].tier, crate::llm::ModelTier::Fast);
    }

    #[tokio::test]
    async fn test_generate_llm_error_degrades() {
        let llm = Arc::new(ScriptedLlm::default());
        llm.push_error("connection refused");
        let generator = PlanGenerator::new(llm, Duration::from_secs(5));
        let err = generator.generate(&wps_request()).await.unwrap_err();
        assert_eq!(err.error_type(), "llm_error");
    }

    #[tokio::test]
    async fn test_generate_timeout() {
        let llm = Arc::new(ScriptedLlm::new([MODEL_PLAN]).with_delay(Duration::from_millis(200)));
        let generator = PlanGenerator::new(llm, Duration::from_millis(20));
        let err = generator.generate(&wps_request()).await.unwrap_err();
        assert_eq!(err.error_type(), "timeout");
    }
}
