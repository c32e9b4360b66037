//! Bounded ReAct loop.
//!
//! The model either answers or emits one JSON tool call
//! (`{"tool": "...", "action_input": {...}}`). Tool calls are executed and
//! their observations appended to the conversation until the model answers
//! or the step budget runs out.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use crate::agent::tools::{ToolContext, ToolRegistry};
use crate::llm::{ChatMessage, CompletionRequest, LlmClient, Usage};
use crate::plan::extract::{balanced_objects, fenced_blocks};
use crate::plan::guard::{looks_like_plan, looks_like_tool_call, TOOL_ARG_KEYS, TOOL_NAME_KEYS};
use crate::utils::text::truncate_chars;
use crate::Ah32Error;

/// Longest observation fed back to the model, in characters.
pub const MAX_OBSERVATION_CHARS: usize = 4_000;

#[derive(Debug, Clone)]
pub struct ReactConfig {
    /// Tool calls allowed before the model must answer.
    pub max_steps: usize,
    /// Budget for each model call.
    pub call_timeout: Duration,
}

impl Default for ReactConfig {
    fn default() -> Self {
        Self {
            max_steps: 3,
            call_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolStep {
    pub tool: String,
    pub input: Value,
    pub observation: String,
    pub ok: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ReactOutcome {
    pub answer: String,
    /// Reasoning reported with the final answer, if any.
    pub reasoning: Option<String>,
    pub usage: Usage,
    pub steps: Vec<ToolStep>,
}

/// Find a tool call in model output: fenced blocks first, then bare objects.
///
/// Plan-shaped JSON is never a tool call. Arguments may be an object or a
/// JSON-encoded string; missing arguments become `{}`.
pub fn parse_tool_call(text: &str) -> Option<(String, Value)> {
    let fenced = fenced_blocks(text)
        .into_iter()
        .filter_map(|b| serde_json::from_str::<Value>(b.body.trim()).ok());
    let bare = balanced_objects(text)
        .into_iter()
        .filter_map(|(start, end)| serde_json::from_str::<Value>(&text[start..end]).ok());

    fenced.chain(bare).find_map(|value| {
        if looks_like_plan(&value) || !looks_like_tool_call(&value) {
            return None;
        }
        let obj = value.as_object()?;
        let name = TOOL_NAME_KEYS
            .iter()
            .find_map(|k| obj.get(*k).and_then(Value::as_str))?
            .trim()
            .to_string();
        let args = TOOL_ARG_KEYS
            .iter()
            .find_map(|k| obj.get(*k))
            .cloned()
            .unwrap_or_else(|| json!({}));
        let args = match args {
            Value::String(s) => {
                serde_json::from_str::<Value>(&s).unwrap_or_else(|_| json!({ "query": s }))
            }
            Value::Null => json!({}),
            other => other,
        };
        (!name.is_empty()).then_some((name, args))
    })
}

/// Run the loop until the model answers.
///
/// # Arguments
///
/// * `llm` - Chat model
/// * `tools` - Tools the model may call; empty disables tool use
/// * `messages` - Prompt so far (system + user)
/// * `ctx` - Turn context passed to tools
/// * `config` - Step and time budget
///
/// # Returns
///
/// The final answer with usage summed over every call. A model call that
/// fails or times out aborts the loop.
#[instrument(skip_all, fields(session_id = %ctx.session_id))]
pub async fn run_react(
    llm: Arc<dyn LlmClient>,
    tools: &ToolRegistry,
    mut messages: Vec<ChatMessage>,
    ctx: &ToolContext,
    config: &ReactConfig,
) -> Result<ReactOutcome, Ah32Error> {
    let mut outcome = ReactOutcome::default();

    for step in 0..=config.max_steps {
        if step == config.max_steps && step > 0 {
            messages.push(ChatMessage::user(
                "Tool budget exhausted. Answer now using the observations above, without calling tools.",
            ));
        }

        let request = CompletionRequest::new(messages.clone());
        let completion = tokio::time::timeout(config.call_timeout, llm.complete(request))
            .await
            .map_err(|_| Ah32Error::timeout(format!("chat completion ({}s)", config.call_timeout.as_secs())))??;
        outcome.usage += completion.usage;

        let call = if step < config.max_steps && !tools.is_empty() {
            parse_tool_call(&completion.content)
        } else {
            None
        };
        let Some((name, input)) = call else {
            outcome.answer = completion.content;
            outcome.reasoning = completion.reasoning;
            debug!(steps = outcome.steps.len(), "ReAct loop answered");
            return Ok(outcome);
        };

        let (observation, ok) = match tools.get(&name) {
            Some(tool) => match tool.call(&input, ctx).await {
                Ok(text) => (text, true),
                Err(e) => {
                    warn!(tool = %name, error = %e, "Tool call failed");
                    (format!("Tool error: {}", e), false)
                }
            },
            None => (
                format!(
                    "Unknown tool '{}'. Available tools: {}",
                    name,
                    tools.names().join(", ")
                ),
                false,
            ),
        };
        info!(tool = %name, ok, "Tool step");

        let observation = truncate_chars(&observation, MAX_OBSERVATION_CHARS);
        messages.push(ChatMessage::assistant(completion.content));
        messages.push(ChatMessage::user(format!(
            "Observation from {}:\n{}",
            name, observation
        )));
        outcome.steps.push(ToolStep {
            tool: name,
            input,
            observation,
            ok,
        });
    }

    // The final iteration never parses a tool call, so it always returns.
    Ok(outcome)
}
