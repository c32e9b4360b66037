//! Final pass over assistant text before it reaches the task-pane.
//!
//! Chat-only turns must not leak Plan or tool-call JSON (the frontend would
//! try to execute it). Writeback turns must carry exactly one fenced Plan.

use serde_json::Value;

use crate::plan::extract::{balanced_objects, fenced_blocks, FencedBlock};
use crate::plan::schema::PLAN_SCHEMA_VERSION;

/// Keys naming the tool in a tool-call object.
pub const TOOL_NAME_KEYS: &[&str] = &["tool", "tool_name", "name", "function"];
/// Keys carrying the arguments of a tool-call object.
pub const TOOL_ARG_KEYS: &[&str] = &["action_input", "arguments", "args", "input", "parameters"];

/// True if `value` is shaped like a Plan or a Plan fragment.
pub fn looks_like_plan(value: &Value) -> bool {
    match value {
        Value::Object(obj) => {
            obj.get("schema_version")
                .and_then(Value::as_str)
                .is_some_and(|v| v == PLAN_SCHEMA_VERSION || v.starts_with("ah32.plan"))
                || obj.get("actions").is_some_and(Value::is_array)
                || obj.get("op").is_some_and(Value::is_string)
        }
        Value::Array(items) => items.first().is_some_and(looks_like_plan),
        _ => false,
    }
}

/// True if `value` is shaped like an agent tool invocation.
pub fn looks_like_tool_call(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    let named = TOOL_NAME_KEYS
        .iter()
        .any(|k| obj.get(*k).is_some_and(Value::is_string));
    let has_args = TOOL_ARG_KEYS.iter().any(|k| obj.contains_key(*k));
    (named && has_args) || obj.contains_key("tool_calls")
}

fn is_leaky(value: &Value) -> bool {
    looks_like_plan(value) || looks_like_tool_call(value)
}

fn block_value(block: &FencedBlock) -> Option<Value> {
    serde_json::from_str::<Value>(block.body.trim()).ok()
}

fn is_plan_block(block: &FencedBlock) -> bool {
    match block_value(block) {
        Some(value) => looks_like_plan(&value),
        None => block.lang == "json" && block.body.contains("\"actions\""),
    }
}

/// Remove byte ranges from `text` and tidy the leftover blank lines.
fn remove_spans(text: &str, mut spans: Vec<(usize, usize)>) -> String {
    if spans.is_empty() {
        return text.to_string();
    }
    spans.sort_unstable();
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for (start, end) in spans {
        if start < cursor {
            continue;
        }
        out.push_str(&text[cursor..start]);
        cursor = end;
    }
    out.push_str(&text[cursor..]);
    squeeze_blank_lines(&out)
}

fn squeeze_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;
    for line in text.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.trim().to_string()
}

/// Strip Plan and tool-call JSON from a chat-only answer.
///
/// Fenced blocks that hold such JSON are removed whole, as are bare balanced
/// objects outside any fence. Other code blocks are kept.
pub fn strip_plan_payloads(text: &str) -> String {
    let blocks = fenced_blocks(text);
    let mut spans: Vec<(usize, usize)> = blocks
        .iter()
        .filter(|b| {
            is_plan_block(b)
                || block_value(b).is_some_and(|v| looks_like_tool_call(&v))
                || b.body.contains(PLAN_SCHEMA_VERSION)
        })
        .map(|b| (b.start, b.end))
        .collect();

    let inside_fence = |pos: usize| blocks.iter().any(|b| pos >= b.start && pos < b.end);
    spans.extend(
        balanced_objects(text)
            .into_iter()
            .filter(|(start, _)| !inside_fence(*start))
            .filter(|(start, end)| {
                serde_json::from_str::<Value>(&text[*start..*end]).is_ok_and(|v| is_leaky(&v))
            }),
    );

    let stripped = remove_spans(text, spans);
    if stripped.len() != text.trim().len() {
        tracing::debug!("Stripped plan/tool JSON from chat-only answer");
    }
    stripped
}

/// Keep exactly one fenced Plan block in a writeback answer.
///
/// The first block that parses as a Plan-shaped value is kept; if none
/// parses, the first Plan-looking block is kept.
pub fn collapse_plan_blocks(text: &str) -> String {
    let plan_blocks: Vec<FencedBlock> = fenced_blocks(text)
        .into_iter()
        .filter(is_plan_block)
        .collect();
    if plan_blocks.len() <= 1 {
        return text.to_string();
    }

    let keep = plan_blocks
        .iter()
        .position(|b| block_value(b).is_some_and(|v| looks_like_plan(&v)))
        .unwrap_or(0);

    tracing::debug!(
        blocks = plan_blocks.len(),
        kept = keep,
        "Collapsing duplicate plan blocks"
    );

    let spans = plan_blocks
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != keep)
        .map(|(_, b)| (b.start, b.end))
        .collect();
    remove_spans(text, spans)
}

/// Apply the guard matching the turn's routing decision.
pub fn guard_output(text: &str, want_writeback: bool) -> String {
    if want_writeback {
        collapse_plan_blocks(text)
    } else {
        strip_plan_payloads(text)
    }
}
