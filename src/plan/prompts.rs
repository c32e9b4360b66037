//! Prompt text for the dedicated plan and repair calls.

use crate::llm::ChatMessage;
use crate::plan::generator::PlanRequest;
use crate::plan::schema::{required_host, HostApp, KNOWN_OPS, PLAN_SCHEMA_VERSION};
use crate::utils::text::truncate_chars;

/// Upper bound on the frontend capability probe quoted into prompts.
pub const MAX_CAPABILITY_CHARS: usize = 1200;

/// Upper bound on the original plan quoted into a repair prompt.
const MAX_ORIGINAL_CHARS: usize = 6000;

/// Operations executable on `host`.
pub fn ops_for_host(host: HostApp) -> Vec<&'static str> {
    KNOWN_OPS
        .iter()
        .copied()
        .filter(|op| required_host(op).map_or(true, |h| h == host))
        .collect()
}

fn contract(req: &PlanRequest) -> String {
    let block_id = req.effective_block_id();
    let mut out = format!(
        "Output exactly ONE fenced ```json block and nothing else.\n\
         The JSON object must have:\n\
         - \"schema_version\": \"{version}\"\n\
         - \"host_app\": \"{host}\"\n\
         - \"meta\": {{}} (optional object)\n\
         - \"actions\": non-empty array; each action has \"id\" (matching [a-zA-Z0-9_-:.], max 64 chars), \"title\", \"op\".\n\
         Allowed ops for this host: {ops}.\n\
         Wrap written content in a single upsert_block with \"block_id\": \"{block_id}\" and \"anchor\": \"{anchor}\"; \
         upsert_block children must not be upsert_block.\n\
         Use snake_case keys only. Do not wrap fields in \"params\".",
        version = PLAN_SCHEMA_VERSION,
        host = req.host_app,
        ops = ops_for_host(req.host_app).join(", "),
        block_id = block_id,
        anchor = req.anchor.as_str(),
    );
    if req.delivery.is_compare_table() {
        out.push_str(
            "\nDelivery mode is compare_table: write a review table (original | revised | reason) \
             into the block instead of rewriting the text in place.",
        );
    }
    out
}

fn context_sections(req: &PlanRequest) -> String {
    let mut sections = Vec::new();
    if let Some(caps) = &req.capabilities {
        let rendered = truncate_chars(&caps.to_string(), MAX_CAPABILITY_CHARS);
        sections.push(format!("Frontend capabilities:\n{}", rendered));
    }
    if !req.context.trim().is_empty() {
        sections.push(format!("Document context:\n{}", req.context.trim()));
    }
    if !req.quality_hints.is_empty() {
        let hints = req
            .quality_hints
            .iter()
            .map(|h| format!("- {}", h))
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(format!("Avoid these past execution failures:\n{}", hints));
    }
    sections.join("\n\n")
}

/// Messages for a first plan generation attempt.
pub fn plan_generation_messages(req: &PlanRequest) -> Vec<ChatMessage> {
    let system = format!(
        "You are AH32 (阿蛤), an assistant embedded in {label}. \
         Turn the user's request into an executable Plan for the document.\n\n{contract}\n\n{context}",
        label = req.host_app.label(),
        contract = contract(req),
        context = context_sections(req),
    );
    vec![
        ChatMessage::system(system.trim_end().to_string()),
        ChatMessage::user(req.user_query.clone()),
    ]
}

/// Messages for the single repair attempt.
pub fn plan_repair_messages(
    req: &PlanRequest,
    original: &str,
    error_type: &str,
    error_message: &str,
) -> Vec<ChatMessage> {
    let original = if original.trim().is_empty() {
        "(no plan was produced)".to_string()
    } else {
        truncate_chars(original.trim(), MAX_ORIGINAL_CHARS)
    };
    let system = format!(
        "You repair Plan JSON for {label}. The previous attempt failed.\n\
         Error type: {error_type}\nError: {error_message}\n\n{contract}\n\n{context}",
        label = req.host_app.label(),
        error_type = error_type,
        error_message = error_message,
        contract = contract(req),
        context = context_sections(req),
    );
    let user = format!(
        "User request:\n{}\n\nPrevious output:\n{}\n\nReturn the corrected Plan.",
        req.user_query, original
    );
    vec![
        ChatMessage::system(system.trim_end().to_string()),
        ChatMessage::user(user),
    ]
}
