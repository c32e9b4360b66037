//! System-prompt directives derived from a routing decision.

use crate::plan::schema::{HostApp, PLAN_SCHEMA_VERSION};
use crate::routing::WritebackDecision;

/// Appended to chat-only turns so plan or macro code never leaks into chat.
pub const CHAT_ONLY_DIRECTIVE: &str = "This turn is CHAT ONLY. Answer in natural language. \
Do not output any fenced code block, Plan JSON, JS macro or tool-call JSON.";

pub fn chat_only_directive() -> &'static str {
    CHAT_ONLY_DIRECTIVE
}

/// Appended to writeback turns: exactly one fenced Plan with the forced block.
pub fn writeback_directive(decision: &WritebackDecision, host: HostApp, block_id: &str) -> String {
    let mut out = format!(
        "This turn WRITES BACK to the {host} document. After a brief explanation, output exactly ONE \
         fenced ```json block holding a Plan with \"schema_version\": \"{version}\" and \
         \"host_app\": \"{host}\". Put the content in an upsert_block with \"block_id\": \"{block_id}\" \
         and \"anchor\": \"{anchor}\". Never output more than one code block.",
        host = host,
        version = PLAN_SCHEMA_VERSION,
        block_id = block_id,
        anchor = decision.anchor.as_str(),
    );
    if decision.delivery.is_compare_table() {
        out.push_str(
            " Deliver the result as a comparison table (original | revised | reason) \
             instead of rewriting the text in place.",
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::schema::BlockAnchor;
    use crate::routing::{Delivery, RouteReason};

    #[test]
    fn test_writeback_directive_mentions_block_and_anchor() {
        let decision = WritebackDecision {
            want_writeback: true,
            anchor: BlockAnchor::End,
            delivery: Delivery::CompareTable,
            reason: RouteReason::SkillDefault,
        };
        let text = writeback_directive(&decision, HostApp::Wps, "ah32_0123456789ab");
        assert!(text.contains("\"block_id\": \"ah32_0123456789ab\""));
        assert!(text.contains("\"anchor\": \"end\""));
        assert!(text.contains("comparison table"));
    }

    #[test]
    fn test_chat_only_directive_forbids_fences() {
        assert!(chat_only_directive().contains("Do not output any fenced code block"));
    }
}
