//! Writeback intent routing.
//!
//! [`route`] decides per chat turn whether the assistant must emit a Plan or
//! may answer in plain chat, and where a written block goes. It is a pure
//! function over the message, the prior context and the selected skills.

pub mod directives;
pub mod keywords;

use serde::{Deserialize, Serialize};

use crate::plan::extract::fenced_blocks;
use crate::plan::schema::{BlockAnchor, HostApp};
use crate::utils::text::{compact, contains_any};

use keywords::*;

/// Longest compacted message still treated as an acknowledgement.
const MAX_ACK_CHARS: usize = 16;

/// Longest compacted message still treated as a continuation.
const MAX_CONTINUATION_CHARS: usize = 12;

/// Longest spreadsheet message that defaults to a chart writeback.
const MAX_SPREADSHEET_CHART_CHARS: usize = 24;

/// How written content is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Delivery {
    /// Plain rewrite or insertion.
    #[default]
    #[serde(rename = "", alias = "rewrite")]
    Rewrite,
    /// Review table of original / revised / reason.
    #[serde(rename = "compare_table")]
    CompareTable,
}

impl Delivery {
    pub fn as_str(&self) -> &'static str {
        match self {
            Delivery::Rewrite => "",
            Delivery::CompareTable => "compare_table",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "" | "rewrite" | "plain" => Some(Delivery::Rewrite),
            "compare_table" | "compare" => Some(Delivery::CompareTable),
            _ => None,
        }
    }

    pub fn is_compare_table(&self) -> bool {
        matches!(self, Delivery::CompareTable)
    }
}

/// What a selected skill contributes to routing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillHint {
    pub name: String,
    /// Delivery forced when this skill is active.
    pub default_writeback: Option<Delivery>,
    /// The skill's tools run in the background for this message.
    pub background: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct RouteInput<'a> {
    pub message: &'a str,
    /// Recent conversation text, used for continuation detection.
    pub prior_context: &'a str,
    /// `None` when the request came from an unsupported host.
    pub host_app: Option<HostApp>,
    pub skills: &'a [SkillHint],
}

impl<'a> RouteInput<'a> {
    pub fn new(message: &'a str, host_app: Option<HostApp>) -> Self {
        Self {
            message,
            prior_context: "",
            host_app,
            skills: &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteReason {
    ExplicitNegative,
    Acknowledgement,
    Question,
    BackgroundSkill,
    UnsupportedHost,
    SkillDefault,
    VerbAndTarget,
    ChartRequest,
    Continuation,
    StrongVerb,
    SpreadsheetChart,
    NoIntent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WritebackDecision {
    pub want_writeback: bool,
    pub anchor: BlockAnchor,
    pub delivery: Delivery,
    pub reason: RouteReason,
}

impl WritebackDecision {
    fn chat(reason: RouteReason) -> Self {
        Self {
            want_writeback: false,
            anchor: BlockAnchor::Cursor,
            delivery: Delivery::Rewrite,
            reason,
        }
    }

    fn write(anchor: BlockAnchor, reason: RouteReason) -> Self {
        Self {
            want_writeback: true,
            anchor,
            delivery: Delivery::Rewrite,
            reason,
        }
    }
}

/// Anchor implied by the message: cursor keywords, then end keywords,
/// defaulting to the cursor.
pub fn detect_anchor(message: &str) -> BlockAnchor {
    if contains_any(message, CURSOR_KEYWORDS) {
        BlockAnchor::Cursor
    } else if contains_any(message, END_KEYWORDS) {
        BlockAnchor::End
    } else {
        BlockAnchor::Cursor
    }
}

/// True if `compacted` splits entirely into words from `tables`.
fn splits_into(compacted: &str, tables: &[&[&str]]) -> bool {
    let chars: Vec<char> = compacted.chars().collect();
    if chars.is_empty() {
        return false;
    }
    // reachable[i]: the first i chars split into known words
    let mut reachable = vec![false; chars.len() + 1];
    reachable[0] = true;
    for i in 0..chars.len() {
        if !reachable[i] {
            continue;
        }
        for word in tables.iter().flat_map(|t| t.iter()) {
            let word_chars: Vec<char> = word.chars().collect();
            let end = i + word_chars.len();
            if end <= chars.len() && chars[i..end] == word_chars[..] {
                reachable[end] = true;
            }
        }
    }
    reachable[chars.len()]
}

/// True if `compacted` is one acknowledgement or a run of them ("好的谢谢").
fn is_acknowledgement(compacted: &str) -> bool {
    compacted.chars().count() <= MAX_ACK_CHARS && splits_into(compacted, &[ACKNOWLEDGEMENTS])
}

fn is_question(message: &str, has_verb: bool) -> bool {
    if contains_any(message, QUESTION_MARKERS) {
        return true;
    }
    let trimmed = message.trim_end();
    (trimmed.ends_with('?') || trimmed.ends_with('？')) && !has_verb
}

/// A whole-message continuation: continuation words, optionally mixed with
/// acknowledgements and particles ("好的，继续吧"). Prefixes never count, so
/// "goodbye" or "开始前先问一下" stay chat.
fn is_continuation(compacted: &str) -> bool {
    compacted.chars().count() <= MAX_CONTINUATION_CHARS
        && contains_any(compacted, CONTINUATIONS)
        && splits_into(compacted, &[CONTINUATIONS, ACKNOWLEDGEMENTS, CONTINUATION_PARTICLES])
}

/// True if the prior context already carried a plan or macro.
///
/// A JSON fence only counts when it holds an `actions` array; a JS fence
/// always counts.
pub fn prior_has_plan(prior_context: &str) -> bool {
    let lower = prior_context.to_lowercase();
    if PLAN_MARKERS.iter().any(|m| lower.contains(m)) {
        return true;
    }
    fenced_blocks(prior_context).iter().any(|b| {
        MACRO_FENCE_LANGS.contains(&b.lang.as_str())
            || (b.lang == "json" && b.body.contains("\"actions\""))
    })
}

/// Decide whether this turn writes back into the document.
pub fn route(input: &RouteInput<'_>) -> WritebackDecision {
    let message = input.message.trim();
    let compacted = compact(message);

    let strong = contains_any(message, STRONG_VERBS);
    let soft = contains_any(message, SOFT_VERBS);
    let target = contains_any(message, TARGET_NOUNS);
    let chart = contains_any(message, CHART_NOUNS);
    let explicit_write = strong && target;
    let chart_request = chart && (strong || soft);
    let anchor = detect_anchor(message);

    if contains_any(message, NEGATIVE_PHRASES) {
        return WritebackDecision::chat(RouteReason::ExplicitNegative);
    }

    if input.host_app.is_none() {
        return if explicit_write {
            WritebackDecision::write(anchor, RouteReason::VerbAndTarget)
        } else if chart_request {
            WritebackDecision::write(anchor, RouteReason::ChartRequest)
        } else {
            WritebackDecision::chat(RouteReason::UnsupportedHost)
        };
    }

    if !explicit_write {
        if is_acknowledgement(&compacted) {
            return WritebackDecision::chat(RouteReason::Acknowledgement);
        }
        if is_question(message, strong || soft) {
            return WritebackDecision::chat(RouteReason::Question);
        }
        if input.skills.iter().any(|s| s.background) {
            return WritebackDecision::chat(RouteReason::BackgroundSkill);
        }
    }

    if let Some(delivery) = input.skills.iter().find_map(|s| s.default_writeback) {
        let anchor = if contains_any(message, CURSOR_KEYWORDS) {
            BlockAnchor::Cursor
        } else {
            BlockAnchor::End
        };
        return WritebackDecision {
            want_writeback: true,
            anchor,
            delivery,
            reason: RouteReason::SkillDefault,
        };
    }

    if explicit_write {
        return WritebackDecision::write(anchor, RouteReason::VerbAndTarget);
    }
    if chart_request {
        return WritebackDecision::write(anchor, RouteReason::ChartRequest);
    }
    if is_continuation(&compacted) && prior_has_plan(input.prior_context) {
        return WritebackDecision::write(anchor, RouteReason::Continuation);
    }
    if strong {
        return WritebackDecision::write(anchor, RouteReason::StrongVerb);
    }
    if input.host_app == Some(HostApp::Et)
        && chart
        && message.chars().count() <= MAX_SPREADSHEET_CHART_CHARS
    {
        return WritebackDecision::write(anchor, RouteReason::SpreadsheetChart);
    }

    WritebackDecision::chat(RouteReason::NoIntent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn wps(message: &str) -> WritebackDecision {
        route(&RouteInput::new(message, Some(HostApp::Wps)))
    }

    #[test]
    fn test_greeting_is_chat_only() {
        let d = wps("你好");
        assert!(!d.want_writeback);
        assert_eq!(d.reason, RouteReason::Acknowledgement);
    }

    #[test]
    fn test_concatenated_acknowledgements() {
        assert!(!wps("好的，谢谢！").want_writeback);
        assert!(!wps("OK thanks").want_writeback);
    }

    #[test]
    fn test_write_to_document_end() {
        let d = wps("把这段话写到文档末尾");
        assert!(d.want_writeback);
        assert_eq!(d.anchor, BlockAnchor::End);
        assert_eq!(d.reason, RouteReason::VerbAndTarget);
    }

    #[test]
    fn test_explanatory_question_is_chat_only() {
        let d = wps("这是什么意思？");
        assert!(!d.want_writeback);
        assert_eq!(d.reason, RouteReason::Question);
    }

    #[test]
    fn test_question_with_explicit_write_pair_writes() {
        let d = wps("为什么不把结论插入到文档里？");
        assert!(d.want_writeback);
    }

    #[test]
    fn test_continuation_with_prior_plan() {
        let prior = "assistant: ```json\n{\"schema_version\": \"ah32.plan.v1\", \"actions\": []}\n```";
        let input = RouteInput {
            prior_context: prior,
            ..RouteInput::new("继续", Some(HostApp::Wps))
        };
        let d = route(&input);
        assert!(d.want_writeback);
        assert_eq!(d.reason, RouteReason::Continuation);

        assert!(!wps("继续").want_writeback);
    }

    const PRIOR_PLAN: &str =
        "assistant: ```json\n{\"schema_version\": \"ah32.plan.v1\", \"actions\": []}\n```";

    fn after_plan(message: &str) -> WritebackDecision {
        route(&RouteInput {
            prior_context: PRIOR_PLAN,
            ..RouteInput::new(message, Some(HostApp::Wps))
        })
    }

    #[test]
    fn test_continuation_must_be_the_whole_message() {
        for message in ["good job", "goodbye", "开始前先问一下", "yesterday", "可以吗？我再想想"] {
            let d = after_plan(message);
            assert!(!d.want_writeback, "{message} -> {d:?}");
            assert_ne!(d.reason, RouteReason::Continuation, "{message}");
        }
        for message in ["继续", "好的，继续吧", "请继续", "go on", "Yes!", "确认执行"] {
            let d = after_plan(message);
            assert!(d.want_writeback, "{message} -> {d:?}");
            assert_eq!(d.reason, RouteReason::Continuation, "{message}");
        }
    }

    #[test]
    fn test_prior_plan_detection() {
        assert!(!prior_has_plan("assistant: 示例配置：\n```json\n{\"name\": \"Alice\"}\n```"));
        assert!(prior_has_plan("```json\n{\"actions\": [{\"op\": \"insert_text\"}]}\n```"));
        assert!(prior_has_plan("```js\nvar doc = Application.ActiveDocument;\n```"));
        assert!(prior_has_plan("```JavaScript\nvar x = 1;\n```"));

        let input = RouteInput {
            prior_context: "assistant: 示例配置：\n```json\n{\"name\": \"Alice\"}\n```",
            ..RouteInput::new("继续", Some(HostApp::Wps))
        };
        assert!(!route(&input).want_writeback);
    }

    #[test]
    fn test_spreadsheet_chart() {
        let d = route(&RouteInput::new("画个柱形图", Some(HostApp::Et)));
        assert!(d.want_writeback);
        let d = route(&RouteInput::new("销售额柱形图", Some(HostApp::Et)));
        assert_eq!(d.reason, RouteReason::SpreadsheetChart);
        assert!(!wps("销售额柱形图").want_writeback);
    }

    #[test]
    fn test_negative_always_wins() {
        let d = wps("不要写入文档，只回答：这段怎么改？");
        assert!(!d.want_writeback);
        assert_eq!(d.reason, RouteReason::ExplicitNegative);
    }

    #[test]
    fn test_strong_verb_alone() {
        let d = wps("帮我润色一下");
        assert!(d.want_writeback);
        assert_eq!(d.reason, RouteReason::StrongVerb);
        assert_eq!(d.anchor, BlockAnchor::Cursor);
    }

    #[test]
    fn test_unsupported_host_needs_explicit_intent() {
        assert!(!route(&RouteInput::new("帮我润色一下", None)).want_writeback);
        assert!(route(&RouteInput::new("把总结插入到文档", None)).want_writeback);
    }

    #[test]
    fn test_skill_default_writeback() {
        let skills = [SkillHint {
            name: "contract_review".into(),
            default_writeback: Some(Delivery::CompareTable),
            background: false,
        }];
        let input = RouteInput {
            skills: &skills,
            ..RouteInput::new("审查这份合同的风险条款", Some(HostApp::Wps))
        };
        let d = route(&input);
        assert!(d.want_writeback);
        assert_eq!(d.delivery, Delivery::CompareTable);
        assert_eq!(d.anchor, BlockAnchor::End);

        let input = RouteInput {
            skills: &skills,
            ..RouteInput::new("审查合同，结果放在光标处", Some(HostApp::Wps))
        };
        assert_eq!(route(&input).anchor, BlockAnchor::Cursor);
    }

    #[test]
    fn test_background_skill_forces_chat_unless_explicit() {
        let skills = [SkillHint {
            name: "crawler".into(),
            default_writeback: None,
            background: true,
        }];
        let input = RouteInput {
            skills: &skills,
            ..RouteInput::new("帮我抓取并润色招标公告", Some(HostApp::Wps))
        };
        assert_eq!(route(&input).reason, RouteReason::BackgroundSkill);

        let input = RouteInput {
            skills: &skills,
            ..RouteInput::new("抓取招标公告并插入到文档末尾", Some(HostApp::Wps))
        };
        assert!(route(&input).want_writeback);
    }

    #[test]
    fn test_delivery_serde() {
        assert_eq!(serde_json::to_string(&Delivery::Rewrite).unwrap(), "\"\"");
        let d: Delivery = serde_json::from_str("\"rewrite\"").unwrap();
        assert_eq!(d, Delivery::Rewrite);
        assert_eq!(Delivery::from_name("compare_table"), Some(Delivery::CompareTable));
    }
}
