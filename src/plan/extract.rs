//! Locate JSON payloads inside free-form model output.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static FENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```([A-Za-z0-9_+\-]*)[ \t]*\r?\n(.*?)```").expect("fence regex is valid")
});

/// A fenced code block found in model output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FencedBlock {
    /// Lowercased info string (`json`, `javascript`, or empty).
    pub lang: String,
    pub body: String,
    /// Byte range of the whole block, fences included.
    pub start: usize,
    pub end: usize,
}

/// All fenced code blocks, in order of appearance.
pub fn fenced_blocks(text: &str) -> Vec<FencedBlock> {
    FENCE_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some(FencedBlock {
                lang: caps
                    .get(1)
                    .map(|m| m.as_str().to_ascii_lowercase())
                    .unwrap_or_default(),
                body: caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default(),
                start: whole.start(),
                end: whole.end(),
            })
        })
        .collect()
}

/// Byte ranges of top-level balanced `{...}` spans, string-literal aware.
pub fn balanced_objects(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        spans.push((s, i + c.len_utf8()));
                    }
                }
            }
            _ => {}
        }
    }
    spans
}

/// Extract the Plan JSON from a model response.
///
/// Fenced blocks are preferred; the first one that parses wins. Otherwise the
/// span from the first `{` to the last `}` is tried.
pub fn extract_plan_json(text: &str) -> Option<Value> {
    for block in fenced_blocks(text) {
        if let Ok(value) = serde_json::from_str::<Value>(block.body.trim()) {
            if value.is_object() || value.is_array() {
                return Some(value);
            }
        }
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&text[start..=end])
        .ok()
        .filter(Value::is_object)
}

/// Extract the first fenced JavaScript block, or the whole text if unfenced.
pub fn extract_code(text: &str) -> Option<String> {
    let blocks = fenced_blocks(text);
    let code = blocks
        .iter()
        .find(|b| matches!(b.lang.as_str(), "javascript" | "js"))
        .or_else(|| blocks.first())
        .map(|b| b.body.trim().to_string())
        .unwrap_or_else(|| text.trim().to_string());
    if code.is_empty() {
        None
    } else {
        Some(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fenced_block_preferred() {
        let text = "Here you go {not json}\n```json\n{\"actions\": []}\n```\ntrailing }";
        assert_eq!(extract_plan_json(text), Some(json!({"actions": []})));
    }

    #[test]
    fn test_outermost_braces_fallback() {
        let text = "Plan: {\"host_app\": \"wps\", \"meta\": {\"a\": 1}} done";
        assert_eq!(
            extract_plan_json(text),
            Some(json!({"host_app": "wps", "meta": {"a": 1}}))
        );
    }

    #[test]
    fn test_no_json() {
        assert_eq!(extract_plan_json("just prose"), None);
        assert_eq!(extract_plan_json("} backwards {"), None);
    }

    #[test]
    fn test_balanced_objects_ignores_braces_in_strings() {
        let text = r#"a {"x": "}{"} b {"y": {"z": 1}} c"#;
        let spans = balanced_objects(text);
        assert_eq!(spans.len(), 2);
        assert_eq!(&text[spans[0].0..spans[0].1], r#"{"x": "}{"}"#);
        assert_eq!(&text[spans[1].0..spans[1].1], r#"{"y": {"z": 1}}"#);
    }

    #[test]
    fn test_fenced_blocks_capture_lang() {
        let blocks = fenced_blocks("```JavaScript\nvar a = 1;\n```\n```\nplain\n```");
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].lang, "javascript");
        assert_eq!(blocks[1].lang, "");
        assert_eq!(blocks[1].body, "plain\n");
    }

    #[test]
    fn test_extract_code() {
        assert_eq!(
            extract_code("text\n```js\nfunction main() {}\n```").as_deref(),
            Some("function main() {}")
        );
        assert_eq!(extract_code("var x = 1;").as_deref(), Some("var x = 1;"));
        assert_eq!(extract_code("   "), None);
    }
}
