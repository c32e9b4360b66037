//! Character-safe string helpers.
//!
//! All limits are counted in `char`s, never bytes, since most traffic is CJK.

/// Truncate `text` to at most `max_chars` characters, appending `…` when cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}

/// Split `text` into chunks of at most `max_chars` characters.
///
/// Empty input yields no chunks. A zero limit is treated as one.
pub fn chunk_chars(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_chars)
        .map(|c| c.iter().collect::<String>())
        .collect()
}

/// Lowercase and drop whitespace and punctuation (ASCII and CJK).
///
/// Used to compare short utterances like "好的！" and "ok." against fixed sets.
pub fn compact(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace() && !is_punctuation(*c))
        .flat_map(|c| c.to_lowercase())
        .collect()
}

fn is_punctuation(c: char) -> bool {
    c.is_ascii_punctuation()
        || matches!(
            c,
            '，' | '。' | '！' | '？' | '、' | '；' | '：' | '“' | '”' | '‘' | '’' | '（' | '）'
                | '…' | '～' | '~' | '《' | '》' | '【' | '】' | '·'
        )
}

/// True if `text` contains any of `needles` (case-insensitive for ASCII).
pub fn contains_any(text: &str, needles: &[&str]) -> bool {
    let lower = text.to_lowercase();
    needles.iter().any(|n| lower.contains(&n.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars_cjk() {
        assert_eq!(truncate_chars("你好世界", 2), "你好…");
        assert_eq!(truncate_chars("短", 5), "短");
    }

    #[test]
    fn test_chunk_chars() {
        assert_eq!(chunk_chars("abcde", 2), vec!["ab", "cd", "e"]);
        assert!(chunk_chars("", 3).is_empty());
        assert_eq!(chunk_chars("文档内容", 3), vec!["文档内", "容"]);
    }

    #[test]
    fn test_compact_strips_punctuation() {
        assert_eq!(compact("好的！"), "好的");
        assert_eq!(compact(" OK, Thanks. "), "okthanks");
    }

    #[test]
    fn test_contains_any_case_insensitive() {
        assert!(contains_any("Please INSERT here", &["insert"]));
        assert!(!contains_any("hello", &["write"]));
    }
}
