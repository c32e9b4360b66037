//! Identifier validation and sanitisation for Plan ids.
//!
//! Plan ids (`id`, `block_id`) must match `^[a-zA-Z0-9_\-:.]{1,64}$` because
//! the frontend executor embeds them into document bookmarks and macro
//! variable names.

use sha2::{Digest, Sha256};

/// Maximum length of a Plan identifier.
pub const MAX_ID_LEN: usize = 64;

/// Allowed characters in a Plan identifier.
pub fn is_valid_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ':' | '.')
}

/// True when `id` matches the strict identifier pattern.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && id.chars().count() <= MAX_ID_LEN && id.chars().all(is_valid_id_char)
}

/// Hex-encoded SHA-256 digest of `input`.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Coerce an arbitrary string into a valid identifier.
///
/// Valid input is returned unchanged. Otherwise disallowed characters become
/// `_` and surrounding separators are stripped; if nothing usable survives
/// (or the result is too long) the id falls back to
/// `<prefix>_<first 12 hex chars of sha256(original)>`.
pub fn safe_id(raw: &str, prefix: &str) -> String {
    if is_valid_id(raw) {
        return raw.to_string();
    }

    let replaced: String = raw
        .trim()
        .chars()
        .map(|c| if is_valid_id_char(c) { c } else { '_' })
        .collect();
    let stripped = replaced.trim_matches(|c| matches!(c, '_' | '-' | '.' | ':'));

    if !stripped.is_empty() && is_valid_id(stripped) {
        return stripped.to_string();
    }

    let prefix = if prefix.is_empty() || !prefix.chars().all(is_valid_id_char) {
        "id"
    } else {
        prefix
    };
    format!("{}_{}", prefix, &sha256_hex(raw)[..12])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_ids() {
        assert!(is_valid_id("block_1"));
        assert!(is_valid_id("ah32:review.v2"));
        assert!(is_valid_id("a-b-c"));
        assert!(is_valid_id(&"x".repeat(64)));
    }

    #[test]
    fn test_invalid_ids() {
        assert!(!is_valid_id(""));
        assert!(!is_valid_id("has space"));
        assert!(!is_valid_id("合同"));
        assert!(!is_valid_id(&"x".repeat(65)));
        assert!(!is_valid_id("semi;colon"));
    }

    #[test]
    fn test_safe_id_keeps_valid_input() {
        assert_eq!(safe_id("block_1", "block"), "block_1");
    }

    #[test]
    fn test_safe_id_replaces_disallowed_chars() {
        assert_eq!(safe_id("my block!", "block"), "my_block");
        assert_eq!(safe_id(" step 2 ", "step"), "step_2");
    }

    #[test]
    fn test_safe_id_hash_fallback() {
        let id = safe_id("合同审查", "block");
        assert!(id.starts_with("block_"));
        assert_eq!(id.len(), "block_".len() + 12);
        assert!(is_valid_id(&id));
        assert_eq!(id, safe_id("合同审查", "block"));
    }

    #[test]
    fn test_safe_id_too_long_falls_back() {
        let long = "y".repeat(80);
        let id = safe_id(&long, "step");
        assert!(id.starts_with("step_"));
        assert!(is_valid_id(&id));
    }

    #[test]
    fn test_sha256_hex_known_value() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    mod proptests {
        use super::super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_safe_id_always_valid(raw in ".{0,100}", prefix in "[a-z]{1,8}") {
                let id = safe_id(&raw, &prefix);
                prop_assert!(is_valid_id(&id), "produced invalid id {:?} from {:?}", id, raw);
            }

            #[test]
            fn prop_safe_id_deterministic(raw in ".{0,100}") {
                prop_assert_eq!(safe_id(&raw, "step"), safe_id(&raw, "step"));
            }

            #[test]
            fn prop_safe_id_is_fixed_point(raw in ".{0,100}") {
                let once = safe_id(&raw, "block");
                prop_assert_eq!(safe_id(&once, "block"), once);
            }
        }
    }
}
