//! Utility functions for message building

/// Maximum characters in an embed description.
pub const MAX_DESCRIPTION_LENGTH: usize = 4096;
/// Maximum characters in an embed field value.
pub const MAX_FIELD_VALUE_LENGTH: usize = 1024;

const ELLIPSIS: &str = "...";
const FENCE: &str = "```";

/// Truncate a string to at most `max_len` characters, marking the cut.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let keep = max_len.saturating_sub(ELLIPSIS.len());
    let mut out: String = s.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}

/// Wraps text in a fenced code block that fits an embed description.
pub fn code_block(body: &str) -> String {
    let body = truncate_string(body, MAX_DESCRIPTION_LENGTH - 2 * FENCE.len());
    format!("{FENCE}{body}{FENCE}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_keeps_short_strings() {
        assert_eq!(truncate_string("hello", 10), "hello");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = "⚠️⚠️⚠️⚠️⚠️⚠️";
        let out = truncate_string(s, 6);
        assert!(out.ends_with("..."));
        assert_eq!(out.chars().count(), 6);
    }

    #[test]
    fn code_block_fits_description_and_stays_closed() {
        let long = "x".repeat(MAX_DESCRIPTION_LENGTH * 2);
        let out = code_block(&long);
        assert_eq!(out.chars().count(), MAX_DESCRIPTION_LENGTH);
        assert!(out.starts_with("```"));
        assert!(out.ends_with("...```"));
    }
}
