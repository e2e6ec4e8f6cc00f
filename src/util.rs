//! Shared utility functions

/// Shorten text for log lines and context messages, ending in "..." when
/// cut. Never splits a multi-byte character.
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    const ELLIPSIS: &str = "...";
    let mut end = max_len.saturating_sub(ELLIPSIS.len());
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &s[..end], ELLIPSIS)
}

/// First line with visible content, trimmed
pub fn first_line(s: &str) -> Option<&str> {
    s.lines().map(str::trim).find(|l| !l.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_str("short", 10), "short");
        assert_eq!(truncate_str("abcdefghij", 8), "abcde...");
        assert_eq!(truncate_str("ééééé", 6), "é...");
    }

    #[test]
    fn test_first_line_skips_blank_lines() {
        assert_eq!(first_line("\n   \n  fatal: not a git repository \nmore"), Some("fatal: not a git repository"));
        assert_eq!(first_line(" \n"), None);
    }
}
