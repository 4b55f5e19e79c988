//! File-system safe names derived from user input.

/// Longest sanitized topic kept in a directory name, in characters.
pub const MAX_TOPIC_CHARS: usize = 48;

/// Turns a free-form topic into a directory-name fragment.
///
/// Whitespace runs become a single `_`, path separators and other characters
/// that are unsafe on common file systems are dropped, and the result is
/// capped at [`MAX_TOPIC_CHARS`]. Non-ASCII letters (e.g. CJK) are kept.
/// An empty result becomes `untitled`.
#[must_use]
pub fn sanitize_topic(topic: &str) -> String {
    let mut out = String::new();
    let mut pending_sep = false;

    for ch in topic.trim().chars() {
        if ch.is_whitespace() {
            pending_sep = !out.is_empty();
            continue;
        }
        if !(ch.is_alphanumeric() || matches!(ch, '-' | '_' | '.')) {
            continue;
        }
        if pending_sep {
            out.push('_');
            pending_sep = false;
        }
        out.push(ch);
    }

    let trimmed: String = out
        .trim_matches('.')
        .chars()
        .take(MAX_TOPIC_CHARS)
        .collect();

    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spaces_become_underscores() {
        assert_eq!(sanitize_topic("DeepSeek R1"), "DeepSeek_R1");
        assert_eq!(sanitize_topic("  a   b  "), "a_b");
    }

    #[test]
    fn test_unsafe_characters_dropped() {
        assert_eq!(sanitize_topic("../etc/passwd"), "etcpasswd");
        assert_eq!(sanitize_topic("what? *now*"), "what_now");
    }

    #[test]
    fn test_cjk_kept() {
        assert_eq!(sanitize_topic("人工智能 新闻"), "人工智能_新闻");
    }

    #[test]
    fn test_empty_topic() {
        assert_eq!(sanitize_topic(""), "untitled");
        assert_eq!(sanitize_topic("///"), "untitled");
    }

    #[test]
    fn test_length_cap() {
        let long = "x".repeat(200);
        assert_eq!(sanitize_topic(&long).chars().count(), MAX_TOPIC_CHARS);
    }
}
