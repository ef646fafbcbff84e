//! UTF-8 safe string helpers.

/// Truncate at a char boundary to at most `max_bytes` bytes.
pub fn safe_truncate(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Identifier safe for an OpenAI function name; case is preserved and other
/// characters become `_`.
pub fn sanitize_tool_name(name: &str) -> String {
    let s: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if s.is_empty() {
        "tool".to_string()
    } else {
        s
    }
}

/// Collapse runs of whitespace into single spaces and trim.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strip NUL bytes, which some extractors leave in text and SQLite/LLM APIs reject.
pub fn strip_nul(s: &str) -> String {
    s.replace('\0', "")
}

/// Split text into windows of at most `chunk_size` chars, each starting
/// `chunk_size - overlap` chars after the previous one. A window end is pulled
/// back to the last space in its second half so words stay intact.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }
    let chunk_size = chunk_size.max(1);
    let overlap = overlap.min(chunk_size - 1);

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let mut end = (start + chunk_size).min(chars.len());
        if end < chars.len() {
            let half = start + chunk_size / 2;
            if let Some(space) = (half..end).rev().find(|&i| chars[i] == ' ') {
                end = space;
            }
        }
        let chunk: String = chars[start..end].iter().collect();
        let trimmed = chunk.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }
        if end >= chars.len() {
            break;
        }
        let next = end.saturating_sub(overlap);
        start = if next > start { next } else { end };
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_truncate_multibyte() {
        assert_eq!(safe_truncate("héllo", 2), "h");
        assert_eq!(safe_truncate("abc", 10), "abc");
    }

    #[test]
    fn test_sanitize_tool_name() {
        assert_eq!(sanitize_tool_name("Knowledge Base!"), "Knowledge_Base_");
        assert_eq!(sanitize_tool_name(""), "tool");
        assert_eq!(sanitize_tool_name("TextToBinary"), "TextToBinary");
    }

    #[test]
    fn test_collapse_and_strip() {
        assert_eq!(collapse_whitespace("  a\n\n b\tc  "), "a b c");
        assert_eq!(strip_nul("a\0b"), "ab");
    }

    #[test]
    fn test_chunk_text_short_input_is_single_chunk() {
        assert_eq!(chunk_text("invoice total is 42", 1000, 200), vec!["invoice total is 42"]);
        assert!(chunk_text("", 1000, 200).is_empty());
    }

    #[test]
    fn test_chunk_text_overlaps_and_covers() {
        let words: Vec<String> = (0..400).map(|i| format!("w{}", i)).collect();
        let text = words.join(" ");
        let chunks = chunk_text(&text, 100, 20);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.chars().count() <= 100);
        }
        assert!(chunks[0].starts_with("w0 "));
        assert!(chunks.last().unwrap().ends_with("w399"));
        // Consecutive chunks share text.
        let tail: String = chunks[0].split(' ').last().unwrap().to_string();
        assert!(chunks[1].contains(&tail));
    }

    #[test]
    fn test_chunk_text_without_spaces_advances() {
        let text = "x".repeat(250);
        let chunks = chunk_text(&text, 100, 20);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 100);
    }
}
