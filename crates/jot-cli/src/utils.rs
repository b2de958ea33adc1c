//! Shared utilities

use ratatui::text::Line;

/// Truncate a string to `max` characters, appending "..." if truncated.
/// Operates on Unicode char boundaries, not bytes.
pub fn truncate_chars(s: &str, max: usize) -> String {
    let mut chars = s.chars();
    let truncated: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{}...", truncated)
    } else {
        truncated
    }
}

/// Short single-line preview of message text
pub fn preview(s: &str, max: usize) -> String {
    truncate_chars(&s.replace('\n', " "), max)
}

/// Rendered lines as plain text, one line per row
pub fn plain_text(lines: &[Line<'_>]) -> String {
    lines
        .iter()
        .map(|line| {
            line.spans
                .iter()
                .map(|span| span.content.as_ref())
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_on_char_boundary() {
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo...");
        assert_eq!(truncate_chars("short", 10), "short");
    }

    #[test]
    fn test_plain_text_joins_spans() {
        let lines = vec![
            Line::from(vec!["a".into(), "b".into()]),
            Line::from(""),
            Line::from("c"),
        ];
        assert_eq!(plain_text(&lines), "ab\n\nc");
    }

    #[test]
    fn test_preview_flattens_lines() {
        assert_eq!(preview("a\nb\nc", 3), "a b...");
    }
}
