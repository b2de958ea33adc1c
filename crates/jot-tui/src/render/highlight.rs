//! Syntax highlighting for fenced code blocks

use ratatui::{
    style::{Color, Style},
    text::{Line, Span},
};
use std::sync::LazyLock;
use syntect::easy::HighlightLines;
use syntect::highlighting::{Style as SynStyle, ThemeSet};
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;

static SYNTAX_SET: LazyLock<SyntaxSet> = LazyLock::new(SyntaxSet::load_defaults_newlines);
static THEME_SET: LazyLock<ThemeSet> = LazyLock::new(ThemeSet::load_defaults);

const HIGHLIGHT_THEME: &str = "base16-ocean.dark";

/// Whether a fence language is known to the highlighter
pub fn is_known_language(lang: &str) -> bool {
    SYNTAX_SET.find_syntax_by_token(lang).is_some()
}

/// Highlight a code block, one `Line` per source line
///
/// Unknown languages and highlighter failures fall back to `fallback`.
pub fn highlight_code(code: &str, lang: Option<&str>, fallback: Style) -> Vec<Line<'static>> {
    let syntax = lang
        .filter(|l| !l.is_empty())
        .and_then(|l| SYNTAX_SET.find_syntax_by_token(l));
    let (Some(syntax), Some(theme)) = (syntax, THEME_SET.themes.get(HIGHLIGHT_THEME)) else {
        return plain(code, fallback);
    };

    let mut highlighter = HighlightLines::new(syntax, theme);
    let mut lines = Vec::new();
    // The newline grammars need each line with its terminator
    for line in LinesWithEndings::from(code) {
        match highlighter.highlight_line(line, &SYNTAX_SET) {
            Ok(ranges) => lines.push(Line::from(
                ranges
                    .into_iter()
                    .filter_map(|(style, text)| {
                        let text = text.trim_end_matches(['\n', '\r']);
                        (!text.is_empty())
                            .then(|| Span::styled(text.to_string(), to_ratatui(style)))
                    })
                    .collect::<Vec<_>>(),
            )),
            Err(e) => {
                tracing::debug!("Highlighting failed, using plain text: {}", e);
                return plain(code, fallback);
            }
        }
    }
    lines
}

fn plain(code: &str, style: Style) -> Vec<Line<'static>> {
    code.lines()
        .map(|line| Line::from(Span::styled(line.to_string(), style)))
        .collect()
}

fn to_ratatui(style: SynStyle) -> Style {
    Style::default().fg(Color::Rgb(
        style.foreground.r,
        style.foreground.g,
        style.foreground.b,
    ))
}
