//! Markdown rendering for terminal UI
//!
//! Math is swapped for placeholders before parsing and drawn as Unicode
//! afterwards. Fenced code is highlighted and `mermaid` fences go through
//! the diagram cache. Input may be cut off anywhere while a reply streams,
//! so every step tolerates partial markdown.

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use ratatui::{
    style::{Modifier, Style},
    text::{Line, Span},
};
use unicode_width::UnicodeWidthChar;

use super::diagram::{DiagramCache, DiagramKey};
use super::highlight::{highlight_code, is_known_language};
use super::math::{self, MathSpan, Protected, Segment, render_tex};
use crate::theme::Theme;

/// Renders message markdown into styled lines
pub struct MarkdownRenderer {
    theme: Theme,
    diagrams: DiagramCache,
}

impl MarkdownRenderer {
    pub fn new(theme: Theme) -> Self {
        Self {
            theme,
            diagrams: DiagramCache::new(),
        }
    }

    pub fn theme(&self) -> &Theme {
        &self.theme
    }

    pub fn diagrams(&self) -> &DiagramCache {
        &self.diagrams
    }

    /// Drop cached diagrams for a message that went away
    pub fn forget(&mut self, scope: &str) {
        self.diagrams.forget_scope(scope);
    }

    /// Drop every cached diagram
    pub fn clear(&mut self) {
        self.diagrams.clear();
    }

    /// Convert markdown text to styled lines
    ///
    /// `scope` identifies the owner of any diagram blocks so they are only
    /// redrawn when their source changes.
    pub fn render(&mut self, scope: &str, text: &str, width: usize) -> Vec<Line<'static>> {
        let protected = math::protect(text);
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);

        let mut writer = Writer {
            theme: &self.theme,
            diagrams: &mut self.diagrams,
            protected: &protected,
            scope,
            width: width.max(8),
            lines: Vec::new(),
            current: Vec::new(),
            styles: Vec::new(),
            lists: Vec::new(),
            quote_depth: 0,
            code: None,
            table: None,
            link: None,
            diagram_ordinal: 0,
        };
        for event in Parser::new_ext(protected.text(), options) {
            writer.event(event);
        }
        writer.finish()
    }
}

struct CodeBlock {
    lang: Option<String>,
    content: String,
}

#[derive(Default)]
struct Table {
    rows: Vec<Vec<String>>,
    row: Vec<String>,
    cell: String,
}

struct Writer<'a> {
    theme: &'a Theme,
    diagrams: &'a mut DiagramCache,
    protected: &'a Protected,
    scope: &'a str,
    width: usize,
    lines: Vec<Line<'static>>,
    current: Vec<Span<'static>>,
    styles: Vec<Style>,
    lists: Vec<Option<u64>>,
    quote_depth: usize,
    code: Option<CodeBlock>,
    table: Option<Table>,
    /// Destination and index of the first span of the open link
    link: Option<(String, usize)>,
    diagram_ordinal: usize,
}

impl Writer<'_> {
    fn style(&self) -> Style {
        self.styles
            .last()
            .copied()
            .unwrap_or_else(|| self.theme.base_style())
    }

    fn push_modifier(&mut self, modifier: Modifier) {
        let style = self.style().add_modifier(modifier);
        self.styles.push(style);
    }

    fn flush(&mut self) {
        if self.current.is_empty() {
            return;
        }
        let mut spans = self.quote_prefix();
        spans.append(&mut self.current);
        self.lines.push(Line::from(spans));
    }

    fn push_line(&mut self, line: Line<'static>) {
        let mut spans = self.quote_prefix();
        spans.extend(line.spans);
        self.lines.push(Line::from(spans));
    }

    fn quote_prefix(&self) -> Vec<Span<'static>> {
        if self.quote_depth == 0 {
            Vec::new()
        } else {
            vec![Span::styled("│ ".repeat(self.quote_depth), self.theme.dim_style())]
        }
    }

    /// Blank separator, never doubled
    fn blank(&mut self) {
        if self.lines.last().is_some_and(|l| !is_blank(l)) {
            self.lines.push(Line::from(""));
        }
    }

    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => self.text(&text),
            Event::Code(code) => {
                if let Some(table) = self.table.as_mut() {
                    table.cell.push_str(&code);
                } else {
                    let code_style = self.theme.code_style().add_modifier(Modifier::BOLD);
                    self.current
                        .push(Span::styled(format!("`{}`", code), code_style));
                }
            }
            Event::SoftBreak => {
                if let Some(table) = self.table.as_mut() {
                    table.cell.push(' ');
                } else {
                    self.current.push(Span::raw(" "));
                }
            }
            Event::HardBreak => self.flush(),
            Event::Rule => {
                self.flush();
                let rule = "─".repeat(self.width.min(60));
                self.push_line(Line::from(Span::styled(rule, self.theme.dim_style())));
                self.blank();
            }
            Event::Html(html) => {
                self.flush();
                for line in html.lines() {
                    self.push_line(Line::from(Span::styled(
                        line.to_string(),
                        self.theme.dim_style(),
                    )));
                }
            }
            Event::InlineHtml(html) => {
                self.current
                    .push(Span::styled(html.to_string(), self.theme.dim_style()));
            }
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Heading { level, .. } => {
                self.flush();
                let style = match level {
                    HeadingLevel::H1 => self
                        .theme
                        .accent_style()
                        .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
                    HeadingLevel::H2 => self.theme.accent_style().add_modifier(Modifier::BOLD),
                    _ => self.theme.accent_style(),
                };
                self.styles.push(style);
            }
            Tag::Paragraph => self.flush(),
            Tag::CodeBlock(kind) => {
                self.flush();
                let lang = match kind {
                    CodeBlockKind::Fenced(info) => info
                        .split_whitespace()
                        .next()
                        .map(|l| l.to_ascii_lowercase()),
                    CodeBlockKind::Indented => None,
                };
                self.code = Some(CodeBlock {
                    lang,
                    content: String::new(),
                });
            }
            Tag::List(start) => {
                self.flush();
                self.lists.push(start);
            }
            Tag::Item => {
                self.flush();
                let indent = "  ".repeat(self.lists.len().saturating_sub(1));
                let marker = match self.lists.last_mut() {
                    Some(Some(n)) => {
                        let marker = format!("{}. ", n);
                        *n += 1;
                        marker
                    }
                    _ => "• ".to_string(),
                };
                self.current.push(Span::styled(
                    format!("{}{}", indent, marker),
                    self.theme.dim_style(),
                ));
            }
            Tag::BlockQuote(_) => {
                self.flush();
                self.quote_depth += 1;
            }
            Tag::Emphasis => self.push_modifier(Modifier::ITALIC),
            Tag::Strong => self.push_modifier(Modifier::BOLD),
            Tag::Strikethrough => self.push_modifier(Modifier::CROSSED_OUT),
            Tag::Link { dest_url, .. } => {
                self.styles.push(
                    Style::default()
                        .fg(self.theme.link)
                        .add_modifier(Modifier::UNDERLINED),
                );
                self.link = Some((dest_url.to_string(), self.current.len()));
            }
            Tag::Image { dest_url, .. } => {
                self.current
                    .push(Span::styled("[image: ", self.theme.dim_style()));
                self.styles.push(Style::default().fg(self.theme.link));
                self.link = Some((dest_url.to_string(), self.current.len()));
            }
            Tag::Table(_) => {
                self.flush();
                self.table = Some(Table::default());
            }
            Tag::TableCell => {
                if let Some(table) = self.table.as_mut() {
                    table.cell.clear();
                }
            }
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Heading(_) => {
                self.flush();
                self.styles.pop();
            }
            TagEnd::Paragraph => {
                self.flush();
                self.blank();
            }
            TagEnd::CodeBlock => {
                if let Some(block) = self.code.take() {
                    self.code_block(block);
                }
                self.blank();
            }
            TagEnd::List(_) => {
                self.flush();
                self.lists.pop();
                if self.lists.is_empty() {
                    self.blank();
                }
            }
            TagEnd::Item => self.flush(),
            TagEnd::BlockQuote(_) => {
                self.flush();
                self.quote_depth = self.quote_depth.saturating_sub(1);
                if self.quote_depth == 0 {
                    self.blank();
                }
            }
            TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough => {
                self.styles.pop();
            }
            TagEnd::Link => {
                self.styles.pop();
                if let Some((url, start)) = self.link.take() {
                    let label: String = self
                        .current
                        .get(start..)
                        .unwrap_or_default()
                        .iter()
                        .map(|s| s.content.as_ref())
                        .collect();
                    if !url.is_empty() && label != url {
                        self.current
                            .push(Span::styled(format!(" ({})", url), self.theme.dim_style()));
                    }
                }
            }
            TagEnd::Image => {
                self.styles.pop();
                let url = self.link.take().map(|(url, _)| url).unwrap_or_default();
                self.current
                    .push(Span::styled(format!("] ({})", url), self.theme.dim_style()));
            }
            TagEnd::TableCell => {
                if let Some(table) = self.table.as_mut() {
                    let cell = std::mem::take(&mut table.cell);
                    table.row.push(cell.trim().to_string());
                }
            }
            TagEnd::TableHead | TagEnd::TableRow => {
                if let Some(table) = self.table.as_mut() {
                    let row = std::mem::take(&mut table.row);
                    if !row.is_empty() {
                        table.rows.push(row);
                    }
                }
            }
            TagEnd::Table => {
                if let Some(table) = self.table.take() {
                    for line in render_table(&table.rows, self.width, self.theme) {
                        self.push_line(line);
                    }
                }
                self.blank();
            }
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        if let Some(code) = self.code.as_mut() {
            code.content.push_str(text);
            return;
        }
        let protected = self.protected;
        if let Some(table) = self.table.as_mut() {
            table.cell.push_str(&plain_with_math(protected, text));
            return;
        }
        if let Some(span) = protected.display_only(text) {
            self.display_math(span);
            return;
        }

        for segment in protected.split(text) {
            match segment {
                Segment::Text(s) => {
                    let style = self.style();
                    self.current.push(Span::styled(s.to_string(), style));
                }
                Segment::Math(span) if span.display => self.display_math(span),
                Segment::Math(span) => {
                    let span = self.inline_math(span);
                    self.current.push(span);
                }
            }
        }
    }

    fn inline_math(&self, span: &MathSpan) -> Span<'static> {
        match render_tex(&span.source) {
            Ok(rendered) => Span::styled(rendered, self.theme.math_style()),
            Err(e) => {
                tracing::debug!("Showing raw math `{}`: {}", span.source, e);
                Span::styled(format!("${}$", span.source), self.theme.code_style())
            }
        }
    }

    fn display_math(&mut self, span: &MathSpan) {
        self.flush();
        match render_tex(&span.source) {
            Ok(rendered) => {
                for line in rendered.lines() {
                    self.push_line(Line::from(Span::styled(
                        format!("    {}", line.trim()),
                        self.theme.math_style(),
                    )));
                }
            }
            Err(e) => {
                tracing::debug!("Showing raw display math: {}", e);
                let raw = format!("$${}$$", span.source);
                for line in raw.lines() {
                    self.push_line(Line::from(Span::styled(
                        format!("    {}", line),
                        self.theme.code_style(),
                    )));
                }
            }
        }
    }

    fn code_block(&mut self, block: CodeBlock) {
        // Indented blocks are not skipped by math protection
        let content = unprotect(self.protected, &block.content);

        if block.lang.as_deref() == Some("mermaid") {
            let key = DiagramKey::new(self.scope, self.diagram_ordinal);
            self.diagram_ordinal += 1;
            for line in self.diagrams.render(key, &content, self.theme) {
                self.push_line(line);
            }
            return;
        }

        if let Some(lang) = block.lang.as_deref() {
            if !is_known_language(lang) {
                tracing::debug!("No highlighting for code language {}", lang);
            }
            self.push_line(Line::from(Span::styled(
                format!("  {}", lang),
                self.theme.dim_style(),
            )));
        }
        let fallback = self.theme.code_style().add_modifier(Modifier::DIM);
        let max = self.width.saturating_sub(4);
        for line in highlight_code(&content, block.lang.as_deref(), fallback) {
            let mut spans = vec![Span::raw("  ")];
            spans.extend(clip_spans(line.spans, max));
            self.push_line(Line::from(spans));
        }
    }

    fn finish(mut self) -> Vec<Line<'static>> {
        // A fence still open at the end of a partial reply
        if let Some(block) = self.code.take() {
            self.code_block(block);
        }
        self.flush();
        while self.lines.last().is_some_and(is_blank) {
            self.lines.pop();
        }
        self.lines
    }
}

fn is_blank(line: &Line<'_>) -> bool {
    line.spans.iter().all(|s| s.content.is_empty())
}

/// Protected fragment back to source text, math with its delimiters
fn unprotect(protected: &Protected, text: &str) -> String {
    protected
        .split(text)
        .into_iter()
        .map(|segment| match segment {
            Segment::Text(s) => s.to_string(),
            Segment::Math(span) if span.display => format!("$${}$$", span.source),
            Segment::Math(span) => format!("${}$", span.source),
        })
        .collect()
}

/// Protected fragment as plain text with math rendered where possible
fn plain_with_math(protected: &Protected, text: &str) -> String {
    protected
        .split(text)
        .into_iter()
        .map(|segment| match segment {
            Segment::Text(s) => s.to_string(),
            Segment::Math(span) => {
                render_tex(&span.source).unwrap_or_else(|_| format!("${}$", span.source))
            }
        })
        .collect()
}

fn display_width(text: &str) -> usize {
    text.chars().map(|c| c.width().unwrap_or(0)).sum()
}

/// Truncate to `max` columns on char boundaries, ending with `…`
fn clip(text: &str, max: usize) -> String {
    if display_width(text) <= max {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if used + w + 1 > max {
            break;
        }
        used += w;
        out.push(c);
    }
    out.push('…');
    out
}

fn clip_spans(spans: Vec<Span<'static>>, max: usize) -> Vec<Span<'static>> {
    let total: usize = spans.iter().map(|s| display_width(&s.content)).sum();
    if total <= max {
        return spans;
    }
    let mut out = Vec::new();
    let mut remaining = max;
    for span in spans {
        let w = display_width(&span.content);
        if w < remaining {
            remaining -= w;
            out.push(span);
        } else {
            out.push(Span::styled(clip(&span.content, remaining), span.style));
            break;
        }
    }
    out
}

fn render_table(rows: &[Vec<String>], max_width: usize, theme: &Theme) -> Vec<Line<'static>> {
    let num_cols = rows.iter().map(Vec::len).max().unwrap_or(0);
    if num_cols == 0 {
        return Vec::new();
    }

    let mut col_widths = vec![0usize; num_cols];
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            col_widths[i] = col_widths[i].max(display_width(cell));
        }
    }

    // " │ " between columns
    let available = max_width.saturating_sub((num_cols - 1) * 3);
    let total: usize = col_widths.iter().sum();
    if total > available && total > 0 {
        let scale = available as f64 / total as f64;
        for w in &mut col_widths {
            *w = ((*w as f64 * scale).round() as usize).max(3);
        }
    }

    let border = theme.border_style();
    let mut lines = Vec::new();
    for (row_idx, row) in rows.iter().enumerate() {
        let style = if row_idx == 0 {
            theme.base_style().add_modifier(Modifier::BOLD)
        } else {
            theme.base_style()
        };
        let mut spans = Vec::new();
        for (i, width) in col_widths.iter().copied().enumerate() {
            if i > 0 {
                spans.push(Span::styled(" │ ", border));
            }
            let cell = clip(row.get(i).map(String::as_str).unwrap_or(""), width);
            let pad = width.saturating_sub(display_width(&cell));
            spans.push(Span::styled(format!("{}{}", cell, " ".repeat(pad)), style));
        }
        lines.push(Line::from(spans));

        if row_idx == 0 {
            let separator = col_widths
                .iter()
                .map(|w| "─".repeat(*w))
                .collect::<Vec<_>>()
                .join("─┼─");
            lines.push(Line::from(Span::styled(separator, border)));
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn text(line: &Line<'_>) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    fn render(md: &str) -> Vec<String> {
        MarkdownRenderer::new(Theme::dark())
            .render("test", md, 80)
            .iter()
            .map(text)
            .collect()
    }

    #[test]
    fn test_simple_text() {
        assert_eq!(render("Hello, world!"), vec!["Hello, world!"]);
    }

    #[test]
    fn test_code_block() {
        let lines = render("```rust\nfn main() {}\n```");
        assert_eq!(lines, vec!["  rust", "  fn main() {}"]);
    }

    #[test]
    fn test_inline_math_rendered() {
        let theme = Theme::dark();
        let lines = MarkdownRenderer::new(theme.clone()).render("m", r"Angle \(\alpha\) and $x^2$ here", 80);
        assert_eq!(text(&lines[0]), "Angle α and x² here");
        assert!(lines[0]
            .spans
            .iter()
            .any(|s| s.content == "α" && s.style == theme.math_style()));
    }

    #[test]
    fn test_math_survives_markdown() {
        // Underscores and stars would otherwise become emphasis
        assert_eq!(render(r"$a_1 * b_2 * c$"), vec!["a₁ * b₂ * c"]);
    }

    #[test]
    fn test_display_math_is_block() {
        let lines = render("Sum:\n\n$$\\sum_{i=1}^{n} i$$\n\nDone");
        assert_eq!(lines, vec!["Sum:", "", "    ∑ᵢ₌₁ⁿ i", "", "Done"]);
    }

    #[test]
    fn test_bad_math_shown_raw() {
        assert_eq!(render(r"try $\frac{1}$ now"), vec![r"try $\frac{1}$ now"]);
    }

    #[test]
    fn test_deeply_nested_math_shown_raw() {
        let braces = "{".repeat(10_000);
        for md in [
            format!("$${}x$$", braces),
            format!("Answer: $${}x$$", braces),
            format!("inline ${}x$ end", "{".repeat(100)),
        ] {
            let joined = render(&md).concat();
            assert!(joined.contains("{{{{{{{{x"), "expected raw source in {:?}", joined);
        }
    }

    #[test]
    fn test_lists_and_quotes() {
        let lines = render("1. first\n2. second\n\n- a\n  - b\n\n> quoted");
        assert_eq!(
            lines,
            vec!["1. first", "2. second", "", "• a", "  • b", "", "│ quoted"]
        );
    }

    #[test]
    fn test_table() {
        let lines = render("| Mood | Days |\n|---|---|\n| calm | 4 |\n| busy | 12 |");
        assert_eq!(
            lines,
            vec![
                "Mood │ Days",
                "─────┼─────",
                "calm │ 4   ",
                "busy │ 12  ",
            ]
        );
    }

    #[test]
    fn test_link_shows_destination() {
        assert_eq!(
            render("[notes](https://example.com/n) and <https://x.io>"),
            vec!["notes (https://example.com/n) and https://x.io"]
        );
    }

    #[test]
    fn test_partial_input_never_panics() {
        let full = "# Title\n\n| a | b |\n|---|---|\n| 1 | 2 |\n\n```python\nprint('é')\n```\n\n$$x^2$$ and *em* `code`";
        let mut renderer = MarkdownRenderer::new(Theme::dark());
        for (i, _) in full.char_indices() {
            renderer.render("p", &full[..i], 12);
        }
    }

    #[test]
    fn test_unterminated_fence_still_rendered() {
        let lines = render("Look:\n\n```\nlet x = 1;");
        assert_eq!(lines, vec!["Look:", "", "  let x = 1;"]);
    }

    #[test]
    fn test_long_code_line_clipped_on_char_boundary() {
        let mut renderer = MarkdownRenderer::new(Theme::dark());
        let lines = renderer.render("c", "```\nééééééééééééééé\n```", 10);
        assert_eq!(text(&lines[0]), "  ééééé…");
    }

    #[test]
    fn test_mermaid_redrawn_only_on_change() {
        let mut renderer = MarkdownRenderer::new(Theme::dark());
        let md = "```mermaid\ngraph TD\nA --> B\n```";
        let lines = renderer.render("msg", md, 80);
        assert!(lines.iter().any(|l| text(l).contains("A ──▶ B")));
        renderer.render("msg", md, 80);
        renderer.render("msg", &format!("{}\n\nmore text", md), 80);
        assert_eq!(renderer.diagrams().render_count(), 1);

        renderer.render("msg", "```mermaid\ngraph TD\nA --> C\n```", 80);
        assert_eq!(renderer.diagrams().render_count(), 2);
    }

    #[test]
    fn test_clear_drops_cached_diagrams() {
        let mut renderer = MarkdownRenderer::new(Theme::dark());
        let md = "```mermaid\ngraph TD\nA --> B\n```";
        renderer.render("a", md, 80);
        renderer.render("b", md, 80);
        renderer.forget("a");
        renderer.render("b", md, 80);
        assert_eq!(renderer.diagrams().render_count(), 2);

        renderer.clear();
        renderer.render("b", md, 80);
        assert_eq!(renderer.diagrams().render_count(), 3);
    }
}
