//! Message list widget for displaying chat messages

use crate::render::MarkdownRenderer;
use crate::theme::Theme;
use crate::widgets::spinner::frame_at;
use jot_ai::{Message, MessageId, Role};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::Modifier,
    text::{Line, Span},
    widgets::{Paragraph, Widget, Wrap},
};
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::{SystemTime, UNIX_EPOCH};

const REASONING_TITLE: &str = "AI Reasoning";

/// Rendered lines for one piece of text, reused until the text or width changes
#[derive(Default)]
struct RenderCache {
    key: Option<(u64, usize)>,
    lines: Vec<Line<'static>>,
    renders: usize,
}

impl RenderCache {
    fn get_or_render(
        &mut self,
        text: &str,
        width: usize,
        render: impl FnOnce() -> Vec<Line<'static>>,
    ) -> &[Line<'static>] {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let key = (hasher.finish(), width);
        if self.key != Some(key) {
            self.lines = render();
            self.key = Some(key);
            self.renders += 1;
        }
        &self.lines
    }
}

/// Per-message render state
///
/// Answer and reasoning are cached separately, so folding the reasoning
/// section never re-renders the answer.
#[derive(Default)]
pub struct MessageView {
    answer: RenderCache,
    thinking: RenderCache,
}

impl MessageView {
    /// How many times the answer markdown was rendered
    pub fn answer_renders(&self) -> usize {
        self.answer.renders
    }

    /// How many times the reasoning markdown was rendered
    pub fn thinking_renders(&self) -> usize {
        self.thinking.renders
    }

    fn lines(
        &mut self,
        msg: &Message,
        renderer: &mut MarkdownRenderer,
        show_thinking: bool,
        streaming: bool,
        width: usize,
    ) -> Vec<Line<'static>> {
        let theme = renderer.theme().clone();
        let content_width = width.saturating_sub(2);
        let mut lines = vec![header(msg, streaming, &theme)];

        match msg.role {
            Role::Assistant => {
                if let Some(thinking) = msg.thinking() {
                    let marker = if show_thinking { "▾" } else { "▸" };
                    lines.push(Line::from(vec![
                        Span::styled(
                            format!("  {} {}", marker, REASONING_TITLE),
                            theme.thinking_style(),
                        ),
                        Span::styled(" (Ctrl+T)", theme.dim_style()),
                    ]));
                    if show_thinking {
                        let scope = format!("{}:thinking", msg.id);
                        let inner = content_width.saturating_sub(2);
                        let rendered = self.thinking.get_or_render(thinking, inner, || {
                            renderer.render(&scope, thinking, inner)
                        });
                        let bar = Span::styled("  │ ", theme.thinking_style());
                        lines.extend(rendered.iter().map(|line| indented(line, bar.clone())));
                    }
                }

                if msg.content.is_empty() && streaming {
                    let elapsed = SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .unwrap_or_default();
                    let label = if msg.thinking().is_some() {
                        "reasoning..."
                    } else {
                        "thinking..."
                    };
                    lines.push(Line::from(Span::styled(
                        format!("  {} {}", frame_at(elapsed), label),
                        theme.warning_style(),
                    )));
                } else if !msg.content.is_empty() {
                    let scope = msg.id.to_string();
                    let rendered = self.answer.get_or_render(&msg.content, content_width, || {
                        renderer.render(&scope, &msg.content, content_width)
                    });
                    lines.extend(
                        rendered
                            .iter()
                            .map(|line| indented(line, Span::raw("  "))),
                    );
                }

                if !streaming {
                    if let Some(footer) = stats_footer(msg, &theme) {
                        lines.push(footer);
                    }
                }
            }
            Role::User | Role::System => {
                let style = if msg.role == Role::System {
                    theme.dim_style()
                } else {
                    theme.base_style()
                };
                for line in textwrap::wrap(&msg.content, content_width.max(1)) {
                    lines.push(Line::from(Span::styled(format!("  {}", line), style)));
                }
            }
        }

        // Empty line between messages
        lines.push(Line::from(""));
        lines
    }
}

fn header(msg: &Message, streaming: bool, theme: &Theme) -> Line<'static> {
    let (role_text, role_style, prefix) = match msg.role {
        Role::User => ("You", theme.accent_bold(), "▶ "),
        Role::Assistant => (
            "Assistant",
            theme.success_style().add_modifier(Modifier::BOLD),
            "◀ ",
        ),
        Role::System => ("Journal", theme.dim_style(), "● "),
    };

    let mut spans = vec![Span::styled(format!("{}{}", prefix, role_text), role_style)];
    if streaming {
        spans.push(Span::styled(" ▌", role_style));
    }
    if let Some(ts) = msg.timestamp {
        let local = ts.with_timezone(&chrono::Local);
        spans.push(Span::styled(
            format!("  {}", local.format("%H:%M")),
            theme.dim_style(),
        ));
    }
    Line::from(spans)
}

fn stats_footer(msg: &Message, theme: &Theme) -> Option<Line<'static>> {
    let stats = msg.stats();
    if stats.is_empty() {
        return None;
    }
    let mut parts = Vec::new();
    if let Some(ms) = stats.inference_time {
        parts.push(format!("{:.1}s", ms / 1000.0));
    }
    if let Some(rate) = stats.tokens_per_second {
        parts.push(format!("{:.1} tok/s", rate));
    }
    Some(Line::from(Span::styled(
        format!("  ⏱ {}", parts.join(" · ")),
        theme.dim_style(),
    )))
}

fn indented(line: &Line<'static>, prefix: Span<'static>) -> Line<'static> {
    let mut spans = Vec::with_capacity(line.spans.len() + 1);
    spans.push(prefix);
    spans.extend(line.spans.iter().cloned());
    Line::from(spans)
}

/// Render state for the whole conversation
pub struct Transcript {
    renderer: MarkdownRenderer,
    views: HashMap<MessageId, MessageView>,
    show_thinking: bool,
}

impl Transcript {
    pub fn new(theme: Theme) -> Self {
        Self {
            renderer: MarkdownRenderer::new(theme),
            views: HashMap::new(),
            show_thinking: false,
        }
    }

    pub fn theme(&self) -> &Theme {
        self.renderer.theme()
    }

    /// Whether reasoning sections are expanded
    pub fn show_thinking(&self) -> bool {
        self.show_thinking
    }

    /// Fold or unfold reasoning sections, returning the new state
    pub fn toggle_thinking(&mut self) -> bool {
        self.show_thinking = !self.show_thinking;
        self.show_thinking
    }

    pub fn view(&self, id: &MessageId) -> Option<&MessageView> {
        self.views.get(id)
    }

    /// Drop render state for a removed message
    pub fn forget(&mut self, id: &MessageId) {
        self.views.remove(id);
        let scope = id.to_string();
        self.renderer.forget(&scope);
        self.renderer.forget(&format!("{}:thinking", scope));
    }

    pub fn clear(&mut self) {
        self.views.clear();
        self.renderer.clear();
    }

    /// All lines for `messages`; `streaming` marks the in-flight message
    pub fn lines(
        &mut self,
        messages: &[Message],
        streaming: Option<MessageId>,
        width: usize,
    ) -> Vec<Line<'static>> {
        let mut out = Vec::new();
        for msg in messages {
            let view = self.views.entry(msg.id).or_default();
            out.extend(view.lines(
                msg,
                &mut self.renderer,
                self.show_thinking,
                streaming == Some(msg.id),
                width,
            ));
        }
        out
    }
}

/// Widget for displaying pre-rendered message lines
pub struct MessageList<'a> {
    lines: &'a [Line<'static>],
    scroll: usize,
}

impl<'a> MessageList<'a> {
    /// Create a new message list
    pub fn new(lines: &'a [Line<'static>]) -> Self {
        Self { lines, scroll: 0 }
    }

    /// Set scroll offset
    pub fn scroll(mut self, scroll: usize) -> Self {
        self.scroll = scroll;
        self
    }
}

impl Widget for MessageList<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.width == 0 || area.height == 0 {
            return;
        }

        // Skip whole lines first so wrapping stays cheap on long histories
        let width = area.width as usize;
        let mut skipped = 0;
        let mut start = 0;
        for line in self.lines {
            let rows = line_rows(line, width);
            if skipped + rows > self.scroll {
                break;
            }
            skipped += rows;
            start += 1;
        }
        let offset = self.scroll.saturating_sub(skipped) as u16;

        let visible: Vec<Line> = self.lines[start..].to_vec();
        Paragraph::new(visible)
            .wrap(Wrap { trim: false })
            .scroll((offset, 0))
            .render(area, buf);
    }
}

fn line_rows(line: &Line<'_>, width: usize) -> usize {
    line.width().div_ceil(width.max(1)).max(1)
}

/// Calculate total height of rendered lines at `width`
pub fn calculate_message_height(lines: &[Line<'_>], width: usize) -> usize {
    lines.iter().map(|line| line_rows(line, width)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use jot_ai::Stats;

    fn text(line: &Line<'_>) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    fn reply() -> Message {
        let mut msg = Message::assistant("The answer is **42**.");
        msg.think = Some("Consider the question.".into());
        msg.set_stats(Stats::new(1300.0, 5.5));
        msg
    }

    #[test]
    fn test_toggle_thinking_keeps_answer_cache() {
        let msg = reply();
        let mut transcript = Transcript::new(Theme::dark());

        let collapsed = transcript.lines(std::slice::from_ref(&msg), None, 80);
        assert!(collapsed.iter().any(|l| text(l).contains("▸ AI Reasoning")));
        assert!(!collapsed.iter().any(|l| text(l).contains("Consider")));

        assert!(transcript.toggle_thinking());
        let expanded = transcript.lines(std::slice::from_ref(&msg), None, 80);
        assert!(expanded.iter().any(|l| text(l).contains("▾ AI Reasoning")));
        assert!(expanded.iter().any(|l| text(l) == "  │ Consider the question."));

        transcript.toggle_thinking();
        transcript.lines(std::slice::from_ref(&msg), None, 80);

        let view = transcript.view(&msg.id).unwrap();
        assert_eq!(view.answer_renders(), 1);
        assert_eq!(view.thinking_renders(), 1);
    }

    #[test]
    fn test_answer_rerendered_only_when_text_changes() {
        let mut msg = Message::assistant_placeholder();
        let mut transcript = Transcript::new(Theme::dark());

        let waiting = transcript.lines(std::slice::from_ref(&msg), Some(msg.id), 80);
        assert!(waiting.iter().any(|l| text(l).contains("thinking...")));

        msg.content.push_str("Hel");
        transcript.lines(std::slice::from_ref(&msg), Some(msg.id), 80);
        transcript.lines(std::slice::from_ref(&msg), Some(msg.id), 80);
        msg.content.push_str("lo");
        transcript.lines(std::slice::from_ref(&msg), Some(msg.id), 80);

        assert_eq!(transcript.view(&msg.id).unwrap().answer_renders(), 2);
    }

    #[test]
    fn test_stats_footer_after_stream_ends() {
        let msg = reply();
        let mut transcript = Transcript::new(Theme::dark());

        let streaming = transcript.lines(std::slice::from_ref(&msg), Some(msg.id), 80);
        assert!(!streaming.iter().any(|l| text(l).contains("tok/s")));

        let done = transcript.lines(std::slice::from_ref(&msg), None, 80);
        assert!(done.iter().any(|l| text(l) == "  ⏱ 1.3s · 5.5 tok/s"));
    }

    #[test]
    fn test_user_message_wrapped() {
        let msg = Message::user("one two three four");
        let mut transcript = Transcript::new(Theme::dark());
        let lines = transcript.lines(std::slice::from_ref(&msg), None, 12);
        let body: Vec<String> = lines[1..lines.len() - 1].iter().map(text).collect();
        assert_eq!(body, vec!["  one two", "  three four"]);
    }

    #[test]
    fn test_height_counts_wrapped_rows() {
        let lines = vec![Line::from("x".repeat(25)), Line::from(""), Line::from("short")];
        assert_eq!(calculate_message_height(&lines, 10), 5);
    }
}
