//! Model picker popup with type-to-filter

use crate::Theme;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, HighlightSpacing, List, ListItem, ListState, StatefulWidget, Widget},
};

const MAX_POPUP_WIDTH: u16 = 80;
const MAX_POPUP_HEIGHT: u16 = 20;
const TITLE: &str = " Select Model ";

/// Picker state: visibility, filter text and the highlighted row
#[derive(Debug, Default)]
pub struct ModelPickerState {
    /// Whether the picker is visible
    pub visible: bool,
    query: String,
    /// Position within the filtered rows
    cursor: usize,
}

impl ModelPickerState {
    /// Show the picker with the current model highlighted
    pub fn open(&mut self, models: &[String], current: Option<&str>) {
        self.visible = true;
        self.query.clear();
        self.cursor = current
            .and_then(|c| models.iter().position(|m| m == c))
            .unwrap_or(0);
    }

    pub fn close(&mut self) {
        self.visible = false;
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Narrow the list by one more character
    pub fn push(&mut self, c: char) {
        self.query.push(c);
        self.cursor = 0;
    }

    pub fn pop(&mut self) {
        self.query.pop();
        self.cursor = 0;
    }

    /// Indices into `models` whose name contains the query, ignoring case
    pub fn matches(&self, models: &[String]) -> Vec<usize> {
        let query = self.query.to_lowercase();
        models
            .iter()
            .enumerate()
            .filter(|(_, m)| m.to_lowercase().contains(&query))
            .map(|(i, _)| i)
            .collect()
    }

    /// Index into `models` of the highlighted row
    pub fn selection(&self, models: &[String]) -> Option<usize> {
        self.matches(models).get(self.cursor).copied()
    }

    /// Move up, wrapping to the last match
    pub fn up(&mut self, models: &[String]) {
        let count = self.matches(models).len();
        if count == 0 {
            return;
        }
        self.cursor = if self.cursor == 0 { count - 1 } else { self.cursor - 1 };
    }

    /// Move down, wrapping to the first match
    pub fn down(&mut self, models: &[String]) {
        let count = self.matches(models).len();
        if count == 0 {
            return;
        }
        self.cursor = (self.cursor + 1) % count;
    }
}

/// Popup listing the backend's models, centered in its area
pub struct ModelPicker<'a> {
    models: &'a [String],
    current: Option<&'a str>,
    theme: &'a Theme,
}

impl<'a> ModelPicker<'a> {
    pub fn new(models: &'a [String], current: Option<&'a str>, theme: &'a Theme) -> Self {
        Self {
            models,
            current,
            theme,
        }
    }

    fn row(&self, model: &str, highlighted: bool) -> ListItem<'static> {
        let is_current = self.current == Some(model);
        let marker = if is_current { "● " } else { "  " };
        let style = if highlighted {
            Style::default()
                .bg(self.theme.accent)
                .fg(self.theme.bg)
                .add_modifier(Modifier::BOLD)
        } else if is_current {
            self.theme.accent_style()
        } else {
            self.theme.base_style()
        };
        ListItem::new(Line::from(Span::styled(format!("{}{}", marker, model), style)))
    }
}

impl StatefulWidget for ModelPicker<'_> {
    type State = ModelPickerState;

    fn render(self, area: Rect, buf: &mut Buffer, state: &mut ModelPickerState) {
        let matches = state.matches(self.models);
        let widest = matches
            .iter()
            .map(|&i| self.models[i].chars().count() + 6)
            .max()
            .unwrap_or(0)
            .max(TITLE.len() + 2)
            .max(state.query.chars().count() + 12);
        let width = (widest as u16).clamp(24, MAX_POPUP_WIDTH).min(area.width);
        let height = (matches.len().max(1) as u16 + 2)
            .min(MAX_POPUP_HEIGHT)
            .min(area.height);
        let popup = Rect::new(
            area.x + area.width.saturating_sub(width) / 2,
            area.y + area.height.saturating_sub(height) / 2,
            width,
            height,
        );
        Clear.render(popup, buf);

        let filter = if state.query.is_empty() {
            " type to filter ".to_string()
        } else {
            format!(" filter: {} ", state.query)
        };
        let block = Block::default()
            .title(TITLE)
            .title_style(self.theme.accent_bold())
            .title_bottom(Line::from(Span::styled(filter, self.theme.dim_style())))
            .borders(Borders::ALL)
            .border_style(self.theme.accent_style());

        if matches.is_empty() {
            let empty = List::new([ListItem::new(Span::styled(
                "  No matching models",
                self.theme.dim_style(),
            ))])
            .block(block);
            Widget::render(empty, popup, buf);
            return;
        }

        let cursor = state.cursor.min(matches.len() - 1);
        let rows: Vec<ListItem> = matches
            .iter()
            .enumerate()
            .map(|(row, &i)| self.row(&self.models[i], row == cursor))
            .collect();
        let list = List::new(rows)
            .block(block)
            .highlight_spacing(HighlightSpacing::Always);
        let mut list_state = ListState::default();
        list_state.select(Some(cursor));
        StatefulWidget::render(list, popup, buf, &mut list_state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn models() -> Vec<String> {
        ["qwen3:8b", "llama3.1:8b", "Qwen2.5-coder"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    fn screen(state: &mut ModelPickerState, current: Option<&str>) -> String {
        let theme = Theme::dark();
        let models = models();
        let area = Rect::new(0, 0, 40, 10);
        let mut buf = Buffer::empty(area);
        ModelPicker::new(&models, current, &theme).render(area, &mut buf, state);
        (0..area.height)
            .map(|y| {
                (0..area.width)
                    .map(|x| buf[(x, y)].symbol().to_string())
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_open_highlights_current_model() {
        let models = models();
        let mut state = ModelPickerState::default();
        state.open(&models, Some("llama3.1:8b"));
        assert!(state.visible);
        assert_eq!(state.selection(&models), Some(1));

        state.open(&models, Some("gone"));
        assert_eq!(state.selection(&models), Some(0));
    }

    #[test]
    fn test_filter_maps_back_to_model_index() {
        let models = models();
        let mut state = ModelPickerState::default();
        state.open(&models, None);
        for c in "QWEN".chars() {
            state.push(c);
        }
        assert_eq!(state.matches(&models), vec![0, 2]);

        state.down(&models);
        assert_eq!(state.selection(&models), Some(2));
        state.down(&models);
        assert_eq!(state.selection(&models), Some(0));
        state.up(&models);
        assert_eq!(state.selection(&models), Some(2));

        state.push('z');
        assert_eq!(state.selection(&models), None);
        state.up(&models);
        state.pop();
        assert_eq!(state.selection(&models), Some(0));
    }

    #[test]
    fn test_render_marks_current_and_filter() {
        let mut state = ModelPickerState::default();
        state.open(&models(), Some("qwen3:8b"));
        let text = screen(&mut state, Some("qwen3:8b"));
        assert!(text.contains("Select Model"));
        assert!(text.contains("● qwen3:8b"));
        assert!(text.contains("  llama3.1:8b"));
        assert!(text.contains("type to filter"));

        state.push('x');
        let text = screen(&mut state, Some("qwen3:8b"));
        assert!(text.contains("No matching models"));
        assert!(text.contains("filter: x"));
    }
}
