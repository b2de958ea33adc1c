//! TUI implementation for jot

use tokio::sync::mpsc;

use crossterm::event::{Event, EventStream, MouseEventKind};
use futures::StreamExt;
use jot_ai::{ChatMode, Message, MessageId};
use jot_chat::{ChatEvent, ChatSession, ErrorNotice, RequestOutcome};
use jot_tui::{
    Theme,
    input::{Action, event_to_action},
    widgets::{
        InputBox, MessageList, ModelPicker, ModelPickerState, Spinner, Transcript,
        message_list::calculate_message_height,
    },
};
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    text::{Line, Span},
    widgets::{Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState, Wrap},
};
use std::collections::HashSet;
use std::time::{Duration, Instant};

use crate::commands::{CommandResult, execute_command};

/// Messages sent from key handling to the session owner
#[derive(Debug)]
pub enum UiMessage {
    /// User submitted input
    Submit(String),
    /// User requested quit
    Quit,
    /// User requested clear
    Clear,
    /// Slash command
    Command(String),
    /// Change model (index into available_models)
    ChangeModel(usize),
    /// Hide the error banner
    DismissError,
}

/// TUI application state
///
/// `messages` mirrors the session's conversation. While a request runs the
/// session is borrowed by the send future, so the mirror follows chat events
/// and is resynced from the session once the request ends.
pub struct TuiState {
    messages: Vec<Message>,
    /// The reply currently streaming in
    streaming: Option<MessageId>,
    transcript: Transcript,
    input: InputBox,
    /// Current scroll position (usize::MAX sticks to the bottom)
    scroll: usize,
    is_processing: bool,
    status: String,
    /// Error banner contents
    error: Option<ErrorNotice>,
    /// Banner hidden while the session was busy; dismissed for real on resync
    dismissed: Option<ErrorNotice>,
    model: Option<String>,
    mode: ChatMode,
    available_models: Vec<String>,
    ui_tx: mpsc::Sender<UiMessage>,
    /// Spinner start time for animation
    spinner_start: Instant,
    model_picker: ModelPickerState,
}

impl TuiState {
    pub fn new(
        theme: Theme,
        available_models: Vec<String>,
        ui_tx: mpsc::Sender<UiMessage>,
    ) -> Self {
        let mut input = InputBox::new().with_placeholder("Write to your journal assistant...");
        input.set_focused(true);

        Self {
            messages: vec![],
            streaming: None,
            transcript: Transcript::new(theme),
            input,
            scroll: usize::MAX,
            is_processing: false,
            status: "Ready".to_string(),
            error: None,
            dismissed: None,
            model: None,
            mode: ChatMode::default(),
            available_models,
            ui_tx,
            spinner_start: Instant::now(),
            model_picker: ModelPickerState::default(),
        }
    }

    fn theme(&self) -> &Theme {
        self.transcript.theme()
    }

    /// Copy the session's state into the mirror
    pub fn sync(&mut self, session: &mut ChatSession) {
        if let Some(dismissed) = self.dismissed.take()
            && session.conversation().error() == Some(&dismissed)
        {
            session.dismiss_error();
        }

        let conversation = session.conversation();
        let kept: HashSet<MessageId> = conversation.messages().iter().map(|m| m.id).collect();
        for old in &self.messages {
            if !kept.contains(&old.id) {
                self.transcript.forget(&old.id);
            }
        }
        self.messages = conversation.messages().to_vec();
        self.streaming = conversation.in_flight();
        self.error = conversation.error().cloned();
        self.model = session.model().map(str::to_string);
        self.mode = session.mode();
        self.scroll_to_bottom();
    }

    /// Handle chat events
    pub fn handle_chat_event(&mut self, event: ChatEvent) {
        match event {
            ChatEvent::RequestStart { user, placeholder } => {
                self.is_processing = true;
                self.input.set_busy(true);
                self.error = None;
                self.streaming = Some(placeholder.id);
                self.messages.push(user);
                self.messages.push(placeholder);
                self.scroll_to_bottom();
            }
            ChatEvent::MessageUpdate { message } => {
                self.replace(message);
                self.scroll_to_bottom();
            }
            ChatEvent::MessageEnd { message } => {
                if self.streaming == Some(message.id) {
                    self.streaming = None;
                }
                self.replace(message);
                self.scroll_to_bottom();
            }
            ChatEvent::MessageRemoved { id } => {
                self.messages.retain(|m| m.id != id);
                self.transcript.forget(&id);
                if self.streaming == Some(id) {
                    self.streaming = None;
                }
            }
            ChatEvent::Error { notice } => {
                self.error = Some(notice);
            }
            ChatEvent::RequestEnd { outcome, .. } => {
                self.is_processing = false;
                self.input.set_busy(false);
                self.streaming = None;
                self.status = match outcome {
                    RequestOutcome::Finalized => "Ready",
                    RequestOutcome::Aborted => "Stopped",
                    RequestOutcome::Failed => "Failed",
                }
                .to_string();
            }
        }
    }

    fn replace(&mut self, message: Message) {
        match self.messages.iter_mut().find(|m| m.id == message.id) {
            Some(slot) => *slot = message,
            None => self.messages.push(message),
        }
    }

    fn scroll_to_bottom(&mut self) {
        // Will be calculated during render based on content height
        self.scroll = usize::MAX;
    }

    fn toggle_thinking(&mut self) {
        self.status = if self.transcript.toggle_thinking() {
            "Reasoning shown".to_string()
        } else {
            "Reasoning hidden".to_string()
        };
    }

    fn dismiss_error_locally(&mut self) {
        if let Some(notice) = self.error.take() {
            self.dismissed = Some(notice);
        }
    }

    /// Handle keyboard action while no request is running
    pub async fn handle_action(&mut self, action: Action, width: u16) -> bool {
        if self.model_picker.visible {
            let models = &self.available_models;
            match action {
                Action::Up => self.model_picker.up(models),
                Action::Down => self.model_picker.down(models),
                Action::Char(c) => self.model_picker.push(c),
                Action::Backspace => self.model_picker.pop(),
                Action::Submit => {
                    let selected = self.model_picker.selection(models);
                    self.model_picker.close();
                    if let Some(index) = selected {
                        let _ = self.ui_tx.send(UiMessage::ChangeModel(index)).await;
                    }
                }
                Action::Escape | Action::ModelSelect => self.model_picker.close(),
                // Ignore other actions while the picker is open
                _ => {}
            }
            return true;
        }

        match action {
            Action::Submit => {
                let content = self.input.content().to_string();
                let trimmed = content.trim();
                if !trimmed.is_empty() && !self.is_processing {
                    let msg = if trimmed.starts_with('/') {
                        UiMessage::Command(trimmed.to_string())
                    } else {
                        UiMessage::Submit(content)
                    };
                    self.input.clear();
                    let _ = self.ui_tx.send(msg).await;
                }
                true
            }
            Action::Quit | Action::Interrupt | Action::Escape | Action::Eof => {
                let _ = self.ui_tx.send(UiMessage::Quit).await;
                false
            }
            Action::PageUp => {
                self.scroll = self.scroll.saturating_sub(10);
                true
            }
            Action::PageDown => {
                self.scroll = self.scroll.saturating_add(10);
                true
            }
            Action::Clear => {
                let _ = self.ui_tx.send(UiMessage::Clear).await;
                true
            }
            Action::ToggleThinking => {
                self.toggle_thinking();
                true
            }
            Action::DismissError => {
                let _ = self.ui_tx.send(UiMessage::DismissError).await;
                true
            }
            Action::ModelSelect => {
                if self.available_models.is_empty() {
                    self.status = "No models available".to_string();
                } else {
                    self.open_model_picker();
                }
                true
            }
            _ => {
                self.input.handle_action(&action, width);
                true
            }
        }
    }

    /// Render the UI
    pub fn render(&mut self, frame: &mut Frame) {
        let size = frame.area();
        let banner_height = if self.error.is_some() { 2 } else { 0 };

        // Layout: messages (flex), error banner, status bar (1), input (3)
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(1),
                Constraint::Length(banner_height),
                Constraint::Length(1),
                Constraint::Length(3),
            ])
            .split(size);

        self.render_messages(frame, chunks[0]);
        self.render_banner(frame, chunks[1]);
        self.render_status(frame, chunks[2]);

        let theme = self.transcript.theme().clone();
        self.input.render(chunks[3], frame.buffer_mut(), &theme);

        if self.model_picker.visible {
            let picker = ModelPicker::new(&self.available_models, self.model.as_deref(), &theme);
            frame.render_stateful_widget(picker, size, &mut self.model_picker);
        }
    }

    fn open_model_picker(&mut self) {
        self.model_picker.open(&self.available_models, self.model.as_deref());
    }

    fn render_messages(&mut self, frame: &mut Frame, area: Rect) {
        if area.height == 0 || area.width == 0 {
            return;
        }
        let width = area.width.saturating_sub(1).max(1);
        let lines = self
            .transcript
            .lines(&self.messages, self.streaming, width as usize);
        let content_height = calculate_message_height(&lines, width as usize);
        let max_scroll = content_height.saturating_sub(area.height as usize);

        if self.scroll == usize::MAX {
            self.scroll = max_scroll;
        } else {
            self.scroll = self.scroll.min(max_scroll);
        }

        let list_area = Rect { width, ..area };
        frame.render_widget(MessageList::new(&lines).scroll(self.scroll), list_area);

        if content_height > area.height as usize {
            let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
                .begin_symbol(Some("↑"))
                .end_symbol(Some("↓"))
                .track_symbol(Some("│"))
                .thumb_symbol("█");

            let mut scrollbar_state = ScrollbarState::new(content_height)
                .position(self.scroll)
                .viewport_content_length(area.height as usize);

            frame.render_stateful_widget(scrollbar, area, &mut scrollbar_state);
        }
    }

    fn render_banner(&self, frame: &mut Frame, area: Rect) {
        let Some(notice) = &self.error else {
            return;
        };
        let banner = Paragraph::new(Line::from(vec![
            Span::styled(format!(" ⚠ {} ", notice), self.theme().banner_style()),
            Span::styled("  Ctrl+E: dismiss", self.theme().dim_style()),
        ]))
        .wrap(Wrap { trim: true });
        frame.render_widget(banner, area);
    }

    fn render_status(&self, frame: &mut Frame, area: Rect) {
        if self.is_processing {
            let label = match self.mode {
                ChatMode::Reasoning => "Reasoning...",
                ChatMode::Simple => "Writing...",
            };
            let spinner = Spinner::new(label, self.theme()).with_start_time(self.spinner_start);
            frame.render_widget(spinner, area);
            return;
        }

        let model_name = self.model.as_deref().unwrap_or("default model");
        let left_content = format!("{} │ {} │ {}", model_name, self.mode.as_str(), self.status);
        let right_content = "Ctrl+K: model │ Ctrl+T: reasoning │ Esc: quit";

        let left_width = left_content.chars().count();
        let right_width = right_content.chars().count();
        let available = area.width as usize;

        let line = if left_width + right_width + 2 <= available {
            let spacing = available - left_width - right_width;
            Line::from(vec![
                Span::styled(left_content, self.theme().dim_style()),
                Span::raw(" ".repeat(spacing)),
                Span::styled(right_content, self.theme().dim_style()),
            ])
        } else {
            Line::from(Span::styled(left_content, self.theme().dim_style()))
        };

        frame.render_widget(Paragraph::new(line), area);
    }
}

/// Apply a slash command to the session; returns false to quit
fn apply_command(state: &mut TuiState, session: &mut ChatSession, cmd: &str) -> bool {
    let Some(result) = execute_command(cmd, session.mode(), &state.available_models) else {
        return true;
    };
    match result {
        CommandResult::Message(msg) => session.push_notice(msg),
        CommandResult::Clear => clear(state, session),
        CommandResult::ChangeModel(model) => {
            session.push_notice(format!("Switched to: {}", model));
            session.set_model(model);
        }
        CommandResult::ChangeMode(mode) => {
            session.push_notice(format!("Chat mode: {}", mode.as_str()));
            session.set_mode(mode);
        }
        CommandResult::Exit => return false,
        CommandResult::Unknown(cmd) => session.push_notice(format!(
            "Unknown command: /{}\nType /help for available commands.",
            cmd
        )),
        CommandResult::OpenModelSelector => {
            if state.available_models.is_empty() {
                session.push_notice("No models available");
            } else {
                state.open_model_picker();
            }
        }
    }
    state.sync(session);
    true
}

fn clear(state: &mut TuiState, session: &mut ChatSession) {
    if session.clear() {
        state.transcript.clear();
        state.status = "Cleared".to_string();
    }
    state.sync(session);
}

/// Run the TUI application
pub async fn run_tui(
    session: &mut ChatSession,
    available_models: &[String],
    theme: Theme,
) -> anyhow::Result<()> {
    use crossterm::{
        execute,
        terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
    };
    use ratatui::{Terminal, backend::CrosstermBackend};
    use std::io;

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let (ui_tx, mut ui_rx) = mpsc::channel::<UiMessage>(32);

    let mut state = TuiState::new(theme, available_models.to_vec(), ui_tx);
    state.sync(session);

    let mut chat_rx = session.subscribe();
    let mut event_stream = EventStream::new();

    // Tick interval for animations (80ms for smooth spinner)
    let mut tick_interval = tokio::time::interval(Duration::from_millis(80));

    // Processed at the start of the next loop iteration so the send future
    // can borrow the session
    let mut pending_prompt: Option<String> = None;

    let result = loop {
        if let Some(content) = pending_prompt.take() {
            state.spinner_start = Instant::now();
            state.status = "Sending...".to_string();
            let mut quit = false;

            {
                // Taken before the future borrows the session
                let cancel_handle = session.cancel_handle();
                let mut send_future = std::pin::pin!(session.send(&content));

                loop {
                    terminal.draw(|frame| state.render(frame))?;
                    let area_width = terminal.size()?.width;

                    tokio::select! {
                        biased;

                        result = &mut send_future => {
                            if let Err(e) = result {
                                state.status = e.to_string();
                            }
                            break;
                        }

                        event = chat_rx.recv() => {
                            if let Ok(chat_event) = event {
                                state.handle_chat_event(chat_event);
                            }
                        }

                        // Input keeps working while the reply streams
                        event = event_stream.next() => {
                            match event {
                                Some(Ok(Event::Mouse(mouse))) => match mouse.kind {
                                    MouseEventKind::ScrollUp => {
                                        state.scroll = state.scroll.saturating_sub(3);
                                    }
                                    MouseEventKind::ScrollDown => {
                                        state.scroll = state.scroll.saturating_add(3);
                                    }
                                    _ => {}
                                },
                                Some(Ok(event)) => match event_to_action(event) {
                                    Some(Action::Interrupt | Action::Escape) => {
                                        cancel_handle.cancel();
                                        state.status = "Stopping...".to_string();
                                    }
                                    Some(Action::Quit) => {
                                        cancel_handle.cancel();
                                        quit = true;
                                    }
                                    Some(Action::ToggleThinking) => state.toggle_thinking(),
                                    Some(Action::DismissError) => state.dismiss_error_locally(),
                                    Some(Action::PageUp) => {
                                        state.scroll = state.scroll.saturating_sub(10);
                                    }
                                    Some(Action::PageDown) => {
                                        state.scroll = state.scroll.saturating_add(10);
                                    }
                                    // Enter stays disabled until the reply ends
                                    Some(Action::Submit) => {}
                                    Some(action) => {
                                        state.input.handle_action(&action, area_width);
                                    }
                                    None => {}
                                },
                                Some(Err(_)) | None => {
                                    cancel_handle.cancel();
                                    quit = true;
                                }
                            }
                        }

                        _ = tick_interval.tick() => {}
                    }
                }
            }

            // Drain any remaining chat events after the request completes
            while let Ok(chat_event) = chat_rx.try_recv() {
                state.handle_chat_event(chat_event);
            }
            state.is_processing = false;
            state.input.set_busy(false);
            state.sync(session);

            if quit {
                break Ok(());
            }
            continue;
        }

        terminal.draw(|frame| state.render(frame))?;
        let area_width = terminal.size()?.width;

        tokio::select! {
            biased;

            event = event_stream.next() => {
                match event {
                    Some(Ok(Event::Mouse(mouse))) => match mouse.kind {
                        MouseEventKind::ScrollUp => {
                            state.scroll = state.scroll.saturating_sub(3);
                        }
                        MouseEventKind::ScrollDown => {
                            state.scroll = state.scroll.saturating_add(3);
                        }
                        _ => {}
                    },
                    Some(Ok(event)) => {
                        if let Some(action) = event_to_action(event)
                            && !state.handle_action(action, area_width).await
                        {
                            break Ok(());
                        }
                    }
                    Some(Err(e)) => {
                        break Err(anyhow::anyhow!("Event error: {}", e));
                    }
                    None => {
                        break Ok(());
                    }
                }
            }

            // Tick for animations
            _ = tick_interval.tick() => {}

            msg = ui_rx.recv() => {
                match msg {
                    Some(UiMessage::Submit(content)) => {
                        pending_prompt = Some(content);
                    }
                    Some(UiMessage::Command(cmd)) => {
                        if !apply_command(&mut state, session, &cmd) {
                            break Ok(());
                        }
                    }
                    Some(UiMessage::ChangeModel(index)) => {
                        if let Some(model) = available_models.get(index) {
                            session.push_notice(format!("Switched to: {}", model));
                            session.set_model(model.clone());
                            state.sync(session);
                        }
                    }
                    Some(UiMessage::Clear) => clear(&mut state, session),
                    Some(UiMessage::DismissError) => {
                        session.dismiss_error();
                        state.sync(session);
                    }
                    Some(UiMessage::Quit) | None => {
                        break Ok(());
                    }
                }
            }
        }
    };

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> (TuiState, mpsc::Receiver<UiMessage>) {
        let (tx, rx) = mpsc::channel(8);
        let state = TuiState::new(Theme::dark(), vec!["qwen3:8b".to_string()], tx);
        (state, rx)
    }

    #[test]
    fn test_mirror_follows_request_events() {
        let (mut state, _rx) = state();
        let user = Message::user("hi");
        let mut reply = Message::assistant_placeholder();
        let id = reply.id;

        state.handle_chat_event(ChatEvent::RequestStart {
            user,
            placeholder: reply.clone(),
        });
        assert!(state.is_processing);
        assert!(state.input.is_busy());
        assert_eq!(state.streaming, Some(id));

        reply.content = "Hello".to_string();
        state.handle_chat_event(ChatEvent::MessageUpdate {
            message: reply.clone(),
        });
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[1].content, "Hello");

        state.handle_chat_event(ChatEvent::MessageEnd { message: reply });
        assert_eq!(state.streaming, None);

        state.handle_chat_event(ChatEvent::RequestEnd {
            id,
            outcome: RequestOutcome::Finalized,
        });
        assert!(!state.is_processing);
        assert!(!state.input.is_busy());
        assert_eq!(state.status, "Ready");
    }

    #[test]
    fn test_removed_placeholder_and_error() {
        let (mut state, _rx) = state();
        let placeholder = Message::assistant_placeholder();
        let id = placeholder.id;
        state.handle_chat_event(ChatEvent::RequestStart {
            user: Message::user("hi"),
            placeholder,
        });
        state.handle_chat_event(ChatEvent::MessageRemoved { id });
        state.handle_chat_event(ChatEvent::Error {
            notice: ErrorNotice::UpstreamTimeout,
        });
        state.handle_chat_event(ChatEvent::RequestEnd {
            id,
            outcome: RequestOutcome::Failed,
        });

        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.error, Some(ErrorNotice::UpstreamTimeout));
        assert_eq!(state.status, "Failed");

        state.dismiss_error_locally();
        assert_eq!(state.error, None);
        assert_eq!(state.dismissed, Some(ErrorNotice::UpstreamTimeout));
    }

    #[tokio::test]
    async fn test_submit_routes_commands_and_messages() {
        let (mut state, mut rx) = state();

        state.input.set_content("  dear diary  ");
        assert!(state.handle_action(Action::Submit, 80).await);
        assert!(matches!(rx.try_recv(), Ok(UiMessage::Submit(s)) if s == "  dear diary  "));
        assert_eq!(state.input.content(), "");

        state.input.set_content(" /mode reasoning ");
        state.handle_action(Action::Submit, 80).await;
        assert!(matches!(rx.try_recv(), Ok(UiMessage::Command(s)) if s == "/mode reasoning"));

        state.input.set_content("   ");
        state.handle_action(Action::Submit, 80).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_model_picker_filters_and_picks() {
        let (mut state, mut rx) = state();
        state.available_models.push("llama3.1:8b".to_string());
        state.handle_action(Action::ModelSelect, 80).await;
        assert!(state.model_picker.visible);

        for c in "llama".chars() {
            state.handle_action(Action::Char(c), 80).await;
        }
        assert_eq!(state.model_picker.query(), "llama");
        assert_eq!(state.input.content(), "");

        state.handle_action(Action::Submit, 80).await;
        assert!(!state.model_picker.visible);
        assert!(matches!(rx.try_recv(), Ok(UiMessage::ChangeModel(1))));
    }

    #[tokio::test]
    async fn test_toggle_thinking_and_quit() {
        let (mut state, mut rx) = state();
        state.handle_action(Action::ToggleThinking, 80).await;
        assert!(state.transcript.show_thinking());
        assert_eq!(state.status, "Reasoning shown");

        assert!(!state.handle_action(Action::Escape, 80).await);
        assert!(matches!(rx.try_recv(), Ok(UiMessage::Quit)));
    }
}
