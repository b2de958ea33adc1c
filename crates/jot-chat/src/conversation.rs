//! Conversation state: ordered messages and the in-flight assistant reply.

use chrono::Utc;
use jot_ai::{HistoryTurn, Message, MessageId, Role, Stats, StreamEvent};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::assembler::{ContentAssembler, Update};
use crate::error::ErrorNotice;

/// Welcome text shown before the first exchange
pub const DEFAULT_WELCOME: &str =
    "Hi! I'm your journaling assistant. Ask me about your entries, your writing, or anything on your mind.";

/// Lifecycle of an assistant reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageState {
    /// Placeholder appended, nothing received
    Created,
    /// At least one content event applied
    Receiving,
    /// Done received
    Finalized,
    /// Cancelled by the user
    Aborted,
    /// Ended by an error
    Failed,
}

impl MessageState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MessageState::Finalized | MessageState::Aborted | MessageState::Failed
        )
    }
}

/// Per-request state, alive for one send/receive cycle
#[derive(Debug)]
pub struct RequestContext {
    id: MessageId,
    token: CancellationToken,
    assembler: ContentAssembler,
}

impl RequestContext {
    pub fn new(id: MessageId, token: CancellationToken) -> Self {
        Self {
            id,
            token,
            assembler: ContentAssembler::new(),
        }
    }

    /// Id of the assistant message this request feeds
    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn assembler(&self) -> &ContentAssembler {
        &self.assembler
    }
}

/// Result of applying one stream event
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    /// In-flight message changed
    Updated,
    /// Done processed and the message kept
    Finalized,
    /// Done processed on an empty reply, which was dropped
    Discarded,
    /// Error processed
    Failed(ErrorNotice),
    /// Event belongs to a request that is no longer current
    Stale,
}

/// Ordered chat history with at most one in-flight assistant message
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<Message>,
    /// The assistant reply currently receiving events
    in_flight: Option<MessageId>,
    /// The user message that opened the in-flight turn
    prompt: Option<MessageId>,
    state: Option<MessageState>,
    error: Option<ErrorNotice>,
    welcome: Option<String>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::seeded(DEFAULT_WELCOME)
    }
}

impl Conversation {
    /// Start with a single display-only system message
    pub fn seeded(welcome: impl Into<String>) -> Self {
        let welcome = welcome.into();
        Self {
            messages: vec![Message::system(welcome.clone())],
            in_flight: None,
            prompt: None,
            state: None,
            error: None,
            welcome: Some(welcome),
        }
    }

    /// Start empty (no welcome message)
    pub fn empty() -> Self {
        Self {
            messages: Vec::new(),
            in_flight: None,
            prompt: None,
            state: None,
            error: None,
            welcome: None,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    fn get_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == id)
    }

    fn remove(&mut self, id: MessageId) -> Option<Message> {
        let pos = self.messages.iter().position(|m| m.id == id)?;
        Some(self.messages.remove(pos))
    }

    /// Id of the message currently receiving events
    pub fn in_flight(&self) -> Option<MessageId> {
        self.in_flight
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// State of the most recent reply
    pub fn state(&self) -> Option<MessageState> {
        self.state
    }

    /// Error banner contents, if any
    pub fn error(&self) -> Option<&ErrorNotice> {
        self.error.as_ref()
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    /// Append the user message and an assistant placeholder
    ///
    /// The text is stored as given. Returns `None` without touching state
    /// when the text is blank or a reply is already in flight.
    pub fn submit(&mut self, text: &str) -> Option<MessageId> {
        if text.trim().is_empty() {
            return None;
        }
        if self.in_flight.is_some() {
            tracing::debug!("Ignoring submit while a reply is in flight");
            return None;
        }

        let user = Message::user(text);
        let placeholder = Message::assistant_placeholder();
        let id = placeholder.id;

        self.prompt = Some(user.id);
        self.in_flight = Some(id);
        self.state = Some(MessageState::Created);
        self.error = None;
        self.messages.push(user);
        self.messages.push(placeholder);
        Some(id)
    }

    /// Route one stream event through the request's assembler onto the message
    pub fn apply_event(&mut self, ctx: &mut RequestContext, event: StreamEvent) -> Applied {
        if self.in_flight != Some(ctx.id) {
            tracing::debug!("Dropping stale stream event for {}", ctx.id);
            return Applied::Stale;
        }

        match ctx.assembler.apply(event) {
            Update::Thinking | Update::Answer { .. } => {
                let assembler = &ctx.assembler;
                if let Some(message) = self.get_mut(ctx.id) {
                    message.content.clear();
                    message.content.push_str(assembler.answer());
                    message.think = Some(assembler.thinking().to_string());
                    let mut stats = message.stats();
                    stats.update(assembler.stats());
                    message.set_stats(stats);
                }
                self.state = Some(MessageState::Receiving);
                Applied::Updated
            }
            Update::Stats(stats) => {
                if let Some(message) = self.get_mut(ctx.id) {
                    let mut current = message.stats();
                    current.update(stats);
                    message.set_stats(current);
                }
                Applied::Updated
            }
            Update::Done(stats) => self.finalize(ctx.id, stats),
            Update::Error(notice) => {
                self.fail(notice.clone());
                Applied::Failed(notice)
            }
        }
    }

    /// Commit the in-flight reply
    ///
    /// `stats` only fill fields that are still unset. A reply with no
    /// thinking, no answer and no stats is dropped.
    pub fn finalize(&mut self, id: MessageId, stats: Stats) -> Applied {
        if self.in_flight != Some(id) {
            return Applied::Stale;
        }
        self.in_flight = None;
        self.prompt = None;
        self.state = Some(MessageState::Finalized);

        let Some(message) = self.get_mut(id) else {
            return Applied::Discarded;
        };
        let mut current = message.stats();
        current.fill_missing(stats);
        message.set_stats(current);

        if message.is_blank() && current.is_empty() {
            tracing::debug!("Dropping empty reply {}", id);
            self.remove(id);
            return Applied::Discarded;
        }
        message.timestamp = Some(Utc::now());
        Applied::Finalized
    }

    /// Stop the in-flight reply
    ///
    /// The message is removed iff its answer is empty; otherwise it stays
    /// exactly as received. Returns whether a message was removed.
    pub fn abort_current(&mut self) -> bool {
        let Some(id) = self.in_flight.take() else {
            return false;
        };
        self.prompt = None;
        self.state = Some(MessageState::Aborted);

        let empty = self.get(id).is_some_and(|m| !m.has_content());
        if empty {
            self.remove(id);
        }
        empty
    }

    /// End the in-flight reply with an error and raise the banner
    ///
    /// The message is removed if it holds neither answer nor thinking text.
    pub fn fail(&mut self, notice: ErrorNotice) {
        if let Some(id) = self.in_flight.take() {
            self.prompt = None;
            self.state = Some(MessageState::Failed);
            if self.get(id).is_some_and(Message::is_blank) {
                self.remove(id);
            }
        }
        self.error = Some(notice);
    }

    /// Prior turns for an outbound request
    ///
    /// System messages and the in-flight turn are excluded.
    pub fn history(&self) -> Vec<HistoryTurn> {
        self.messages
            .iter()
            .filter(|m| m.role != Role::System)
            .filter(|m| Some(m.id) != self.in_flight && Some(m.id) != self.prompt)
            .map(Message::to_turn)
            .collect()
    }

    /// Reset to the welcome message; refused while a reply is in flight
    pub fn clear(&mut self) -> bool {
        if self.in_flight.is_some() {
            return false;
        }
        self.messages.clear();
        if let Some(ref welcome) = self.welcome {
            self.messages.push(Message::system(welcome.clone()));
        }
        self.state = None;
        self.error = None;
        true
    }

    /// Append a display-only system message
    pub fn push_notice(&mut self, text: impl Into<String>) {
        self.messages.push(Message::system(text));
    }
}
