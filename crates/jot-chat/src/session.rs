//! Drives one chat request at a time against a transport

use jot_ai::{ChatMode, ChatRequest, ChatTransport, MessageId, Stats, StreamOutcome, decode_stream};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::{
    cancel::CancellationController,
    conversation::{Applied, Conversation, DEFAULT_WELCOME, MessageState, RequestContext},
    error::{Error, ErrorNotice, Result},
    events::{ChatEvent, RequestOutcome},
};

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Model identifier; backend default when unset
    pub model: Option<String>,
    /// Simple or reasoning mode
    pub mode: ChatMode,
    /// System prompt sent with every request
    pub system_prompt: Option<String>,
    /// Display-only welcome message
    pub welcome: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: None,
            mode: ChatMode::default(),
            system_prompt: None,
            welcome: DEFAULT_WELCOME.to_string(),
        }
    }
}

/// Releases the request token however the cycle ends
struct EndGuard(CancellationController);

impl Drop for EndGuard {
    fn drop(&mut self) {
        self.0.end();
    }
}

/// A conversation bound to a transport
pub struct ChatSession {
    config: SessionConfig,
    conversation: Conversation,
    transport: Arc<dyn ChatTransport>,
    event_tx: broadcast::Sender<ChatEvent>,
    cancel: CancellationController,
}

impl ChatSession {
    /// Create a new session
    pub fn new(config: SessionConfig, transport: Arc<dyn ChatTransport>) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            conversation: Conversation::seeded(config.welcome.clone()),
            config,
            transport,
            event_tx,
            cancel: CancellationController::new(),
        }
    }

    /// Subscribe to chat events
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.event_tx.subscribe()
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Handle for stopping the current request from outside
    pub fn cancel_handle(&self) -> CancellationController {
        self.cancel.clone()
    }

    /// Stop the current request, if any
    pub fn abort(&self) {
        self.cancel.cancel();
    }

    pub fn is_running(&self) -> bool {
        self.cancel.is_active()
    }

    pub fn model(&self) -> Option<&str> {
        self.config.model.as_deref()
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.config.model = Some(model.into());
    }

    pub fn mode(&self) -> ChatMode {
        self.config.mode
    }

    pub fn set_mode(&mut self, mode: ChatMode) {
        self.config.mode = mode;
    }

    pub fn set_system_prompt(&mut self, prompt: Option<String>) {
        self.config.system_prompt = prompt;
    }

    pub fn dismiss_error(&mut self) {
        self.conversation.dismiss_error();
    }

    /// Reset the conversation; refused while a request runs
    pub fn clear(&mut self) -> bool {
        self.conversation.clear()
    }

    /// Add a display-only note to the conversation
    pub fn push_notice(&mut self, text: impl Into<String>) {
        self.conversation.push_notice(text);
    }

    /// Send a message and stream the reply into the conversation
    pub async fn send(&mut self, text: &str) -> Result<RequestOutcome> {
        if text.trim().is_empty() {
            return Err(Error::EmptyInput);
        }
        let token = self.cancel.begin()?;
        let _guard = EndGuard(self.cancel.clone());

        let history = self.conversation.history();
        let Some(id) = self.conversation.submit(text) else {
            return Err(Error::RequestInFlight);
        };
        self.emit_start(id);

        let request = ChatRequest::new(text, history)
            .with_model(self.config.model.clone())
            .with_system_prompt(self.config.system_prompt.clone())
            .with_mode(self.config.mode);
        let mut ctx = RequestContext::new(id, token);

        let outcome = self.run_request(&mut ctx, &request).await;
        tracing::debug!(id = %id, ?outcome, "Chat request finished");

        let _ = self.event_tx.send(ChatEvent::RequestEnd { id, outcome });
        Ok(outcome)
    }

    fn emit_start(&self, id: MessageId) {
        let messages = self.conversation.messages();
        if let [.., user, placeholder] = messages {
            if placeholder.id == id {
                let _ = self.event_tx.send(ChatEvent::RequestStart {
                    user: user.clone(),
                    placeholder: placeholder.clone(),
                });
            }
        }
    }

    async fn run_request(
        &mut self,
        ctx: &mut RequestContext,
        request: &ChatRequest,
    ) -> RequestOutcome {
        let token = ctx.token().clone();

        let opened = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            result = self.transport.chat_stream(request) => Some(result),
        };

        let stream = match opened {
            None => return self.finish_aborted(ctx.id()),
            Some(Ok(stream)) => stream,
            Some(Err(e)) => {
                tracing::warn!("Failed to open chat stream: {}", e);
                let notice = ErrorNotice::from_error(&e);
                self.conversation.fail(notice.clone());
                self.emit_failure(ctx.id(), notice);
                return RequestOutcome::Failed;
            }
        };

        let conversation = &mut self.conversation;
        let event_tx = &self.event_tx;
        let outcome = decode_stream(stream, &token, |event| {
            let applied = conversation.apply_event(ctx, event);
            Self::publish(conversation, event_tx, ctx.id(), applied);
        })
        .await;

        match outcome {
            StreamOutcome::Aborted => self.finish_aborted(ctx.id()),
            StreamOutcome::Failed => RequestOutcome::Failed,
            StreamOutcome::Completed => {
                if self.conversation.in_flight() == Some(ctx.id()) {
                    tracing::debug!("Stream ended without done; finalizing");
                    let applied = self.conversation.finalize(ctx.id(), Stats::default());
                    Self::publish(&self.conversation, &self.event_tx, ctx.id(), applied);
                }
                match self.conversation.state() {
                    Some(MessageState::Failed) => RequestOutcome::Failed,
                    _ => RequestOutcome::Finalized,
                }
            }
        }
    }

    fn finish_aborted(&mut self, id: MessageId) -> RequestOutcome {
        let removed = self.conversation.abort_current();
        let event = match self.conversation.get(id) {
            Some(message) if !removed => ChatEvent::MessageEnd {
                message: message.clone(),
            },
            _ => ChatEvent::MessageRemoved { id },
        };
        let _ = self.event_tx.send(event);
        RequestOutcome::Aborted
    }

    fn emit_failure(&self, id: MessageId, notice: ErrorNotice) {
        let event = match self.conversation.get(id) {
            Some(message) => ChatEvent::MessageEnd {
                message: message.clone(),
            },
            None => ChatEvent::MessageRemoved { id },
        };
        let _ = self.event_tx.send(event);
        let _ = self.event_tx.send(ChatEvent::Error { notice });
    }

    /// Broadcast the effect of one applied event
    fn publish(
        conversation: &Conversation,
        event_tx: &broadcast::Sender<ChatEvent>,
        id: MessageId,
        applied: Applied,
    ) {
        let message = conversation.get(id).cloned();
        let event = match (applied, message) {
            (Applied::Stale, _) => return,
            (Applied::Failed(notice), message) => {
                let _ = event_tx.send(match message {
                    Some(message) => ChatEvent::MessageEnd { message },
                    None => ChatEvent::MessageRemoved { id },
                });
                ChatEvent::Error { notice }
            }
            (Applied::Updated, Some(message)) => ChatEvent::MessageUpdate { message },
            (Applied::Finalized, Some(message)) => ChatEvent::MessageEnd { message },
            (Applied::Updated | Applied::Finalized | Applied::Discarded, _) => {
                ChatEvent::MessageRemoved { id }
            }
        };
        let _ = event_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use jot_ai::{ByteStream, Role};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    /// A transport that plays back canned body chunks.
    struct MockTransport {
        chunks: Vec<&'static str>,
        requests: Arc<Mutex<Vec<ChatRequest>>>,
        fail_with: Option<u16>,
    }

    impl MockTransport {
        fn new(chunks: Vec<&'static str>) -> Self {
            Self {
                chunks,
                requests: Arc::new(Mutex::new(Vec::new())),
                fail_with: None,
            }
        }

        fn failing(status: u16) -> Self {
            Self {
                fail_with: Some(status),
                ..Self::new(vec![])
            }
        }
    }

    #[async_trait]
    impl ChatTransport for MockTransport {
        async fn chat_stream(&self, request: &ChatRequest) -> jot_ai::Result<ByteStream> {
            self.requests.lock().push(request.clone());
            if let Some(status) = self.fail_with {
                return Err(jot_ai::Error::api(status, "boom"));
            }
            let chunks: Vec<jot_ai::Result<Bytes>> = self
                .chunks
                .iter()
                .map(|c| Ok(Bytes::from_static(c.as_bytes())))
                .collect();
            Ok(Box::pin(futures::stream::iter(chunks)))
        }
    }

    /// Emits one answer chunk, then cancels through the shared controller.
    struct CancellingTransport {
        controller: Mutex<Option<CancellationController>>,
        first: &'static str,
    }

    #[async_trait]
    impl ChatTransport for CancellingTransport {
        async fn chat_stream(&self, _request: &ChatRequest) -> jot_ai::Result<ByteStream> {
            let controller = self.controller.lock().clone();
            let first = self.first;
            Ok(Box::pin(async_stream::stream! {
                yield Ok(Bytes::from_static(first.as_bytes()));
                if let Some(controller) = controller {
                    controller.cancel();
                }
                yield Ok(Bytes::from_static(b"data: {\"type\":\"answer\",\"content\":\" late\"}\n"));
                yield Ok(Bytes::from_static(b"data: {\"type\":\"done\"}\n"));
            }))
        }
    }

    fn make_session(transport: Arc<dyn ChatTransport>) -> ChatSession {
        ChatSession::new(
            SessionConfig {
                model: Some("qwen3:8b".into()),
                welcome: "welcome".into(),
                ..SessionConfig::default()
            },
            transport,
        )
    }

    #[tokio::test]
    async fn test_send_streams_into_conversation() {
        let transport = Arc::new(MockTransport::new(vec![
            "data: {\"type\":\"thinking\",\"content\":\"step1 \"}\n",
            "data: {\"type\":\"thinking\",\"content\":\"step2\"}\n",
            "data: {\"type\":\"answer\",\"content\":\"42\"}\n",
            "data: {\"type\":\"done\",\"inference_time\":300,\"tokens_per_second\":12}\n",
        ]));
        let mut session = make_session(transport.clone());
        let mut rx = session.subscribe();

        let outcome = session.send("what is 6*7?").await.unwrap();
        assert_eq!(outcome, RequestOutcome::Finalized);
        assert!(!session.is_running());

        let messages = session.conversation().messages();
        assert_eq!(messages.len(), 3);
        let reply = &messages[2];
        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(reply.think.as_deref(), Some("step1 step2"));
        assert_eq!(reply.content, "42");
        assert_eq!(reply.inference_time, Some(300.0));

        let mut saw_end = false;
        while let Ok(event) = rx.try_recv() {
            if event.is_terminal() {
                saw_end = true;
            }
        }
        assert!(saw_end);

        let requests = transport.requests.lock();
        assert_eq!(requests[0].message, "what is 6*7?");
        assert_eq!(requests[0].model.as_deref(), Some("qwen3:8b"));
        assert!(requests[0].history.is_empty());
    }

    #[tokio::test]
    async fn test_history_sent_on_second_turn() {
        let transport = Arc::new(MockTransport::new(vec![
            "data: {\"type\":\"answer\",\"content\":\"hey\"}\ndata: {\"type\":\"done\"}\n",
        ]));
        let mut session = make_session(transport.clone());
        session.send("hi").await.unwrap();
        session.send("again").await.unwrap();

        let requests = transport.requests.lock();
        let history = &requests[1].history;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "hi");
        assert_eq!(history[1].content, "hey");
    }

    #[tokio::test]
    async fn test_message_text_sent_verbatim() {
        let transport = Arc::new(MockTransport::new(vec![
            "data: {\"type\":\"done\"}\n",
        ]));
        let mut session = make_session(transport.clone());
        let text = "  fn main() {}\n    indented\n";
        session.send(text).await.unwrap();

        assert_eq!(transport.requests.lock()[0].message, text);
        let user = session
            .conversation()
            .messages()
            .iter()
            .find(|m| m.role == Role::User)
            .unwrap();
        assert_eq!(user.content, text);
    }

    #[tokio::test]
    async fn test_blank_send_is_rejected() {
        let transport = Arc::new(MockTransport::new(vec![]));
        let mut session = make_session(transport.clone());
        assert!(matches!(session.send("   ").await, Err(Error::EmptyInput)));
        assert_eq!(session.conversation().len(), 1);
        assert!(transport.requests.lock().is_empty());
        assert!(!session.is_running());
    }

    #[tokio::test]
    async fn test_open_failure_removes_placeholder_and_sets_banner() {
        let mut session = make_session(Arc::new(MockTransport::failing(500)));
        let outcome = session.send("hi").await.unwrap();

        assert_eq!(outcome, RequestOutcome::Failed);
        assert_eq!(session.conversation().len(), 2);
        assert!(session.conversation().error().is_some());
        assert!(!session.is_running());
    }

    #[tokio::test]
    async fn test_gateway_timeout_becomes_friendly_notice() {
        let mut session = make_session(Arc::new(MockTransport::failing(504)));
        session.send("hi").await.unwrap();
        assert_eq!(
            session.conversation().error(),
            Some(&ErrorNotice::UpstreamTimeout)
        );
    }

    #[tokio::test]
    async fn test_error_event_keeps_partial_answer() {
        let transport = Arc::new(MockTransport::new(vec![
            "data: {\"type\":\"answer\",\"content\":\"partial\"}\n",
            "data: {\"type\":\"error\",\"content\":\"Model took too long to respond\"}\n",
        ]));
        let mut session = make_session(transport);
        let outcome = session.send("hi").await.unwrap();

        assert_eq!(outcome, RequestOutcome::Failed);
        assert_eq!(session.conversation().messages()[2].content, "partial");
        assert_eq!(
            session.conversation().error(),
            Some(&ErrorNotice::UpstreamTimeout)
        );
    }

    #[tokio::test]
    async fn test_stream_end_without_done_finalizes() {
        let transport = Arc::new(MockTransport::new(vec![
            "data: {\"type\":\"answer\",\"content\":\"cut short\"}\n",
        ]));
        let mut session = make_session(transport);
        let outcome = session.send("hi").await.unwrap();
        assert_eq!(outcome, RequestOutcome::Finalized);
        assert!(session.conversation().messages()[2].timestamp.is_some());
    }

    #[tokio::test]
    async fn test_cancel_mid_stream_keeps_partial_content() {
        let transport = Arc::new(CancellingTransport {
            controller: Mutex::new(None),
            first: "data: {\"type\":\"answer\",\"content\":\"so far\"}\n",
        });
        let mut session = make_session(transport.clone());
        *transport.controller.lock() = Some(session.cancel_handle());

        let outcome = session.send("hi").await.unwrap();
        assert_eq!(outcome, RequestOutcome::Aborted);
        assert!(!session.is_running());
        assert!(session.conversation().error().is_none());

        let messages = session.conversation().messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2].content, "so far");
    }

    #[tokio::test]
    async fn test_cancel_mid_stream_without_content_removes_message() {
        let transport = Arc::new(CancellingTransport {
            controller: Mutex::new(None),
            first: "data: {\"type\":\"thinking\",\"content\":\"hmm\"}\n",
        });
        let mut session = make_session(transport.clone());
        *transport.controller.lock() = Some(session.cancel_handle());

        let outcome = session.send("hi").await.unwrap();
        assert_eq!(outcome, RequestOutcome::Aborted);
        assert_eq!(session.conversation().len(), 2);
        assert_eq!(session.conversation().messages()[1].role, Role::User);

        // Controller is free again
        let transport: Arc<dyn ChatTransport> =
            Arc::new(MockTransport::new(vec!["data: {\"type\":\"done\"}\n"]));
        session.transport = transport;
        assert!(session.send("retry").await.is_ok());
    }
}
