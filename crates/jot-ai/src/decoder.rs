//! Chat stream decoding
//!
//! The backend answers `/ai/chat-stream` with one JSON record per line, either
//! as SSE (`data: {...}`) or as bare NDJSON. Chunks arrive at arbitrary byte
//! boundaries, so [`SseDecoder`] buffers until a full line is available and
//! only then parses it.

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::stream::{ByteStream, StreamEvent, StreamOutcome, WireRecord};

/// Message shown when the transport times out while waiting for the model
const TRANSPORT_TIMEOUT_MESSAGE: &str = "The model took too long to respond";

/// Incremental line decoder for the chat stream
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every event completed by it
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = decode_line(&line[..line.len() - 1]) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a final unterminated line at end of stream
    pub fn finish(&mut self) -> Option<StreamEvent> {
        let rest = std::mem::take(&mut self.buffer);
        let text = String::from_utf8_lossy(&rest);
        let payload = line_payload(text.trim())?;
        match serde_json::from_str::<WireRecord>(payload) {
            Ok(record) => convert(record),
            Err(e) => {
                tracing::warn!("Dropping truncated stream record: {}", e);
                None
            }
        }
    }

    /// Whether bytes are waiting for a line terminator
    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty()
    }
}

/// Strip SSE framing, returning the JSON payload if the line carries one
fn line_payload(line: &str) -> Option<&str> {
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    let payload = if let Some(data) = line.strip_prefix("data:") {
        data.trim_start()
    } else if line.starts_with('{') {
        line
    } else {
        // event:, id:, retry: and anything else
        return None;
    };
    if payload.is_empty() || payload == "[DONE]" {
        return None;
    }
    Some(payload)
}

fn decode_line(raw: &[u8]) -> Option<StreamEvent> {
    let text = match std::str::from_utf8(raw) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!("Skipping non-UTF-8 stream line: {}", e);
            return None;
        }
    };
    let payload = line_payload(text.trim_end_matches('\r').trim())?;
    match serde_json::from_str::<WireRecord>(payload) {
        Ok(record) => convert(record),
        Err(e) => {
            tracing::warn!("Skipping malformed stream record: {} ({})", e, payload);
            None
        }
    }
}

fn convert(record: WireRecord) -> Option<StreamEvent> {
    let kind = record.kind.clone();
    let event = StreamEvent::from_record(record);
    if event.is_none() {
        tracing::warn!("Skipping unknown stream event type: {}", kind);
    }
    event
}

/// Drive a response body to completion, invoking `on_event` once per event
///
/// The token is checked before every chunk. Once it fires nothing else is
/// emitted and [`StreamOutcome::Aborted`] is returned.
pub async fn decode_stream<F>(
    mut bytes: ByteStream,
    cancel: &CancellationToken,
    mut on_event: F,
) -> StreamOutcome
where
    F: FnMut(StreamEvent),
{
    let mut decoder = SseDecoder::new();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return StreamOutcome::Aborted,
            next = bytes.next() => next,
        };

        match next {
            Some(Ok(chunk)) => {
                for event in decoder.push(&chunk) {
                    if cancel.is_cancelled() {
                        return StreamOutcome::Aborted;
                    }
                    let terminal = event.is_terminal();
                    on_event(event);
                    if terminal {
                        return StreamOutcome::Completed;
                    }
                }
            }
            Some(Err(e)) => {
                if cancel.is_cancelled() {
                    return StreamOutcome::Aborted;
                }
                tracing::debug!("Chat stream transport error: {}", e);
                let message = if e.is_upstream_timeout() {
                    TRANSPORT_TIMEOUT_MESSAGE.to_string()
                } else {
                    e.to_string()
                };
                on_event(StreamEvent::error(message));
                return StreamOutcome::Failed;
            }
            None => {
                if decoder.has_pending() {
                    tracing::debug!("Chat stream closed mid-record, flushing tail");
                }
                if let Some(event) = decoder.finish() {
                    on_event(event);
                }
                return StreamOutcome::Completed;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::types::Stats;
    use bytes::Bytes;

    fn byte_stream(chunks: Vec<crate::Result<Bytes>>) -> ByteStream {
        Box::pin(futures::stream::iter(chunks))
    }

    fn ok(s: &str) -> crate::Result<Bytes> {
        Ok(Bytes::from(s.to_string()))
    }

    #[test]
    fn test_split_record_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"type\":\"ans").is_empty());
        assert!(decoder.has_pending());
        let events = decoder.push(b"wer\",\"content\":\"hi\"}\n");
        assert_eq!(events, vec![StreamEvent::answer("hi")]);
        assert!(!decoder.has_pending());
    }

    #[test]
    fn test_utf8_split_across_chunks() {
        let line = "data: {\"type\":\"answer\",\"content\":\"caf\u{e9} \u{1F600}\"}\n";
        let bytes = line.as_bytes();
        // Split inside the 4-byte emoji
        let cut = bytes.len() - 6;
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(&bytes[..cut]).is_empty());
        let events = decoder.push(&bytes[cut..]);
        assert_eq!(events, vec![StreamEvent::answer("caf\u{e9} \u{1F600}")]);
    }

    #[test]
    fn test_multiple_records_in_one_chunk() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(
            b"data: {\"type\":\"thinking\",\"content\":\"a\"}\n\ndata: {\"type\":\"answer\",\"content\":\"b\"}\n\n",
        );
        assert_eq!(
            events,
            vec![StreamEvent::thinking("a"), StreamEvent::answer("b")]
        );
    }

    #[test]
    fn test_ndjson_and_crlf() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"{\"type\":\"answer\",\"content\":\"x\"}\r\n");
        assert_eq!(events, vec![StreamEvent::answer("x")]);
    }

    #[test]
    fn test_ignores_comments_fields_and_done_marker() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b": keepalive\nevent: message\nid: 4\nretry: 100\ndata: [DONE]\n");
        assert!(events.is_empty());
    }

    #[test]
    fn test_malformed_record_skipped() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(
            b"data: {not json}\ndata: {\"type\":\"answer\",\"content\":\"ok\"}\n",
        );
        assert_eq!(events, vec![StreamEvent::answer("ok")]);
    }

    #[test]
    fn test_finish_flushes_complete_tail() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"type\":\"done\"}").is_empty());
        assert_eq!(decoder.finish(), Some(StreamEvent::Done(Stats::default())));
    }

    #[test]
    fn test_finish_drops_truncated_tail() {
        let mut decoder = SseDecoder::new();
        decoder.push(b"data: {\"type\":\"answer\",\"cont");
        assert_eq!(decoder.finish(), None);
        assert!(!decoder.has_pending());
    }

    #[tokio::test]
    async fn test_decode_stream_in_order() {
        let stream = byte_stream(vec![
            ok("data: {\"type\":\"thinking\",\"content\":\"step1 \"}\n"),
            ok("data: {\"type\":\"thinking\",\"content\":\"step2\"}\ndata: {\"type\":\"ans"),
            ok("wer\",\"content\":\"42\"}\n"),
            ok("data: {\"type\":\"done\"}\n"),
        ]);
        let token = CancellationToken::new();
        let mut events = Vec::new();
        let outcome = decode_stream(stream, &token, |e| events.push(e)).await;

        assert_eq!(outcome, StreamOutcome::Completed);
        assert_eq!(
            events,
            vec![
                StreamEvent::thinking("step1 "),
                StreamEvent::thinking("step2"),
                StreamEvent::answer("42"),
                StreamEvent::Done(Stats::default()),
            ]
        );
    }

    #[tokio::test]
    async fn test_decode_stream_stops_after_done() {
        let stream = byte_stream(vec![ok(
            "data: {\"type\":\"done\"}\ndata: {\"type\":\"answer\",\"content\":\"late\"}\n",
        )]);
        let token = CancellationToken::new();
        let mut events = Vec::new();
        decode_stream(stream, &token, |e| events.push(e)).await;
        assert_eq!(events, vec![StreamEvent::Done(Stats::default())]);
    }

    #[tokio::test]
    async fn test_decode_stream_cancelled_before_read() {
        let stream = byte_stream(vec![ok("data: {\"type\":\"answer\",\"content\":\"x\"}\n")]);
        let token = CancellationToken::new();
        token.cancel();
        let mut events = Vec::new();
        let outcome = decode_stream(stream, &token, |e| events.push(e)).await;
        assert_eq!(outcome, StreamOutcome::Aborted);
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_decode_stream_cancelled_mid_stream() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        let stream: ByteStream = Box::pin(async_stream::stream! {
            yield ok("data: {\"type\":\"answer\",\"content\":\"first\"}\n");
            trigger.cancel();
            yield ok("data: {\"type\":\"answer\",\"content\":\"second\"}\n");
        });
        let mut events = Vec::new();
        let outcome = decode_stream(stream, &token, |e| events.push(e)).await;
        assert_eq!(outcome, StreamOutcome::Aborted);
        assert_eq!(events, vec![StreamEvent::answer("first")]);
    }

    #[tokio::test]
    async fn test_decode_stream_transport_error() {
        let stream = byte_stream(vec![
            ok("data: {\"type\":\"answer\",\"content\":\"part\"}\n"),
            Err(Error::Stream("connection reset".into())),
            ok("data: {\"type\":\"answer\",\"content\":\"never\"}\n"),
        ]);
        let token = CancellationToken::new();
        let mut events = Vec::new();
        let outcome = decode_stream(stream, &token, |e| events.push(e)).await;

        assert_eq!(outcome, StreamOutcome::Failed);
        assert_eq!(events.len(), 2);
        assert!(
            matches!(&events[1], StreamEvent::Error { message } if message.contains("connection reset"))
        );
    }

    #[tokio::test]
    async fn test_decode_stream_end_without_done() {
        let stream = byte_stream(vec![ok("{\"type\":\"answer\",\"content\":\"a\"}\n")]);
        let token = CancellationToken::new();
        let mut events = Vec::new();
        let outcome = decode_stream(stream, &token, |e| events.push(e)).await;
        assert_eq!(outcome, StreamOutcome::Completed);
        assert_eq!(events, vec![StreamEvent::answer("a")]);
    }

    #[tokio::test]
    async fn test_decode_stream_flushes_unterminated_tail() {
        let stream = byte_stream(vec![
            ok("data: {\"type\":\"answer\",\"content\":\"a\"}\n"),
            ok("data: {\"type\":\"answer\",\"content\":\"b\"}"),
        ]);
        let token = CancellationToken::new();
        let mut events = Vec::new();
        let outcome = decode_stream(stream, &token, |e| events.push(e)).await;
        assert_eq!(outcome, StreamOutcome::Completed);
        assert_eq!(events, vec![StreamEvent::answer("a"), StreamEvent::answer("b")]);
    }
}
