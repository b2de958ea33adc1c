//! Streaming event types

use crate::error::Result;
use crate::types::Stats;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_stream::Stream;

/// Events emitted by the chat backend while a response streams in
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Reasoning trace fragment
    Thinking { content: String },
    /// Answer text fragment (may carry a trailing stats object)
    Answer { content: String },
    /// Timing figures reported mid-stream
    Stats(Stats),
    /// Backend-reported failure
    Error { message: String },
    /// Response complete
    Done(Stats),
}

impl StreamEvent {
    /// Check if this is a terminal event (Done or Error)
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done(_) | StreamEvent::Error { .. })
    }

    pub fn thinking(content: impl Into<String>) -> Self {
        StreamEvent::Thinking {
            content: content.into(),
        }
    }

    pub fn answer(content: impl Into<String>) -> Self {
        StreamEvent::Answer {
            content: content.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        StreamEvent::Error {
            message: message.into(),
        }
    }

    /// Convert a decoded wire record, `None` for unknown kinds
    pub fn from_record(record: WireRecord) -> Option<Self> {
        let stats = Stats {
            inference_time: record.inference_time,
            tokens_per_second: record.tokens_per_second,
        };
        let content = record.content.unwrap_or_default();
        match record.kind.as_str() {
            "thinking" => Some(StreamEvent::Thinking { content }),
            "answer" | "chunk" => Some(StreamEvent::Answer { content }),
            "stats" => Some(StreamEvent::Stats(stats)),
            "error" => Some(StreamEvent::Error {
                message: if content.is_empty() {
                    "Unknown streaming error".to_string()
                } else {
                    content
                },
            }),
            "done" => Some(StreamEvent::Done(stats)),
            _ => None,
        }
    }
}

/// One JSON record as it appears on the wire
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireRecord {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inference_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_per_second: Option<f64>,
}

/// How a decoded stream ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Stream ended or a terminal record arrived
    Completed,
    /// The cancellation token fired
    Aborted,
    /// The transport broke; one error event was emitted
    Failed,
}

/// Raw response body chunks
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;
