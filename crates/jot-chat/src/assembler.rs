//! Accumulates stream events into thinking/answer buffers

use jot_ai::{Stats, StreamEvent};

use crate::embedded::{TrailingStats, split_trailing_stats};
use crate::error::ErrorNotice;

/// What applying one event changed
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// Thinking buffer grew
    Thinking,
    /// Answer buffer grew; carries stats found embedded in the fragment
    Answer { stats: Option<Stats> },
    /// Stats reported on their own
    Stats(Stats),
    /// Response complete; carries the numbers on the done record
    Done(Stats),
    /// Backend reported a failure
    Error(ErrorNotice),
}

/// Buffers for the in-flight assistant message
#[derive(Debug, Default, Clone)]
pub struct ContentAssembler {
    thinking: String,
    answer: String,
    stats: Stats,
}

impl ContentAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one event
    pub fn apply(&mut self, event: StreamEvent) -> Update {
        match event {
            StreamEvent::Thinking { content } => {
                self.thinking.push_str(&content);
                Update::Thinking
            }
            StreamEvent::Answer { content } => match split_trailing_stats(&content) {
                TrailingStats::Found { text, stats } => {
                    self.answer.push_str(text);
                    self.stats.update(stats);
                    Update::Answer { stats: Some(stats) }
                }
                TrailingStats::Malformed | TrailingStats::Absent => {
                    self.answer.push_str(&content);
                    Update::Answer { stats: None }
                }
            },
            StreamEvent::Stats(stats) => {
                self.stats.update(stats);
                Update::Stats(stats)
            }
            StreamEvent::Done(stats) => {
                self.stats.fill_missing(stats);
                Update::Done(stats)
            }
            StreamEvent::Error { message } => {
                tracing::debug!("Stream reported error: {}", message);
                Update::Error(ErrorNotice::classify(&message))
            }
        }
    }

    pub fn thinking(&self) -> &str {
        &self.thinking
    }

    pub fn answer(&self) -> &str {
        &self.answer
    }

    /// Accumulated stats
    pub fn stats(&self) -> Stats {
        self.stats
    }
}
