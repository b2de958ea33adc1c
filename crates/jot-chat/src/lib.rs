//! jot-chat: Conversation state and streaming request lifecycle
//!
//! This crate turns decoded stream events into an ordered conversation with
//! one interruptible in-flight assistant reply.

pub mod assembler;
pub mod cancel;
pub mod conversation;
pub mod embedded;
pub mod error;
pub mod events;
pub mod session;

pub use assembler::{ContentAssembler, Update};
pub use cancel::CancellationController;
pub use conversation::{Applied, Conversation, MessageState, RequestContext};
pub use error::{Error, ErrorNotice, Result};
pub use events::{ChatEvent, RequestOutcome};
pub use session::{ChatSession, SessionConfig};
