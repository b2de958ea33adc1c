//! jot-ai: Journal backend client and chat stream decoding
//!
//! This crate talks to the journal backend over HTTP and turns the streamed
//! chat response into typed [`StreamEvent`]s.

pub mod client;
pub mod decoder;
pub mod error;
pub mod stream;
pub mod types;

pub use client::{ChatTransport, JournalClient};
pub use decoder::{SseDecoder, decode_stream};
pub use error::{Error, Result};
pub use stream::{ByteStream, StreamEvent, StreamOutcome};
pub use types::*;
