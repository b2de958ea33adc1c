//! One cancellation token per in-flight request.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// A cloneable handle that owns the token of the current request.
///
/// Clones share state, so the UI can keep one to stop a request while the
/// session drives it.
#[derive(Clone, Default)]
pub struct CancellationController {
    active: Arc<Mutex<Option<CancellationToken>>>,
}

impl CancellationController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out a fresh token for a new request.
    pub fn begin(&self) -> Result<CancellationToken> {
        let mut active = self.active.lock();
        if active.is_some() {
            return Err(Error::RequestInFlight);
        }
        let token = CancellationToken::new();
        *active = Some(token.clone());
        Ok(token)
    }

    /// Signal abort to the active request. No-op when idle.
    pub fn cancel(&self) {
        if let Some(token) = self.active.lock().as_ref() {
            tracing::debug!("Cancelling in-flight request");
            token.cancel();
        }
    }

    /// Drop the active token. Called once the request is fully wound down.
    pub fn end(&self) {
        self.active.lock().take();
    }

    /// Whether a request currently holds a token.
    pub fn is_active(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Whether the active request has been asked to stop.
    pub fn is_cancelling(&self) -> bool {
        self.active
            .lock()
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }
}
