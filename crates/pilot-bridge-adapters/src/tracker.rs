use std::error::Error as StdError;
use std::sync::{Arc, Mutex, PoisonError};

use pilot_bridge_core::ErrorTracker;

/// Production tracker: captured failures end up in the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorTracker;

impl ErrorTracker for TracingErrorTracker {
    fn capture_exception(&self, error: &(dyn StdError + 'static)) {
        tracing::error!(error = %error, "captured exception");
    }

    fn capture_message(&self, message: &str) {
        tracing::warn!(captured = message, "captured message");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapturedError {
    Exception(String),
    Message(String),
}

impl CapturedError {
    pub fn text(&self) -> &str {
        match self {
            CapturedError::Exception(text) | CapturedError::Message(text) => text,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryErrorTracker {
    captured: Arc<Mutex<Vec<CapturedError>>>,
}

impl MemoryErrorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn captured(&self) -> Vec<CapturedError> {
        self.captured
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn push(&self, entry: CapturedError) {
        self.captured
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }
}

impl ErrorTracker for MemoryErrorTracker {
    fn capture_exception(&self, error: &(dyn StdError + 'static)) {
        self.push(CapturedError::Exception(error.to_string()));
    }

    fn capture_message(&self, message: &str) {
        self.push(CapturedError::Message(message.to_owned()));
    }
}
