//! Outbound queue
//!
//! Strict FIFO across every command kind. Entries carry a deadline and are
//! dropped unsent once it passes.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use tuyalan_core::Message;

#[derive(Debug, Clone)]
pub(crate) struct QueuedMessage {
    pub message: Message,
    pub encrypt: bool,
    pub expects_response: bool,
    pub expires_at: Instant,
}

impl QueuedMessage {
    pub fn new(message: Message, encrypt: bool, expects_response: bool, ttl: Duration) -> Self {
        Self {
            message,
            encrypt,
            expects_response,
            expires_at: Instant::now() + ttl,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Default)]
pub(crate) struct OutboundQueue {
    entries: VecDeque<QueuedMessage>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: QueuedMessage) {
        self.entries.push_back(entry);
    }

    /// Drop expired entries and pop the oldest survivor
    ///
    /// Returns the popped entry together with the expired ones so the
    /// caller can account for them.
    pub fn next(&mut self, now: Instant) -> (Option<QueuedMessage>, Vec<QueuedMessage>) {
        let mut expired = Vec::new();
        self.entries.retain(|entry| {
            if entry.is_expired(now) {
                expired.push(entry.clone());
                false
            } else {
                true
            }
        });

        (self.entries.pop_front(), expired)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
