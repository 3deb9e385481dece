//! Request/response correlation
//!
//! Maps the sequence number of each in-flight request to the task waiting
//! for its response. An entry is resolved at most once.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use tuyalan_core::Message;

use crate::error::Result;

pub(crate) type Waiter = oneshot::Receiver<Result<Message>>;

#[derive(Debug, Default)]
pub(crate) struct ListenerRegistry {
    pending: Mutex<HashMap<u32, oneshot::Sender<Result<Message>>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a sequence number
    ///
    /// Returns `None` if the number is still held by another request.
    pub fn register(&self, sequence: u32) -> Option<Waiter> {
        match self.pending.lock().entry(sequence) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let (tx, rx) = oneshot::channel();
                slot.insert(tx);
                Some(rx)
            }
        }
    }

    /// Hand a result to the waiter of `sequence`
    ///
    /// Returns `false` if nobody holds that sequence number.
    pub fn resolve(&self, sequence: u32, result: Result<Message>) -> bool {
        match self.take(sequence) {
            Some(tx) => {
                // A waiter that already gave up is not an error
                let _ = tx.send(result);
                true
            }
            None => false,
        }
    }

    /// Remove the entry for `sequence` and return its sender
    pub fn take(&self, sequence: u32) -> Option<oneshot::Sender<Result<Message>>> {
        self.pending.lock().remove(&sequence)
    }

    pub fn remove(&self, sequence: u32) -> bool {
        self.pending.lock().remove(&sequence).is_some()
    }

    /// Tie the entry for `sequence` to the returned guard
    ///
    /// The entry is removed when the guard drops, including when the
    /// waiting future is cancelled.
    pub fn hold(&self, sequence: u32) -> Registration<'_> {
        Registration {
            registry: self,
            sequence,
        }
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Drop every pending entry, waking waiters with a closed channel
    pub fn clear(&self) {
        self.pending.lock().clear();
    }
}

/// Releases a sequence number on drop
#[derive(Debug)]
pub(crate) struct Registration<'a> {
    registry: &'a ListenerRegistry,
    sequence: u32,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.registry.remove(self.sequence);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tuyalan_core::Command;

    #[tokio::test]
    async fn test_resolve_wakes_waiter() {
        let registry = ListenerRegistry::new();
        let rx = registry.register(42).unwrap();

        let message = Message::new(Command::Get, 42);
        assert!(registry.resolve(42, Ok(message.clone())));

        assert_eq!(rx.await.unwrap().unwrap(), message);
        assert!(registry.take(42).is_none());
    }

    #[test]
    fn test_sequence_not_reused_while_pending() {
        let registry = ListenerRegistry::new();
        let _rx = registry.register(7).unwrap();

        assert!(registry.register(7).is_none());
        assert!(registry.remove(7));
        assert!(registry.register(7).is_some());
    }

    #[test]
    fn test_unmatched_sequence_ignored() {
        let registry = ListenerRegistry::new();
        let _rx = registry.register(98).unwrap();

        assert!(!registry.resolve(99, Ok(Message::new(Command::GratuitousUpdate, 99))));
        assert!(registry.take(99).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_registration_releases_on_drop() {
        let registry = ListenerRegistry::new();
        let _rx = registry.register(5).unwrap();

        {
            let _held = registry.hold(5);
            assert_eq!(registry.len(), 1);
        }

        assert_eq!(registry.len(), 0);
        assert!(registry.register(5).is_some());
    }

    #[tokio::test]
    async fn test_clear_closes_waiters() {
        let registry = ListenerRegistry::new();
        let rx = registry.register(1).unwrap();

        registry.clear();
        assert_eq!(registry.len(), 0);
        assert!(rx.await.is_err());
    }
}
