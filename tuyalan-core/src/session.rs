//! Session state tracking for the Tuya local protocol
//!
//! A session represents one device endpoint and tracks:
//! - Link state (disconnected, connecting, connected)
//! - The terminal `disabled` flag
//! - Sequence numbers for request/response correlation
//! - Keepalive liveness (last ping sent, last pong seen)

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use crate::error::{Error, Result};

/// Link state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No socket
    Disconnected,

    /// Socket being opened
    Connecting,

    /// Socket open, reader running
    Connected,
}

/// Session state tracker
///
/// Thread-safe and can be cloned cheaply (Arc internally).
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    /// Last sequence number handed out
    last_sequence: AtomicU32,

    /// Set once, never cleared
    disabled: AtomicBool,

    /// Current link state
    state: parking_lot::RwLock<LinkState>,

    /// Keepalive bookkeeping
    liveness: parking_lot::Mutex<Liveness>,
}

impl Session {
    /// Create a new disconnected session
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SessionInner {
                last_sequence: AtomicU32::new(0),
                disabled: AtomicBool::new(false),
                state: parking_lot::RwLock::new(LinkState::Disconnected),
                liveness: parking_lot::Mutex::new(Liveness::default()),
            }),
        }
    }

    /// Get current state
    pub fn state(&self) -> LinkState {
        *self.inner.state.read()
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        matches!(self.state(), LinkState::Connected)
    }

    /// Check if the session has been permanently disabled
    pub fn is_disabled(&self) -> bool {
        self.inner.disabled.load(Ordering::Acquire)
    }

    /// Claim the right to open a socket
    ///
    /// Returns `false` if the session is disabled or another caller is
    /// already connecting or connected.
    pub fn begin_connect(&self) -> bool {
        let mut state = self.inner.state.write();

        if self.is_disabled() || *state != LinkState::Disconnected {
            return false;
        }

        *state = LinkState::Connecting;
        true
    }

    /// Finish a connect claimed with [`Self::begin_connect`]
    pub fn mark_connected(&self) -> Result<()> {
        let mut state = self.inner.state.write();

        if *state != LinkState::Connecting {
            return Err(Error::InvalidSessionState(format!(
                "Cannot mark connected from state: {:?}",
                *state
            )));
        }

        *state = LinkState::Connected;
        Ok(())
    }

    /// Close session
    ///
    /// Returns `true` only for the call that actually left a non-disconnected
    /// state, so concurrent closers tear down exactly once.
    pub fn close(&self) -> bool {
        let mut state = self.inner.state.write();

        if *state == LinkState::Disconnected {
            return false;
        }

        *state = LinkState::Disconnected;
        self.inner.liveness.lock().clear_pong();
        true
    }

    /// Permanently disable the session
    ///
    /// Returns `true` the first time only.
    pub fn disable(&self) -> bool {
        !self.inner.disabled.swap(true, Ordering::AcqRel)
    }

    /// Get next sequence number
    ///
    /// Derived from a monotonic millisecond clock, strictly increasing
    /// between calls, never zero (zero is reserved for keepalives).
    pub fn next_sequence(&self) -> u32 {
        let now = monotonic_millis();

        let mut current = self.inner.last_sequence.load(Ordering::Acquire);
        loop {
            let mut next = now.max(current.wrapping_add(1));
            if next == 0 {
                next = 1;
            }

            match self.inner.last_sequence.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }

    /// Record that a keepalive was queued
    pub fn record_ping(&self) {
        self.inner.liveness.lock().record_ping(Instant::now());
    }

    /// Record that a keepalive acknowledgement arrived
    pub fn record_pong(&self) {
        self.inner.liveness.lock().record_pong(Instant::now());
    }

    /// Check if the last ping went unanswered
    pub fn is_stale(&self) -> bool {
        self.inner.liveness.lock().is_stale()
    }

    /// Snapshot of keepalive bookkeeping
    pub fn liveness(&self) -> Liveness {
        *self.inner.liveness.lock()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Keepalive bookkeeping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Liveness {
    pub last_ping: Option<Instant>,
    pub last_pong: Option<Instant>,
}

impl Liveness {
    pub fn record_ping(&mut self, at: Instant) {
        self.last_ping = Some(at);
    }

    pub fn record_pong(&mut self, at: Instant) {
        self.last_pong = Some(at);
    }

    pub fn clear_pong(&mut self) {
        self.last_pong = None;
    }

    /// A pong older than the last ping (or none at all) means the device
    /// stopped answering
    pub fn is_stale(&self) -> bool {
        match (self.last_ping, self.last_pong) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(ping), Some(pong)) => pong < ping,
        }
    }
}

fn monotonic_millis() -> u32 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    let epoch = *EPOCH.get_or_init(Instant::now);
    (epoch.elapsed().as_millis() & 0xFFFF_FFFF) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_session_new() {
        let session = Session::new();
        assert_eq!(session.state(), LinkState::Disconnected);
        assert!(!session.is_connected());
        assert!(!session.is_disabled());
    }

    #[test]
    fn test_connect_lifecycle() {
        let session = Session::new();

        assert!(session.begin_connect());
        assert_eq!(session.state(), LinkState::Connecting);
        assert!(!session.begin_connect());

        session.mark_connected().unwrap();
        assert!(session.is_connected());

        assert!(session.close());
        assert_eq!(session.state(), LinkState::Disconnected);
    }

    #[test]
    fn test_close_is_idempotent() {
        let session = Session::new();
        session.begin_connect();
        session.mark_connected().unwrap();

        assert!(session.close());
        assert!(!session.close());
        assert!(!session.close());
    }

    #[test]
    fn test_invalid_state_transitions() {
        let session = Session::new();

        // Cannot finish a connect that was never started
        assert!(session.mark_connected().is_err());
    }

    #[test]
    fn test_disabled_session_never_connects() {
        let session = Session::new();

        assert!(session.disable());
        assert!(!session.disable());
        assert!(session.is_disabled());
        assert!(!session.begin_connect());
    }

    #[test]
    fn test_sequence_strictly_increasing() {
        let session = Session::new();

        let mut last = session.next_sequence();
        for _ in 0..10_000 {
            let next = session.next_sequence();
            assert!(next > last);
            assert_ne!(next, 0);
            last = next;
        }
    }

    #[test]
    fn test_session_clone() {
        let session1 = Session::new();
        let session2 = session1.clone();

        session1.begin_connect();
        session1.mark_connected().unwrap();

        // Both share same state
        assert!(session2.is_connected());

        let a = session1.next_sequence();
        let b = session2.next_sequence();
        assert_ne!(a, b);
    }

    #[test]
    fn test_liveness() {
        let start = Instant::now();
        let mut liveness = Liveness::default();
        assert!(!liveness.is_stale());

        liveness.record_ping(start);
        assert!(liveness.is_stale());

        liveness.record_pong(start + Duration::from_millis(5));
        assert!(!liveness.is_stale());

        liveness.record_ping(start + Duration::from_millis(10));
        assert!(liveness.is_stale());

        liveness.record_pong(start + Duration::from_millis(15));
        liveness.clear_pong();
        assert!(liveness.is_stale());
    }

    #[test]
    fn test_close_clears_pong() {
        let session = Session::new();
        session.begin_connect();
        session.mark_connected().unwrap();
        session.record_ping();
        session.record_pong();
        assert!(!session.is_stale());

        session.close();
        assert_eq!(session.liveness().last_pong, None);
        assert!(session.is_stale());
    }
}
