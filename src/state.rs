//! The replicated player-count signal.
//!
//! The player count is a global scalar signal: any device can write it and
//! the write eventually becomes visible everywhere. [`SharedScalar`] is the
//! local face of that signal, a cheaply cloneable cell shared between the
//! session and the embedder's replication layer.
//! Concurrent writers race (no compare-and-set); the value is "last write
//! visible", not strongly consistent, and the session treats it that way.

use parking_lot::Mutex;
use std::sync::Arc;

/// A cloneable handle to a replicated scalar value.
///
/// The session reads and writes it during event handling; the embedder's
/// shared-state layer writes remote updates into it (and should follow up
/// with a [`SharedPlayersChanged`](crate::SessionEvent::SharedPlayersChanged)
/// event so the display refreshes).
///
/// Note the displayed player count is *not* necessarily the number of
/// active participants: fail events decrement it independently.
#[derive(Debug, Clone, Default)]
pub struct SharedScalar {
    inner: Arc<Mutex<i64>>,
}

impl SharedScalar {
    /// Creates a new signal with the given initial value.
    #[must_use]
    pub fn new(value: i64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(value)),
        }
    }

    /// Reads the last written value.
    #[must_use]
    pub fn get(&self) -> i64 {
        *self.inner.lock()
    }

    /// Overwrites the value. Last write wins.
    pub fn set(&self, value: i64) {
        *self.inner.lock() = value;
    }

    /// Returns `true` if both handles refer to the same underlying signal.
    #[must_use]
    pub fn same_signal(&self, other: &SharedScalar) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn new_holds_initial_value() {
        assert_eq!(SharedScalar::new(3).get(), 3);
        assert_eq!(SharedScalar::default().get(), 0);
    }

    #[test]
    fn set_overwrites() {
        let signal = SharedScalar::new(4);
        signal.set(2);
        assert_eq!(signal.get(), 2);
        // Fail events can push the count below the active-participant count,
        // and even below zero; the signal does not clamp.
        signal.set(-1);
        assert_eq!(signal.get(), -1);
    }

    #[test]
    fn clones_share_the_signal() {
        let signal = SharedScalar::new(0);
        let replica = signal.clone();
        replica.set(7);
        assert_eq!(signal.get(), 7);
        assert!(signal.same_signal(&replica));
    }

    #[test]
    fn distinct_signals_are_independent() {
        let a = SharedScalar::new(1);
        let b = SharedScalar::new(1);
        b.set(9);
        assert_eq!(a.get(), 1);
        assert!(!a.same_signal(&b));
    }
}
