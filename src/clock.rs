//! A minimal Lamport clock for tagging turn broadcasts.
//!
//! The protocol is last-writer-wins with no fencing; the tag exists so that
//! out-of-order deliveries become *detectable* (counted in
//! [`SessionStats`](crate::SessionStats)) without changing the baseline
//! overwrite behavior. A stale message still overwrites.

/// A logical clock following the usual Lamport rules: increment on send,
/// merge-and-increment on receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LamportClock {
    value: u64,
}

impl LamportClock {
    /// Creates a clock starting at 0.
    #[must_use]
    pub const fn new() -> Self {
        Self { value: 0 }
    }

    /// The current clock value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.value
    }

    /// Advances the clock for a local send and returns the tag to attach.
    pub fn tick(&mut self) -> u64 {
        self.value += 1;
        self.value
    }

    /// Merges a remote tag on receive.
    ///
    /// Returns `true` if the tag was stale, i.e. strictly behind what this
    /// device had already observed. Saturates rather than wraps at the
    /// (unreachable in practice) top of the range.
    pub fn observe(&mut self, remote: u64) -> bool {
        let stale = remote < self.value;
        self.value = self.value.max(remote).saturating_add(1);
        stale
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
    fn new_clock_starts_at_zero() {
        assert_eq!(LamportClock::new().value(), 0);
    }

    #[test]
    fn tick_increments_and_returns_the_tag() {
        let mut clock = LamportClock::new();
        assert_eq!(clock.tick(), 1);
        assert_eq!(clock.tick(), 2);
        assert_eq!(clock.value(), 2);
    }

    #[test]
    fn observe_merges_ahead_remote() {
        let mut clock = LamportClock::new();
        clock.tick();
        assert!(!clock.observe(10));
        assert_eq!(clock.value(), 11);
    }

    #[test]
    fn observe_flags_stale_tags() {
        let mut clock = LamportClock::new();
        clock.observe(5);
        // A tag behind what we have observed is stale but still merged.
        assert!(clock.observe(2));
        assert_eq!(clock.value(), 7);
    }

    #[test]
    fn observe_untagged_peer_is_stale_once_we_have_history() {
        let mut clock = LamportClock::new();
        assert!(!clock.observe(0));
        assert!(clock.observe(0));
    }

    #[test]
    fn observe_saturates_at_max() {
        let mut clock = LamportClock::new();
        clock.observe(u64::MAX);
        assert_eq!(clock.value(), u64::MAX);
        clock.observe(u64::MAX);
        assert_eq!(clock.value(), u64::MAX);
    }
}
