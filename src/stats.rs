//! Session statistics.

use web_time::Instant;

/// The `SessionStats` struct contains counters about the current session's
/// channel traffic.
///
/// The stale-message counter is the observable half of the Lamport tagging
/// scheme: deliveries that arrive behind the local clock are counted here
/// but still applied (last writer wins is the protocol contract).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[must_use = "SessionStats should be inspected or used after being queried"]
pub struct SessionStats {
    /// Messages successfully handed to the transport, across all channels.
    pub messages_sent: u64,
    /// Messages decoded and dispatched, across all channels.
    pub messages_received: u64,
    /// Sends the transport rejected. Never retried.
    pub send_failures: u64,
    /// Turn-index messages whose Lamport tag was behind the local clock.
    pub stale_turn_messages: u64,
    /// When the most recent remote message arrived, if any.
    pub last_received_at: Option<Instant>,
}

impl SessionStats {
    /// Creates a new `SessionStats` instance with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Display for SessionStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Destructure to ensure all fields are included when new fields are added.
        let Self {
            messages_sent,
            messages_received,
            send_failures,
            stale_turn_messages,
            last_received_at,
        } = self;

        write!(
            f,
            "SessionStats {{ sent: {}, received: {}, send_failures: {}, stale_turn: {}, last_received: ",
            messages_sent, messages_received, send_failures, stale_turn_messages
        )?;
        match last_received_at {
            Some(at) => write!(f, "{:?} ago", at.elapsed())?,
            None => write!(f, "never")?,
        }
        write!(f, " }}")
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
    fn stats_default_is_zeroed() {
        let stats = SessionStats::default();
        assert_eq!(stats.messages_sent, 0);
        assert_eq!(stats.messages_received, 0);
        assert_eq!(stats.send_failures, 0);
        assert_eq!(stats.stale_turn_messages, 0);
        assert_eq!(stats.last_received_at, None);
    }

    #[test]
    fn stats_new_matches_default() {
        assert_eq!(SessionStats::new(), SessionStats::default());
    }

    #[test]
    fn stats_display_without_traffic() {
        let display = format!("{}", SessionStats::new());
        assert!(display.starts_with("SessionStats {"));
        assert!(display.contains("sent: 0"));
        assert!(display.contains("last_received: never"));
    }

    #[test]
    fn stats_display_with_traffic() {
        let stats = SessionStats {
            messages_sent: 4,
            messages_received: 2,
            send_failures: 1,
            stale_turn_messages: 1,
            last_received_at: Some(Instant::now()),
        };
        let display = format!("{}", stats);
        assert!(display.contains("sent: 4"));
        assert!(display.contains("received: 2"));
        assert!(display.contains("send_failures: 1"));
        assert!(display.contains("stale_turn: 1"));
        assert!(display.contains("ago"));
    }
}
