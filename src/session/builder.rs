//! Builds [`TurnSession`]s from a roster and a transport.

use crate::session::turn_session::TurnSession;
use crate::state::SharedScalar;
use crate::{Broadcast, Config};

/// A builder for [`TurnSession`].
///
/// Seed it with the participants already known at startup (from the
/// platform's roster snapshot), then call [`start`] with the outbound
/// channel. Starting runs the session's announcement sequence, so the
/// returned session has already broadcast its readiness.
///
/// # Examples
///
/// ```
/// use turnwire::{Broadcast, Config, SendError, SessionBuilder, Topic};
///
/// struct CallConfig;
/// impl Config for CallConfig {
///     type Id = String;
/// }
///
/// struct NullChannel;
/// impl Broadcast for NullChannel {
///     fn send(&mut self, _topic: Topic, _payload: &str) -> Result<(), SendError> {
///         Ok(())
///     }
/// }
///
/// let session = SessionBuilder::<CallConfig>::new("self".to_owned())
///     .add_participant("peer-1".to_owned(), true)
///     .add_participant("peer-2".to_owned(), false)
///     .start(Box::new(NullChannel));
/// assert_eq!(session.active_participants().len(), 2);
/// ```
///
/// [`start`]: SessionBuilder::start
pub struct SessionBuilder<T>
where
    T: Config,
{
    self_id: T::Id,
    roster: Vec<(T::Id, bool)>,
    player_count: SharedScalar,
}

impl<T: Config> std::fmt::Debug for SessionBuilder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Destructure to ensure all fields are included when new fields are added.
        let Self {
            self_id,
            roster,
            player_count,
        } = self;

        f.debug_struct("SessionBuilder")
            .field("self_id", self_id)
            .field("roster", roster)
            .field("player_count", player_count)
            .finish()
    }
}

impl<T: Config> SessionBuilder<T> {
    /// Creates a builder for the device identified by `self_id`.
    ///
    /// The local device is always registered and active in its own session.
    #[must_use]
    pub fn new(self_id: T::Id) -> Self {
        Self {
            self_id,
            roster: Vec::new(),
            player_count: SharedScalar::default(),
        }
    }

    /// Adds a participant known at startup.
    ///
    /// `active` is whether the participant currently has the effect open.
    /// Duplicate ids are merged; the last activity flag wins when the
    /// session starts.
    #[must_use]
    pub fn add_participant(mut self, id: T::Id, active: bool) -> Self {
        self.roster.push((id, active));
        self
    }

    /// Uses an existing shared player-count signal instead of a fresh one.
    ///
    /// Pass the handle backing the platform's replicated counter so that
    /// remote writes observed by the embedder and this session's writes
    /// land in the same cell.
    #[must_use]
    pub fn with_player_count_signal(mut self, signal: SharedScalar) -> Self {
        self.player_count = signal;
        self
    }

    /// Builds the session and runs its startup sequence.
    ///
    /// The startup sequence publishes the roster size and the initial turn
    /// visibility as display commands, and broadcasts the readiness
    /// announcement on the user-loaded channel. A failed announcement is
    /// logged, not returned; the session still starts and converges through
    /// later traffic.
    #[must_use]
    pub fn start(self, socket: Box<dyn Broadcast>) -> TurnSession<T> {
        let mut session = TurnSession::new(self.self_id.clone(), socket, self.player_count);
        session.seed_participant(self.self_id, true);
        for (id, active) in self.roster {
            session.seed_participant(id, active);
        }
        session.start();
        session
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
    use crate::channels::messages::Topic;
    use crate::error::SendError;

    struct TestConfig;

    impl Config for TestConfig {
        type Id = u64;
    }

    struct NullChannel;

    impl Broadcast for NullChannel {
        fn send(&mut self, _topic: Topic, _payload: &str) -> Result<(), SendError> {
            Ok(())
        }
    }

    #[test]
    fn self_is_always_active() {
        let session = SessionBuilder::<TestConfig>::new(7).start(Box::new(NullChannel));
        assert_eq!(session.active_participants(), &[7]);
        assert!(session.is_my_turn());
    }

    #[test]
    fn roster_activity_is_respected() {
        let session = SessionBuilder::<TestConfig>::new(2)
            .add_participant(1, true)
            .add_participant(3, false)
            .start(Box::new(NullChannel));
        assert_eq!(session.active_participants(), &[1, 2]);
        // Inactive participants still count toward the roster.
        assert_eq!(session.registry().len(), 3);
        assert_eq!(session.player_count(), 3);
    }

    #[test]
    fn duplicate_roster_entries_merge_with_last_flag_winning() {
        let session = SessionBuilder::<TestConfig>::new(2)
            .add_participant(1, true)
            .add_participant(1, false)
            .start(Box::new(NullChannel));
        assert_eq!(session.registry().len(), 2);
        assert_eq!(session.active_participants(), &[2]);
    }

    #[test]
    fn external_player_count_signal_is_adopted() {
        let signal = SharedScalar::new(0);
        let session = SessionBuilder::<TestConfig>::new(1)
            .with_player_count_signal(signal.clone())
            .start(Box::new(NullChannel));
        // Startup wrote the roster size into the shared cell.
        assert_eq!(signal.get(), 1);
        assert!(session.player_count_signal().same_signal(&signal));
    }
}
