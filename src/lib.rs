//! # Turnwire
//!
//! Turnwire coordinates a shared multiplayer turn sequence and per-player
//! background state across the participants of a real-time AR session. Every
//! device runs the same code; there is no central coordinator. State is kept
//! consistent through best-effort broadcast messages on three named channels
//! and eventual reconciliation via rebroadcast, not through guaranteed
//! agreement.
//!
//! The callback-style reactive API common to AR scripting runtimes has been
//! replaced with an explicit event-dispatch core: local pulses and remote
//! messages become [`SessionEvent`] values fed to [`TurnSession::handle_event`],
//! and the resulting display updates are returned as a drained queue of
//! [`DisplayCommand`] values for the embedder to forward to its rendering
//! layer.
//!
//! ## Quick start
//!
//! ```
//! use turnwire::{Broadcast, Config, SessionBuilder, SessionEvent, Topic};
//! use turnwire::error::SendError;
//!
//! struct CallConfig;
//!
//! impl Config for CallConfig {
//!     type Id = String;
//! }
//!
//! /// A transport that drops everything (stand-in for a real peer channel).
//! struct NullChannel;
//!
//! impl Broadcast for NullChannel {
//!     fn send(&mut self, _topic: Topic, _payload: &str) -> Result<(), SendError> {
//!         Ok(())
//!     }
//! }
//!
//! let mut session = SessionBuilder::<CallConfig>::new("bob".to_owned())
//!     .add_participant("alice".to_owned(), true)
//!     .start(Box::new(NullChannel));
//!
//! session.handle_event(SessionEvent::Tap);
//! for command in session.display_commands() {
//!     // forward to the display layer
//!     let _ = command;
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::{fmt::Debug, hash::Hash};

pub use channels::codec::CodecError;
pub use channels::messages::{BackgroundIndexMsg, Topic, TurnIndexMsg, UserLoadedMsg, WireMessage};
pub use clock::LamportClock;
pub use error::{SendError, SessionError};
pub use registry::{Participant, ParticipantRegistry};
pub use session::builder::SessionBuilder;
pub use session::command_drain::CommandDrain;
pub use session::turn_session::TurnSession;
pub use state::SharedScalar;
pub use stats::SessionStats;

pub mod channels {
    //! Wire messages and the JSON codec for the named broadcast channels.
    pub mod codec;
    pub mod messages;
}
pub mod clock;
pub mod error;
pub mod order;
pub mod registry;
pub mod session {
    //! The turn session, its builder and the display-command drain.
    pub mod builder;
    pub mod command_drain;
    pub mod turn_session;
}
pub mod state;
pub mod stats;

// #############
// #   TYPES   #
// #############

/// An index into the sorted active-participant sequence, indicating whose
/// turn it is.
///
/// The turn pointer is slot-based, not identity-based: when the participant
/// holding the turn leaves, the pointer is re-homed to the same slot number
/// (modulo the new list length), implicitly handing the turn to whichever
/// participant now occupies that slot. This is deliberate, observable
/// behavior; see [`TurnIndex::rehome`].
///
/// Both modular operations take a [`NonZeroUsize`] length so the empty-list
/// division is ruled out at the type level.
///
/// [`NonZeroUsize`]: std::num::NonZeroUsize
///
/// # Examples
///
/// ```
/// use std::num::NonZeroUsize;
/// use turnwire::TurnIndex;
///
/// let three = NonZeroUsize::new(3).unwrap();
/// assert_eq!(TurnIndex::new(0).advance(three), TurnIndex::new(1));
/// assert_eq!(TurnIndex::new(2).advance(three), TurnIndex::new(0));
/// assert_eq!(TurnIndex::new(2).rehome(NonZeroUsize::new(2).unwrap()), TurnIndex::new(0));
/// ```
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct TurnIndex(usize);

impl TurnIndex {
    /// The first slot in the turn order.
    pub const FIRST: TurnIndex = TurnIndex(0);

    /// Creates a new `TurnIndex` from a raw slot number.
    ///
    /// No validation against a particular active list is performed; use
    /// [`TurnIndex::is_within`] to check.
    #[inline]
    #[must_use]
    pub const fn new(index: usize) -> Self {
        TurnIndex(index)
    }

    /// Returns the underlying slot number.
    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Returns `true` if this index is a valid slot for a list of `len`
    /// participants.
    #[inline]
    #[must_use]
    pub const fn is_within(self, len: usize) -> bool {
        self.0 < len
    }

    /// Advances the turn to the next slot, wrapping around the list.
    #[inline]
    #[must_use]
    pub fn advance(self, len: std::num::NonZeroUsize) -> Self {
        TurnIndex((self.0 + 1) % len.get())
    }

    /// Re-homes the turn pointer after the active list changed under it.
    ///
    /// This keeps the same slot number when possible and wraps otherwise,
    /// which means the turn passes to whoever now occupies the slot rather
    /// than following the departed holder.
    #[inline]
    #[must_use]
    pub fn rehome(self, len: std::num::NonZeroUsize) -> Self {
        TurnIndex(self.0 % len.get())
    }
}

impl std::fmt::Display for TurnIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<usize> for TurnIndex {
    #[inline]
    fn from(value: usize) -> Self {
        TurnIndex(value)
    }
}

impl From<TurnIndex> for usize {
    #[inline]
    fn from(index: TurnIndex) -> Self {
        index.0
    }
}

// #############
// #   ENUMS   #
// #############

/// Events processed by the session's single-threaded dispatcher.
///
/// Local pulses (`Tap`, `Fail`, `Restart`), membership notifications
/// (`PeerJoined`, `PeerLeft`) and decoded remote messages all funnel through
/// [`TurnSession::handle_event`]. Each event runs to completion before the
/// next one starts; there is no interleaving.
///
/// # Forward Compatibility
///
/// This enum is marked `#[non_exhaustive]` because new event types may be
/// added in future versions. Always include a wildcard arm when matching.
#[non_exhaustive]
pub enum SessionEvent<T>
where
    T: Config,
{
    /// The local participant tapped the screen. Advances the turn if it is
    /// locally this device's turn.
    Tap,
    /// The local participant failed (e.g. ran out the timer) while holding
    /// the turn.
    Fail,
    /// The game was restarted locally.
    Restart,
    /// A participant became active in this effect instance. Unknown ids are
    /// registered lazily.
    PeerJoined {
        /// The participant's id.
        id: T::Id,
    },
    /// A participant left the effect instance. They remain in the registry,
    /// marked inactive.
    PeerLeft {
        /// The participant's id.
        id: T::Id,
    },
    /// A remote `TurnIndexTopic` message arrived.
    TurnIndexMsg {
        /// The turn slot broadcast by the sender. Overwrites the local value
        /// unconditionally (last writer wins).
        turn_index: usize,
        /// The sender's Lamport tag. Used to count stale deliveries; it never
        /// gates application.
        clock: u64,
    },
    /// A remote `BackgroundIndexTopic` message arrived.
    BackgroundIndexMsg {
        /// The background image index broadcast by the sender.
        background: u32,
    },
    /// A remote `UserLoadedTopic` message arrived: a newcomer signals
    /// readiness and asks for the current state.
    UserLoadedMsg,
    /// The replicated player-count signal changed, possibly written by a
    /// remote device.
    SharedPlayersChanged {
        /// The new value of the shared counter.
        value: i64,
    },
}

// Manual impls: derives would bound `T` itself, but only `T::Id` appears in
// the variants.

impl<T: Config> Debug for SessionEvent<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionEvent::Tap => f.write_str("Tap"),
            SessionEvent::Fail => f.write_str("Fail"),
            SessionEvent::Restart => f.write_str("Restart"),
            SessionEvent::PeerJoined { id } => {
                f.debug_struct("PeerJoined").field("id", id).finish()
            }
            SessionEvent::PeerLeft { id } => f.debug_struct("PeerLeft").field("id", id).finish(),
            SessionEvent::TurnIndexMsg { turn_index, clock } => f
                .debug_struct("TurnIndexMsg")
                .field("turn_index", turn_index)
                .field("clock", clock)
                .finish(),
            SessionEvent::BackgroundIndexMsg { background } => f
                .debug_struct("BackgroundIndexMsg")
                .field("background", background)
                .finish(),
            SessionEvent::UserLoadedMsg => f.write_str("UserLoadedMsg"),
            SessionEvent::SharedPlayersChanged { value } => f
                .debug_struct("SharedPlayersChanged")
                .field("value", value)
                .finish(),
        }
    }
}

impl<T: Config> Clone for SessionEvent<T> {
    fn clone(&self) -> Self {
        match self {
            SessionEvent::Tap => SessionEvent::Tap,
            SessionEvent::Fail => SessionEvent::Fail,
            SessionEvent::Restart => SessionEvent::Restart,
            SessionEvent::PeerJoined { id } => SessionEvent::PeerJoined { id: id.clone() },
            SessionEvent::PeerLeft { id } => SessionEvent::PeerLeft { id: id.clone() },
            SessionEvent::TurnIndexMsg { turn_index, clock } => SessionEvent::TurnIndexMsg {
                turn_index: *turn_index,
                clock: *clock,
            },
            SessionEvent::BackgroundIndexMsg { background } => SessionEvent::BackgroundIndexMsg {
                background: *background,
            },
            SessionEvent::UserLoadedMsg => SessionEvent::UserLoadedMsg,
            SessionEvent::SharedPlayersChanged { value } => {
                SessionEvent::SharedPlayersChanged { value: *value }
            }
        }
    }
}

impl<T: Config> PartialEq for SessionEvent<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (SessionEvent::Tap, SessionEvent::Tap)
            | (SessionEvent::Fail, SessionEvent::Fail)
            | (SessionEvent::Restart, SessionEvent::Restart)
            | (SessionEvent::UserLoadedMsg, SessionEvent::UserLoadedMsg) => true,
            (SessionEvent::PeerJoined { id: a }, SessionEvent::PeerJoined { id: b })
            | (SessionEvent::PeerLeft { id: a }, SessionEvent::PeerLeft { id: b }) => a == b,
            (
                SessionEvent::TurnIndexMsg {
                    turn_index: a,
                    clock: ac,
                },
                SessionEvent::TurnIndexMsg {
                    turn_index: b,
                    clock: bc,
                },
            ) => a == b && ac == bc,
            (
                SessionEvent::BackgroundIndexMsg { background: a },
                SessionEvent::BackgroundIndexMsg { background: b },
            ) => a == b,
            (
                SessionEvent::SharedPlayersChanged { value: a },
                SessionEvent::SharedPlayersChanged { value: b },
            ) => a == b,
            _ => false,
        }
    }
}

impl<T: Config> Eq for SessionEvent<T> {}

/// Display updates produced by the session for the external rendering layer.
///
/// Handling them is up to the embedder; they map one-to-one onto the effect's
/// named display inputs (see [`DisplayCommand::target`]).
/// Obtain pending commands by draining [`TurnSession::display_commands`].
///
/// # Forward Compatibility
///
/// This enum is marked `#[non_exhaustive]` because new command types may be
/// added in future versions. Always include a wildcard arm when matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum DisplayCommand {
    /// Set the displayed player count scalar.
    SetPlayerCount(i64),
    /// Set the displayed background image index scalar.
    SetBackgroundIndex(u32),
    /// Show or hide the turn indicator panel.
    SetTurnPanelVisible(bool),
    /// Start or stop the turn countdown.
    SetCounterRunning(bool),
}

impl DisplayCommand {
    /// Returns the name of the display input this command targets.
    #[must_use]
    pub const fn target(&self) -> &'static str {
        match self {
            DisplayCommand::SetPlayerCount(_) => "playerCount",
            DisplayCommand::SetBackgroundIndex(_) => "msg_background",
            DisplayCommand::SetTurnPanelVisible(_) => "showTurnPanel",
            DisplayCommand::SetCounterRunning(_) => "startCounter",
        }
    }
}

// #############
// #  TRAITS   #
// #############

/// Compile time parameterization for sessions.
///
/// This trait bundles the generic types needed for a session. Implement it on
/// a marker struct to configure your session types.
///
/// # Example
///
/// ```
/// use turnwire::Config;
///
/// struct CallConfig;
///
/// impl Config for CallConfig {
///     // Whatever opaque, totally ordered id the call platform hands out.
///     type Id = String;
/// }
/// ```
pub trait Config: 'static {
    /// The opaque participant identifier handed out by the call platform.
    ///
    /// The `Ord` bound is load-bearing: the globally agreed turn order is
    /// the active participants sorted ascending by id, so the comparison
    /// must be a strict total order that is identical on every device.
    type Id: Clone + PartialEq + Eq + PartialOrd + Ord + Hash + Debug;
}

/// The outbound half of the peer-to-peer transport.
///
/// Implement this to plug the session into your platform's message channels.
/// Sends are best-effort and fire-and-forget: there is no acknowledgement, no
/// retry and no delivery guarantee. Per-sender, per-topic ordering is assumed
/// from the transport; nothing is guaranteed across senders or topics.
///
/// The payload is a complete JSON document for the given topic; inbound
/// payloads should be handed to [`TurnSession::handle_wire_message`].
pub trait Broadcast {
    /// Sends one JSON payload on the named broadcast channel.
    ///
    /// # Errors
    ///
    /// Returns [`SendError`] if the transport rejected the message. The
    /// session logs the failure and compensates where the protocol calls for
    /// it; it never retries.
    fn send(&mut self, topic: Topic, payload: &str) -> Result<(), SendError>;
}

// ###################
// # UNIT TESTS      #
// ###################

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use std::num::NonZeroUsize;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct TestConfig;

    impl Config for TestConfig {
        type Id = u32;
    }

    fn len(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    // ==========================================
    // TurnIndex Tests
    // ==========================================

    #[test]
    fn turn_index_first_is_zero() {
        assert_eq!(TurnIndex::FIRST.as_usize(), 0);
    }

    #[test]
    fn turn_index_advance_wraps() {
        assert_eq!(TurnIndex::new(0).advance(len(3)), TurnIndex::new(1));
        assert_eq!(TurnIndex::new(1).advance(len(3)), TurnIndex::new(2));
        assert_eq!(TurnIndex::new(2).advance(len(3)), TurnIndex::new(0));
    }

    #[test]
    fn turn_index_advance_single_participant_stays_put() {
        assert_eq!(TurnIndex::new(0).advance(len(1)), TurnIndex::new(0));
    }

    #[test]
    fn turn_index_rehome_keeps_slot_when_in_range() {
        assert_eq!(TurnIndex::new(1).rehome(len(3)), TurnIndex::new(1));
    }

    #[test]
    fn turn_index_rehome_wraps_when_out_of_range() {
        // Holder at the last slot left; the pointer wraps to slot 0.
        assert_eq!(TurnIndex::new(2).rehome(len(2)), TurnIndex::new(0));
        assert_eq!(TurnIndex::new(5).rehome(len(3)), TurnIndex::new(2));
    }

    #[test]
    fn turn_index_is_within() {
        assert!(TurnIndex::new(0).is_within(1));
        assert!(TurnIndex::new(2).is_within(3));
        assert!(!TurnIndex::new(3).is_within(3));
        assert!(!TurnIndex::new(0).is_within(0));
    }

    #[test]
    fn turn_index_conversions() {
        let index: TurnIndex = 4usize.into();
        assert_eq!(index, TurnIndex::new(4));
        let raw: usize = index.into();
        assert_eq!(raw, 4);
    }

    #[test]
    fn turn_index_display() {
        assert_eq!(format!("{}", TurnIndex::new(7)), "7");
    }

    // ==========================================
    // DisplayCommand Tests
    // ==========================================

    #[test]
    fn display_command_targets_match_display_inputs() {
        assert_eq!(DisplayCommand::SetPlayerCount(3).target(), "playerCount");
        assert_eq!(
            DisplayCommand::SetBackgroundIndex(1).target(),
            "msg_background"
        );
        assert_eq!(
            DisplayCommand::SetTurnPanelVisible(true).target(),
            "showTurnPanel"
        );
        assert_eq!(
            DisplayCommand::SetCounterRunning(false).target(),
            "startCounter"
        );
    }

    #[test]
    fn display_command_equality() {
        assert_eq!(
            DisplayCommand::SetPlayerCount(2),
            DisplayCommand::SetPlayerCount(2)
        );
        assert_ne!(
            DisplayCommand::SetPlayerCount(2),
            DisplayCommand::SetPlayerCount(3)
        );
        assert_ne!(
            DisplayCommand::SetTurnPanelVisible(true),
            DisplayCommand::SetCounterRunning(true)
        );
    }

    // ==========================================
    // SessionEvent Tests
    // ==========================================

    #[test]
    fn session_event_peer_variants_carry_ids() {
        let joined: SessionEvent<TestConfig> = SessionEvent::PeerJoined { id: 7 };
        let left: SessionEvent<TestConfig> = SessionEvent::PeerLeft { id: 7 };

        if let SessionEvent::PeerJoined { id } = joined {
            assert_eq!(id, 7);
        } else {
            panic!("Expected PeerJoined event");
        }
        if let SessionEvent::PeerLeft { id } = left {
            assert_eq!(id, 7);
        } else {
            panic!("Expected PeerLeft event");
        }
    }

    #[test]
    fn session_event_equality() {
        let a: SessionEvent<TestConfig> = SessionEvent::TurnIndexMsg {
            turn_index: 1,
            clock: 5,
        };
        let b: SessionEvent<TestConfig> = SessionEvent::TurnIndexMsg {
            turn_index: 1,
            clock: 5,
        };
        let c: SessionEvent<TestConfig> = SessionEvent::TurnIndexMsg {
            turn_index: 2,
            clock: 5,
        };
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn session_event_debug_format() {
        let event: SessionEvent<TestConfig> = SessionEvent::BackgroundIndexMsg { background: 2 };
        let debug = format!("{:?}", event);
        assert!(debug.contains("BackgroundIndexMsg"));
        assert!(debug.contains('2'));
    }
}
