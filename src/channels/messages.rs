//! Wire message types for the three broadcast channels.
//!
//! Field names are part of the wire contract deployed effects already
//! speak: `{"background": n}`, `{"turnIndex": n}` and `{}`. The Lamport tag
//! on turn messages is additive; decoders treat a missing tag as 0, so
//! untagged peers interoperate.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::TurnIndex;

/// The named broadcast channels of the session.
///
/// Messages on a single channel are delivered in send order per sender, but
/// nothing is guaranteed across senders or across channels.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Topic {
    /// Carries the current background image index.
    BackgroundIndex,
    /// Carries the current turn slot.
    TurnIndex,
    /// A presence-only readiness signal from a newly loaded participant.
    UserLoaded,
}

impl Topic {
    /// All topics, in a fixed order. Useful for transports that register
    /// one handler per channel.
    pub const ALL: [Topic; 3] = [Topic::BackgroundIndex, Topic::TurnIndex, Topic::UserLoaded];

    /// Returns the channel name as it appears on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Topic::BackgroundIndex => "BackgroundIndexTopic",
            Topic::TurnIndex => "TurnIndexTopic",
            Topic::UserLoaded => "UserLoadedTopic",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BackgroundIndexTopic" => Ok(Topic::BackgroundIndex),
            "TurnIndexTopic" => Ok(Topic::TurnIndex),
            "UserLoadedTopic" => Ok(Topic::UserLoaded),
            _ => Err(()),
        }
    }
}

/// Payload of [`Topic::BackgroundIndex`]: `{"background": n}`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BackgroundIndexMsg {
    /// The sender's current background image index.
    pub background: u32,
}

/// Payload of [`Topic::TurnIndex`]: `{"turnIndex": n, "clock": c}`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TurnIndexMsg {
    /// The sender's turn slot after advancing. Receivers overwrite their
    /// local value unconditionally (last writer wins).
    #[serde(rename = "turnIndex")]
    pub turn_index: TurnIndex,
    /// Lamport tag for staleness accounting. Missing on untagged peers.
    #[serde(default)]
    pub clock: u64,
}

/// Payload of [`Topic::UserLoaded`]: the empty object `{}`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct UserLoadedMsg {}

/// A message that the session broadcasts or receives, paired with its
/// channel. Transports deal in `(Topic, JSON string)`; this enum is the
/// decoded form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    /// A background-index update.
    BackgroundIndex(BackgroundIndexMsg),
    /// A turn-slot update.
    TurnIndex(TurnIndexMsg),
    /// A readiness signal.
    UserLoaded(UserLoadedMsg),
}

impl WireMessage {
    /// Returns the channel this message travels on.
    #[must_use]
    pub const fn topic(&self) -> Topic {
        match self {
            WireMessage::BackgroundIndex(_) => Topic::BackgroundIndex,
            WireMessage::TurnIndex(_) => Topic::TurnIndex,
            WireMessage::UserLoaded(_) => Topic::UserLoaded,
        }
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
    fn topic_names_match_wire_contract() {
        assert_eq!(Topic::BackgroundIndex.as_str(), "BackgroundIndexTopic");
        assert_eq!(Topic::TurnIndex.as_str(), "TurnIndexTopic");
        assert_eq!(Topic::UserLoaded.as_str(), "UserLoadedTopic");
    }

    #[test]
    fn topic_round_trips_through_from_str() {
        for topic in Topic::ALL {
            assert_eq!(topic.as_str().parse::<Topic>(), Ok(topic));
        }
    }

    #[test]
    fn topic_from_str_rejects_unknown_names() {
        assert!("ScoreTopic".parse::<Topic>().is_err());
        assert!("".parse::<Topic>().is_err());
    }

    #[test]
    fn topic_display_matches_as_str() {
        assert_eq!(format!("{}", Topic::UserLoaded), "UserLoadedTopic");
    }

    #[test]
    fn wire_message_knows_its_topic() {
        let background = WireMessage::BackgroundIndex(BackgroundIndexMsg { background: 1 });
        let turn = WireMessage::TurnIndex(TurnIndexMsg {
            turn_index: TurnIndex::new(2),
            clock: 9,
        });
        let loaded = WireMessage::UserLoaded(UserLoadedMsg {});

        assert_eq!(background.topic(), Topic::BackgroundIndex);
        assert_eq!(turn.topic(), Topic::TurnIndex);
        assert_eq!(loaded.topic(), Topic::UserLoaded);
    }

    #[test]
    fn turn_index_msg_serializes_with_wire_field_name() {
        let msg = TurnIndexMsg {
            turn_index: TurnIndex::new(1),
            clock: 3,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"turnIndex\":1"));
        assert!(json.contains("\"clock\":3"));
    }

    #[test]
    fn turn_index_msg_tolerates_missing_clock() {
        // Untagged peers send only the turn slot.
        let msg: TurnIndexMsg = serde_json::from_str("{\"turnIndex\":2}").unwrap();
        assert_eq!(msg.turn_index, TurnIndex::new(2));
        assert_eq!(msg.clock, 0);
    }

    #[test]
    fn user_loaded_msg_is_the_empty_object() {
        let json = serde_json::to_string(&UserLoadedMsg {}).unwrap();
        assert_eq!(json, "{}");
        let _: UserLoadedMsg = serde_json::from_str("{}").unwrap();
    }
}
