//! JSON codec for the broadcast channel payloads.
//!
//! This module provides the one place where wire messages are encoded and
//! decoded, so the payload shape stays consistent across the codebase. The
//! wire format is plain JSON because that is the contract of the channels
//! the session rides on; the topic name selects the payload type.
//!
//! # Examples
//!
//! ```
//! use turnwire::channels::codec::{decode, encode};
//! use turnwire::{BackgroundIndexMsg, Topic, WireMessage};
//!
//! let msg = WireMessage::BackgroundIndex(BackgroundIndexMsg { background: 2 });
//! let json = encode(&msg).expect("encoding should succeed");
//! assert_eq!(json, r#"{"background":2}"#);
//!
//! let decoded = decode(Topic::BackgroundIndex, &json).expect("decoding should succeed");
//! assert_eq!(decoded, msg);
//! ```

use std::fmt;

use crate::channels::messages::{
    BackgroundIndexMsg, Topic, TurnIndexMsg, UserLoadedMsg, WireMessage,
};

/// Errors that can occur while encoding or decoding a channel payload.
///
/// Error messages are stored as `String` because the underlying serde_json
/// errors are opaque: they only expose human-readable descriptions via
/// `Display`. Codec failures are exceptional (garbled payloads, peers
/// speaking a different schema), not hot-path conditions, so the allocation
/// does not matter.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CodecError {
    /// Serializing an outbound message failed.
    Encode {
        /// The underlying serde_json error message.
        message: String,
    },
    /// Deserializing an inbound payload failed.
    Decode {
        /// The channel the payload arrived on.
        topic: Topic,
        /// The underlying serde_json error message.
        message: String,
    },
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Encode { message } => {
                write!(f, "failed to encode channel payload: {}", message)
            }
            CodecError::Decode { topic, message } => {
                write!(f, "failed to decode payload on {}: {}", topic, message)
            }
        }
    }
}

impl std::error::Error for CodecError {}

/// Encodes a wire message into the JSON payload for its channel.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if serialization fails. With the message
/// types in this crate that cannot happen in practice, but the transport
/// boundary keeps the `Result` anyway.
pub fn encode(msg: &WireMessage) -> Result<String, CodecError> {
    let result = match msg {
        WireMessage::BackgroundIndex(body) => serde_json::to_string(body),
        WireMessage::TurnIndex(body) => serde_json::to_string(body),
        WireMessage::UserLoaded(body) => serde_json::to_string(body),
    };
    result.map_err(|err| CodecError::Encode {
        message: err.to_string(),
    })
}

/// Decodes the JSON payload received on `topic` into a wire message.
///
/// Unknown extra fields are ignored; a missing Lamport tag on a turn
/// message decodes as 0 (untagged peer).
///
/// # Errors
///
/// Returns [`CodecError::Decode`] if the payload is not valid JSON or does
/// not match the channel's schema.
pub fn decode(topic: Topic, payload: &str) -> Result<WireMessage, CodecError> {
    let into_error = |err: serde_json::Error| CodecError::Decode {
        topic,
        message: err.to_string(),
    };
    match topic {
        Topic::BackgroundIndex => serde_json::from_str::<BackgroundIndexMsg>(payload)
            .map(WireMessage::BackgroundIndex)
            .map_err(into_error),
        Topic::TurnIndex => serde_json::from_str::<TurnIndexMsg>(payload)
            .map(WireMessage::TurnIndex)
            .map_err(into_error),
        Topic::UserLoaded => serde_json::from_str::<UserLoadedMsg>(payload)
            .map(WireMessage::UserLoaded)
            .map_err(into_error),
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
    use crate::TurnIndex;

    #[test]
    fn encode_background_index() {
        let msg = WireMessage::BackgroundIndex(BackgroundIndexMsg { background: 5 });
        assert_eq!(encode(&msg).unwrap(), r#"{"background":5}"#);
    }

    #[test]
    fn encode_turn_index_uses_wire_field_name() {
        let msg = WireMessage::TurnIndex(TurnIndexMsg {
            turn_index: TurnIndex::new(1),
            clock: 4,
        });
        assert_eq!(encode(&msg).unwrap(), r#"{"turnIndex":1,"clock":4}"#);
    }

    #[test]
    fn encode_user_loaded_is_empty_object() {
        let msg = WireMessage::UserLoaded(UserLoadedMsg {});
        assert_eq!(encode(&msg).unwrap(), "{}");
    }

    #[test]
    fn decode_dispatches_on_topic() {
        let decoded = decode(Topic::BackgroundIndex, r#"{"background":3}"#).unwrap();
        assert_eq!(
            decoded,
            WireMessage::BackgroundIndex(BackgroundIndexMsg { background: 3 })
        );

        let decoded = decode(Topic::TurnIndex, r#"{"turnIndex":2,"clock":7}"#).unwrap();
        assert_eq!(
            decoded,
            WireMessage::TurnIndex(TurnIndexMsg {
                turn_index: TurnIndex::new(2),
                clock: 7,
            })
        );

        let decoded = decode(Topic::UserLoaded, "{}").unwrap();
        assert_eq!(decoded, WireMessage::UserLoaded(UserLoadedMsg {}));
    }

    #[test]
    fn decode_untagged_turn_message() {
        let decoded = decode(Topic::TurnIndex, r#"{"turnIndex":1}"#).unwrap();
        assert_eq!(
            decoded,
            WireMessage::TurnIndex(TurnIndexMsg {
                turn_index: TurnIndex::new(1),
                clock: 0,
            })
        );
    }

    #[test]
    fn decode_garbage_reports_topic() {
        let err = decode(Topic::TurnIndex, "not json").unwrap_err();
        match err {
            CodecError::Decode { topic, .. } => assert_eq!(topic, Topic::TurnIndex),
            other => panic!("expected decode error, got {:?}", other),
        }
    }

    #[test]
    fn decode_wrong_schema_fails() {
        // A background payload on the turn channel is missing "turnIndex".
        assert!(decode(Topic::TurnIndex, r#"{"background":1}"#).is_err());
    }

    #[test]
    fn decode_ignores_extra_fields() {
        let decoded = decode(Topic::BackgroundIndex, r#"{"background":1,"extra":true}"#).unwrap();
        assert_eq!(
            decoded,
            WireMessage::BackgroundIndex(BackgroundIndexMsg { background: 1 })
        );
    }

    #[test]
    fn codec_error_display() {
        let err = CodecError::Decode {
            topic: Topic::UserLoaded,
            message: "EOF".to_owned(),
        };
        let text = format!("{}", err);
        assert!(text.contains("UserLoadedTopic"));
        assert!(text.contains("EOF"));
    }
}
