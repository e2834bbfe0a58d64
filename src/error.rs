//! Error types for the session.
//!
//! The only failure mode the protocol itself models is a rejected message
//! send; everything else is ambient (codec failures, unknown topics). All
//! failures are non-fatal to the session.

use std::error::Error;
use std::fmt;
use std::fmt::Display;

use crate::channels::codec::CodecError;
use crate::channels::messages::Topic;

/// This enum contains all error messages this library can return. Fallible
/// API functions generally return a [`Result<(), SessionError>`].
///
/// [`Result<(), SessionError>`]: std::result::Result
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionError {
    /// The transport rejected a broadcast. The session logs this and, for
    /// the turn-advance broadcast specifically, reverts the countdown
    /// display flag; it never retries.
    SendFailed {
        /// The channel the message was destined for.
        topic: Topic,
        /// The transport's description of the failure.
        reason: String,
    },
    /// Encoding or decoding a wire message failed.
    Codec(CodecError),
    /// A payload arrived on a channel name this session does not know.
    UnknownTopic {
        /// The unrecognized channel name.
        topic: String,
    },
}

impl Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::SendFailed { topic, reason } => {
                write!(f, "Failed to send on {}: {}", topic, reason)
            }
            SessionError::Codec(err) => {
                write!(f, "Codec error: {}", err)
            }
            SessionError::UnknownTopic { topic } => {
                write!(f, "Unknown channel name: {}", topic)
            }
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SessionError::Codec(err) => Some(err),
            SessionError::SendFailed { .. } | SessionError::UnknownTopic { .. } => None,
        }
    }
}

impl From<CodecError> for SessionError {
    fn from(err: CodecError) -> Self {
        SessionError::Codec(err)
    }
}

/// A transport-level send failure, returned by [`Broadcast::send`].
///
/// Transports surface whatever diagnostic they have as a string; the session
/// wraps it into [`SessionError::SendFailed`] together with the topic.
///
/// [`Broadcast::send`]: crate::Broadcast::send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendError {
    /// The transport's description of the failure.
    pub reason: String,
}

impl SendError {
    /// Creates a new `SendError` from any displayable reason.
    pub fn new(reason: impl Display) -> Self {
        Self {
            reason: reason.to_string(),
        }
    }
}

impl Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "message send rejected: {}", self.reason)
    }
}

impl Error for SendError {}

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
    fn send_failed_display_includes_topic_and_reason() {
        let err = SessionError::SendFailed {
            topic: Topic::TurnIndex,
            reason: "peer unreachable".to_owned(),
        };
        let text = format!("{}", err);
        assert!(text.contains("TurnIndexTopic"));
        assert!(text.contains("peer unreachable"));
    }

    #[test]
    fn unknown_topic_display() {
        let err = SessionError::UnknownTopic {
            topic: "ScoreTopic".to_owned(),
        };
        assert_eq!(format!("{}", err), "Unknown channel name: ScoreTopic");
    }

    #[test]
    fn codec_error_converts_and_exposes_source() {
        let codec = CodecError::Decode {
            topic: Topic::BackgroundIndex,
            message: "expected value".to_owned(),
        };
        let err: SessionError = codec.clone().into();
        assert_eq!(err, SessionError::Codec(codec));
        assert!(err.source().is_some());
    }

    #[test]
    fn send_error_display() {
        let err = SendError::new("channel closed");
        assert_eq!(format!("{}", err), "message send rejected: channel closed");
    }

    #[test]
    fn session_error_equality() {
        let a = SessionError::UnknownTopic {
            topic: "X".to_owned(),
        };
        let b = SessionError::UnknownTopic {
            topic: "X".to_owned(),
        };
        assert_eq!(a, b);
    }
}
