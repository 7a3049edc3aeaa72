//! Mesh negotiation error types

use crate::signaling::SdpType;

use super::session::SessionState;

/// Error type for mesh negotiation operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiationError {
    /// Local media could not be acquired (e.g. device already in use)
    MediaUnavailable(String),
    /// A track with this identity is already attached
    DuplicateTrack(String),
    /// An offer was requested with no local tracks attached
    NoLocalMedia,
    /// The event is not legal in the session's current state
    InvalidTransition {
        /// State the session was in
        from: SessionState,
        /// The event that was rejected
        event: &'static str,
    },
    /// The description payload has the wrong type for the operation
    DescriptionMismatch {
        /// The type the operation requires
        expected: SdpType,
    },
    /// The session has already terminated
    Closed,
}

impl std::fmt::Display for NegotiationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NegotiationError::MediaUnavailable(detail) => {
                write!(f, "Local media unavailable: {}", detail)
            }
            NegotiationError::DuplicateTrack(id) => {
                write!(f, "Track already attached: {}", id)
            }
            NegotiationError::NoLocalMedia => {
                write!(f, "No local tracks attached")
            }
            NegotiationError::InvalidTransition { from, event } => {
                write!(f, "Cannot {} in state {}", event, from)
            }
            NegotiationError::DescriptionMismatch { expected } => {
                write!(f, "Expected {:?} description", expected)
            }
            NegotiationError::Closed => write!(f, "Session already terminated"),
        }
    }
}

impl std::error::Error for NegotiationError {}
