//! Hub error types
//!
//! Error types for resource graph operations. Lookup failures are usually
//! races with concurrent teardown and are recovered by the caller, never
//! propagated as panics.

use crate::registry::ConnectionId;
use crate::signaling::TransportDirection;

/// Error type for hub resource graph operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubError {
    /// Room not found
    RoomNotFound(String),
    /// Peer not found (connection raced with disconnect)
    PeerNotFound(ConnectionId),
    /// Transport id does not belong to the peer
    TransportNotFound(u64),
    /// Producer already closed or never existed
    ProducerNotFound(u64),
    /// Transport has the wrong direction for the operation
    WrongDirection {
        /// Direction the operation requires
        expected: TransportDirection,
    },
    /// `connect` called a second time on the same transport
    AlreadyConnected(u64),
    /// Resource was already closed
    AlreadyClosed(u64),
    /// Remote capabilities cannot consume the producer
    IncompatibleCapabilities(u64),
}

impl std::fmt::Display for HubError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HubError::RoomNotFound(room) => write!(f, "Room not found: {}", room),
            HubError::PeerNotFound(conn) => {
                write!(f, "Peer not found for connection {}", conn)
            }
            HubError::TransportNotFound(id) => write!(f, "Transport not found: {}", id),
            HubError::ProducerNotFound(id) => write!(f, "Producer not found: {}", id),
            HubError::WrongDirection { expected } => {
                write!(f, "Operation requires a {} transport", expected)
            }
            HubError::AlreadyConnected(id) => {
                write!(f, "Transport {} is already connected", id)
            }
            HubError::AlreadyClosed(id) => write!(f, "Resource {} is already closed", id),
            HubError::IncompatibleCapabilities(id) => {
                write!(f, "Capabilities cannot consume producer {}", id)
            }
        }
    }
}

impl std::error::Error for HubError {}
