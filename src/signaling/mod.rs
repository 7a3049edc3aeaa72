//! Signaling wire schema
//!
//! The logical message set carried over the signaling channel. The
//! channel itself is an external collaborator: any
//! reliable, ordered, bidirectional text/event transport works. Messages
//! serialize to tagged JSON objects via [`ClientMessage::to_json`] and
//! friends.

pub mod message;
pub mod types;

pub use message::{ClientMessage, ProducerAnnouncement, ServerMessage};
pub use types::{
    Codec, ConnectivityParams, IceCandidate, MediaKind, MediaParams, SdpType,
    SessionDescription, TransportDirection,
};
