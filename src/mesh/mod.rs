//! Mesh negotiation (direct topology)
//!
//! Per-pair offer/answer negotiation for participants talking directly
//! instead of through the hub. The heart of it is the candidate buffering
//! rule: connectivity candidates routinely outrace the description they
//! belong to, so each session queues them FIFO until its remote
//! description is applied, then flushes the queue in arrival order.
//!
//! Sessions are keyed by room plus unordered peer pair; glare (both sides
//! offering at once) is broken deterministically, with the lower identity
//! yielding.

pub mod config;
pub mod error;
pub mod session;
pub mod store;

pub use config::MeshConfig;
pub use error::NegotiationError;
pub use session::{
    AttachMode, CandidateDisposition, FailureNotice, MediaTrack, MeshSession, OfferDisposition,
    SessionState, TrackSwap,
};
pub use store::{FixedTracks, MeshStore, SessionKey, TrackSource};
