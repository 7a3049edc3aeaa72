//! Room capability descriptors
//!
//! The shared codec set a room negotiates against, and the compatibility
//! check that gates subscription.

use serde::{Deserialize, Serialize};

use crate::signaling::{Codec, MediaParams};

/// The media capability descriptor shared by every peer in a room
///
/// Returned from `join-room` and matched against on `consume`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterCapabilities {
    /// Codecs the room's media policy supports
    pub codecs: Vec<Codec>,
}

impl RouterCapabilities {
    /// Create a capability descriptor from an explicit codec set
    pub fn with_codecs(codecs: Vec<Codec>) -> Self {
        Self { codecs }
    }

    /// Whether the descriptor supports the given codec
    pub fn supports(&self, codec: &Codec) -> bool {
        self.codecs.iter().any(|c| c.matches(codec))
    }
}

impl Default for RouterCapabilities {
    /// Opus audio and H264 video, the stock conference policy
    fn default() -> Self {
        Self {
            codecs: vec![
                Codec::audio("audio/opus", 48000, 2),
                Codec::video("video/H264", 90000)
                    .parameter("packetization-mode", "1")
                    .parameter("profile-level-id", "42e01f"),
            ],
        }
    }
}

/// Check whether remote capabilities can consume a producer's parameters
///
/// Pure function; `HubGraph::consume` applies the same check atomically
/// inside the operation, so callers can use this as an advisory pre-check
/// without a check-then-use race.
pub fn compatible(params: &MediaParams, remote: &[Codec]) -> bool {
    remote.iter().any(|c| c.matches(&params.codec))
}
