//! Shared wire-level data types
//!
//! Types that appear inside signaling payloads for both topologies:
//! media kinds, codec descriptors, connectivity material and the
//! offer/answer description and ICE candidate shapes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Media kind of a track, producer or consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Audio track
    Audio,
    /// Video track
    Video,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}

/// Direction of a hub transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportDirection {
    /// Carries producers (outbound media from the peer's point of view)
    Send,
    /// Carries consumers
    Recv,
}

impl std::fmt::Display for TransportDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportDirection::Send => write!(f, "send"),
            TransportDirection::Recv => write!(f, "recv"),
        }
    }
}

/// One media codec a room or participant supports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Codec {
    /// Media kind this codec applies to
    pub kind: MediaKind,
    /// MIME type, e.g. "audio/opus" or "video/H264"
    pub mime_type: String,
    /// Clock rate in Hz
    pub clock_rate: u32,
    /// Channel count (audio only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<u8>,
    /// Codec-specific parameters (e.g. packetization-mode)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
}

impl Codec {
    /// Create an audio codec descriptor
    pub fn audio(mime_type: impl Into<String>, clock_rate: u32, channels: u8) -> Self {
        Self {
            kind: MediaKind::Audio,
            mime_type: mime_type.into(),
            clock_rate,
            channels: Some(channels),
            parameters: BTreeMap::new(),
        }
    }

    /// Create a video codec descriptor
    pub fn video(mime_type: impl Into<String>, clock_rate: u32) -> Self {
        Self {
            kind: MediaKind::Video,
            mime_type: mime_type.into(),
            clock_rate,
            channels: None,
            parameters: BTreeMap::new(),
        }
    }

    /// Add a codec-specific parameter
    pub fn parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Check whether this codec is compatible with another
    ///
    /// Matching is by kind, MIME type (case-insensitive) and clock rate.
    /// Channel counts must agree when both sides declare them. Codec-specific
    /// parameters are not compared; parameter munging belongs to the media
    /// layer, not the coordinator.
    pub fn matches(&self, other: &Codec) -> bool {
        self.kind == other.kind
            && self.mime_type.eq_ignore_ascii_case(&other.mime_type)
            && self.clock_rate == other.clock_rate
            && match (self.channels, other.channels) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            }
    }
}

/// Negotiated parameters for a single produced or consumed track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaParams {
    /// The codec the track is encoded with
    pub codec: Codec,
}

impl MediaParams {
    /// Create media parameters for the given codec
    pub fn new(codec: Codec) -> Self {
        Self { codec }
    }
}

/// ICE/DTLS-equivalent connectivity material for one transport endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectivityParams {
    /// ICE username fragment
    pub ice_ufrag: String,
    /// ICE password
    pub ice_pwd: String,
    /// DTLS certificate fingerprint
    pub fingerprint: String,
}

/// Which half of the description exchange a payload carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    /// First half of the exchange
    Offer,
    /// Second half of the exchange
    Answer,
}

/// A session description as shipped over signaling
///
/// Same shape as the `{ type, sdp }` object a WebRTC stack serializes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// Offer or answer
    #[serde(rename = "type")]
    pub kind: SdpType,
    /// The raw SDP blob (opaque to the coordinator)
    pub sdp: String,
}

impl SessionDescription {
    /// Create an offer description
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    /// Create an answer description
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// A discovered network path descriptor
///
/// Matches the JSON shape of `RTCIceCandidate.toJSON()`. A `None` candidate
/// on the wire signals end-of-candidates and is represented outside this
/// struct (`Option<IceCandidate>` in the message schema).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    /// The candidate line
    pub candidate: String,
    /// Media stream identification tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    /// Index of the media description the candidate belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u16>,
}

impl IceCandidate {
    /// Create a candidate from its candidate line
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_m_line_index: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_match_case_insensitive_mime() {
        let a = Codec::video("video/H264", 90000);
        let b = Codec::video("video/h264", 90000);

        assert!(a.matches(&b));
    }

    #[test]
    fn test_codec_mismatch_clock_rate() {
        let a = Codec::audio("audio/opus", 48000, 2);
        let b = Codec::audio("audio/opus", 44100, 2);

        assert!(!a.matches(&b));
    }

    #[test]
    fn test_codec_channels_lenient_when_undeclared() {
        let mut a = Codec::audio("audio/opus", 48000, 2);
        let b = Codec {
            channels: None,
            ..a.clone()
        };

        assert!(a.matches(&b));

        a.channels = Some(1);
        let c = Codec::audio("audio/opus", 48000, 2);
        assert!(!a.matches(&c));
    }

    #[test]
    fn test_description_wire_shape() {
        let desc = SessionDescription::offer("v=0...");
        let json = serde_json::to_value(&desc).unwrap();

        assert_eq!(json["type"], "offer");
        assert_eq!(json["sdp"], "v=0...");
    }

    #[test]
    fn test_candidate_wire_shape() {
        let cand = IceCandidate {
            candidate: "candidate:1 1 udp 2122260223 192.0.2.1 54321 typ host".into(),
            sdp_mid: Some("0".into()),
            sdp_m_line_index: Some(0),
        };
        let json = serde_json::to_value(&cand).unwrap();

        assert_eq!(json["sdpMid"], "0");
        assert_eq!(json["sdpMLineIndex"], 0);
    }
}
