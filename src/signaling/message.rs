//! Signaling message schema
//!
//! The logical, transport-agnostic messages exchanged over the signaling
//! channel. Hub-topology messages are request/response; mesh-topology
//! messages (`offer`, `answer`, `ice-candidate`, `control`) are addressed
//! `to` a peer id and relayed fire-and-forget.
//!
//! Tag spellings match the original wire protocol: hub events are
//! kebab-case (`join-room`, `new-producer`), membership events keep their
//! snake_case names (`join_error`, `peer_joined`, `peer_left`,
//! `signal_error`).

use serde::{Deserialize, Serialize};

use super::types::{
    Codec, ConnectivityParams, IceCandidate, MediaKind, MediaParams, SessionDescription,
    TransportDirection,
};
use crate::hub::RouterCapabilities;

/// A message received from a participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Join a room under a logical peer id
    #[serde(rename_all = "camelCase")]
    JoinRoom { room_id: String, peer_id: String },

    /// Allocate a transport in the given direction
    CreateTransport { direction: TransportDirection },

    /// Establish connectivity on a previously created transport (one-shot)
    #[serde(rename_all = "camelCase")]
    ConnectTransport {
        transport_id: u64,
        connectivity: ConnectivityParams,
    },

    /// Publish a track on a send transport
    #[serde(rename_all = "camelCase")]
    Produce {
        transport_id: u64,
        kind: MediaKind,
        params: MediaParams,
    },

    /// Subscribe to a producer on a recv transport
    #[serde(rename_all = "camelCase")]
    Consume {
        transport_id: u64,
        producer_id: u64,
        capabilities: Vec<Codec>,
    },

    /// Leave the current room explicitly
    Leave,

    /// Mesh: forward an offer to a peer
    #[serde(rename_all = "camelCase")]
    Offer {
        room_id: String,
        to: String,
        description: SessionDescription,
    },

    /// Mesh: forward an answer to a peer
    #[serde(rename_all = "camelCase")]
    Answer {
        room_id: String,
        to: String,
        description: SessionDescription,
    },

    /// Mesh: forward an ICE candidate; `None` signals end-of-candidates
    #[serde(rename_all = "camelCase")]
    IceCandidate {
        room_id: String,
        to: String,
        candidate: Option<IceCandidate>,
    },

    /// Mesh: opaque control payload, passed through without interpretation
    #[serde(rename_all = "camelCase")]
    Control {
        room_id: String,
        to: String,
        action: String,
        #[serde(default)]
        data: serde_json::Value,
    },
}

impl ClientMessage {
    /// Parse a message from its JSON wire form
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Serialize to the JSON wire form
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Announcement of a live producer: id, owning peer and media kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerAnnouncement {
    pub producer_id: u64,
    pub peer_id: String,
    pub kind: MediaKind,
}

/// A message sent to a participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Join succeeded: room capabilities plus a snapshot of producers
    /// already live in the room (late joiners see these instead of the
    /// `new-producer` broadcasts they missed)
    #[serde(rename_all = "camelCase")]
    Joined {
        room_id: String,
        capabilities: RouterCapabilities,
        producers: Vec<ProducerAnnouncement>,
    },

    /// Join failed
    #[serde(rename = "join_error")]
    JoinError { message: String },

    /// Another peer entered the room
    #[serde(rename = "peer_joined", rename_all = "camelCase")]
    PeerJoined { peer_id: String },

    /// A peer left the room (or its connection dropped)
    #[serde(rename = "peer_left", rename_all = "camelCase")]
    PeerLeft { peer_id: String },

    /// Response to `create-transport`
    #[serde(rename_all = "camelCase")]
    TransportCreated {
        transport_id: u64,
        connectivity: ConnectivityParams,
    },

    /// Response to `connect-transport`
    #[serde(rename_all = "camelCase")]
    TransportConnected { transport_id: u64 },

    /// Response to `produce`
    #[serde(rename_all = "camelCase")]
    Produced { producer_id: u64 },

    /// Broadcast to other room members when a producer is created
    #[serde(rename_all = "camelCase")]
    NewProducer {
        producer_id: u64,
        peer_id: String,
        kind: MediaKind,
    },

    /// Response to `consume`
    #[serde(rename_all = "camelCase")]
    Consumed {
        consumer_id: u64,
        producer_id: u64,
        kind: MediaKind,
        params: MediaParams,
    },

    /// Mesh: relayed offer, sender identity injected by the relay
    #[serde(rename_all = "camelCase")]
    Offer {
        room_id: String,
        from: String,
        description: SessionDescription,
    },

    /// Mesh: relayed answer
    #[serde(rename_all = "camelCase")]
    Answer {
        room_id: String,
        from: String,
        description: SessionDescription,
    },

    /// Mesh: relayed ICE candidate (`None` = end-of-candidates)
    #[serde(rename_all = "camelCase")]
    IceCandidate {
        room_id: String,
        from: String,
        candidate: Option<IceCandidate>,
    },

    /// Mesh: relayed control payload
    #[serde(rename_all = "camelCase")]
    Control {
        room_id: String,
        from: String,
        action: String,
        #[serde(default)]
        data: serde_json::Value,
    },

    /// A mesh relay request could not be delivered
    #[serde(rename = "signal_error")]
    SignalError { message: String },

    /// A hub request failed; the session continues
    RequestFailed { message: String },
}

impl ServerMessage {
    /// Parse a message from its JSON wire form
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Serialize to the JSON wire form
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_tags_match_wire_protocol() {
        let join = ClientMessage::JoinRoom {
            room_id: "r1".into(),
            peer_id: "alice".into(),
        };
        let json = serde_json::to_value(&join).unwrap();
        assert_eq!(json["type"], "join-room");
        assert_eq!(json["roomId"], "r1");
        assert_eq!(json["peerId"], "alice");

        let create = ClientMessage::CreateTransport {
            direction: TransportDirection::Send,
        };
        let json = serde_json::to_value(&create).unwrap();
        assert_eq!(json["type"], "create-transport");
        assert_eq!(json["direction"], "send");
    }

    #[test]
    fn test_server_tags_keep_snake_case_membership_events() {
        let msg = ServerMessage::JoinError {
            message: "roomId and peerId are required".into(),
        };
        assert_eq!(serde_json::to_value(&msg).unwrap()["type"], "join_error");

        let msg = ServerMessage::PeerLeft {
            peer_id: "bob".into(),
        };
        assert_eq!(serde_json::to_value(&msg).unwrap()["type"], "peer_left");

        let msg = ServerMessage::NewProducer {
            producer_id: 7,
            peer_id: "alice".into(),
            kind: MediaKind::Video,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "new-producer");
        assert_eq!(json["producerId"], 7);
    }

    #[test]
    fn test_end_of_candidates_is_null() {
        let msg = ClientMessage::IceCandidate {
            room_id: "r1".into(),
            to: "bob".into(),
            candidate: None,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json["candidate"].is_null());

        let parsed = ClientMessage::from_json(&msg.to_json().unwrap()).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn test_control_passes_opaque_data() {
        let text = r#"{"type":"control","roomId":"r1","to":"bob","action":"start-ai","data":{"model":"slr-v2"}}"#;
        let msg = ClientMessage::from_json(text).unwrap();

        match msg {
            ClientMessage::Control { action, data, .. } => {
                assert_eq!(action, "start-ai");
                assert_eq!(data["model"], "slr-v2");
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }
}
