//! Rooms and peers
//!
//! A room is a mapping from connection identity to peer. Peers exclusively
//! own their transports, producers and consumers; a room exists only while
//! it has at least one peer.

use std::collections::HashMap;

use crate::registry::ConnectionId;
use crate::signaling::ProducerAnnouncement;

use super::error::HubError;
use super::resource::{Consumer, Producer, Transport};

/// One participant's presence in a room
#[derive(Debug)]
pub struct Peer {
    /// Application-supplied logical id; stable across reconnects
    pub peer_id: String,
    /// Current connection identity; changes across reconnects
    pub connection: ConnectionId,
    /// Transports owned by this peer, keyed by id
    pub transports: HashMap<u64, Transport>,
    /// Producers owned by this peer, keyed by id
    pub producers: HashMap<u64, Producer>,
    /// Consumers owned by this peer, keyed by id
    pub consumers: HashMap<u64, Consumer>,
}

impl Peer {
    /// Create a peer with no resources
    pub fn new(peer_id: impl Into<String>, connection: ConnectionId) -> Self {
        Self {
            peer_id: peer_id.into(),
            connection,
            transports: HashMap::new(),
            producers: HashMap::new(),
            consumers: HashMap::new(),
        }
    }

    /// Look up one of this peer's transports
    pub fn transport(&self, transport_id: u64) -> Result<&Transport, HubError> {
        self.transports
            .get(&transport_id)
            .ok_or(HubError::TransportNotFound(transport_id))
    }

    /// Look up one of this peer's transports mutably
    pub fn transport_mut(&mut self, transport_id: u64) -> Result<&mut Transport, HubError> {
        self.transports
            .get_mut(&transport_id)
            .ok_or(HubError::TransportNotFound(transport_id))
    }

    /// Total count of live (unclosed) owned resources
    pub fn live_resource_count(&self) -> usize {
        self.transports.values().filter(|t| !t.is_closed()).count()
            + self.producers.values().filter(|p| !p.is_closed()).count()
            + self.consumers.values().filter(|c| !c.is_closed()).count()
    }
}

/// A named group of peers sharing one media-exchange context
#[derive(Debug)]
pub struct Room {
    /// Room identifier
    pub id: String,
    peers: HashMap<ConnectionId, Peer>,
}

impl Room {
    /// Create an empty room
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            peers: HashMap::new(),
        }
    }

    /// Insert a peer under its connection identity
    pub fn insert_peer(&mut self, peer: Peer) {
        self.peers.insert(peer.connection, peer);
    }

    /// Look up a peer by connection identity
    pub fn peer(&self, conn: ConnectionId) -> Result<&Peer, HubError> {
        self.peers.get(&conn).ok_or(HubError::PeerNotFound(conn))
    }

    /// Look up a peer by connection identity, mutably
    pub fn peer_mut(&mut self, conn: ConnectionId) -> Result<&mut Peer, HubError> {
        self.peers
            .get_mut(&conn)
            .ok_or(HubError::PeerNotFound(conn))
    }

    /// Remove a peer, returning it for cascade teardown
    pub fn remove_peer(&mut self, conn: ConnectionId) -> Option<Peer> {
        self.peers.remove(&conn)
    }

    /// Whether the room has no peers left
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Number of peers in the room
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Connection ids of current members, optionally excluding one
    pub fn member_connections(&self, exclude: Option<ConnectionId>) -> Vec<ConnectionId> {
        self.peers
            .keys()
            .copied()
            .filter(|conn| Some(*conn) != exclude)
            .collect()
    }

    /// Members as `(connection, peer id)` pairs, optionally excluding one
    pub fn members(&self, exclude: Option<ConnectionId>) -> Vec<(ConnectionId, String)> {
        self.peers
            .iter()
            .filter(|(conn, _)| Some(**conn) != exclude)
            .map(|(conn, peer)| (*conn, peer.peer_id.clone()))
            .collect()
    }

    /// Resolve a logical peer id to its current connection identity
    pub fn connection_of(&self, peer_id: &str) -> Option<ConnectionId> {
        self.peers
            .values()
            .find(|p| p.peer_id == peer_id)
            .map(|p| p.connection)
    }

    /// Snapshot of live producers in the room, optionally excluding one
    /// peer's own
    pub fn live_producers(&self, exclude: Option<ConnectionId>) -> Vec<ProducerAnnouncement> {
        let mut announcements: Vec<ProducerAnnouncement> = self
            .peers
            .iter()
            .filter(|(conn, _)| Some(**conn) != exclude)
            .flat_map(|(_, peer)| {
                peer.producers
                    .values()
                    .filter(|p| !p.is_closed())
                    .map(|p| ProducerAnnouncement {
                        producer_id: p.id,
                        peer_id: peer.peer_id.clone(),
                        kind: p.kind,
                    })
            })
            .collect();
        announcements.sort_by_key(|a| a.producer_id);
        announcements
    }

    /// Find a live producer anywhere in the room
    ///
    /// Consumer back-references resolve through here; a missing or closed
    /// producer is a clean lookup failure, never a dangling reference.
    pub fn find_producer(&self, producer_id: u64) -> Option<(&Producer, &str)> {
        self.peers.values().find_map(|peer| {
            peer.producers
                .get(&producer_id)
                .filter(|p| !p.is_closed())
                .map(|p| (p, peer.peer_id.as_str()))
        })
    }

    /// Close every consumer in the room referencing the given producer
    ///
    /// Returns the number of consumers closed. Individual close failures
    /// are logged and skipped; the goal is to free as much as possible.
    pub fn close_consumers_of(&mut self, producer_id: u64) -> usize {
        let mut closed = 0;
        for peer in self.peers.values_mut() {
            for consumer in peer
                .consumers
                .values_mut()
                .filter(|c| c.producer_id == producer_id)
            {
                match consumer.close() {
                    Ok(()) => closed += 1,
                    Err(e) => {
                        tracing::warn!(
                            consumer = consumer.id,
                            producer = producer_id,
                            error = %e,
                            "Failed to close consumer of closed producer"
                        );
                    }
                }
            }
            peer.consumers.retain(|_, c| !c.is_closed());
        }
        closed
    }
}
