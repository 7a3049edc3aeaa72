//! Hub resource graph
//!
//! The central ownership graph for the forwarding-hub topology:
//! room → peer → transport → producer/consumer. All mutation goes through
//! the operations here, never direct field writes.
//!
//! Locking is two-level, like the stream registry this crate grew out of:
//! the room table lock is held only to look up or insert a room entry;
//! per-room mutation takes that room's own lock, so operations in
//! different rooms never serialize against each other.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::registry::ConnectionId;
use crate::signaling::{
    Codec, ConnectivityParams, MediaKind, MediaParams, ProducerAnnouncement, TransportDirection,
};

use super::capabilities::{compatible, RouterCapabilities};
use super::error::HubError;
use super::resource::{Consumer, Producer, Transport};
use super::room::{Peer, Room};

/// Result of a join: capabilities, what is already live, who else is here
#[derive(Debug, Clone)]
pub struct JoinSummary {
    /// The room's shared negotiation capability descriptor
    pub capabilities: RouterCapabilities,
    /// Producers already live in the room (late-join enumeration; these
    /// replace the `new-producer` broadcasts the joiner was not there for)
    pub producers: Vec<ProducerAnnouncement>,
    /// Other current members as `(connection, peer id)` pairs
    pub others: Vec<(ConnectionId, String)>,
    /// Whether this join refreshed an existing peer (reconnect)
    pub rejoined: bool,
    /// The connection the peer was rebound from, when this join replaced
    /// a stale connection identity
    pub previous: Option<ConnectionId>,
}

/// Parameters returned from transport allocation
#[derive(Debug, Clone)]
pub struct TransportParams {
    /// Id of the new transport
    pub transport_id: u64,
    /// Locally generated connectivity material for the client
    pub connectivity: ConnectivityParams,
}

/// Result of `produce`: the announcement and who should receive it
#[derive(Debug, Clone)]
pub struct ProducerCreated {
    /// Broadcast payload for the room
    pub announcement: ProducerAnnouncement,
    /// Connections of every *other* member, snapshotted under the room
    /// lock at creation time
    pub notify: Vec<ConnectionId>,
}

/// Parameters returned from `consume`
#[derive(Debug, Clone)]
pub struct ConsumerParams {
    /// Id of the new consumer
    pub consumer_id: u64,
    /// The producer it receives from
    pub producer_id: u64,
    /// Media kind
    pub kind: MediaKind,
    /// Negotiated receive parameters
    pub params: MediaParams,
}

/// Result of peer teardown
#[derive(Debug, Clone)]
pub struct PeerCleanup {
    /// Logical id of the departed peer
    pub peer_id: String,
    /// Connections of the members still in the room
    pub remaining: Vec<ConnectionId>,
    /// Whether the room became empty and was pruned
    pub room_pruned: bool,
}

/// The hub-side resource graph
///
/// Thread-safe; one instance serves every room.
pub struct HubGraph {
    rooms: RwLock<HashMap<String, Arc<Mutex<Room>>>>,
    capabilities: RouterCapabilities,
    next_id: AtomicU64,
}

impl HubGraph {
    /// Create a graph with the default media policy
    pub fn new() -> Self {
        Self::with_capabilities(RouterCapabilities::default())
    }

    /// Create a graph with a custom media policy
    pub fn with_capabilities(capabilities: RouterCapabilities) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            capabilities,
            next_id: AtomicU64::new(1),
        }
    }

    /// The shared capability descriptor handed out on join
    pub fn capabilities(&self) -> &RouterCapabilities {
        &self.capabilities
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn room(&self, room_id: &str) -> Result<Arc<Mutex<Room>>, HubError> {
        self.rooms
            .read()
            .await
            .get(room_id)
            .cloned()
            .ok_or_else(|| HubError::RoomNotFound(room_id.to_string()))
    }

    /// Run a closure against a room under its lock (read-style access)
    ///
    /// Returns `None` if the room does not exist.
    pub async fn inspect_room<R>(
        &self,
        room_id: &str,
        f: impl FnOnce(&Room) -> R,
    ) -> Option<R> {
        let room_arc = self.rooms.read().await.get(room_id).cloned()?;
        let room = room_arc.lock().await;
        Some(f(&room))
    }

    /// Join a room, creating it if absent
    ///
    /// Idempotent for a reconnecting `{room, peer}` pair: the existing
    /// peer's connection identity is refreshed and its resources are
    /// preserved instead of creating a duplicate peer.
    pub async fn join_room(
        &self,
        conn: ConnectionId,
        room_id: &str,
        peer_id: &str,
    ) -> JoinSummary {
        let room_arc = {
            let mut rooms = self.rooms.write().await;
            rooms
                .entry(room_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(Room::new(room_id))))
                .clone()
        };

        let mut room = room_arc.lock().await;

        let (rejoined, previous) = match room.connection_of(peer_id) {
            Some(old_conn) if old_conn != conn => {
                // Reconnect: rebind the existing peer to the new connection
                if let Some(mut peer) = room.remove_peer(old_conn) {
                    peer.connection = conn;
                    room.insert_peer(peer);
                }
                (true, Some(old_conn))
            }
            Some(_) => (true, None), // replayed join on the same connection
            None => {
                room.insert_peer(Peer::new(peer_id, conn));
                (false, None)
            }
        };

        let others = room.members(Some(conn));
        let producers = room.live_producers(Some(conn));

        tracing::info!(
            room = %room_id,
            peer = %peer_id,
            conn = conn,
            rejoined = rejoined,
            members = room.peer_count(),
            "Peer joined room"
        );

        JoinSummary {
            capabilities: self.capabilities.clone(),
            producers,
            others,
            rejoined,
            previous,
        }
    }

    /// Allocate a transport owned by the calling peer
    pub async fn create_transport(
        &self,
        conn: ConnectionId,
        room_id: &str,
        direction: TransportDirection,
    ) -> Result<TransportParams, HubError> {
        let room_arc = self.room(room_id).await?;
        let mut room = room_arc.lock().await;
        let peer = room.peer_mut(conn)?;

        let id = self.allocate_id();
        let transport = Transport::new(id, direction);
        let connectivity = transport.local.clone();
        peer.transports.insert(id, transport);

        tracing::info!(
            room = %room_id,
            peer = %peer.peer_id,
            transport = id,
            direction = %direction,
            "Transport created"
        );

        Ok(TransportParams {
            transport_id: id,
            connectivity,
        })
    }

    /// Establish connectivity on a transport (one-shot)
    ///
    /// A second call fails with `AlreadyConnected`; state is unchanged by
    /// the failing call.
    pub async fn connect_transport(
        &self,
        conn: ConnectionId,
        room_id: &str,
        transport_id: u64,
        remote: ConnectivityParams,
    ) -> Result<(), HubError> {
        let room_arc = self.room(room_id).await?;
        let mut room = room_arc.lock().await;
        let peer = room.peer_mut(conn)?;

        peer.transport_mut(transport_id)?.connect(remote)?;

        tracing::debug!(
            room = %room_id,
            transport = transport_id,
            "Transport connected"
        );

        Ok(())
    }

    /// Publish a track on a send transport
    ///
    /// The notify list is snapshotted under the room lock, so a peer
    /// joining concurrently either appears in it or discovers the producer
    /// through its join snapshot, never both and never neither.
    pub async fn produce(
        &self,
        conn: ConnectionId,
        room_id: &str,
        transport_id: u64,
        kind: MediaKind,
        params: MediaParams,
    ) -> Result<ProducerCreated, HubError> {
        let room_arc = self.room(room_id).await?;
        let mut room = room_arc.lock().await;

        let (producer_id, peer_id) = {
            let peer = room.peer_mut(conn)?;
            let transport = peer.transport(transport_id)?;
            if transport.direction != TransportDirection::Send {
                return Err(HubError::WrongDirection {
                    expected: TransportDirection::Send,
                });
            }

            let id = self.allocate_id();
            peer.producers
                .insert(id, Producer::new(id, transport_id, kind, params));
            (id, peer.peer_id.clone())
        };

        let notify = room.member_connections(Some(conn));

        tracing::info!(
            room = %room_id,
            peer = %peer_id,
            producer = producer_id,
            kind = %kind,
            recipients = notify.len(),
            "Producer created"
        );

        Ok(ProducerCreated {
            announcement: ProducerAnnouncement {
                producer_id,
                peer_id,
                kind,
            },
            notify,
        })
    }

    /// Pure capability compatibility check; mutates nothing
    ///
    /// `consume` re-applies the same check atomically inside the
    /// operation, so this is advisory only.
    pub async fn can_consume(&self, room_id: &str, producer_id: u64, remote: &[Codec]) -> bool {
        let Ok(room_arc) = self.room(room_id).await else {
            return false;
        };
        let room = room_arc.lock().await;
        room.find_producer(producer_id)
            .map(|(producer, _)| compatible(&producer.params, remote))
            .unwrap_or(false)
    }

    /// Subscribe to a producer on a recv transport
    ///
    /// The capability gate is enforced here, in the same critical section
    /// as the lookup, so there is no check-then-use race with producer
    /// teardown.
    pub async fn consume(
        &self,
        conn: ConnectionId,
        room_id: &str,
        transport_id: u64,
        producer_id: u64,
        remote: &[Codec],
    ) -> Result<ConsumerParams, HubError> {
        let room_arc = self.room(room_id).await?;
        let mut room = room_arc.lock().await;

        let (kind, params) = room
            .find_producer(producer_id)
            .map(|(producer, _)| (producer.kind, producer.params.clone()))
            .ok_or(HubError::ProducerNotFound(producer_id))?;

        if !compatible(&params, remote) {
            return Err(HubError::IncompatibleCapabilities(producer_id));
        }

        let peer = room.peer_mut(conn)?;
        let transport = peer.transport(transport_id)?;
        if transport.direction != TransportDirection::Recv {
            return Err(HubError::WrongDirection {
                expected: TransportDirection::Recv,
            });
        }

        let id = self.allocate_id();
        peer.consumers
            .insert(id, Consumer::new(id, transport_id, producer_id, kind, params.clone()));

        tracing::info!(
            room = %room_id,
            peer = %peer.peer_id,
            consumer = id,
            producer = producer_id,
            "Consumer created"
        );

        Ok(ConsumerParams {
            consumer_id: id,
            producer_id,
            kind,
            params,
        })
    }

    /// Explicitly close a producer
    ///
    /// Consumers anywhere in the room referencing it are closed as well;
    /// their teardown is independent of the producer's because the
    /// reference is a plain id, not ownership.
    pub async fn close_producer(
        &self,
        conn: ConnectionId,
        room_id: &str,
        producer_id: u64,
    ) -> Result<(), HubError> {
        let room_arc = self.room(room_id).await?;
        let mut room = room_arc.lock().await;

        {
            let peer = room.peer_mut(conn)?;
            let producer = peer
                .producers
                .get_mut(&producer_id)
                .ok_or(HubError::ProducerNotFound(producer_id))?;
            producer.close()?;
            peer.producers.remove(&producer_id);
        }

        let orphaned = room.close_consumers_of(producer_id);

        tracing::info!(
            room = %room_id,
            producer = producer_id,
            orphaned_consumers = orphaned,
            "Producer closed"
        );

        Ok(())
    }

    /// Explicitly close a transport
    ///
    /// Cascades to the producers and consumers riding on it; producers
    /// closing in turn close their consumers across the room.
    pub async fn close_transport(
        &self,
        conn: ConnectionId,
        room_id: &str,
        transport_id: u64,
    ) -> Result<(), HubError> {
        let room_arc = self.room(room_id).await?;
        let mut room = room_arc.lock().await;

        let producer_ids = {
            let peer = room.peer_mut(conn)?;
            peer.transport_mut(transport_id)?.close()?;

            let producer_ids: Vec<u64> = peer
                .producers
                .values()
                .filter(|p| p.transport_id == transport_id)
                .map(|p| p.id)
                .collect();
            for id in &producer_ids {
                if let Some(mut producer) = peer.producers.remove(id) {
                    if let Err(e) = producer.close() {
                        tracing::warn!(producer = *id, error = %e, "Producer close failed");
                    }
                }
            }

            let consumer_ids: Vec<u64> = peer
                .consumers
                .values()
                .filter(|c| c.transport_id == transport_id)
                .map(|c| c.id)
                .collect();
            for id in consumer_ids {
                if let Some(mut consumer) = peer.consumers.remove(&id) {
                    if let Err(e) = consumer.close() {
                        tracing::warn!(consumer = id, error = %e, "Consumer close failed");
                    }
                }
            }

            peer.transports.remove(&transport_id);
            producer_ids
        };

        for producer_id in producer_ids {
            room.close_consumers_of(producer_id);
        }

        tracing::info!(
            room = %room_id,
            transport = transport_id,
            "Transport closed"
        );

        Ok(())
    }

    /// Remove a peer and cascade-close everything it owns
    ///
    /// Used by both explicit `leave` and the connection-drop path.
    /// Cleanup is best-effort: individual close failures are logged and
    /// the cascade continues, because the goal is to free as much as
    /// possible. The room is pruned if it becomes empty.
    pub async fn remove_peer(
        &self,
        conn: ConnectionId,
        room_id: &str,
    ) -> Result<PeerCleanup, HubError> {
        let room_arc = self.room(room_id).await?;

        let (cleanup, became_empty) = {
            let mut room = room_arc.lock().await;
            let mut peer = room.remove_peer(conn).ok_or(HubError::PeerNotFound(conn))?;

            // Consumers first, then producers, then transports
            for (_, mut consumer) in peer.consumers.drain() {
                if let Err(e) = consumer.close() {
                    tracing::warn!(consumer = consumer.id, error = %e, "Consumer close failed during teardown");
                }
            }

            let mut producer_ids = Vec::new();
            for (_, mut producer) in peer.producers.drain() {
                producer_ids.push(producer.id);
                if let Err(e) = producer.close() {
                    tracing::warn!(producer = producer.id, error = %e, "Producer close failed during teardown");
                }
            }

            for (_, mut transport) in peer.transports.drain() {
                if let Err(e) = transport.close() {
                    tracing::warn!(transport = transport.id, error = %e, "Transport close failed during teardown");
                }
            }

            // Other peers' consumers of this peer's producers
            for producer_id in producer_ids {
                room.close_consumers_of(producer_id);
            }

            let remaining = room.member_connections(None);
            let became_empty = room.is_empty();

            tracing::info!(
                room = %room_id,
                peer = %peer.peer_id,
                remaining = remaining.len(),
                "Peer removed from room"
            );

            (
                PeerCleanup {
                    peer_id: std::mem::take(&mut peer.peer_id),
                    remaining,
                    room_pruned: false,
                },
                became_empty,
            )
        };

        let mut cleanup = cleanup;
        if became_empty {
            let mut rooms = self.rooms.write().await;
            if let Some(entry) = rooms.get(room_id) {
                // Re-check under the table lock; a concurrent join may
                // have repopulated the room.
                let still_empty = entry.lock().await.is_empty();
                if still_empty {
                    rooms.remove(room_id);
                    cleanup.room_pruned = true;
                    tracing::info!(room = %room_id, "Empty room pruned");
                }
            }
        }

        Ok(cleanup)
    }

    /// Whether a room currently exists
    pub async fn room_exists(&self, room_id: &str) -> bool {
        self.rooms.read().await.contains_key(room_id)
    }

    /// Total number of rooms
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

impl Default for HubGraph {
    fn default() -> Self {
        Self::new()
    }
}
