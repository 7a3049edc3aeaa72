//! Signaling relay
//!
//! Routes each inbound message to the hub resource graph or to its mesh
//! negotiation partner, and fans hub lifecycle events (`new-producer`,
//! `peer_joined`, `peer_left`) out to room members. One relay instance
//! serves every connection; each connection attaches an outbound channel
//! and is handled by its own task, so a slow operation for one connection
//! never blocks candidates arriving for another.

use std::collections::HashMap;

use tokio::sync::{mpsc, RwLock};

use crate::hub::{HubGraph, PeerCleanup, RouterCapabilities};
use crate::registry::{Binding, ConnectionId, RegistryError, SessionRegistry};
use crate::signaling::{ClientMessage, ServerMessage};

/// The relay: session registry + hub graph + outbound channels
pub struct SignalingRelay {
    registry: SessionRegistry,
    hub: HubGraph,
    senders: RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<ServerMessage>>>,
}

impl SignalingRelay {
    /// Create a relay with the default room media policy
    pub fn new() -> Self {
        Self::with_capabilities(RouterCapabilities::default())
    }

    /// Create a relay with a custom room media policy
    pub fn with_capabilities(capabilities: RouterCapabilities) -> Self {
        Self {
            registry: SessionRegistry::new(),
            hub: HubGraph::with_capabilities(capabilities),
            senders: RwLock::new(HashMap::new()),
        }
    }

    /// The hub resource graph behind this relay
    pub fn hub(&self) -> &HubGraph {
        &self.hub
    }

    /// The session registry behind this relay
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Attach a connection's outbound channel
    ///
    /// Everything addressed to `conn` is delivered through the returned
    /// receiver. Re-attaching replaces the previous channel.
    pub async fn attach(&self, conn: ConnectionId) -> mpsc::UnboundedReceiver<ServerMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        if self.senders.write().await.insert(conn, tx).is_some() {
            tracing::warn!(conn = conn, "Outbound channel replaced");
        }
        rx
    }

    /// Handle the connection dropping
    ///
    /// Idempotent: the registry yields the binding at most once, so the
    /// hub cascade and `peer_left` broadcast run at most once.
    pub async fn disconnect(&self, conn: ConnectionId) {
        self.senders.write().await.remove(&conn);
        if let Some(binding) = self.registry.unregister(conn).await {
            self.teardown(conn, &binding).await;
        }
    }

    /// Dispatch one inbound message
    ///
    /// Messages from connections that already disconnected are no-ops,
    /// never errors: lookup failures here are races, not bugs.
    pub async fn handle(&self, conn: ConnectionId, message: ClientMessage) {
        match message {
            ClientMessage::JoinRoom { room_id, peer_id } => {
                self.handle_join(conn, room_id, peer_id).await;
            }

            ClientMessage::CreateTransport { direction } => {
                let Some(binding) = self.binding_of(conn).await else {
                    return;
                };
                match self
                    .hub
                    .create_transport(conn, &binding.room_id, direction)
                    .await
                {
                    Ok(params) => {
                        self.send_to(
                            conn,
                            ServerMessage::TransportCreated {
                                transport_id: params.transport_id,
                                connectivity: params.connectivity,
                            },
                        )
                        .await;
                    }
                    Err(e) => self.request_failed(conn, e).await,
                }
            }

            ClientMessage::ConnectTransport {
                transport_id,
                connectivity,
            } => {
                let Some(binding) = self.binding_of(conn).await else {
                    return;
                };
                match self
                    .hub
                    .connect_transport(conn, &binding.room_id, transport_id, connectivity)
                    .await
                {
                    Ok(()) => {
                        self.send_to(conn, ServerMessage::TransportConnected { transport_id })
                            .await;
                    }
                    Err(e) => self.request_failed(conn, e).await,
                }
            }

            ClientMessage::Produce {
                transport_id,
                kind,
                params,
            } => {
                let Some(binding) = self.binding_of(conn).await else {
                    return;
                };
                match self
                    .hub
                    .produce(conn, &binding.room_id, transport_id, kind, params)
                    .await
                {
                    Ok(created) => {
                        self.send_to(
                            conn,
                            ServerMessage::Produced {
                                producer_id: created.announcement.producer_id,
                            },
                        )
                        .await;
                        let broadcast = ServerMessage::NewProducer {
                            producer_id: created.announcement.producer_id,
                            peer_id: created.announcement.peer_id,
                            kind: created.announcement.kind,
                        };
                        for member in created.notify {
                            self.send_to(member, broadcast.clone()).await;
                        }
                    }
                    Err(e) => self.request_failed(conn, e).await,
                }
            }

            ClientMessage::Consume {
                transport_id,
                producer_id,
                capabilities,
            } => {
                let Some(binding) = self.binding_of(conn).await else {
                    return;
                };
                match self
                    .hub
                    .consume(
                        conn,
                        &binding.room_id,
                        transport_id,
                        producer_id,
                        &capabilities,
                    )
                    .await
                {
                    Ok(consumer) => {
                        self.send_to(
                            conn,
                            ServerMessage::Consumed {
                                consumer_id: consumer.consumer_id,
                                producer_id: consumer.producer_id,
                                kind: consumer.kind,
                                params: consumer.params,
                            },
                        )
                        .await;
                    }
                    Err(e) => self.request_failed(conn, e).await,
                }
            }

            ClientMessage::Leave => {
                if let Some(binding) = self.registry.unregister(conn).await {
                    self.teardown(conn, &binding).await;
                }
            }

            ClientMessage::Offer {
                room_id,
                to,
                description,
            } => {
                self.relay_signal(conn, &room_id, &to, |from| ServerMessage::Offer {
                    room_id: room_id.clone(),
                    from,
                    description: description.clone(),
                })
                .await;
            }

            ClientMessage::Answer {
                room_id,
                to,
                description,
            } => {
                self.relay_signal(conn, &room_id, &to, |from| ServerMessage::Answer {
                    room_id: room_id.clone(),
                    from,
                    description: description.clone(),
                })
                .await;
            }

            ClientMessage::IceCandidate {
                room_id,
                to,
                candidate,
            } => {
                self.relay_signal(conn, &room_id, &to, |from| ServerMessage::IceCandidate {
                    room_id: room_id.clone(),
                    from,
                    candidate: candidate.clone(),
                })
                .await;
            }

            ClientMessage::Control {
                room_id,
                to,
                action,
                data,
            } => {
                // Pass-through: the relay never interprets control bodies
                self.relay_signal(conn, &room_id, &to, |from| ServerMessage::Control {
                    room_id: room_id.clone(),
                    from,
                    action: action.clone(),
                    data: data.clone(),
                })
                .await;
            }
        }
    }

    async fn handle_join(&self, conn: ConnectionId, room_id: String, peer_id: String) {
        if room_id.is_empty() || peer_id.is_empty() {
            self.send_to(
                conn,
                ServerMessage::JoinError {
                    message: "roomId and peerId are required".into(),
                },
            )
            .await;
            return;
        }

        match self.registry.register(conn, &room_id, &peer_id).await {
            Ok(()) => {}
            Err(RegistryError::DuplicateRegistration(_)) => {
                // A replayed join (reconnect logic re-sending its intent)
                // is idempotent when it names the same binding
                match self.registry.resolve(conn).await {
                    Ok(binding) if binding.room_id == room_id && binding.peer_id == peer_id => {}
                    _ => {
                        self.send_to(
                            conn,
                            ServerMessage::JoinError {
                                message: "connection is already in a room".into(),
                            },
                        )
                        .await;
                        return;
                    }
                }
            }
            Err(e) => {
                self.send_to(
                    conn,
                    ServerMessage::JoinError {
                        message: e.to_string(),
                    },
                )
                .await;
                return;
            }
        }

        let summary = self.hub.join_room(conn, &room_id, &peer_id).await;

        // Reconnect: the peer was rebound away from a stale connection.
        // Retire that connection now so its eventual disconnect is a
        // no-op instead of tearing the peer down.
        if let Some(old_conn) = summary.previous {
            self.senders.write().await.remove(&old_conn);
            self.registry.unregister(old_conn).await;
            tracing::info!(
                conn = conn,
                old_conn = old_conn,
                peer = %peer_id,
                "Peer rebound from stale connection"
            );
        }

        self.send_to(
            conn,
            ServerMessage::Joined {
                room_id: room_id.clone(),
                capabilities: summary.capabilities,
                producers: summary.producers,
            },
        )
        .await;

        // Announce both ways, like the original room handlers: existing
        // members learn of the joiner, the joiner learns who is here
        for (member_conn, member_peer) in summary.others {
            self.send_to(
                member_conn,
                ServerMessage::PeerJoined {
                    peer_id: peer_id.clone(),
                },
            )
            .await;
            self.send_to(
                conn,
                ServerMessage::PeerJoined {
                    peer_id: member_peer,
                },
            )
            .await;
        }
    }

    /// Forward a mesh signal to its addressee, injecting the sender id
    async fn relay_signal(
        &self,
        conn: ConnectionId,
        room_id: &str,
        to: &str,
        build: impl FnOnce(String) -> ServerMessage,
    ) {
        let Some(binding) = self.binding_of(conn).await else {
            return;
        };
        if binding.room_id != room_id {
            self.send_to(
                conn,
                ServerMessage::SignalError {
                    message: format!("Not joined to room '{}'", room_id),
                },
            )
            .await;
            return;
        }

        let target = self
            .hub
            .inspect_room(room_id, |room| room.connection_of(to))
            .await
            .flatten();

        match target {
            Some(target_conn) if target_conn != conn => {
                self.send_to(target_conn, build(binding.peer_id)).await;
            }
            Some(_) => {
                tracing::debug!(conn = conn, to = %to, "Dropping self-addressed signal");
            }
            None => {
                self.send_to(
                    conn,
                    ServerMessage::SignalError {
                        message: format!("Target peer '{}' not found", to),
                    },
                )
                .await;
            }
        }
    }

    async fn teardown(&self, conn: ConnectionId, binding: &Binding) {
        match self.hub.remove_peer(conn, &binding.room_id).await {
            Ok(PeerCleanup {
                peer_id, remaining, ..
            }) => {
                for member in remaining {
                    self.send_to(
                        member,
                        ServerMessage::PeerLeft {
                            peer_id: peer_id.clone(),
                        },
                    )
                    .await;
                }
            }
            Err(e) => {
                // Raced with a reconnect or a concurrent leave; nothing
                // left to clean
                tracing::debug!(conn = conn, error = %e, "Teardown found no peer");
            }
        }
    }

    async fn binding_of(&self, conn: ConnectionId) -> Option<Binding> {
        match self.registry.resolve(conn).await {
            Ok(binding) => Some(binding),
            Err(e) => {
                tracing::debug!(conn = conn, error = %e, "Message from unbound connection dropped");
                None
            }
        }
    }

    async fn request_failed(&self, conn: ConnectionId, error: crate::hub::HubError) {
        tracing::warn!(conn = conn, error = %error, "Hub request failed");
        self.send_to(
            conn,
            ServerMessage::RequestFailed {
                message: error.to_string(),
            },
        )
        .await;
    }

    async fn send_to(&self, conn: ConnectionId, message: ServerMessage) {
        let sender = self.senders.read().await.get(&conn).cloned();
        match sender {
            Some(tx) => {
                if tx.send(message).is_err() {
                    tracing::debug!(conn = conn, "Outbound channel closed");
                }
            }
            None => {
                tracing::debug!(conn = conn, "No outbound channel attached");
            }
        }
    }
}

impl Default for SignalingRelay {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signaling::{
        Codec, ConnectivityParams, MediaKind, MediaParams, SessionDescription, TransportDirection,
    };

    fn audio_params() -> MediaParams {
        MediaParams::new(Codec::audio("audio/opus", 48000, 2))
    }

    fn remote_connectivity() -> ConnectivityParams {
        ConnectivityParams {
            ice_ufrag: "remote".into(),
            ice_pwd: "secret".into(),
            fingerprint: "sha-256 AA".into(),
        }
    }

    async fn join(
        relay: &SignalingRelay,
        conn: ConnectionId,
        room: &str,
        peer: &str,
    ) -> mpsc::UnboundedReceiver<ServerMessage> {
        let rx = relay.attach(conn).await;
        relay
            .handle(
                conn,
                ClientMessage::JoinRoom {
                    room_id: room.into(),
                    peer_id: peer.into(),
                },
            )
            .await;
        rx
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            messages.push(msg);
        }
        messages
    }

    #[tokio::test]
    async fn test_join_returns_capabilities() {
        let relay = SignalingRelay::new();
        let mut rx = join(&relay, 1, "r1", "alice").await;

        match rx.try_recv().unwrap() {
            ServerMessage::Joined {
                room_id,
                capabilities,
                producers,
            } => {
                assert_eq!(room_id, "r1");
                assert_eq!(capabilities, RouterCapabilities::default());
                assert!(producers.is_empty());
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_join_requires_identifiers() {
        let relay = SignalingRelay::new();
        let rx = relay.attach(1).await;
        relay
            .handle(
                1,
                ClientMessage::JoinRoom {
                    room_id: "".into(),
                    peer_id: "alice".into(),
                },
            )
            .await;

        let mut rx = rx;
        match rx.try_recv().unwrap() {
            ServerMessage::JoinError { message } => {
                assert_eq!(message, "roomId and peerId are required");
            }
            other => panic!("unexpected message: {:?}", other),
        }
        assert!(!relay.hub().room_exists("").await);
    }

    #[tokio::test]
    async fn test_join_announces_both_directions() {
        let relay = SignalingRelay::new();
        let mut alice_rx = join(&relay, 1, "r1", "alice").await;
        drain(&mut alice_rx);

        let mut bob_rx = join(&relay, 2, "r1", "bob").await;

        let to_alice = drain(&mut alice_rx);
        assert!(to_alice.contains(&ServerMessage::PeerJoined {
            peer_id: "bob".into()
        }));

        let to_bob = drain(&mut bob_rx);
        assert!(to_bob.contains(&ServerMessage::PeerJoined {
            peer_id: "alice".into()
        }));
    }

    #[tokio::test]
    async fn test_produce_broadcasts_to_present_members_only() {
        let relay = SignalingRelay::new();

        // A is alone and publishes
        let mut alice_rx = join(&relay, 1, "r1", "alice").await;
        relay
            .handle(
                1,
                ClientMessage::CreateTransport {
                    direction: TransportDirection::Send,
                },
            )
            .await;
        let messages = drain(&mut alice_rx);
        let transport_id = messages
            .iter()
            .find_map(|m| match m {
                ServerMessage::TransportCreated { transport_id, .. } => Some(*transport_id),
                _ => None,
            })
            .unwrap();
        relay
            .handle(
                1,
                ClientMessage::Produce {
                    transport_id,
                    kind: MediaKind::Video,
                    params: audio_params(),
                },
            )
            .await;
        drain(&mut alice_rx);

        // B joins afterwards: no new-producer broadcast, but the snapshot
        // in `joined` names A's producer
        let mut bob_rx = join(&relay, 2, "r1", "bob").await;
        let to_bob = drain(&mut bob_rx);

        assert!(to_bob
            .iter()
            .all(|m| !matches!(m, ServerMessage::NewProducer { .. })));
        match &to_bob[0] {
            ServerMessage::Joined { producers, .. } => {
                assert_eq!(producers.len(), 1);
                assert_eq!(producers[0].peer_id, "alice");
            }
            other => panic!("unexpected message: {:?}", other),
        }

        // A publishes again: B (present now) gets exactly one broadcast
        relay
            .handle(
                1,
                ClientMessage::Produce {
                    transport_id,
                    kind: MediaKind::Audio,
                    params: audio_params(),
                },
            )
            .await;
        let broadcasts: Vec<_> = drain(&mut bob_rx)
            .into_iter()
            .filter(|m| matches!(m, ServerMessage::NewProducer { .. }))
            .collect();
        assert_eq!(broadcasts.len(), 1);

        // The producer itself never receives its own broadcast
        let to_alice = drain(&mut alice_rx);
        assert!(to_alice
            .iter()
            .all(|m| !matches!(m, ServerMessage::NewProducer { .. })));
    }

    #[tokio::test]
    async fn test_connect_transport_twice_reports_failure() {
        let relay = SignalingRelay::new();
        let mut rx = join(&relay, 1, "r1", "alice").await;
        relay
            .handle(
                1,
                ClientMessage::CreateTransport {
                    direction: TransportDirection::Send,
                },
            )
            .await;
        let transport_id = drain(&mut rx)
            .iter()
            .find_map(|m| match m {
                ServerMessage::TransportCreated { transport_id, .. } => Some(*transport_id),
                _ => None,
            })
            .unwrap();

        let connect = ClientMessage::ConnectTransport {
            transport_id,
            connectivity: remote_connectivity(),
        };
        relay.handle(1, connect.clone()).await;
        relay.handle(1, connect).await;

        let messages = drain(&mut rx);
        assert!(messages.contains(&ServerMessage::TransportConnected { transport_id }));
        assert!(messages.iter().any(|m| matches!(
            m,
            ServerMessage::RequestFailed { message } if message.contains("already connected")
        )));
    }

    #[tokio::test]
    async fn test_offer_relayed_with_sender_injected() {
        let relay = SignalingRelay::new();
        let mut alice_rx = join(&relay, 1, "r1", "alice").await;
        let mut bob_rx = join(&relay, 2, "r1", "bob").await;
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        relay
            .handle(
                1,
                ClientMessage::Offer {
                    room_id: "r1".into(),
                    to: "bob".into(),
                    description: SessionDescription::offer("sdp"),
                },
            )
            .await;

        match drain(&mut bob_rx).pop().unwrap() {
            ServerMessage::Offer {
                from, description, ..
            } => {
                assert_eq!(from, "alice");
                assert_eq!(description.sdp, "sdp");
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_signal_to_unknown_peer_errors_back() {
        let relay = SignalingRelay::new();
        let mut rx = join(&relay, 1, "r1", "alice").await;
        drain(&mut rx);

        relay
            .handle(
                1,
                ClientMessage::IceCandidate {
                    room_id: "r1".into(),
                    to: "ghost".into(),
                    candidate: None,
                },
            )
            .await;

        match drain(&mut rx).pop().unwrap() {
            ServerMessage::SignalError { message } => {
                assert_eq!(message, "Target peer 'ghost' not found");
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_disconnect_broadcasts_peer_left_and_prunes() {
        let relay = SignalingRelay::new();
        let mut alice_rx = join(&relay, 1, "r1", "alice").await;
        join(&relay, 2, "r1", "bob").await;
        drain(&mut alice_rx);

        relay.disconnect(2).await;

        assert!(drain(&mut alice_rx).contains(&ServerMessage::PeerLeft {
            peer_id: "bob".into()
        }));
        assert!(relay.hub().room_exists("r1").await);

        relay.disconnect(1).await;
        assert!(!relay.hub().room_exists("r1").await);
        assert!(relay.registry().is_empty().await);

        // Dispatching for a gone connection is a quiet no-op
        relay
            .handle(
                1,
                ClientMessage::CreateTransport {
                    direction: TransportDirection::Send,
                },
            )
            .await;
    }

    #[tokio::test]
    async fn test_reconnect_does_not_duplicate_peer_or_leak_peer_left() {
        let relay = SignalingRelay::new();
        join(&relay, 1, "r1", "alice").await;
        let mut bob_rx = join(&relay, 2, "r1", "bob").await;
        drain(&mut bob_rx);

        // Alice reconnects on a fresh connection and replays her join
        let mut alice2_rx = join(&relay, 7, "r1", "alice").await;

        match drain(&mut alice2_rx).first().unwrap() {
            ServerMessage::Joined { .. } => {}
            other => panic!("unexpected message: {:?}", other),
        }
        let members = relay
            .hub()
            .inspect_room("r1", |room| room.peer_count())
            .await
            .unwrap();
        assert_eq!(members, 2);

        // The stale connection's drop must not announce alice leaving
        relay.disconnect(1).await;
        let to_bob = drain(&mut bob_rx);
        assert!(to_bob
            .iter()
            .all(|m| !matches!(m, ServerMessage::PeerLeft { .. })));
        assert!(relay.hub().room_exists("r1").await);
    }

    #[tokio::test]
    async fn test_leave_keeps_channel_but_exits_room() {
        let relay = SignalingRelay::new();
        let mut alice_rx = join(&relay, 1, "r1", "alice").await;
        let mut bob_rx = join(&relay, 2, "r1", "bob").await;
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        relay.handle(2, ClientMessage::Leave).await;

        assert!(drain(&mut alice_rx).contains(&ServerMessage::PeerLeft {
            peer_id: "bob".into()
        }));

        // Bob can join another room on the same connection
        relay
            .handle(
                2,
                ClientMessage::JoinRoom {
                    room_id: "r2".into(),
                    peer_id: "bob".into(),
                },
            )
            .await;
        assert!(matches!(
            drain(&mut bob_rx).pop().unwrap(),
            ServerMessage::Joined { .. }
        ));
    }
}
