//! Hub resource graph (forwarding topology)
//!
//! Rooms contain peers; peers exclusively own transports; transports carry
//! producers (send side) or consumers (recv side). Subscription is gated
//! by the room's shared capability descriptor.
//!
//! # Ownership and teardown
//!
//! ```text
//!                 Arc<HubGraph>
//!          ┌──────────────────────────┐
//!          │ rooms: HashMap<RoomId,   │
//!          │   Arc<Mutex<Room>>       │
//!          │ >                        │
//!          └──────────┬───────────────┘
//!                     │ per-room lock
//!                     ▼
//!        Room ─► Peer ─► Transport ─► Producer
//!                     │                   ▲
//!                     └─► Consumer ───────┘  (id back-reference,
//!                                             non-owning)
//! ```
//!
//! Destroying a peer cascades consumers, then producers, then transports;
//! producer closure also closes consumers of it held by *other* peers.
//! Empty rooms are pruned, never retained.

pub mod capabilities;
pub mod error;
pub mod graph;
pub mod resource;
pub mod room;

pub use capabilities::{compatible, RouterCapabilities};
pub use error::HubError;
pub use graph::{
    ConsumerParams, HubGraph, JoinSummary, PeerCleanup, ProducerCreated, TransportParams,
};
pub use resource::{Consumer, Producer, Transport};
pub use room::{Peer, Room};
