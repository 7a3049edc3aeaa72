//! # signalhub
//!
//! Coordination layers for multi-party real-time audio/video sessions.
//! The crate is transport-agnostic: it speaks in typed messages and
//! leaves sockets, media engines and codecs to the embedding
//! application.
//!
//! Two topologies share one signaling schema:
//!
//! - **Hub** (forwarding server): participants publish tracks once and
//!   the server fans them out. [`hub::HubGraph`] owns the room → peer →
//!   transport → producer/consumer resource graph; [`relay`] routes the
//!   request/response traffic and lifecycle broadcasts.
//! - **Mesh** (direct pairs): participants negotiate with each other
//!   pairwise and the server only relays. [`mesh`] holds the
//!   participant-side negotiator with its candidate buffering and glare
//!   handling.
//!
//! ```text
//!                     ┌──────────────────┐
//!    ClientMessage ──▶│  SignalingRelay  │──▶ ServerMessage
//!                     │                  │
//!                     │  SessionRegistry │  conn → {room, peer}
//!                     │  HubGraph        │  rooms and media resources
//!                     └──────────────────┘
//!
//!    MeshStore / MeshSession: per-pair offer/answer state,
//!    FIFO candidate buffer, run by each participant
//! ```

pub mod error;
pub mod hub;
pub mod mesh;
pub mod registry;
pub mod relay;
pub mod signaling;

pub use error::{Error, Result};
pub use hub::{HubGraph, RouterCapabilities};
pub use mesh::{MeshConfig, MeshSession, MeshStore};
pub use registry::{Binding, ConnectionId, SessionRegistry};
pub use relay::SignalingRelay;
pub use signaling::{ClientMessage, ServerMessage};
