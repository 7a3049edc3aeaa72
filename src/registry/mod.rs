//! Session registry
//!
//! Maps live signaling connections to their logical `{room, peer}` binding.
//! The registry is the first lookup for every inbound message and the
//! anchor for disconnect cleanup: `unregister` returns the prior binding
//! exactly once, so the caller can cascade teardown exactly once.
//!
//! Thread-safe via `RwLock`; lookups are read-heavy.

use std::collections::HashMap;

use tokio::sync::RwLock;

/// Identity of one live signaling connection
///
/// Assigned by the transport layer; changes across reconnects of the same
/// logical peer.
pub type ConnectionId = u64;

/// Logical binding of a connection: which room and which peer it is
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    /// Room the connection joined
    pub room_id: String,
    /// Application-supplied peer id
    pub peer_id: String,
}

impl Binding {
    /// Create a new binding
    pub fn new(room_id: impl Into<String>, peer_id: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            peer_id: peer_id.into(),
        }
    }
}

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The connection id is already bound
    DuplicateRegistration(ConnectionId),
    /// The connection id has no binding (e.g. message after disconnect)
    NotFound(ConnectionId),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::DuplicateRegistration(conn) => {
                write!(f, "Connection {} is already registered", conn)
            }
            RegistryError::NotFound(conn) => {
                write!(f, "Connection {} is not registered", conn)
            }
        }
    }
}

impl std::error::Error for RegistryError {}

/// Registry of live connection bindings
#[derive(Debug, Default)]
pub struct SessionRegistry {
    bindings: RwLock<HashMap<ConnectionId, Binding>>,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a connection to a room and peer id
    ///
    /// Fails with `DuplicateRegistration` if the connection is already
    /// bound; a reconnecting peer arrives on a fresh connection id, so a
    /// duplicate here is a caller bug, not a reconnect.
    pub async fn register(
        &self,
        conn: ConnectionId,
        room_id: &str,
        peer_id: &str,
    ) -> Result<(), RegistryError> {
        let mut bindings = self.bindings.write().await;

        if bindings.contains_key(&conn) {
            return Err(RegistryError::DuplicateRegistration(conn));
        }

        bindings.insert(conn, Binding::new(room_id, peer_id));

        tracing::debug!(
            conn = conn,
            room = %room_id,
            peer = %peer_id,
            "Connection registered"
        );

        Ok(())
    }

    /// Resolve a connection to its binding
    ///
    /// A `NotFound` result is expected when a message races with a
    /// disconnect; callers treat it as a no-op.
    pub async fn resolve(&self, conn: ConnectionId) -> Result<Binding, RegistryError> {
        self.bindings
            .read()
            .await
            .get(&conn)
            .cloned()
            .ok_or(RegistryError::NotFound(conn))
    }

    /// Remove a connection's binding
    ///
    /// Idempotent. Returns the prior binding (if any) so the caller can
    /// cascade cleanup exactly once.
    pub async fn unregister(&self, conn: ConnectionId) -> Option<Binding> {
        let removed = self.bindings.write().await.remove(&conn);

        if let Some(ref binding) = removed {
            tracing::debug!(
                conn = conn,
                room = %binding.room_id,
                peer = %binding.peer_id,
                "Connection unregistered"
            );
        }

        removed
    }

    /// Move an existing binding to a new connection id
    ///
    /// Used on signaling reconnection: the logical peer keeps its room
    /// binding while the connection identity changes.
    pub async fn refresh(
        &self,
        old_conn: ConnectionId,
        new_conn: ConnectionId,
    ) -> Result<Binding, RegistryError> {
        let mut bindings = self.bindings.write().await;

        if bindings.contains_key(&new_conn) {
            return Err(RegistryError::DuplicateRegistration(new_conn));
        }

        let binding = bindings
            .remove(&old_conn)
            .ok_or(RegistryError::NotFound(old_conn))?;

        tracing::debug!(
            old_conn = old_conn,
            new_conn = new_conn,
            room = %binding.room_id,
            peer = %binding.peer_id,
            "Connection binding refreshed"
        );

        bindings.insert(new_conn, binding.clone());
        Ok(binding)
    }

    /// Number of live bindings
    pub async fn len(&self) -> usize {
        self.bindings.read().await.len()
    }

    /// Whether the registry has no live bindings
    pub async fn is_empty(&self) -> bool {
        self.bindings.read().await.is_empty()
    }
}
