//! Mesh session store
//!
//! Owns every mesh session for one participant, keyed by room and
//! unordered peer pair, and enforces the at-most-one-session-per-pair
//! rule. Also runs the negotiation timeout sweep.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::signaling::{IceCandidate, MediaKind, SessionDescription};

use super::config::MeshConfig;
use super::error::NegotiationError;
use super::session::{
    AttachMode, CandidateDisposition, FailureNotice, MediaTrack, MeshSession, OfferDisposition,
};

/// Source of local media tracks
///
/// Device/track acquisition itself is an external collaborator; this
/// trait is the narrow contract the negotiator acquires through when an
/// incoming offer arrives with no tracks attached yet.
pub trait TrackSource: Send + Sync {
    /// Acquire a local track of the given kind
    ///
    /// Fails with `MediaUnavailable` when the device cannot be opened
    /// (e.g. already in use).
    fn acquire(&self, kind: MediaKind) -> Result<MediaTrack, NegotiationError>;
}

/// A track source backed by a fixed set of tracks
///
/// Suitable for embedders that acquire devices up front, and for tests.
#[derive(Debug, Clone, Default)]
pub struct FixedTracks {
    tracks: Vec<MediaTrack>,
}

impl FixedTracks {
    /// Create a source from the given tracks
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self { tracks }
    }
}

impl TrackSource for FixedTracks {
    fn acquire(&self, kind: MediaKind) -> Result<MediaTrack, NegotiationError> {
        self.tracks
            .iter()
            .find(|t| t.kind == kind)
            .cloned()
            .ok_or_else(|| NegotiationError::MediaUnavailable(format!("no {} track", kind)))
    }
}

/// Unique identifier for a session: room plus unordered peer pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    /// Room the pair shares
    pub room: String,
    pair: (String, String),
}

impl SessionKey {
    /// Create a key; peer order does not matter
    pub fn new(room: impl Into<String>, a: &str, b: &str) -> Self {
        let pair = if a <= b {
            (a.to_string(), b.to_string())
        } else {
            (b.to_string(), a.to_string())
        };
        Self {
            room: room.into(),
            pair,
        }
    }

    /// Whether the pair contains the given peer
    pub fn involves(&self, peer_id: &str) -> bool {
        self.pair.0 == peer_id || self.pair.1 == peer_id
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}<->{}", self.room, self.pair.0, self.pair.1)
    }
}

/// Store of live mesh sessions for one participant
pub struct MeshStore {
    sessions: RwLock<HashMap<SessionKey, Arc<Mutex<MeshSession>>>>,
    source: Arc<dyn TrackSource>,
    config: MeshConfig,
}

impl MeshStore {
    /// Create a store with the default configuration
    pub fn new(source: Arc<dyn TrackSource>) -> Self {
        Self::with_config(source, MeshConfig::default())
    }

    /// Create a store with a custom configuration
    pub fn with_config(source: Arc<dyn TrackSource>, config: MeshConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            source,
            config,
        }
    }

    /// The store's configuration
    pub fn config(&self) -> &MeshConfig {
        &self.config
    }

    /// Get or lazily create the session for a pair
    ///
    /// At most one session exists per unordered pair per room.
    pub async fn session(
        &self,
        room: &str,
        local: &str,
        remote: &str,
    ) -> Arc<Mutex<MeshSession>> {
        let key = SessionKey::new(room, local, remote);
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(MeshSession::new(local, remote))))
            .clone()
    }

    fn ensure_tracks(
        session: &mut MeshSession,
        source: &dyn TrackSource,
    ) -> Result<(), NegotiationError> {
        for kind in [MediaKind::Audio, MediaKind::Video] {
            let track = source.acquire(kind)?;
            session.attach_track(track, AttachMode::Automatic)?;
        }
        Ok(())
    }

    /// Start a call: attach local media and record the outgoing offer
    ///
    /// Acquisition failures surface synchronously to the caller; the
    /// session stays `Idle` and can be retried.
    pub async fn begin_call(
        &self,
        room: &str,
        local: &str,
        remote: &str,
        offer: SessionDescription,
    ) -> Result<(), NegotiationError> {
        let session = self.session(room, local, remote).await;
        let mut session = session.lock().await;

        Self::ensure_tracks(&mut session, self.source.as_ref())?;
        session.create_offer(offer)
    }

    /// Handle an incoming offer: acquire media lazily, then apply
    ///
    /// If acquisition fails the session is failed (one notice) and
    /// `MediaUnavailable` is returned.
    pub async fn handle_offer(
        &self,
        room: &str,
        local: &str,
        remote: &str,
        offer: SessionDescription,
    ) -> Result<OfferDisposition, NegotiationError> {
        let session = self.session(room, local, remote).await;
        let mut session = session.lock().await;

        if let Err(e) = Self::ensure_tracks(&mut session, self.source.as_ref()) {
            if let Some(notice) = session.fail("local media unavailable") {
                tracing::warn!(
                    room = %room,
                    peer = %notice.remote_peer,
                    "Incoming call failed: media unavailable"
                );
            }
            return Err(e);
        }

        session.receive_offer(offer)
    }

    /// Record the locally applied answer for an incoming call
    pub async fn complete_answer(
        &self,
        room: &str,
        local: &str,
        remote: &str,
        answer: SessionDescription,
    ) -> Result<(), NegotiationError> {
        let session = self.session(room, local, remote).await;
        let mut session = session.lock().await;
        session.apply_local_answer(answer)
    }

    /// Apply a remote answer; returns buffered candidates in FIFO order
    pub async fn handle_answer(
        &self,
        room: &str,
        local: &str,
        remote: &str,
        answer: SessionDescription,
    ) -> Result<Vec<IceCandidate>, NegotiationError> {
        let session = self.session(room, local, remote).await;
        let mut session = session.lock().await;
        session.receive_answer(answer)
    }

    /// Route an inbound candidate to its session
    pub async fn handle_candidate(
        &self,
        room: &str,
        local: &str,
        remote: &str,
        candidate: Option<IceCandidate>,
    ) -> CandidateDisposition {
        let session = self.session(room, local, remote).await;
        let disposition = session.lock().await.add_candidate(candidate);
        if let CandidateDisposition::Apply(_) = disposition {
            tracing::debug!(room = %room, peer = %remote, "Applying candidate");
        }
        disposition
    }

    /// Signal an unrecoverable connectivity failure for a pair
    ///
    /// The session is removed; the notice (present exactly once per
    /// cause) is for the user, room membership is untouched.
    pub async fn fail_session(
        &self,
        room: &str,
        local: &str,
        remote: &str,
        reason: &str,
    ) -> Option<FailureNotice> {
        let key = SessionKey::new(room, local, remote);
        let session = self.sessions.write().await.remove(&key)?;
        let mut session = session.lock().await;
        session.fail(reason)
    }

    /// Hang up the session with a peer; returns whether one existed
    pub async fn hangup(&self, room: &str, local: &str, remote: &str) -> bool {
        let key = SessionKey::new(room, local, remote);
        match self.sessions.write().await.remove(&key) {
            Some(session) => {
                session.lock().await.close();
                true
            }
            None => false,
        }
    }

    /// Close every session involving a departed peer
    pub async fn peer_left(&self, room: &str, peer_id: &str) -> Vec<SessionKey> {
        let mut sessions = self.sessions.write().await;
        let keys: Vec<SessionKey> = sessions
            .keys()
            .filter(|key| key.room == room && key.involves(peer_id))
            .cloned()
            .collect();

        for key in &keys {
            if let Some(session) = sessions.remove(key) {
                session.lock().await.close();
                tracing::info!(session = %key, "Session closed: peer left");
            }
        }

        keys
    }

    /// Fail sessions stuck in negotiation past the configured timeout
    ///
    /// Also drops sessions that already terminated. Returns one notice per
    /// newly failed session.
    pub async fn sweep(&self) -> Vec<FailureNotice> {
        let mut sessions = self.sessions.write().await;
        let mut notices = Vec::new();
        let mut expired = Vec::new();

        for (key, session_arc) in sessions.iter() {
            // Skip sessions busy elsewhere; they get the next sweep
            let Ok(mut session) = session_arc.try_lock() else {
                continue;
            };

            if session.timed_out(self.config.negotiation_timeout) {
                if let Some(notice) = session.fail("negotiation timed out") {
                    notices.push(notice);
                }
            }
            if session.is_terminal() {
                expired.push(key.clone());
            }
        }

        for key in expired {
            sessions.remove(&key);
            tracing::debug!(session = %key, "Session removed by sweep");
        }

        notices
    }

    /// Spawn the background timeout sweep
    ///
    /// Returns a handle that can be used to abort the task.
    pub fn spawn_sweep_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        let interval = store.config.sweep_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let notices = store.sweep().await;
                for notice in notices {
                    tracing::warn!(
                        peer = %notice.remote_peer,
                        reason = %notice.reason,
                        "Session failed by sweep"
                    );
                }
            }
        })
    }

    /// Number of live sessions
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
