//! Mesh session state machine
//!
//! Tracks one direct negotiation between two peer identities, from intent
//! through offer/answer to a connected media session. The session owns the
//! FIFO buffer of candidates that arrive before the remote description.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::signaling::{IceCandidate, MediaKind, SdpType, SessionDescription};

use super::error::NegotiationError;

/// Negotiation lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No negotiation in flight
    Idle,
    /// Local offer sent, waiting for the answer
    OfferSent,
    /// Remote offer applied, local answer not yet applied
    OfferReceived,
    /// Description exchange complete
    Connected,
    /// Unrecoverable failure; room membership survives
    Failed,
    /// Hung up or partner left
    Closed,
}

impl SessionState {
    /// Whether the state is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Failed | SessionState::Closed)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::OfferSent => "offer-sent",
            SessionState::OfferReceived => "offer-received",
            SessionState::Connected => "connected",
            SessionState::Failed => "failed",
            SessionState::Closed => "closed",
        };
        write!(f, "{}", name)
    }
}

/// A local media track attached to the session's outbound side
///
/// Acquisition from hardware is an external collaborator; the coordinator
/// only tracks identity and kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTrack {
    /// Track identity
    pub id: String,
    /// Audio or video
    pub kind: MediaKind,
}

impl MediaTrack {
    /// Create a track handle
    pub fn new(id: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }
}

/// Whether a track attachment came from the caller or a retry path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachMode {
    /// Direct caller request; re-attaching is a usage error
    Explicit,
    /// Automatic re-attempt; re-attaching silently no-ops
    Automatic,
}

/// What to do with an inbound candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateDisposition {
    /// Queued until the remote description is applied
    Buffered,
    /// Apply to the connection now
    Apply(IceCandidate),
    /// Forward the end-of-candidates marker now
    EndOfCandidates,
    /// Dropped (terminal session, or end-of-candidates while buffering)
    Ignored,
}

/// Outcome of an inbound offer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfferDisposition {
    /// Offer applied; candidates buffered so far, flushed in arrival order
    Accepted {
        /// Candidates to apply now, FIFO
        flushed: Vec<IceCandidate>,
        /// Whether a colliding local offer was rolled back first
        rolled_back: bool,
    },
    /// Colliding offer ignored; this side's own offer stands
    Ignored,
}

/// How a track replacement took effect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackSwap {
    /// Swapped on the live connection, no renegotiation
    Live,
    /// Stored locally; takes effect on the next negotiation
    Staged,
}

/// The single user-visible notification for one failure cause
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureNotice {
    /// The partner identity of the failed session
    pub remote_peer: String,
    /// Human-readable cause
    pub reason: String,
}

/// One direct negotiated connection between two peer identities
#[derive(Debug)]
pub struct MeshSession {
    /// Our identity
    pub local_peer: String,
    /// The partner identity
    pub remote_peer: String,
    state: SessionState,
    local_description: Option<SessionDescription>,
    remote_description: Option<SessionDescription>,
    pending: VecDeque<IceCandidate>,
    tracks: Vec<MediaTrack>,
    negotiating_since: Option<Instant>,
    failure_notified: bool,
}

impl MeshSession {
    /// Create an idle session between two identities
    pub fn new(local_peer: impl Into<String>, remote_peer: impl Into<String>) -> Self {
        Self {
            local_peer: local_peer.into(),
            remote_peer: remote_peer.into(),
            state: SessionState::Idle,
            local_description: None,
            remote_description: None,
            pending: VecDeque::new(),
            tracks: Vec::new(),
            negotiating_since: None,
            failure_notified: false,
        }
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the session has terminated
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Currently attached outbound tracks
    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    /// Number of candidates waiting for the remote description
    pub fn pending_candidates(&self) -> usize {
        self.pending.len()
    }

    /// Glare tie-break role: the lower identity yields to an incoming
    /// offer and answers instead
    pub fn polite(&self) -> bool {
        self.local_peer < self.remote_peer
    }

    /// Attach a local track to the outbound side
    ///
    /// Idempotent by track identity: an explicit re-attach fails with
    /// `DuplicateTrack`, an automatic re-attempt silently no-ops. Returns
    /// whether the track was newly attached.
    pub fn attach_track(
        &mut self,
        track: MediaTrack,
        mode: AttachMode,
    ) -> Result<bool, NegotiationError> {
        if self.is_terminal() {
            return Err(NegotiationError::Closed);
        }

        if self.tracks.iter().any(|t| t.id == track.id) {
            return match mode {
                AttachMode::Explicit => Err(NegotiationError::DuplicateTrack(track.id)),
                AttachMode::Automatic => Ok(false),
            };
        }

        tracing::debug!(
            peer = %self.remote_peer,
            track = %track.id,
            kind = %track.kind,
            "Track attached"
        );
        self.tracks.push(track);
        Ok(true)
    }

    /// Replace the outbound track of the given kind
    ///
    /// On a connected session the swap is live and requires no
    /// renegotiation; otherwise the track is staged and takes effect on
    /// the next negotiation.
    pub fn replace_track(&mut self, track: MediaTrack) -> Result<TrackSwap, NegotiationError> {
        if self.is_terminal() {
            return Err(NegotiationError::Closed);
        }

        match self.tracks.iter_mut().find(|t| t.kind == track.kind) {
            Some(slot) => *slot = track,
            None => self.tracks.push(track),
        }

        if self.state == SessionState::Connected {
            Ok(TrackSwap::Live)
        } else {
            Ok(TrackSwap::Staged)
        }
    }

    /// Record the locally created offer and move to `OfferSent`
    ///
    /// Requires at least one attached track; producing an offer with no
    /// outbound media is a caller error.
    pub fn create_offer(&mut self, offer: SessionDescription) -> Result<(), NegotiationError> {
        if self.is_terminal() {
            return Err(NegotiationError::Closed);
        }
        if self.state != SessionState::Idle {
            return Err(NegotiationError::InvalidTransition {
                from: self.state,
                event: "send offer",
            });
        }
        if self.tracks.is_empty() {
            return Err(NegotiationError::NoLocalMedia);
        }
        if offer.kind != SdpType::Offer {
            return Err(NegotiationError::DescriptionMismatch {
                expected: SdpType::Offer,
            });
        }

        self.local_description = Some(offer);
        self.state = SessionState::OfferSent;
        self.negotiating_since = Some(Instant::now());

        tracing::info!(peer = %self.remote_peer, "Offer sent");
        Ok(())
    }

    /// Apply a remote offer
    ///
    /// In `OfferSent` this is glare: the polite side (lower identity)
    /// rolls back its own offer and answers; the impolite side ignores the
    /// incoming offer and lets its own stand. Buffered candidates are
    /// flushed in arrival order once the offer is applied.
    pub fn receive_offer(
        &mut self,
        offer: SessionDescription,
    ) -> Result<OfferDisposition, NegotiationError> {
        if self.is_terminal() {
            return Err(NegotiationError::Closed);
        }
        if offer.kind != SdpType::Offer {
            return Err(NegotiationError::DescriptionMismatch {
                expected: SdpType::Offer,
            });
        }

        let rolled_back = match self.state {
            SessionState::Idle => false,
            SessionState::OfferSent => {
                if !self.polite() {
                    tracing::debug!(
                        peer = %self.remote_peer,
                        "Glare: ignoring incoming offer, ours stands"
                    );
                    return Ok(OfferDisposition::Ignored);
                }
                tracing::info!(
                    peer = %self.remote_peer,
                    "Glare: rolling back local offer, answering instead"
                );
                self.local_description = None;
                true
            }
            state => {
                return Err(NegotiationError::InvalidTransition {
                    from: state,
                    event: "receive offer",
                });
            }
        };

        self.remote_description = Some(offer);
        self.state = SessionState::OfferReceived;
        self.negotiating_since = Some(Instant::now());
        let flushed = self.flush_pending();

        tracing::info!(
            peer = %self.remote_peer,
            flushed = flushed.len(),
            "Offer received"
        );

        Ok(OfferDisposition::Accepted {
            flushed,
            rolled_back,
        })
    }

    /// Record the locally applied answer; completes the callee side
    pub fn apply_local_answer(
        &mut self,
        answer: SessionDescription,
    ) -> Result<(), NegotiationError> {
        if self.is_terminal() {
            return Err(NegotiationError::Closed);
        }
        if self.state != SessionState::OfferReceived {
            return Err(NegotiationError::InvalidTransition {
                from: self.state,
                event: "apply answer",
            });
        }
        if answer.kind != SdpType::Answer {
            return Err(NegotiationError::DescriptionMismatch {
                expected: SdpType::Answer,
            });
        }

        self.local_description = Some(answer);
        self.state = SessionState::Connected;
        self.negotiating_since = None;

        tracing::info!(peer = %self.remote_peer, "Session connected (answerer)");
        Ok(())
    }

    /// Apply the remote answer; completes the caller side
    ///
    /// Returns buffered candidates to apply now, in arrival order.
    /// Applying each is best-effort for the caller: one bad candidate must
    /// not abort the rest of the flush.
    pub fn receive_answer(
        &mut self,
        answer: SessionDescription,
    ) -> Result<Vec<IceCandidate>, NegotiationError> {
        if self.is_terminal() {
            return Err(NegotiationError::Closed);
        }
        if self.state != SessionState::OfferSent {
            // Stale answer, e.g. after a glare rollback
            return Err(NegotiationError::InvalidTransition {
                from: self.state,
                event: "receive answer",
            });
        }
        if answer.kind != SdpType::Answer {
            return Err(NegotiationError::DescriptionMismatch {
                expected: SdpType::Answer,
            });
        }

        self.remote_description = Some(answer);
        self.state = SessionState::Connected;
        self.negotiating_since = None;
        let flushed = self.flush_pending();

        tracing::info!(
            peer = %self.remote_peer,
            flushed = flushed.len(),
            "Session connected (offerer)"
        );

        Ok(flushed)
    }

    /// Handle an inbound candidate; `None` signals end-of-candidates
    ///
    /// Candidates arriving before the remote description are buffered in
    /// arrival order. The end-of-candidates marker is forwarded directly
    /// once past buffering and never queued.
    pub fn add_candidate(&mut self, candidate: Option<IceCandidate>) -> CandidateDisposition {
        if self.is_terminal() {
            tracing::debug!(peer = %self.remote_peer, "Candidate for terminated session ignored");
            return CandidateDisposition::Ignored;
        }

        let past_buffering = self.remote_description.is_some();
        match candidate {
            Some(candidate) if past_buffering => CandidateDisposition::Apply(candidate),
            Some(candidate) => {
                self.pending.push_back(candidate);
                tracing::debug!(
                    peer = %self.remote_peer,
                    buffered = self.pending.len(),
                    "Candidate buffered (remote description not set)"
                );
                CandidateDisposition::Buffered
            }
            None if past_buffering => CandidateDisposition::EndOfCandidates,
            None => CandidateDisposition::Ignored,
        }
    }

    fn flush_pending(&mut self) -> Vec<IceCandidate> {
        self.pending.drain(..).collect()
    }

    /// Transition to `Failed` from any non-terminal state
    ///
    /// Releases held resources but leaves room membership alone. Returns
    /// the user-visible notice exactly once per cause; repeated failure
    /// signals and cascading cleanup get `None`.
    pub fn fail(&mut self, reason: &str) -> Option<FailureNotice> {
        if self.is_terminal() {
            return None;
        }

        self.state = SessionState::Failed;
        self.pending.clear();
        self.tracks.clear();
        self.negotiating_since = None;

        if self.failure_notified {
            return None;
        }
        self.failure_notified = true;

        tracing::warn!(peer = %self.remote_peer, reason = %reason, "Session failed");

        Some(FailureNotice {
            remote_peer: self.remote_peer.clone(),
            reason: reason.to_string(),
        })
    }

    /// Close the session (hangup or partner left)
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closed;
        self.pending.clear();
        self.tracks.clear();
        self.negotiating_since = None;

        tracing::info!(peer = %self.remote_peer, "Session closed");
    }

    /// Whether the session has been negotiating longer than `timeout`
    pub fn timed_out(&self, timeout: Duration) -> bool {
        matches!(
            self.state,
            SessionState::OfferSent | SessionState::OfferReceived
        ) && self
            .negotiating_since
            .map(|since| since.elapsed() > timeout)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caller_session() -> MeshSession {
        // "bob" > "alice": this side is impolite
        let mut session = MeshSession::new("bob", "alice");
        session
            .attach_track(MediaTrack::new("cam-1", MediaKind::Video), AttachMode::Explicit)
            .unwrap();
        session
    }

    #[test]
    fn test_caller_flow_reaches_connected() {
        let mut session = caller_session();
        assert_eq!(session.state(), SessionState::Idle);

        session.create_offer(SessionDescription::offer("o")).unwrap();
        assert_eq!(session.state(), SessionState::OfferSent);

        let flushed = session
            .receive_answer(SessionDescription::answer("a"))
            .unwrap();
        assert!(flushed.is_empty());
        assert_eq!(session.state(), SessionState::Connected);
    }

    #[test]
    fn test_callee_flow_reaches_connected() {
        let mut session = MeshSession::new("alice", "bob");
        session
            .attach_track(MediaTrack::new("cam-1", MediaKind::Video), AttachMode::Automatic)
            .unwrap();

        let outcome = session
            .receive_offer(SessionDescription::offer("o"))
            .unwrap();
        assert_eq!(session.state(), SessionState::OfferReceived);
        assert!(matches!(
            outcome,
            OfferDisposition::Accepted {
                rolled_back: false,
                ..
            }
        ));

        session
            .apply_local_answer(SessionDescription::answer("a"))
            .unwrap();
        assert_eq!(session.state(), SessionState::Connected);
    }

    #[test]
    fn test_offer_requires_local_media() {
        let mut session = MeshSession::new("bob", "alice");

        let result = session.create_offer(SessionDescription::offer("o"));
        assert_eq!(result, Err(NegotiationError::NoLocalMedia));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_candidates_buffer_fifo_until_remote_description() {
        let mut session = caller_session();
        session.create_offer(SessionDescription::offer("o")).unwrap();

        let c1 = IceCandidate::new("c1");
        let c2 = IceCandidate::new("c2");
        let c3 = IceCandidate::new("c3");
        assert_eq!(
            session.add_candidate(Some(c1.clone())),
            CandidateDisposition::Buffered
        );
        assert_eq!(
            session.add_candidate(Some(c2.clone())),
            CandidateDisposition::Buffered
        );
        assert_eq!(
            session.add_candidate(Some(c3.clone())),
            CandidateDisposition::Buffered
        );

        let flushed = session
            .receive_answer(SessionDescription::answer("a"))
            .unwrap();

        // All three, in arrival order, none dropped
        assert_eq!(flushed, vec![c1, c2, c3]);
        assert_eq!(session.pending_candidates(), 0);

        // Past buffering: candidates apply directly
        let c4 = IceCandidate::new("c4");
        assert_eq!(
            session.add_candidate(Some(c4.clone())),
            CandidateDisposition::Apply(c4)
        );
    }

    #[test]
    fn test_end_of_candidates_never_queued() {
        let mut session = caller_session();
        session.create_offer(SessionDescription::offer("o")).unwrap();

        // While buffering, the marker is dropped, not queued
        assert_eq!(session.add_candidate(None), CandidateDisposition::Ignored);
        assert_eq!(session.pending_candidates(), 0);

        session
            .receive_answer(SessionDescription::answer("a"))
            .unwrap();
        assert_eq!(
            session.add_candidate(None),
            CandidateDisposition::EndOfCandidates
        );
    }

    #[test]
    fn test_glare_polite_side_rolls_back() {
        // "alice" < "bob": alice is polite and yields
        let mut session = MeshSession::new("alice", "bob");
        session
            .attach_track(MediaTrack::new("cam-1", MediaKind::Video), AttachMode::Explicit)
            .unwrap();
        session.create_offer(SessionDescription::offer("mine")).unwrap();

        let outcome = session
            .receive_offer(SessionDescription::offer("theirs"))
            .unwrap();

        assert!(matches!(
            outcome,
            OfferDisposition::Accepted {
                rolled_back: true,
                ..
            }
        ));
        assert_eq!(session.state(), SessionState::OfferReceived);

        // Answering completes the session as the yielded side
        session
            .apply_local_answer(SessionDescription::answer("a"))
            .unwrap();
        assert_eq!(session.state(), SessionState::Connected);

        // An answer to the rolled-back offer arriving late is rejected
        // cleanly, not applied
        let stale = session.receive_answer(SessionDescription::answer("stale"));
        assert!(stale.is_err());
    }

    #[test]
    fn test_glare_impolite_side_ignores() {
        let mut session = caller_session(); // bob > alice
        session.create_offer(SessionDescription::offer("mine")).unwrap();

        let outcome = session
            .receive_offer(SessionDescription::offer("theirs"))
            .unwrap();

        assert_eq!(outcome, OfferDisposition::Ignored);
        assert_eq!(session.state(), SessionState::OfferSent);

        // Our own offer still completes normally
        session
            .receive_answer(SessionDescription::answer("a"))
            .unwrap();
        assert_eq!(session.state(), SessionState::Connected);
    }

    #[test]
    fn test_duplicate_track_explicit_vs_automatic() {
        let mut session = MeshSession::new("bob", "alice");
        let track = MediaTrack::new("mic-1", MediaKind::Audio);

        assert!(session.attach_track(track.clone(), AttachMode::Explicit).unwrap());

        let explicit = session.attach_track(track.clone(), AttachMode::Explicit);
        assert_eq!(explicit, Err(NegotiationError::DuplicateTrack("mic-1".into())));

        let automatic = session.attach_track(track, AttachMode::Automatic);
        assert_eq!(automatic, Ok(false));
        assert_eq!(session.tracks().len(), 1);
    }

    #[test]
    fn test_replace_track_live_vs_staged() {
        let mut session = caller_session();

        // Not yet connected: swap is staged
        let swap = session
            .replace_track(MediaTrack::new("cam-2", MediaKind::Video))
            .unwrap();
        assert_eq!(swap, TrackSwap::Staged);

        session.create_offer(SessionDescription::offer("o")).unwrap();
        session
            .receive_answer(SessionDescription::answer("a"))
            .unwrap();

        // Connected: swap is live, no renegotiation
        let swap = session
            .replace_track(MediaTrack::new("screen-1", MediaKind::Video))
            .unwrap();
        assert_eq!(swap, TrackSwap::Live);
        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(session.tracks()[0].id, "screen-1");
    }

    #[test]
    fn test_failure_notice_exactly_once() {
        let mut session = caller_session();
        session.create_offer(SessionDescription::offer("o")).unwrap();

        let first = session.fail("ice failed");
        let second = session.fail("ice failed");

        assert!(first.is_some());
        assert_eq!(first.unwrap().remote_peer, "alice");
        assert_eq!(second, None);
        assert_eq!(session.state(), SessionState::Failed);
        assert!(session.tracks().is_empty());
    }

    #[test]
    fn test_closed_session_ignores_signals() {
        let mut session = caller_session();
        session.close();

        assert_eq!(
            session.add_candidate(Some(IceCandidate::new("c1"))),
            CandidateDisposition::Ignored
        );
        assert_eq!(
            session.receive_offer(SessionDescription::offer("o")),
            Err(NegotiationError::Closed)
        );
        assert_eq!(session.fail("late failure"), None);
    }

    #[test]
    fn test_timeout_only_while_negotiating() {
        let mut session = caller_session();
        assert!(!session.timed_out(Duration::ZERO));

        session.create_offer(SessionDescription::offer("o")).unwrap();
        assert!(session.timed_out(Duration::ZERO));
        assert!(!session.timed_out(Duration::from_secs(3600)));

        session
            .receive_answer(SessionDescription::answer("a"))
            .unwrap();
        assert!(!session.timed_out(Duration::ZERO));
    }
}
