//! Peer-owned media resources
//!
//! Transports, producers and consumers. Each belongs to exactly one peer
//! and never outlives it; closing is explicit and one-shot so cascade
//! paths can distinguish "freed now" from "was already gone".

use crate::signaling::{ConnectivityParams, MediaKind, MediaParams, TransportDirection};

use super::error::HubError;

/// A directional connectivity channel owned by one peer
///
/// Identity is immutable after creation; connectivity is established once
/// via [`Transport::connect`].
#[derive(Debug, Clone)]
pub struct Transport {
    /// Unique transport id
    pub id: u64,
    /// Send or recv
    pub direction: TransportDirection,
    /// Locally generated connectivity material handed to the client
    pub local: ConnectivityParams,
    remote: Option<ConnectivityParams>,
    closed: bool,
}

impl Transport {
    /// Create a new transport with generated local connectivity material
    ///
    /// The material here is an opaque token; real ICE/DTLS handling lives
    /// in the media layer, which is an external collaborator.
    pub fn new(id: u64, direction: TransportDirection) -> Self {
        Self {
            id,
            direction,
            local: ConnectivityParams {
                ice_ufrag: format!("ufrag-{:08x}", id),
                ice_pwd: format!("pwd-{:016x}", id.wrapping_mul(0x9e3779b97f4a7c15)),
                fingerprint: format!("sha-256 {:016X}", id.wrapping_mul(0xc2b2ae3d27d4eb4f)),
            },
            remote: None,
            closed: false,
        }
    }

    /// Apply the remote side's connectivity parameters (one-shot)
    ///
    /// A second call fails with `AlreadyConnected` and leaves state
    /// unchanged; silent acceptance would hide client bugs.
    pub fn connect(&mut self, remote: ConnectivityParams) -> Result<(), HubError> {
        if self.closed {
            return Err(HubError::AlreadyClosed(self.id));
        }
        if self.remote.is_some() {
            return Err(HubError::AlreadyConnected(self.id));
        }
        self.remote = Some(remote);
        Ok(())
    }

    /// Whether connectivity has been established
    pub fn is_connected(&self) -> bool {
        self.remote.is_some()
    }

    /// Whether the transport has been closed
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Close the transport
    pub fn close(&mut self) -> Result<(), HubError> {
        if self.closed {
            return Err(HubError::AlreadyClosed(self.id));
        }
        self.closed = true;
        Ok(())
    }
}

/// One outbound media track published on a send transport
#[derive(Debug, Clone)]
pub struct Producer {
    /// Unique producer id
    pub id: u64,
    /// Owning transport
    pub transport_id: u64,
    /// Audio or video
    pub kind: MediaKind,
    /// Negotiated send parameters
    pub params: MediaParams,
    closed: bool,
}

impl Producer {
    /// Create a new producer
    pub fn new(id: u64, transport_id: u64, kind: MediaKind, params: MediaParams) -> Self {
        Self {
            id,
            transport_id,
            kind,
            params,
            closed: false,
        }
    }

    /// Whether the producer has been closed
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Close the producer
    pub fn close(&mut self) -> Result<(), HubError> {
        if self.closed {
            return Err(HubError::AlreadyClosed(self.id));
        }
        self.closed = true;
        Ok(())
    }
}

/// One inbound media sink on a recv transport, bound to one producer
///
/// Holds a non-owning back-reference (`producer_id`); the producer is
/// looked up in the room's table and may be gone by the time anyone asks.
#[derive(Debug, Clone)]
pub struct Consumer {
    /// Unique consumer id
    pub id: u64,
    /// Owning transport
    pub transport_id: u64,
    /// The producer this consumer receives from
    pub producer_id: u64,
    /// Audio or video
    pub kind: MediaKind,
    /// Negotiated receive parameters
    pub params: MediaParams,
    closed: bool,
}

impl Consumer {
    /// Create a new consumer
    pub fn new(
        id: u64,
        transport_id: u64,
        producer_id: u64,
        kind: MediaKind,
        params: MediaParams,
    ) -> Self {
        Self {
            id,
            transport_id,
            producer_id,
            kind,
            params,
            closed: false,
        }
    }

    /// Whether the consumer has been closed
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Close the consumer
    pub fn close(&mut self) -> Result<(), HubError> {
        if self.closed {
            return Err(HubError::AlreadyClosed(self.id));
        }
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signaling::Codec;

    fn remote_params() -> ConnectivityParams {
        ConnectivityParams {
            ice_ufrag: "remote".into(),
            ice_pwd: "secret".into(),
            fingerprint: "sha-256 AA".into(),
        }
    }

    #[test]
    fn test_connect_is_one_shot() {
        let mut transport = Transport::new(1, TransportDirection::Send);
        assert!(!transport.is_connected());

        transport.connect(remote_params()).unwrap();
        assert!(transport.is_connected());

        let second = transport.connect(ConnectivityParams {
            ice_ufrag: "other".into(),
            ..remote_params()
        });
        assert_eq!(second, Err(HubError::AlreadyConnected(1)));
        // State unchanged by the failing call
        assert!(transport.is_connected());
    }

    #[test]
    fn test_close_twice_fails() {
        let mut transport = Transport::new(2, TransportDirection::Recv);

        transport.close().unwrap();
        assert_eq!(transport.close(), Err(HubError::AlreadyClosed(2)));
    }

    #[test]
    fn test_producer_close_once() {
        let params = MediaParams::new(Codec::audio("audio/opus", 48000, 2));
        let mut producer = Producer::new(5, 1, MediaKind::Audio, params);

        assert!(!producer.is_closed());
        producer.close().unwrap();
        assert!(producer.is_closed());
        assert_eq!(producer.close(), Err(HubError::AlreadyClosed(5)));
    }
}
