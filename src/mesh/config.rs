//! Mesh negotiation configuration

use std::time::Duration;

/// Configuration for mesh session management
#[derive(Debug, Clone)]
pub struct MeshConfig {
    /// How long a session may sit in `OfferSent`/`OfferReceived` before it
    /// is failed
    pub negotiation_timeout: Duration,

    /// Interval between sweeps of stale sessions
    pub sweep_interval: Duration,

    /// Bound the embedding transport applies when establishing the
    /// signaling channel itself; exceeding it is a connection-layer
    /// error, distinct from a negotiation timeout
    pub connect_timeout: Duration,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            negotiation_timeout: Duration::from_secs(10),
            sweep_interval: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl MeshConfig {
    /// Set the negotiation timeout
    pub fn negotiation_timeout(mut self, timeout: Duration) -> Self {
        self.negotiation_timeout = timeout;
        self
    }

    /// Set the sweep interval
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Set the signaling connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}
