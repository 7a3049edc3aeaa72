//! Crate-level error type
//!
//! Each module returns its own error enum; this aggregate exists for
//! embedding code (a websocket handler, a client runtime) that drives
//! several modules behind one `Result`.

use crate::hub::HubError;
use crate::mesh::NegotiationError;
use crate::registry::RegistryError;

/// Convenience alias used at the crate surface
pub type Result<T> = std::result::Result<T, Error>;

/// Any error the coordination layers can produce
#[derive(Debug)]
pub enum Error {
    /// Session registry failure
    Registry(RegistryError),
    /// Hub resource graph failure
    Hub(HubError),
    /// Mesh negotiation failure
    Negotiation(NegotiationError),
    /// A message failed to parse or serialize
    Serialization(serde_json::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Registry(e) => write!(f, "Registry error: {}", e),
            Error::Hub(e) => write!(f, "Hub error: {}", e),
            Error::Negotiation(e) => write!(f, "Negotiation error: {}", e),
            Error::Serialization(e) => write!(f, "Serialization error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Registry(e) => Some(e),
            Error::Hub(e) => Some(e),
            Error::Negotiation(e) => Some(e),
            Error::Serialization(e) => Some(e),
        }
    }
}

impl From<RegistryError> for Error {
    fn from(e: RegistryError) -> Self {
        Error::Registry(e)
    }
}

impl From<HubError> for Error {
    fn from(e: HubError) -> Self {
        Error::Hub(e)
    }
}

impl From<NegotiationError> for Error {
    fn from(e: NegotiationError) -> Self {
        Error::Negotiation(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapped_errors_keep_their_source() {
        let err: Error = RegistryError::NotFound(7).into();

        assert!(err.to_string().contains("not registered"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_parse_failures_convert() {
        let parse_err = crate::signaling::ClientMessage::from_json("not json").unwrap_err();
        let err: Error = parse_err.into();

        assert!(matches!(err, Error::Serialization(_)));
    }
}
