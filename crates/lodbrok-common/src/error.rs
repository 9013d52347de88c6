//! Error types for Lodbrok.

use thiserror::Error;

/// Result type alias for Lodbrok operations.
pub type Result<T> = std::result::Result<T, Error>;

/// An error code carried inside a broker response body, together with its
/// symbolic name and the broker-side description.
///
/// Values are produced by the error-code registry in `lodbrok-protocol`;
/// they never originate anywhere else.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{name}: {description}")]
pub struct BrokerError {
    /// Numeric error code as it appears on the wire.
    pub code: i16,
    /// Symbolic name, e.g. `REBALANCE_IN_PROGRESS`.
    pub name: &'static str,
    /// Human-readable description.
    pub description: &'static str,
}

/// Main error type for Lodbrok.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Wire protocol errors (malformed frames, length mismatches, bad fields)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Network errors (unreachable brokers, timeouts, closed connections)
    #[error("Network error: {0}")]
    Network(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An error code returned inside a broker response body
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// Other errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Protocol(e.to_string())
    }
}

impl Error {
    /// The broker error code carried by this error, if it is one.
    pub fn broker_code(&self) -> Option<i16> {
        match self {
            Error::Broker(e) => Some(e.code),
            _ => None,
        }
    }
}
