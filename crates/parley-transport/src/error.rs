//! Transport error types.

use parley_session::SessionError;

/// Errors raised while framing a session over a byte stream.
///
/// The framer never recovers from these: any protocol or session failure
/// aborts the connection.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

impl From<TransportError> for std::io::Error {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Io(io) => io,
            other => Self::new(std::io::ErrorKind::InvalidData, other),
        }
    }
}
