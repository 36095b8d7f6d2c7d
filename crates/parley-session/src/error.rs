//! Session error taxonomy.

use crate::state::State;

/// Errors reported by `SecureSession`.
///
/// During the handshake, `Protocol`, `Authentication` and `UnknownPeer`
/// are fatal: the session closes itself and must be discarded. Once
/// established, an `Authentication` failure on a single record is
/// reported without destroying the session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Invalid identity: {0}")]
    Identity(String),

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("No public key known for peer {peer_id}")]
    UnknownPeer {
        /// Hex-encoded peer id.
        peer_id: String,
    },

    #[error("Operation '{operation}' invalid in state {state}")]
    InvalidState {
        state: State,
        operation: &'static str,
    },

    #[error("Corrupt session snapshot: {0}")]
    Serialization(String),
}

impl SessionError {
    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub(crate) fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication(message.into())
    }

    pub(crate) fn unknown_peer(peer_id: &[u8]) -> Self {
        Self::UnknownPeer {
            peer_id: hex::encode(peer_id),
        }
    }
}
