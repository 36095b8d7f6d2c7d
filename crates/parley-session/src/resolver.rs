//! Caller-supplied peer key resolution and state notifications.

use parley_crypto::PeerPublicKey;

use crate::state::State;

/// Maps peer identifiers to public keys and observes session transitions.
///
/// Implementations are invoked synchronously from inside the session call
/// that needs them; they must not call back into the session.
pub trait PeerKeyResolver: Send {
    /// Return the Ed25519 public key for `peer_id`, or `None` when the
    /// peer is unknown. An unknown peer aborts the handshake.
    fn public_key_for_id(&self, peer_id: &[u8]) -> Option<PeerPublicKey>;

    /// Called on every session state transition.
    fn state_changed(&self, _state: State) {}
}
