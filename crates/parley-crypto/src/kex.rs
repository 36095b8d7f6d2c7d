//! Ephemeral key agreement and the handshake key schedule.
//!
//! Each side generates an ephemeral X25519 keypair per handshake, performs
//! ECDH, and expands the shared secret through HKDF-SHA256 salted with the
//! handshake transcript hash. The schedule yields one record key and one
//! confirmation key per direction.

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

/// HKDF info string for the session key schedule.
const HKDF_INFO: &[u8] = b"parley-session-keys-v1";

/// Which side of the handshake this key schedule belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Sent the connect request.
    Initiator,
    /// Accepted the connect request.
    Responder,
}

/// An in-progress ephemeral key exchange.
pub struct KeyExchange {
    ephemeral_secret: StaticSecret,
    ephemeral_public: PublicKey,
}

impl std::fmt::Debug for KeyExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyExchange")
            .field("public", &hex::encode(self.ephemeral_public.as_bytes()))
            .finish_non_exhaustive()
    }
}

impl Default for KeyExchange {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyExchange {
    /// Generate a fresh ephemeral keypair.
    pub fn new() -> Self {
        let ephemeral_secret = StaticSecret::random_from_rng(OsRng);
        let ephemeral_public = PublicKey::from(&ephemeral_secret);
        Self {
            ephemeral_secret,
            ephemeral_public,
        }
    }

    /// Our ephemeral public key bytes to send to the peer.
    pub fn public_bytes(&self) -> [u8; 32] {
        *self.ephemeral_public.as_bytes()
    }

    /// Complete the exchange: ECDH with the peer's ephemeral key, then
    /// derive the directional session keys, salted with the transcript
    /// hash so the keys are bound to the authenticated handshake.
    pub fn derive(
        self,
        peer_public_bytes: &[u8],
        transcript_hash: &[u8; 32],
        role: Role,
    ) -> Result<SessionKeys, CryptoError> {
        if peer_public_bytes.len() != 32 {
            return Err(CryptoError::InvalidKeyLength {
                expected: 32,
                actual: peer_public_bytes.len(),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(peer_public_bytes);
        let peer_public = PublicKey::from(arr);

        let shared = self.ephemeral_secret.diffie_hellman(&peer_public);
        if !shared.was_contributory() {
            return Err(CryptoError::KeyDerivationFailed(
                "non-contributory peer public key".into(),
            ));
        }

        let hk = Hkdf::<Sha256>::new(Some(transcript_hash), shared.as_bytes());
        let mut okm = [0u8; 128];
        hk.expand(HKDF_INFO, &mut okm)
            .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))?;

        let mut to_responder = [0u8; 32];
        let mut to_initiator = [0u8; 32];
        let mut initiator_confirm = [0u8; 32];
        let mut responder_confirm = [0u8; 32];
        to_responder.copy_from_slice(&okm[0..32]);
        to_initiator.copy_from_slice(&okm[32..64]);
        initiator_confirm.copy_from_slice(&okm[64..96]);
        responder_confirm.copy_from_slice(&okm[96..128]);
        okm.zeroize();

        let keys = match role {
            Role::Initiator => SessionKeys {
                send_key: to_responder,
                recv_key: to_initiator,
                send_confirm: initiator_confirm,
                recv_confirm: responder_confirm,
            },
            Role::Responder => SessionKeys {
                send_key: to_initiator,
                recv_key: to_responder,
                send_confirm: responder_confirm,
                recv_confirm: initiator_confirm,
            },
        };
        Ok(keys)
    }
}

/// Directional key material for one established session.
#[derive(ZeroizeOnDrop)]
pub struct SessionKeys {
    send_key: [u8; 32],
    recv_key: [u8; 32],
    send_confirm: [u8; 32],
    recv_confirm: [u8; 32],
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeys")
            .field("keys", &"[REDACTED]")
            .finish()
    }
}

impl SessionKeys {
    /// Reassemble from raw key bytes (session restore path).
    pub fn from_raw(send_key: [u8; 32], recv_key: [u8; 32]) -> Self {
        // Confirmation keys are only used during the handshake and are
        // not part of a restored session.
        Self {
            send_key,
            recv_key,
            send_confirm: [0u8; 32],
            recv_confirm: [0u8; 32],
        }
    }

    /// Key protecting records we send.
    pub fn send_key(&self) -> &[u8; 32] {
        &self.send_key
    }

    /// Key protecting records we receive.
    pub fn recv_key(&self) -> &[u8; 32] {
        &self.recv_key
    }

    /// Produce our key-confirmation tag over the transcript hash.
    pub fn confirm_tag(&self, transcript_hash: &[u8; 32]) -> [u8; 32] {
        hmac_tag(&self.send_confirm, transcript_hash)
    }

    /// Check the peer's key-confirmation tag in constant time.
    pub fn verify_peer_confirm(&self, transcript_hash: &[u8; 32], tag: &[u8]) -> bool {
        if tag.len() != 32 {
            return false;
        }
        let expected = hmac_tag(&self.recv_confirm, transcript_hash);
        expected.ct_eq(tag).into()
    }
}

fn hmac_tag(key: &[u8; 32], message: &[u8]) -> [u8; 32] {
    // HMAC-SHA256 accepts any key length; 32 bytes can never fail.
    #[allow(clippy::unwrap_used)]
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(key).unwrap();
    mac.update(message);
    mac.finalize().into_bytes().into()
}
