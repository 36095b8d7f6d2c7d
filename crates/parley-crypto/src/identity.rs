//! Identity signing keys.
//!
//! Each peer holds a long-lived Ed25519 signing keypair. Handshake halves
//! are signed with it and verified against the public key the application
//! supplies for the claimed peer identity.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use rand::rngs::OsRng;
use zeroize::Zeroize;

use crate::error::CryptoError;

/// Length of an Ed25519 signature in bytes.
pub const SIGNATURE_SIZE: usize = 64;

/// An Ed25519 signing keypair identifying one peer.
pub struct SigningIdentity {
    signing: SigningKey,
}

impl std::fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("public", &hex::encode(self.signing.verifying_key().as_bytes()))
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl SigningIdentity {
    /// Generate a new random signing keypair.
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        let signing = SigningKey::from_bytes(&seed);
        seed.zeroize();
        Self { signing }
    }

    /// Reconstruct from raw 32-byte secret key bytes.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKeyLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut seed = [0u8; 32];
        seed.copy_from_slice(bytes);
        let signing = SigningKey::from_bytes(&seed);
        seed.zeroize();
        Ok(Self { signing })
    }

    /// Get the public verification key as raw bytes.
    pub fn public_bytes(&self) -> [u8; 32] {
        self.signing.verifying_key().to_bytes()
    }

    /// Get the secret key as raw bytes. Handle with care.
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.signing.to_bytes()
    }

    /// Sign a message with the identity key.
    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_SIZE] {
        self.signing.sign(message).to_bytes()
    }
}

/// A peer's Ed25519 verification key, as supplied by the resolver.
#[derive(Debug, Clone)]
pub struct PeerPublicKey {
    verifying: VerifyingKey,
}

impl PeerPublicKey {
    /// Parse a 32-byte Ed25519 public key.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKeyLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(bytes);
        let verifying =
            VerifyingKey::from_bytes(&arr).map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self { verifying })
    }

    /// Get the key as raw bytes.
    pub fn as_bytes(&self) -> [u8; 32] {
        self.verifying.to_bytes()
    }

    /// Verify an identity signature over `message`.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
        if signature.len() != SIGNATURE_SIZE {
            return Err(CryptoError::InvalidSignatureLength {
                expected: SIGNATURE_SIZE,
                actual: signature.len(),
            });
        }
        let mut sig = [0u8; SIGNATURE_SIZE];
        sig.copy_from_slice(signature);
        self.verifying
            .verify(message, &Signature::from_bytes(&sig))
            .map_err(|_| CryptoError::SignatureVerification)
    }
}
