//! Parley cryptographic engine
//!
//! Primitives consumed by the session layer; nothing here knows about
//! protocol states or wire framing.
//!
//! ## Crypto primitives
//!
//! - **Identity**: Ed25519 signing keypair per peer
//! - **Key agreement**: X25519 ephemeral ECDH per handshake → HKDF-SHA256
//!   salted with the handshake transcript hash → directional keys
//! - **Records**: ChaCha20-Poly1305 AEAD, nonce and associated data derived
//!   from the record sequence number

pub mod error;
pub mod identity;
pub mod kex;
pub mod record;
pub mod transcript;

pub use error::CryptoError;
pub use identity::{PeerPublicKey, SIGNATURE_SIZE, SigningIdentity};
pub use kex::{KeyExchange, Role, SessionKeys};
pub use record::{NONCE_SIZE, RecordCipher, TAG_SIZE};
pub use transcript::{TRANSCRIPT_HASH_SIZE, Transcript};
