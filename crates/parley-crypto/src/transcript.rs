//! Running handshake transcript.
//!
//! Both sides absorb every handshake message into a SHA-256 transcript.
//! Signatures and confirmation MACs are computed over the transcript hash
//! at the point they are produced, which binds each message to everything
//! exchanged before it.

use sha2::{Digest, Sha256};

/// Size of a transcript hash in bytes.
pub const TRANSCRIPT_HASH_SIZE: usize = 32;

/// Incremental SHA-256 transcript over handshake messages.
#[derive(Clone)]
pub struct Transcript {
    hasher: Sha256,
}

impl std::fmt::Debug for Transcript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transcript").finish_non_exhaustive()
    }
}

impl Transcript {
    /// Start a fresh transcript under a domain-separation label.
    pub fn new(label: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(label);
        Self { hasher }
    }

    /// Absorb a length-delimited message into the transcript.
    ///
    /// The length prefix keeps adjacent messages from being ambiguous
    /// under concatenation.
    pub fn absorb(&mut self, message: &[u8]) {
        self.hasher.update((message.len() as u64).to_be_bytes());
        self.hasher.update(message);
    }

    /// Hash of everything absorbed so far. Does not consume the transcript.
    pub fn current_hash(&self) -> [u8; TRANSCRIPT_HASH_SIZE] {
        self.hasher.clone().finalize().into()
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn same_messages_same_hash() {
        let mut a = Transcript::new(b"test");
        let mut b = Transcript::new(b"test");
        a.absorb(b"msg1");
        b.absorb(b"msg1");
        assert_eq!(a.current_hash(), b.current_hash());
    }

    #[test]
    fn order_matters() {
        let mut a = Transcript::new(b"test");
        let mut b = Transcript::new(b"test");
        a.absorb(b"one");
        a.absorb(b"two");
        b.absorb(b"two");
        b.absorb(b"one");
        assert_ne!(a.current_hash(), b.current_hash());
    }

    #[test]
    fn length_prefix_disambiguates_boundaries() {
        let mut a = Transcript::new(b"test");
        let mut b = Transcript::new(b"test");
        a.absorb(b"ab");
        a.absorb(b"c");
        b.absorb(b"a");
        b.absorb(b"bc");
        assert_ne!(a.current_hash(), b.current_hash());
    }

    #[test]
    fn current_hash_is_non_destructive() {
        let mut t = Transcript::new(b"test");
        t.absorb(b"msg");
        assert_eq!(t.current_hash(), t.current_hash());
    }

    #[test]
    fn label_separates_domains() {
        let a = Transcript::new(b"one");
        let b = Transcript::new(b"two");
        assert_ne!(a.current_hash(), b.current_hash());
    }
}
