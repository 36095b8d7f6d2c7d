//! Serialized session state.
//!
//! A snapshot captures only the negotiated symmetric context of an
//! established session: record keys, sequence counters, and the peer
//! pairing. Callbacks and transport state are never persisted and must
//! be re-supplied on restore.

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

pub(crate) const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Snapshot {
    pub version: u32,
    /// Local identity bytes, hex.
    pub local_id: String,
    /// Peer identity bytes, hex.
    pub peer_id: String,
    /// Outbound record key, hex.
    pub send_key: String,
    /// Inbound record key, hex.
    pub recv_key: String,
    /// Next outbound record sequence number.
    pub send_seq: u64,
    /// Highest inbound sequence number seen, if any.
    pub last_recv_seq: Option<u64>,
}

impl Snapshot {
    pub(crate) fn to_bytes(&self) -> Result<Vec<u8>, SessionError> {
        serde_json::to_vec(self).map_err(|e| SessionError::Serialization(e.to_string()))
    }

    pub(crate) fn from_bytes(blob: &[u8]) -> Result<Self, SessionError> {
        let snapshot: Self = serde_json::from_slice(blob)
            .map_err(|e| SessionError::Serialization(e.to_string()))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SessionError::Serialization(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }
        Ok(snapshot)
    }

    pub(crate) fn local_id_bytes(&self) -> Result<Vec<u8>, SessionError> {
        decode_hex(&self.local_id, "local_id")
    }

    pub(crate) fn peer_id_bytes(&self) -> Result<Vec<u8>, SessionError> {
        decode_hex(&self.peer_id, "peer_id")
    }

    pub(crate) fn send_key_bytes(&self) -> Result<[u8; 32], SessionError> {
        decode_key(&self.send_key, "send_key")
    }

    pub(crate) fn recv_key_bytes(&self) -> Result<[u8; 32], SessionError> {
        decode_key(&self.recv_key, "recv_key")
    }
}

fn decode_hex(field: &str, name: &str) -> Result<Vec<u8>, SessionError> {
    hex::decode(field)
        .map_err(|_| SessionError::Serialization(format!("field '{name}' is not hex")))
}

fn decode_key(field: &str, name: &str) -> Result<[u8; 32], SessionError> {
    decode_hex(field, name)?
        .try_into()
        .map_err(|_| SessionError::Serialization(format!("field '{name}' has wrong length")))
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample() -> Snapshot {
        Snapshot {
            version: SNAPSHOT_VERSION,
            local_id: hex::encode(b"alice"),
            peer_id: hex::encode(b"bob"),
            send_key: hex::encode([1u8; 32]),
            recv_key: hex::encode([2u8; 32]),
            send_seq: 5,
            last_recv_seq: Some(3),
        }
    }

    #[test]
    fn roundtrip() {
        let blob = sample().to_bytes().unwrap();
        let restored = Snapshot::from_bytes(&blob).unwrap();
        assert_eq!(restored.local_id_bytes().unwrap(), b"alice");
        assert_eq!(restored.peer_id_bytes().unwrap(), b"bob");
        assert_eq!(restored.send_key_bytes().unwrap(), [1u8; 32]);
        assert_eq!(restored.recv_key_bytes().unwrap(), [2u8; 32]);
        assert_eq!(restored.send_seq, 5);
        assert_eq!(restored.last_recv_seq, Some(3));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            Snapshot::from_bytes(b"not json"),
            Err(SessionError::Serialization(_))
        ));
    }

    #[test]
    fn rejects_unknown_version() {
        let mut snapshot = sample();
        snapshot.version = 99;
        let blob = snapshot.to_bytes().unwrap();
        assert!(matches!(
            Snapshot::from_bytes(&blob),
            Err(SessionError::Serialization(_))
        ));
    }

    #[test]
    fn rejects_truncated_key() {
        let mut snapshot = sample();
        snapshot.send_key = hex::encode([1u8; 16]);
        let blob = snapshot.to_bytes().unwrap();
        let restored = Snapshot::from_bytes(&blob).unwrap();
        assert!(restored.send_key_bytes().is_err());
    }
}
