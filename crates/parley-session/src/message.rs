//! Handshake message codec.
//!
//! Every handshake message is `MAGIC (4) || kind (1) || JSON body`, with
//! byte-valued fields hex-encoded. The magic prefix is what the transport
//! framer checks before handing negotiation-phase payloads to the session.

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Fixed prefix of every handshake-phase payload.
pub const HANDSHAKE_MAGIC: [u8; 4] = *b"PRLY";

/// Smallest well-formed handshake payload the transport will accept.
pub const MIN_HANDSHAKE_LEN: usize = 12;

const KIND_REQUEST: u8 = 1;
const KIND_REPLY: u8 = 2;
const KIND_INITIATOR_CONFIRM: u8 = 3;
const KIND_RESPONDER_CONFIRM: u8 = 4;

/// Signature domain for the connect request.
pub(crate) const SIG_DOMAIN_REQUEST: &[u8] = b"parley-handshake-request-v1";

/// Signature domain for the connect reply.
pub(crate) const SIG_DOMAIN_REPLY: &[u8] = b"parley-handshake-reply-v1";

/// Identity + ephemeral key halves of the handshake (messages 1 and 2).
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct KeyOffer {
    /// Sender identity, hex.
    pub id: String,
    /// Sender ephemeral X25519 public key, hex.
    pub eph: String,
    /// Ed25519 signature binding this offer to the transcript, hex.
    pub sig: String,
}

/// Key-confirmation halves of the handshake (messages 3 and 4).
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Confirm {
    /// HMAC-SHA256 tag over the transcript hash, hex.
    pub tag: String,
}

impl KeyOffer {
    pub(crate) fn new(id: &[u8], eph: &[u8; 32], sig: &[u8]) -> Self {
        Self {
            id: hex::encode(id),
            eph: hex::encode(eph),
            sig: hex::encode(sig),
        }
    }

    pub(crate) fn id_bytes(&self) -> Result<Vec<u8>, SessionError> {
        let id = decode_hex(&self.id, "id")?;
        if id.is_empty() {
            return Err(SessionError::protocol("empty peer id in key offer"));
        }
        Ok(id)
    }

    pub(crate) fn eph_bytes(&self) -> Result<[u8; 32], SessionError> {
        decode_hex_array(&self.eph, "eph")
    }

    pub(crate) fn sig_bytes(&self) -> Result<Vec<u8>, SessionError> {
        let sig = decode_hex(&self.sig, "sig")?;
        if sig.len() != parley_crypto::SIGNATURE_SIZE {
            return Err(SessionError::protocol("bad signature length in key offer"));
        }
        Ok(sig)
    }
}

impl Confirm {
    pub(crate) fn new(tag: &[u8; 32]) -> Self {
        Self {
            tag: hex::encode(tag),
        }
    }

    pub(crate) fn tag_bytes(&self) -> Result<[u8; 32], SessionError> {
        decode_hex_array(&self.tag, "tag")
    }
}

/// A decoded negotiation-phase message.
#[derive(Debug)]
pub(crate) enum HandshakeMessage {
    Request(KeyOffer),
    Reply(KeyOffer),
    InitiatorConfirm(Confirm),
    ResponderConfirm(Confirm),
}

impl HandshakeMessage {
    /// Serialize to the wire form.
    pub(crate) fn encode(&self) -> Result<Vec<u8>, SessionError> {
        let (kind, body) = match self {
            Self::Request(offer) => (KIND_REQUEST, serde_json::to_vec(offer)),
            Self::Reply(offer) => (KIND_REPLY, serde_json::to_vec(offer)),
            Self::InitiatorConfirm(confirm) => (KIND_INITIATOR_CONFIRM, serde_json::to_vec(confirm)),
            Self::ResponderConfirm(confirm) => (KIND_RESPONDER_CONFIRM, serde_json::to_vec(confirm)),
        };
        let body = body.map_err(|e| SessionError::protocol(e.to_string()))?;
        let mut out = Vec::with_capacity(HANDSHAKE_MAGIC.len() + 1 + body.len());
        out.extend_from_slice(&HANDSHAKE_MAGIC);
        out.push(kind);
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Parse a negotiation-phase payload.
    pub(crate) fn decode(payload: &[u8]) -> Result<Self, SessionError> {
        if payload.len() < MIN_HANDSHAKE_LEN {
            return Err(SessionError::protocol("handshake message too short"));
        }
        if payload[..4] != HANDSHAKE_MAGIC {
            return Err(SessionError::protocol("missing handshake magic"));
        }
        let kind = payload[4];
        let body = &payload[5..];
        match kind {
            KIND_REQUEST => Ok(Self::Request(parse_body(body)?)),
            KIND_REPLY => Ok(Self::Reply(parse_body(body)?)),
            KIND_INITIATOR_CONFIRM => Ok(Self::InitiatorConfirm(parse_body(body)?)),
            KIND_RESPONDER_CONFIRM => Ok(Self::ResponderConfirm(parse_body(body)?)),
            other => Err(SessionError::protocol(format!(
                "unknown handshake message kind {other}"
            ))),
        }
    }

    /// Short name for diagnostics.
    pub(crate) const fn kind_name(&self) -> &'static str {
        match self {
            Self::Request(_) => "request",
            Self::Reply(_) => "reply",
            Self::InitiatorConfirm(_) => "initiator-confirm",
            Self::ResponderConfirm(_) => "responder-confirm",
        }
    }
}

/// Bytes the sender of a key offer signs: a domain label, the transcript
/// hash before this message, and the offer's own fields.
pub(crate) fn offer_signing_input(
    domain: &[u8],
    transcript_hash: &[u8; 32],
    id: &[u8],
    eph: &[u8; 32],
) -> Vec<u8> {
    let mut input = Vec::with_capacity(domain.len() + 32 + 8 + id.len() + 32);
    input.extend_from_slice(domain);
    input.extend_from_slice(transcript_hash);
    input.extend_from_slice(&(id.len() as u64).to_be_bytes());
    input.extend_from_slice(id);
    input.extend_from_slice(eph);
    input
}

fn parse_body<'a, T: Deserialize<'a>>(body: &'a [u8]) -> Result<T, SessionError> {
    serde_json::from_slice(body)
        .map_err(|e| SessionError::protocol(format!("malformed handshake body: {e}")))
}

fn decode_hex(field: &str, name: &str) -> Result<Vec<u8>, SessionError> {
    hex::decode(field).map_err(|_| SessionError::protocol(format!("field '{name}' is not hex")))
}

fn decode_hex_array(field: &str, name: &str) -> Result<[u8; 32], SessionError> {
    let bytes = decode_hex(field, name)?;
    bytes
        .try_into()
        .map_err(|_| SessionError::protocol(format!("field '{name}' has wrong length")))
}
