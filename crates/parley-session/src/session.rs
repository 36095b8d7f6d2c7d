//! The secure session state machine.
//!
//! A session authenticates a peer pairing with Ed25519 identity
//! signatures, agrees on directional record keys through an ephemeral
//! X25519 exchange, and then protects application records with
//! ChaCha20-Poly1305 and strictly monotonic sequence numbers.
//!
//! The handshake takes exactly four messages:
//!
//! 1. connect request — initiator id + ephemeral key, signed
//! 2. reply — responder id + ephemeral key, signed over the transcript
//! 3. initiator key confirmation (HMAC over the transcript)
//! 4. responder key confirmation; the responder is established when it
//!    emits this message, the initiator when it consumes it
//!
//! Any protocol or authentication failure during negotiation closes the
//! session; the only remediation is a fresh handshake.

use parley_crypto::{
    KeyExchange, PeerPublicKey, RecordCipher, Role, SessionKeys, SigningIdentity, TAG_SIZE,
    Transcript,
};
use tracing::{debug, warn};

use crate::error::SessionError;
use crate::message::{
    Confirm, HandshakeMessage, KeyOffer, SIG_DOMAIN_REPLY, SIG_DOMAIN_REQUEST, offer_signing_input,
};
use crate::resolver::PeerKeyResolver;
use crate::snapshot::{SNAPSHOT_VERSION, Snapshot};
use crate::state::State;

/// Domain-separation label for the handshake transcript.
const TRANSCRIPT_LABEL: &[u8] = b"parley-handshake-v1";

/// Bytes of record header (big-endian sequence number).
const RECORD_HEADER_LEN: usize = 8;

/// Output of [`SecureSession::unwrap`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnwrapResult {
    /// Nothing to forward; the triggering message completed a step.
    NoData,
    /// An internal protocol message that must be sent to the peer.
    ProtocolData(Vec<u8>),
    /// Decrypted application data.
    UserData(Vec<u8>),
}

/// Where the handshake currently stands, with the material each step owns.
enum Phase {
    /// No handshake material held (Idle or Closed).
    Inert,
    /// Initiator: connect request sent, waiting for the reply.
    AwaitReply {
        transcript: Transcript,
        kex: KeyExchange,
    },
    /// Responder: reply sent, waiting for the initiator's confirmation.
    AwaitInitiatorConfirm {
        transcript: Transcript,
        keys: SessionKeys,
        peer_id: Vec<u8>,
    },
    /// Initiator: confirmation sent, waiting for the responder's.
    AwaitResponderConfirm {
        transcript: Transcript,
        keys: SessionKeys,
        peer_id: Vec<u8>,
    },
    /// Established record channel.
    Ready(Channel),
}

/// Negotiated symmetric context of an established session.
struct Channel {
    peer_id: Vec<u8>,
    keys: SessionKeys,
    send_cipher: RecordCipher,
    recv_cipher: RecordCipher,
    send_seq: u64,
    last_recv_seq: Option<u64>,
}

impl Channel {
    fn new(peer_id: Vec<u8>, keys: SessionKeys) -> Self {
        let send_cipher = RecordCipher::new(keys.send_key());
        let recv_cipher = RecordCipher::new(keys.recv_key());
        Self {
            peer_id,
            keys,
            send_cipher,
            recv_cipher,
            send_seq: 0,
            last_recv_seq: None,
        }
    }
}

/// A mutually authenticated session with one peer.
///
/// Instances are for sequential use by one logical actor; callers that
/// share a session across threads must serialize access themselves.
pub struct SecureSession {
    local_id: Vec<u8>,
    identity: Option<SigningIdentity>,
    resolver: Box<dyn PeerKeyResolver>,
    state: State,
    phase: Phase,
}

impl std::fmt::Debug for SecureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureSession")
            .field("local_id", &hex::encode(&self.local_id))
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl SecureSession {
    /// Create a session in the `Idle` state.
    ///
    /// `signing_key` is the raw 32-byte Ed25519 secret key identifying
    /// this peer. Fails with [`SessionError::Identity`] when the id is
    /// empty or the key is malformed.
    pub fn new(
        local_id: &[u8],
        signing_key: &[u8],
        resolver: Box<dyn PeerKeyResolver>,
    ) -> Result<Self, SessionError> {
        if local_id.is_empty() {
            return Err(SessionError::Identity("peer id must not be empty".into()));
        }
        let identity = SigningIdentity::from_secret_bytes(signing_key)
            .map_err(|e| SessionError::Identity(e.to_string()))?;
        Ok(Self {
            local_id: local_id.to_vec(),
            identity: Some(identity),
            resolver,
            state: State::Idle,
            phase: Phase::Inert,
        })
    }

    /// Current lifecycle state.
    pub const fn state(&self) -> State {
        self.state
    }

    /// Whether the record channel is usable.
    pub const fn is_established(&self) -> bool {
        matches!(self.state, State::Established)
    }

    /// Local identity bytes.
    pub fn local_id(&self) -> &[u8] {
        &self.local_id
    }

    /// The authenticated peer's identity, once known.
    pub fn peer_id(&self) -> Option<&[u8]> {
        match &self.phase {
            Phase::Ready(channel) => Some(&channel.peer_id),
            Phase::AwaitInitiatorConfirm { peer_id, .. }
            | Phase::AwaitResponderConfirm { peer_id, .. } => Some(peer_id),
            Phase::Inert | Phase::AwaitReply { .. } => None,
        }
    }

    /// Start negotiation in the initiator role.
    ///
    /// Valid only in `Idle`; transitions the session to `Negotiating`
    /// and returns the connect request to send to the peer.
    pub fn generate_connect_request(&mut self) -> Result<Vec<u8>, SessionError> {
        if self.state != State::Idle {
            return Err(SessionError::InvalidState {
                state: self.state,
                operation: "generate_connect_request",
            });
        }

        let mut transcript = Transcript::new(TRANSCRIPT_LABEL);
        let kex = KeyExchange::new();
        let eph = kex.public_bytes();

        let signing_input =
            offer_signing_input(SIG_DOMAIN_REQUEST, &transcript.current_hash(), &self.local_id, &eph);
        let sig = self.signing()?.sign(&signing_input);

        let request =
            HandshakeMessage::Request(KeyOffer::new(&self.local_id, &eph, &sig)).encode()?;
        transcript.absorb(&request);

        self.phase = Phase::AwaitReply { transcript, kex };
        self.set_state(State::Negotiating);
        Ok(request)
    }

    /// Consume one incoming message.
    ///
    /// While negotiating this advances the handshake, consulting the
    /// resolver when a peer identity must be verified. Once established
    /// it decrypts and authenticates a record.
    pub fn unwrap(&mut self, data: &[u8]) -> Result<UnwrapResult, SessionError> {
        match self.state {
            State::Closed => Err(SessionError::InvalidState {
                state: self.state,
                operation: "unwrap",
            }),
            State::Established => self.unwrap_record(data),
            State::Idle => {
                // A fresh session fed a message is the responder side
                // accepting a connect request.
                let message = match HandshakeMessage::decode(data) {
                    Ok(message) => message,
                    Err(e) => return Err(self.fail(e)),
                };
                match message {
                    HandshakeMessage::Request(offer) => self.accept_request(&offer, data),
                    other => Err(self.fail(SessionError::protocol(format!(
                        "expected connect request, got {}",
                        other.kind_name()
                    )))),
                }
            }
            State::Negotiating => {
                let message = match HandshakeMessage::decode(data) {
                    Ok(message) => message,
                    Err(e) => return Err(self.fail(e)),
                };
                self.advance_handshake(message, data)
            }
        }
    }

    /// Encrypt and authenticate outgoing application data.
    ///
    /// Valid only in `Established`. Sequence numbers increase
    /// monotonically and are bound into each record.
    pub fn wrap(&mut self, data: &[u8]) -> Result<Vec<u8>, SessionError> {
        let Phase::Ready(channel) = &mut self.phase else {
            return Err(SessionError::InvalidState {
                state: self.state,
                operation: "wrap",
            });
        };
        let sequence = channel.send_seq;
        let sealed = channel
            .send_cipher
            .seal(sequence, data)
            .map_err(|e| SessionError::authentication(e.to_string()))?;
        channel.send_seq += 1;

        let mut record = Vec::with_capacity(RECORD_HEADER_LEN + sealed.len());
        record.extend_from_slice(&sequence.to_be_bytes());
        record.extend_from_slice(&sealed);
        Ok(record)
    }

    /// Serialize the negotiated symmetric context of an established
    /// session. Fails with [`SessionError::InvalidState`] otherwise.
    pub fn save(&self) -> Result<Vec<u8>, SessionError> {
        let Phase::Ready(channel) = &self.phase else {
            return Err(SessionError::InvalidState {
                state: self.state,
                operation: "save",
            });
        };
        Snapshot {
            version: SNAPSHOT_VERSION,
            local_id: hex::encode(&self.local_id),
            peer_id: hex::encode(&channel.peer_id),
            send_key: hex::encode(channel.keys.send_key()),
            recv_key: hex::encode(channel.keys.recv_key()),
            send_seq: channel.send_seq,
            last_recv_seq: channel.last_recv_seq,
        }
        .to_bytes()
    }

    /// Reconstruct an established session from a snapshot.
    ///
    /// Only the cryptographic context is restored; the resolver must be
    /// re-supplied. The restored session cannot re-handshake.
    pub fn restore(
        blob: &[u8],
        resolver: Box<dyn PeerKeyResolver>,
    ) -> Result<Self, SessionError> {
        let snapshot = Snapshot::from_bytes(blob)?;
        let keys = SessionKeys::from_raw(snapshot.send_key_bytes()?, snapshot.recv_key_bytes()?);
        let mut channel = Channel::new(snapshot.peer_id_bytes()?, keys);
        channel.send_seq = snapshot.send_seq;
        channel.last_recv_seq = snapshot.last_recv_seq;

        Ok(Self {
            local_id: snapshot.local_id_bytes()?,
            identity: None,
            resolver,
            state: State::Established,
            phase: Phase::Ready(channel),
        })
    }

    /// Close the session, releasing key material. Idempotent and safe to
    /// call in any state.
    pub fn close(&mut self) {
        if self.state == State::Closed {
            return;
        }
        // Dropping the phase zeroizes the session keys.
        self.phase = Phase::Inert;
        self.set_state(State::Closed);
    }

    // ── Handshake steps ──────────────────────────────────────────────

    /// Responder side: verify a connect request and produce the reply.
    fn accept_request(
        &mut self,
        offer: &KeyOffer,
        raw: &[u8],
    ) -> Result<UnwrapResult, SessionError> {
        let step = self.try_accept_request(offer, raw);
        match step {
            Ok(result) => Ok(result),
            Err(e) => Err(self.fail(e)),
        }
    }

    fn try_accept_request(
        &mut self,
        offer: &KeyOffer,
        raw: &[u8],
    ) -> Result<UnwrapResult, SessionError> {
        let peer_id = offer.id_bytes()?;
        let peer_eph = offer.eph_bytes()?;
        let sig = offer.sig_bytes()?;
        let peer_key = self.resolve_peer(&peer_id)?;

        let mut transcript = Transcript::new(TRANSCRIPT_LABEL);
        let signing_input =
            offer_signing_input(SIG_DOMAIN_REQUEST, &transcript.current_hash(), &peer_id, &peer_eph);
        peer_key
            .verify(&signing_input, &sig)
            .map_err(|_| SessionError::authentication("connect request signature invalid"))?;
        transcript.absorb(raw);

        self.set_state(State::Negotiating);

        let kex = KeyExchange::new();
        let eph = kex.public_bytes();
        let reply_input =
            offer_signing_input(SIG_DOMAIN_REPLY, &transcript.current_hash(), &self.local_id, &eph);
        let reply_sig = self.signing()?.sign(&reply_input);
        let reply =
            HandshakeMessage::Reply(KeyOffer::new(&self.local_id, &eph, &reply_sig)).encode()?;
        transcript.absorb(&reply);

        let keys = kex
            .derive(&peer_eph, &transcript.current_hash(), Role::Responder)
            .map_err(|e| SessionError::authentication(e.to_string()))?;

        self.phase = Phase::AwaitInitiatorConfirm {
            transcript,
            keys,
            peer_id,
        };
        Ok(UnwrapResult::ProtocolData(reply))
    }

    /// Dispatch a negotiation-phase message against the current step.
    fn advance_handshake(
        &mut self,
        message: HandshakeMessage,
        raw: &[u8],
    ) -> Result<UnwrapResult, SessionError> {
        let phase = std::mem::replace(&mut self.phase, Phase::Inert);
        match (phase, message) {
            (Phase::AwaitReply { transcript, kex }, HandshakeMessage::Reply(offer)) => {
                match self.consume_reply(transcript, kex, &offer, raw) {
                    Ok(result) => Ok(result),
                    Err(e) => Err(self.fail(e)),
                }
            }
            (
                Phase::AwaitInitiatorConfirm {
                    transcript,
                    keys,
                    peer_id,
                },
                HandshakeMessage::InitiatorConfirm(confirm),
            ) => match self.consume_initiator_confirm(transcript, keys, peer_id, &confirm, raw) {
                Ok(result) => Ok(result),
                Err(e) => Err(self.fail(e)),
            },
            (
                Phase::AwaitResponderConfirm {
                    transcript,
                    keys,
                    peer_id,
                },
                HandshakeMessage::ResponderConfirm(confirm),
            ) => match self.consume_responder_confirm(&transcript, keys, peer_id, &confirm) {
                Ok(result) => Ok(result),
                Err(e) => Err(self.fail(e)),
            },
            (_, message) => Err(self.fail(SessionError::protocol(format!(
                "out-of-order handshake message: {}",
                message.kind_name()
            )))),
        }
    }

    /// Initiator side: verify the reply, derive keys, confirm.
    fn consume_reply(
        &mut self,
        mut transcript: Transcript,
        kex: KeyExchange,
        offer: &KeyOffer,
        raw: &[u8],
    ) -> Result<UnwrapResult, SessionError> {
        let peer_id = offer.id_bytes()?;
        let peer_eph = offer.eph_bytes()?;
        let sig = offer.sig_bytes()?;
        let peer_key = self.resolve_peer(&peer_id)?;

        let reply_input =
            offer_signing_input(SIG_DOMAIN_REPLY, &transcript.current_hash(), &peer_id, &peer_eph);
        peer_key
            .verify(&reply_input, &sig)
            .map_err(|_| SessionError::authentication("connect reply signature invalid"))?;
        transcript.absorb(raw);

        let transcript_hash = transcript.current_hash();
        let keys = kex
            .derive(&peer_eph, &transcript_hash, Role::Initiator)
            .map_err(|e| SessionError::authentication(e.to_string()))?;

        let tag = keys.confirm_tag(&transcript_hash);
        let confirm = HandshakeMessage::InitiatorConfirm(Confirm::new(&tag)).encode()?;
        transcript.absorb(&confirm);

        self.phase = Phase::AwaitResponderConfirm {
            transcript,
            keys,
            peer_id,
        };
        Ok(UnwrapResult::ProtocolData(confirm))
    }

    /// Responder side: check the initiator's confirmation, emit ours,
    /// and establish.
    fn consume_initiator_confirm(
        &mut self,
        mut transcript: Transcript,
        keys: SessionKeys,
        peer_id: Vec<u8>,
        confirm: &Confirm,
        raw: &[u8],
    ) -> Result<UnwrapResult, SessionError> {
        let tag = confirm.tag_bytes()?;
        if !keys.verify_peer_confirm(&transcript.current_hash(), &tag) {
            return Err(SessionError::authentication(
                "initiator key confirmation invalid",
            ));
        }
        transcript.absorb(raw);

        let our_tag = keys.confirm_tag(&transcript.current_hash());
        let reply = HandshakeMessage::ResponderConfirm(Confirm::new(&our_tag)).encode()?;

        self.phase = Phase::Ready(Channel::new(peer_id, keys));
        self.set_state(State::Established);
        Ok(UnwrapResult::ProtocolData(reply))
    }

    /// Initiator side: check the responder's confirmation and establish.
    fn consume_responder_confirm(
        &mut self,
        transcript: &Transcript,
        keys: SessionKeys,
        peer_id: Vec<u8>,
        confirm: &Confirm,
    ) -> Result<UnwrapResult, SessionError> {
        let tag = confirm.tag_bytes()?;
        if !keys.verify_peer_confirm(&transcript.current_hash(), &tag) {
            return Err(SessionError::authentication(
                "responder key confirmation invalid",
            ));
        }

        self.phase = Phase::Ready(Channel::new(peer_id, keys));
        self.set_state(State::Established);
        Ok(UnwrapResult::NoData)
    }

    // ── Record path ──────────────────────────────────────────────────

    /// Decrypt one record. Failures here are reported to the caller but
    /// do not destroy the session.
    fn unwrap_record(&mut self, data: &[u8]) -> Result<UnwrapResult, SessionError> {
        let Phase::Ready(channel) = &mut self.phase else {
            return Err(SessionError::InvalidState {
                state: self.state,
                operation: "unwrap",
            });
        };

        if data.len() < RECORD_HEADER_LEN + TAG_SIZE {
            return Err(SessionError::authentication("record too short"));
        }
        let mut seq_bytes = [0u8; RECORD_HEADER_LEN];
        seq_bytes.copy_from_slice(&data[..RECORD_HEADER_LEN]);
        let sequence = u64::from_be_bytes(seq_bytes);

        if let Some(last) = channel.last_recv_seq
            && sequence <= last
        {
            return Err(SessionError::authentication(format!(
                "replayed or reordered record: sequence {sequence} after {last}"
            )));
        }

        let plaintext = channel
            .recv_cipher
            .open(sequence, &data[RECORD_HEADER_LEN..])
            .map_err(|e| SessionError::authentication(e.to_string()))?;

        channel.last_recv_seq = Some(sequence);
        Ok(UnwrapResult::UserData(plaintext))
    }

    // ── Internals ────────────────────────────────────────────────────

    fn signing(&self) -> Result<&SigningIdentity, SessionError> {
        self.identity
            .as_ref()
            .ok_or_else(|| SessionError::Identity("session has no signing key".into()))
    }

    fn resolve_peer(&self, peer_id: &[u8]) -> Result<PeerPublicKey, SessionError> {
        self.resolver
            .public_key_for_id(peer_id)
            .ok_or_else(|| SessionError::unknown_peer(peer_id))
    }

    /// Abort the handshake: negotiation-phase failures are fatal.
    fn fail(&mut self, error: SessionError) -> SessionError {
        warn!(local_id = %hex::encode(&self.local_id), error = %error, "handshake failed");
        self.phase = Phase::Inert;
        self.set_state(State::Closed);
        error
    }

    fn set_state(&mut self, state: State) {
        debug!(local_id = %hex::encode(&self.local_id), %state, "session state changed");
        self.state = state;
        self.resolver.state_changed(state);
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Resolver backed by a shared id → public key directory, recording
    /// every state transition it observes.
    #[derive(Default, Clone)]
    struct DirectoryResolver {
        keys: Arc<Mutex<HashMap<Vec<u8>, Vec<u8>>>>,
        transitions: Arc<Mutex<Vec<State>>>,
    }

    impl DirectoryResolver {
        fn insert(&self, id: &[u8], public_key: [u8; 32]) {
            self.keys
                .lock()
                .unwrap()
                .insert(id.to_vec(), public_key.to_vec());
        }

        fn transitions(&self) -> Vec<State> {
            self.transitions.lock().unwrap().clone()
        }
    }

    impl PeerKeyResolver for DirectoryResolver {
        fn public_key_for_id(&self, peer_id: &[u8]) -> Option<PeerPublicKey> {
            let keys = self.keys.lock().unwrap();
            let bytes = keys.get(peer_id)?;
            PeerPublicKey::from_bytes(bytes).ok()
        }

        fn state_changed(&self, state: State) {
            self.transitions.lock().unwrap().push(state);
        }
    }

    struct Pair {
        alice: SecureSession,
        bob: SecureSession,
        alice_resolver: DirectoryResolver,
        bob_resolver: DirectoryResolver,
    }

    fn make_pair() -> Pair {
        let alice_identity = SigningIdentity::generate();
        let bob_identity = SigningIdentity::generate();

        let alice_resolver = DirectoryResolver::default();
        alice_resolver.insert(b"bob", bob_identity.public_bytes());
        let bob_resolver = DirectoryResolver::default();
        bob_resolver.insert(b"alice", alice_identity.public_bytes());

        let alice = SecureSession::new(
            b"alice",
            &alice_identity.secret_bytes(),
            Box::new(alice_resolver.clone()),
        )
        .unwrap();
        let bob = SecureSession::new(
            b"bob",
            &bob_identity.secret_bytes(),
            Box::new(bob_resolver.clone()),
        )
        .unwrap();

        Pair {
            alice,
            bob,
            alice_resolver,
            bob_resolver,
        }
    }

    fn proto(result: UnwrapResult) -> Vec<u8> {
        match result {
            UnwrapResult::ProtocolData(data) => data,
            other => panic!("expected protocol data, got {other:?}"),
        }
    }

    /// Drive the full 4-message handshake between two sessions.
    fn establish(pair: &mut Pair) {
        let r1 = pair.alice.generate_connect_request().unwrap();
        let r2 = proto(pair.bob.unwrap(&r1).unwrap());
        let r3 = proto(pair.alice.unwrap(&r2).unwrap());
        let r4 = proto(pair.bob.unwrap(&r3).unwrap());
        assert!(pair.bob.is_established());
        assert_eq!(pair.alice.unwrap(&r4).unwrap(), UnwrapResult::NoData);
        assert!(pair.alice.is_established());
    }

    #[test]
    fn alice_bob_scenario_reaches_established() {
        let mut pair = make_pair();
        establish(&mut pair);

        assert_eq!(pair.alice.peer_id(), Some(b"bob".as_slice()));
        assert_eq!(pair.bob.peer_id(), Some(b"alice".as_slice()));
        assert_eq!(
            pair.alice_resolver.transitions(),
            vec![State::Negotiating, State::Established]
        );
        assert_eq!(
            pair.bob_resolver.transitions(),
            vec![State::Negotiating, State::Established]
        );

        let wrapped = pair.alice.wrap(b"hello").unwrap();
        assert_eq!(
            pair.bob.unwrap(&wrapped).unwrap(),
            UnwrapResult::UserData(b"hello".to_vec())
        );
    }

    #[test]
    fn roundtrip_various_payload_sizes() {
        let mut pair = make_pair();
        establish(&mut pair);

        for payload in [vec![], vec![0x42u8], vec![7u8; 64 * 1024]] {
            let wrapped = pair.bob.wrap(&payload).unwrap();
            assert_eq!(
                pair.alice.unwrap(&wrapped).unwrap(),
                UnwrapResult::UserData(payload)
            );
        }
    }

    #[test]
    fn tampered_record_is_rejected_without_killing_session() {
        let mut pair = make_pair();
        establish(&mut pair);

        let wrapped = pair.alice.wrap(b"payload").unwrap();
        for bit in 0..8 {
            let mut mutated = wrapped.clone();
            let last = mutated.len() - 1;
            mutated[last] ^= 1 << bit;
            let err = pair.bob.unwrap(&mutated).unwrap_err();
            assert!(matches!(err, SessionError::Authentication(_)));
        }
        // The session survives and the original record still decrypts.
        assert!(pair.bob.is_established());
        assert_eq!(
            pair.bob.unwrap(&wrapped).unwrap(),
            UnwrapResult::UserData(b"payload".to_vec())
        );
    }

    #[test]
    fn replayed_record_is_rejected() {
        let mut pair = make_pair();
        establish(&mut pair);

        let wrapped = pair.alice.wrap(b"once").unwrap();
        pair.bob.unwrap(&wrapped).unwrap();
        let err = pair.bob.unwrap(&wrapped).unwrap_err();
        assert!(matches!(err, SessionError::Authentication(_)));
    }

    #[test]
    fn reordered_records_are_rejected() {
        let mut pair = make_pair();
        establish(&mut pair);

        let first = pair.alice.wrap(b"first").unwrap();
        let second = pair.alice.wrap(b"second").unwrap();
        pair.bob.unwrap(&second).unwrap();
        let err = pair.bob.unwrap(&first).unwrap_err();
        assert!(matches!(err, SessionError::Authentication(_)));
    }

    #[test]
    fn no_protocol_data_after_establishment() {
        let mut pair = make_pair();
        establish(&mut pair);
        let wrapped = pair.alice.wrap(b"data").unwrap();
        match pair.bob.unwrap(&wrapped).unwrap() {
            UnwrapResult::UserData(_) => {}
            other => panic!("established session produced {other:?}"),
        }
    }

    #[test]
    fn wrap_before_established_fails_and_preserves_state() {
        let mut pair = make_pair();
        let err = pair.alice.wrap(b"too early").unwrap_err();
        assert!(matches!(err, SessionError::InvalidState { .. }));
        assert_eq!(pair.alice.state(), State::Idle);

        // Session is still usable for a normal handshake afterwards.
        establish(&mut pair);
    }

    #[test]
    fn connect_request_valid_only_in_idle() {
        let mut pair = make_pair();
        pair.alice.generate_connect_request().unwrap();
        let err = pair.alice.generate_connect_request().unwrap_err();
        assert!(matches!(err, SessionError::InvalidState { .. }));
    }

    #[test]
    fn empty_id_is_rejected() {
        let identity = SigningIdentity::generate();
        let err = SecureSession::new(
            b"",
            &identity.secret_bytes(),
            Box::new(DirectoryResolver::default()),
        )
        .unwrap_err();
        assert!(matches!(err, SessionError::Identity(_)));
    }

    #[test]
    fn malformed_signing_key_is_rejected() {
        let err = SecureSession::new(
            b"alice",
            &[0u8; 7],
            Box::new(DirectoryResolver::default()),
        )
        .unwrap_err();
        assert!(matches!(err, SessionError::Identity(_)));
    }

    #[test]
    fn unknown_peer_aborts_handshake() {
        let mut pair = make_pair();
        // Bob's resolver does not know "alice" any more.
        pair.bob_resolver.keys.lock().unwrap().clear();

        let r1 = pair.alice.generate_connect_request().unwrap();
        let err = pair.bob.unwrap(&r1).unwrap_err();
        assert!(matches!(err, SessionError::UnknownPeer { .. }));
        assert_eq!(pair.bob.state(), State::Closed);
    }

    #[test]
    fn forged_connect_request_fails_authentication() {
        let mut pair = make_pair();
        // Bob expects a different key for "alice".
        pair.bob_resolver
            .insert(b"alice", SigningIdentity::generate().public_bytes());

        let r1 = pair.alice.generate_connect_request().unwrap();
        let err = pair.bob.unwrap(&r1).unwrap_err();
        assert!(matches!(err, SessionError::Authentication(_)));
        assert_eq!(pair.bob.state(), State::Closed);
    }

    #[test]
    fn tampered_handshake_message_is_fatal() {
        let mut pair = make_pair();
        let r1 = pair.alice.generate_connect_request().unwrap();
        let r2 = proto(pair.bob.unwrap(&r1).unwrap());

        let mut forged = r2.clone();
        let last = forged.len() - 1;
        forged[last] ^= 0x01;
        let err = pair.alice.unwrap(&forged).unwrap_err();
        assert!(matches!(
            err,
            SessionError::Authentication(_) | SessionError::Protocol(_)
        ));
        assert_eq!(pair.alice.state(), State::Closed);
    }

    #[test]
    fn out_of_order_handshake_message_is_fatal() {
        let mut pair = make_pair();
        let r1 = pair.alice.generate_connect_request().unwrap();
        let err = pair.alice.unwrap(&r1).unwrap_err();
        assert!(matches!(err, SessionError::Protocol(_)));
        assert_eq!(pair.alice.state(), State::Closed);
    }

    #[test]
    fn save_restore_roundtrip_continues_record_exchange() {
        let mut pair = make_pair();
        establish(&mut pair);

        // Exchange one record so counters are non-trivial.
        let wrapped = pair.alice.wrap(b"before save").unwrap();
        pair.bob.unwrap(&wrapped).unwrap();

        let alice_blob = pair.alice.save().unwrap();
        let bob_blob = pair.bob.save().unwrap();

        let mut alice =
            SecureSession::restore(&alice_blob, Box::new(DirectoryResolver::default())).unwrap();
        let mut bob =
            SecureSession::restore(&bob_blob, Box::new(DirectoryResolver::default())).unwrap();
        assert!(alice.is_established());
        assert_eq!(alice.peer_id(), Some(b"bob".as_slice()));

        let wrapped = alice.wrap(b"after restore").unwrap();
        assert_eq!(
            bob.unwrap(&wrapped).unwrap(),
            UnwrapResult::UserData(b"after restore".to_vec())
        );
        let reply = bob.wrap(b"reply").unwrap();
        assert_eq!(
            alice.unwrap(&reply).unwrap(),
            UnwrapResult::UserData(b"reply".to_vec())
        );
    }

    #[test]
    fn restore_rejects_replay_of_presave_records() {
        let mut pair = make_pair();
        establish(&mut pair);

        let wrapped = pair.alice.wrap(b"seen").unwrap();
        pair.bob.unwrap(&wrapped).unwrap();
        let blob = pair.bob.save().unwrap();

        let mut bob =
            SecureSession::restore(&blob, Box::new(DirectoryResolver::default())).unwrap();
        let err = bob.unwrap(&wrapped).unwrap_err();
        assert!(matches!(err, SessionError::Authentication(_)));
    }

    #[test]
    fn save_before_established_fails() {
        let pair = make_pair();
        let err = pair.alice.save().unwrap_err();
        assert!(matches!(err, SessionError::InvalidState { .. }));
    }

    #[test]
    fn restore_rejects_corrupt_blob() {
        let err = SecureSession::restore(b"garbage", Box::new(DirectoryResolver::default()))
            .unwrap_err();
        assert!(matches!(err, SessionError::Serialization(_)));
    }

    #[test]
    fn restored_session_cannot_rehandshake() {
        let mut pair = make_pair();
        establish(&mut pair);
        let blob = pair.alice.save().unwrap();
        let mut restored =
            SecureSession::restore(&blob, Box::new(DirectoryResolver::default())).unwrap();
        let err = restored.generate_connect_request().unwrap_err();
        assert!(matches!(err, SessionError::InvalidState { .. }));
    }

    #[test]
    fn close_is_idempotent_and_terminal() {
        let mut pair = make_pair();
        establish(&mut pair);

        pair.alice.close();
        pair.alice.close();
        assert_eq!(pair.alice.state(), State::Closed);
        // Only one Closed notification despite two close calls.
        assert_eq!(
            pair.alice_resolver.transitions(),
            vec![State::Negotiating, State::Established, State::Closed]
        );

        let err = pair.alice.wrap(b"late").unwrap_err();
        assert!(matches!(err, SessionError::InvalidState { .. }));
        let err = pair.alice.unwrap(b"late").unwrap_err();
        assert!(matches!(err, SessionError::InvalidState { .. }));
    }

    #[test]
    fn close_before_establishment_is_safe() {
        let mut pair = make_pair();
        pair.alice.generate_connect_request().unwrap();
        pair.alice.close();
        assert_eq!(pair.alice.state(), State::Closed);
    }
}
