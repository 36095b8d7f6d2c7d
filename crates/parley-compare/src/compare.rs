//! Secret comparison state machine.
//!
//! A socialist-millionaire exchange: two parties learn whether their
//! secrets are equal and nothing else. Exactly four messages are
//! exchanged. The initiator calls [`Comparator::begin`] once and feeds
//! every incoming message to [`Comparator::proceed`]; the responder only
//! calls `proceed`. After the fourth message both sides hold the same
//! verdict and the context is spent.

use std::fmt;
use std::mem;

use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use sha2::{Digest, Sha512};
use subtle::ConstantTimeEq;
use tracing::debug;
use zeroize::Zeroize;

use crate::error::CompareError;
use crate::message::{
    self, BeginMessage, ExchangeMessage, ReplyMessage, VerdictMessage,
};
use crate::proof::{CoordsProof, DlogProof, LogEqProof, base_mul, random_scalar};

// Challenge domain tags, one per proof slot across the four messages.
const TAG_G2A: u8 = 1;
const TAG_G3A: u8 = 2;
const TAG_G2B: u8 = 3;
const TAG_G3B: u8 = 4;
const TAG_PQ_B: u8 = 5;
const TAG_PQ_A: u8 = 6;
const TAG_RA: u8 = 7;
const TAG_RB: u8 = 8;

/// Outcome of a comparison.
///
/// `NotReady` while rounds remain; `Match` or `NoMatch` is terminal and
/// never changes afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareResult {
    NotReady,
    NoMatch,
    Match,
}

impl fmt::Display for CompareResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReady => write!(f, "not ready"),
            Self::NoMatch => write!(f, "no match"),
            Self::Match => write!(f, "match"),
        }
    }
}

enum Phase {
    /// No message handled yet; may become initiator or responder.
    Fresh,
    /// Initiator waiting for the responder's shares.
    AwaitReply { a2: Scalar, a3: Scalar },
    /// Responder waiting for the initiator's blinded pair.
    AwaitExchange {
        b3: Scalar,
        g3a: RistrettoPoint,
        g2: RistrettoPoint,
        g3: RistrettoPoint,
        pb: RistrettoPoint,
        qb: RistrettoPoint,
    },
    /// Initiator waiting for the responder's half of the verdict.
    AwaitVerdict {
        a3: Scalar,
        g3b: RistrettoPoint,
        qa_minus_qb: RistrettoPoint,
        pa_minus_pb: RistrettoPoint,
    },
    /// Finished, aborted, or closed.
    Spent,
}

/// A single-use secret comparison context.
pub struct Comparator {
    secret: Scalar,
    result: CompareResult,
    phase: Phase,
}

impl Comparator {
    /// Create a context around `secret`.
    ///
    /// The secret is hashed to a scalar immediately; the raw bytes are
    /// not retained.
    pub fn new(secret: &[u8]) -> Result<Self, CompareError> {
        if secret.is_empty() {
            return Err(CompareError::identity(
                "comparison secret must not be empty",
            ));
        }
        let mut hasher = Sha512::new();
        hasher.update(b"parley-compare-secret-v1");
        hasher.update(secret);
        let scalar = Scalar::from_bytes_mod_order_wide(&hasher.finalize().into());
        Ok(Self {
            secret: scalar,
            result: CompareResult::NotReady,
            phase: Phase::Fresh,
        })
    }

    /// Current verdict.
    pub const fn result(&self) -> CompareResult {
        self.result
    }

    /// Open the exchange as initiator. Producible exactly once.
    pub fn begin(&mut self) -> Result<Vec<u8>, CompareError> {
        if self.result != CompareResult::NotReady {
            return Err(CompareError::InvalidState { operation: "begin" });
        }
        if !matches!(self.phase, Phase::Fresh) {
            return Err(CompareError::protocol("comparison already begun"));
        }

        let a2 = random_scalar();
        let a3 = random_scalar();
        let opening = BeginMessage {
            g2a: base_mul(&a2),
            g2a_proof: DlogProof::prove(TAG_G2A, &a2),
            g3a: base_mul(&a3),
            g3a_proof: DlogProof::prove(TAG_G3A, &a3),
        };
        self.phase = Phase::AwaitReply { a2, a3 };
        debug!("comparison begun as initiator");
        Ok(opening.encode())
    }

    /// Consume an incoming message and produce the reply, if any.
    ///
    /// Returns `None` once this side's exchange is complete. Any
    /// malformed, out-of-order, or unprovable message aborts the
    /// context; the verdict stays `NotReady`.
    pub fn proceed(&mut self, data: &[u8]) -> Result<Option<Vec<u8>>, CompareError> {
        if self.result != CompareResult::NotReady {
            return Err(CompareError::InvalidState { operation: "proceed" });
        }
        let outcome = self.advance(data);
        if outcome.is_err() {
            self.scrub();
        }
        outcome
    }

    /// Release the secret material. Safe to call repeatedly; a terminal
    /// verdict is retained.
    pub fn close(&mut self) {
        self.scrub();
    }

    fn advance(&mut self, data: &[u8]) -> Result<Option<Vec<u8>>, CompareError> {
        let (kind, body) = message::kind_of(data)?;
        match (mem::replace(&mut self.phase, Phase::Spent), kind) {
            (Phase::Fresh, message::KIND_BEGIN) => self.accept_begin(body).map(Some),
            (Phase::AwaitReply { a2, a3 }, message::KIND_REPLY) => {
                self.accept_reply(&a2, &a3, body).map(Some)
            }
            (
                Phase::AwaitExchange {
                    b3,
                    g3a,
                    g2,
                    g3,
                    pb,
                    qb,
                },
                message::KIND_EXCHANGE,
            ) => self.accept_exchange(&b3, &g3a, &g2, &g3, &pb, &qb, body).map(Some),
            (
                Phase::AwaitVerdict {
                    a3,
                    g3b,
                    qa_minus_qb,
                    pa_minus_pb,
                },
                message::KIND_VERDICT,
            ) => {
                self.accept_verdict(&a3, &g3b, &qa_minus_qb, &pa_minus_pb, body)?;
                Ok(None)
            }
            _ => Err(CompareError::protocol("out-of-order comparison message")),
        }
    }

    /// Responder: check the initiator's shares, contribute our own, and
    /// send the blinded secret pair.
    fn accept_begin(&mut self, body: &[u8]) -> Result<Vec<u8>, CompareError> {
        let opening = BeginMessage::decode(body)?;
        if !opening.g2a_proof.verify(TAG_G2A, &opening.g2a)
            || !opening.g3a_proof.verify(TAG_G3A, &opening.g3a)
        {
            return Err(CompareError::protocol("share proof verification failed"));
        }

        let b2 = random_scalar();
        let b3 = random_scalar();
        let g2b = base_mul(&b2);
        let g3b = base_mul(&b3);
        // Shared bases known to both sides only in exponent-combined form.
        let g2 = b2 * opening.g2a;
        let g3 = b3 * opening.g3a;

        let blinding = random_scalar();
        let pb = blinding * g3;
        let qb = base_mul(&blinding) + self.secret * g2;

        let reply = ReplyMessage {
            g2b,
            g2b_proof: DlogProof::prove(TAG_G2B, &b2),
            g3b,
            g3b_proof: DlogProof::prove(TAG_G3B, &b3),
            pb,
            qb,
            pq_proof: CoordsProof::prove(TAG_PQ_B, &g2, &g3, &blinding, &self.secret),
        };
        self.phase = Phase::AwaitExchange {
            b3,
            g3a: opening.g3a,
            g2,
            g3,
            pb,
            qb,
        };
        debug!("comparison joined as responder");
        Ok(reply.encode())
    }

    /// Initiator: check the responder's shares and blinded pair, send
    /// our own pair plus our half of the verdict.
    fn accept_reply(
        &mut self,
        a2: &Scalar,
        a3: &Scalar,
        body: &[u8],
    ) -> Result<Vec<u8>, CompareError> {
        let reply = ReplyMessage::decode(body)?;
        if !reply.g2b_proof.verify(TAG_G2B, &reply.g2b)
            || !reply.g3b_proof.verify(TAG_G3B, &reply.g3b)
        {
            return Err(CompareError::protocol("share proof verification failed"));
        }
        let g2 = a2 * reply.g2b;
        let g3 = a3 * reply.g3b;
        if !reply.pq_proof.verify(TAG_PQ_B, &g2, &g3, &reply.pb, &reply.qb) {
            return Err(CompareError::protocol(
                "blinded pair proof verification failed",
            ));
        }

        let blinding = random_scalar();
        let pa = blinding * g3;
        let qa = base_mul(&blinding) + self.secret * g2;
        let qa_minus_qb = qa - reply.qb;
        let ra = a3 * qa_minus_qb;

        let exchange = ExchangeMessage {
            pa,
            qa,
            pq_proof: CoordsProof::prove(TAG_PQ_A, &g2, &g3, &blinding, &self.secret),
            ra,
            ra_proof: LogEqProof::prove(TAG_RA, a3, &qa_minus_qb),
        };
        self.phase = Phase::AwaitVerdict {
            a3: *a3,
            g3b: reply.g3b,
            qa_minus_qb,
            pa_minus_pb: pa - reply.pb,
        };
        Ok(exchange.encode())
    }

    /// Responder: check the initiator's pair and verdict half, reach our
    /// verdict, and send the final message.
    #[allow(clippy::too_many_arguments)]
    fn accept_exchange(
        &mut self,
        b3: &Scalar,
        g3a: &RistrettoPoint,
        g2: &RistrettoPoint,
        g3: &RistrettoPoint,
        pb: &RistrettoPoint,
        qb: &RistrettoPoint,
        body: &[u8],
    ) -> Result<Vec<u8>, CompareError> {
        let exchange = ExchangeMessage::decode(body)?;
        if !exchange
            .pq_proof
            .verify(TAG_PQ_A, g2, g3, &exchange.pa, &exchange.qa)
        {
            return Err(CompareError::protocol(
                "blinded pair proof verification failed",
            ));
        }
        let qa_minus_qb = exchange.qa - qb;
        if !exchange
            .ra_proof
            .verify(TAG_RA, g3a, &qa_minus_qb, &exchange.ra)
        {
            return Err(CompareError::protocol(
                "verdict proof verification failed",
            ));
        }

        let rb = b3 * qa_minus_qb;
        let verdict = VerdictMessage {
            rb,
            rb_proof: LogEqProof::prove(TAG_RB, b3, &qa_minus_qb),
        };
        let wire = verdict.encode();

        let matched = bool::from((b3 * exchange.ra).ct_eq(&(exchange.pa - pb)));
        self.finish(matched);
        Ok(wire)
    }

    /// Initiator: check the responder's verdict half and reach the same
    /// verdict. Produces no output.
    fn accept_verdict(
        &mut self,
        a3: &Scalar,
        g3b: &RistrettoPoint,
        qa_minus_qb: &RistrettoPoint,
        pa_minus_pb: &RistrettoPoint,
        body: &[u8],
    ) -> Result<(), CompareError> {
        let verdict = VerdictMessage::decode(body)?;
        if !verdict.rb_proof.verify(TAG_RB, g3b, qa_minus_qb, &verdict.rb) {
            return Err(CompareError::protocol(
                "verdict proof verification failed",
            ));
        }
        let matched = bool::from((a3 * verdict.rb).ct_eq(pa_minus_pb));
        self.finish(matched);
        Ok(())
    }

    fn finish(&mut self, matched: bool) {
        self.result = if matched {
            CompareResult::Match
        } else {
            CompareResult::NoMatch
        };
        self.scrub();
        debug!(result = %self.result, "comparison finished");
    }

    fn scrub(&mut self) {
        self.secret.zeroize();
        self.phase = Phase::Spent;
    }
}

impl Drop for Comparator {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

impl fmt::Debug for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Comparator")
            .field("secret", &"[REDACTED]")
            .field("result", &self.result)
            .finish_non_exhaustive()
    }
}
