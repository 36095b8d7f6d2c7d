//! Comparison message wire format.
//!
//! A message is a one-byte kind followed by a fixed run of 32-byte
//! chunks, each a compressed Ristretto point or a canonical scalar.
//! Anything that fails to decompress or is non-canonical is rejected
//! before the protocol looks at it.

use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::Identity;

use crate::error::CompareError;
use crate::proof::{CoordsProof, DlogProof, LogEqProof};

pub(crate) const KIND_BEGIN: u8 = 1;
pub(crate) const KIND_REPLY: u8 = 2;
pub(crate) const KIND_EXCHANGE: u8 = 3;
pub(crate) const KIND_VERDICT: u8 = 4;

const CHUNK: usize = 32;

/// Initiator's opening shares.
pub(crate) struct BeginMessage {
    pub g2a: RistrettoPoint,
    pub g2a_proof: DlogProof,
    pub g3a: RistrettoPoint,
    pub g3a_proof: DlogProof,
}

/// Responder's shares plus its blinded secret pair.
pub(crate) struct ReplyMessage {
    pub g2b: RistrettoPoint,
    pub g2b_proof: DlogProof,
    pub g3b: RistrettoPoint,
    pub g3b_proof: DlogProof,
    pub pb: RistrettoPoint,
    pub qb: RistrettoPoint,
    pub pq_proof: CoordsProof,
}

/// Initiator's blinded secret pair plus its half of the verdict.
pub(crate) struct ExchangeMessage {
    pub pa: RistrettoPoint,
    pub qa: RistrettoPoint,
    pub pq_proof: CoordsProof,
    pub ra: RistrettoPoint,
    pub ra_proof: LogEqProof,
}

/// Responder's half of the verdict.
pub(crate) struct VerdictMessage {
    pub rb: RistrettoPoint,
    pub rb_proof: LogEqProof,
}

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn new(kind: u8, chunks: usize) -> Self {
        let mut buf = Vec::with_capacity(1 + chunks * CHUNK);
        buf.push(kind);
        Self { buf }
    }

    fn point(&mut self, point: &RistrettoPoint) -> &mut Self {
        self.buf.extend_from_slice(point.compress().as_bytes());
        self
    }

    fn scalar(&mut self, scalar: &Scalar) -> &mut Self {
        self.buf.extend_from_slice(scalar.as_bytes());
        self
    }
}

struct Reader<'a> {
    data: &'a [u8],
}

impl Reader<'_> {
    fn chunk(&mut self) -> Result<[u8; CHUNK], CompareError> {
        if self.data.len() < CHUNK {
            return Err(CompareError::protocol("truncated comparison message"));
        }
        let mut chunk = [0u8; CHUNK];
        chunk.copy_from_slice(&self.data[..CHUNK]);
        self.data = &self.data[CHUNK..];
        Ok(chunk)
    }

    /// A group element; the identity is never a legitimate share.
    fn point(&mut self) -> Result<RistrettoPoint, CompareError> {
        let point = CompressedRistretto(self.chunk()?)
            .decompress()
            .ok_or_else(|| CompareError::protocol("invalid group element"))?;
        if point == RistrettoPoint::identity() {
            return Err(CompareError::protocol("identity group element"));
        }
        Ok(point)
    }

    fn scalar(&mut self) -> Result<Scalar, CompareError> {
        Option::<Scalar>::from(Scalar::from_canonical_bytes(self.chunk()?))
            .ok_or_else(|| CompareError::protocol("non-canonical scalar"))
    }

    fn finish(&self) -> Result<(), CompareError> {
        if self.data.is_empty() {
            Ok(())
        } else {
            Err(CompareError::protocol("trailing bytes in comparison message"))
        }
    }
}

/// Split a raw message into its kind byte and body.
pub(crate) fn kind_of(data: &[u8]) -> Result<(u8, &[u8]), CompareError> {
    match data.split_first() {
        Some((&(kind @ KIND_BEGIN..=KIND_VERDICT), body)) => Ok((kind, body)),
        Some(_) => Err(CompareError::protocol("unknown comparison message kind")),
        None => Err(CompareError::protocol("empty comparison message")),
    }
}

impl BeginMessage {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new(KIND_BEGIN, 6);
        w.point(&self.g2a)
            .scalar(&self.g2a_proof.c)
            .scalar(&self.g2a_proof.d)
            .point(&self.g3a)
            .scalar(&self.g3a_proof.c)
            .scalar(&self.g3a_proof.d);
        w.buf
    }

    pub fn decode(body: &[u8]) -> Result<Self, CompareError> {
        let mut r = Reader { data: body };
        let message = Self {
            g2a: r.point()?,
            g2a_proof: DlogProof {
                c: r.scalar()?,
                d: r.scalar()?,
            },
            g3a: r.point()?,
            g3a_proof: DlogProof {
                c: r.scalar()?,
                d: r.scalar()?,
            },
        };
        r.finish()?;
        Ok(message)
    }
}

impl ReplyMessage {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new(KIND_REPLY, 11);
        w.point(&self.g2b)
            .scalar(&self.g2b_proof.c)
            .scalar(&self.g2b_proof.d)
            .point(&self.g3b)
            .scalar(&self.g3b_proof.c)
            .scalar(&self.g3b_proof.d)
            .point(&self.pb)
            .point(&self.qb)
            .scalar(&self.pq_proof.c)
            .scalar(&self.pq_proof.d1)
            .scalar(&self.pq_proof.d2);
        w.buf
    }

    pub fn decode(body: &[u8]) -> Result<Self, CompareError> {
        let mut r = Reader { data: body };
        let message = Self {
            g2b: r.point()?,
            g2b_proof: DlogProof {
                c: r.scalar()?,
                d: r.scalar()?,
            },
            g3b: r.point()?,
            g3b_proof: DlogProof {
                c: r.scalar()?,
                d: r.scalar()?,
            },
            pb: r.point()?,
            qb: r.point()?,
            pq_proof: CoordsProof {
                c: r.scalar()?,
                d1: r.scalar()?,
                d2: r.scalar()?,
            },
        };
        r.finish()?;
        Ok(message)
    }
}

impl ExchangeMessage {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new(KIND_EXCHANGE, 8);
        w.point(&self.pa)
            .point(&self.qa)
            .scalar(&self.pq_proof.c)
            .scalar(&self.pq_proof.d1)
            .scalar(&self.pq_proof.d2)
            .point(&self.ra)
            .scalar(&self.ra_proof.c)
            .scalar(&self.ra_proof.d);
        w.buf
    }

    pub fn decode(body: &[u8]) -> Result<Self, CompareError> {
        let mut r = Reader { data: body };
        let message = Self {
            pa: r.point()?,
            qa: r.point()?,
            pq_proof: CoordsProof {
                c: r.scalar()?,
                d1: r.scalar()?,
                d2: r.scalar()?,
            },
            ra: r.point()?,
            ra_proof: LogEqProof {
                c: r.scalar()?,
                d: r.scalar()?,
            },
        };
        r.finish()?;
        Ok(message)
    }
}

impl VerdictMessage {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new(KIND_VERDICT, 3);
        w.point(&self.rb)
            .scalar(&self.rb_proof.c)
            .scalar(&self.rb_proof.d);
        w.buf
    }

    pub fn decode(body: &[u8]) -> Result<Self, CompareError> {
        let mut r = Reader { data: body };
        let message = Self {
            rb: r.point()?,
            rb_proof: LogEqProof {
                c: r.scalar()?,
                d: r.scalar()?,
            },
        };
        r.finish()?;
        Ok(message)
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::proof::{base_mul, random_scalar};

    fn sample_begin() -> BeginMessage {
        let a2 = random_scalar();
        let a3 = random_scalar();
        BeginMessage {
            g2a: base_mul(&a2),
            g2a_proof: DlogProof::prove(1, &a2),
            g3a: base_mul(&a3),
            g3a_proof: DlogProof::prove(2, &a3),
        }
    }

    #[test]
    fn begin_roundtrip() {
        let message = sample_begin();
        let wire = message.encode();
        assert_eq!(wire.len(), 1 + 6 * 32);
        assert_eq!(wire[0], KIND_BEGIN);

        let (kind, body) = kind_of(&wire).unwrap();
        assert_eq!(kind, KIND_BEGIN);
        let decoded = BeginMessage::decode(body).unwrap();
        assert_eq!(decoded.g2a, message.g2a);
        assert_eq!(decoded.g3a, message.g3a);
        assert!(decoded.g2a_proof.verify(1, &decoded.g2a));
        assert!(decoded.g3a_proof.verify(2, &decoded.g3a));
    }

    #[test]
    fn verdict_roundtrip() {
        let b3 = random_scalar();
        let base = base_mul(&random_scalar());
        let message = VerdictMessage {
            rb: b3 * base,
            rb_proof: LogEqProof::prove(8, &b3, &base),
        };
        let wire = message.encode();
        assert_eq!(wire.len(), 1 + 3 * 32);

        let (kind, body) = kind_of(&wire).unwrap();
        assert_eq!(kind, KIND_VERDICT);
        let decoded = VerdictMessage::decode(body).unwrap();
        assert_eq!(decoded.rb, message.rb);
    }

    #[test]
    fn truncated_message_is_rejected() {
        let wire = sample_begin().encode();
        let (_, body) = kind_of(&wire[..wire.len() - 1]).unwrap();
        assert!(matches!(
            BeginMessage::decode(body),
            Err(CompareError::Protocol(_))
        ));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut wire = sample_begin().encode();
        wire.push(0);
        let (_, body) = kind_of(&wire).unwrap();
        assert!(matches!(
            BeginMessage::decode(body),
            Err(CompareError::Protocol(_))
        ));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        assert!(matches!(
            kind_of(&[9, 0, 0]),
            Err(CompareError::Protocol(_))
        ));
        assert!(matches!(kind_of(&[]), Err(CompareError::Protocol(_))));
    }

    #[test]
    fn non_canonical_scalar_is_rejected() {
        let mut wire = sample_begin().encode();
        // Overwrite the first proof scalar with an over-the-order value.
        for byte in &mut wire[33..65] {
            *byte = 0xff;
        }
        let (_, body) = kind_of(&wire).unwrap();
        assert!(matches!(
            BeginMessage::decode(body),
            Err(CompareError::Protocol(_))
        ));
    }

    #[test]
    fn undecodable_point_is_rejected() {
        let mut wire = sample_begin().encode();
        // Compressed identity element in the first point slot.
        for byte in &mut wire[1..33] {
            *byte = 0;
        }
        let (_, body) = kind_of(&wire).unwrap();
        assert!(matches!(
            BeginMessage::decode(body),
            Err(CompareError::Protocol(_))
        ));
    }
}
