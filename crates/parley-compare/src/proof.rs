//! Schnorr-style zero-knowledge proofs over Ristretto.
//!
//! Every value a comparison message carries comes with a proof that the
//! sender knows the exponent behind it. Challenges are derived by
//! hashing the commitment points under a per-slot domain tag, so a proof
//! lifted from one message slot never verifies in another.

use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use rand::RngCore;
use sha2::{Digest, Sha512};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

/// Multiply the group generator by a scalar.
pub(crate) fn base_mul(scalar: &Scalar) -> RistrettoPoint {
    RISTRETTO_BASEPOINT_POINT * scalar
}

/// Uniform scalar from the system RNG.
pub(crate) fn random_scalar() -> Scalar {
    let mut wide = [0u8; 64];
    rand::rngs::OsRng.fill_bytes(&mut wide);
    let scalar = Scalar::from_bytes_mod_order_wide(&wide);
    wide.zeroize();
    scalar
}

/// Challenge scalar: SHA-512 over a domain tag and the commitment
/// points, reduced modulo the group order.
pub(crate) fn challenge(tag: u8, points: &[RistrettoPoint]) -> Scalar {
    let mut hasher = Sha512::new();
    hasher.update(b"parley-compare-proof-v1");
    hasher.update([tag]);
    for point in points {
        hasher.update(point.compress().as_bytes());
    }
    Scalar::from_bytes_mod_order_wide(&hasher.finalize().into())
}

/// Proof of knowledge of `x` in `X = x * G`.
#[derive(Clone, Copy)]
pub(crate) struct DlogProof {
    pub c: Scalar,
    pub d: Scalar,
}

impl DlogProof {
    pub fn prove(tag: u8, exponent: &Scalar) -> Self {
        let r = random_scalar();
        let c = challenge(tag, &[base_mul(&r)]);
        let d = r - exponent * c;
        Self { c, d }
    }

    pub fn verify(&self, tag: u8, public: &RistrettoPoint) -> bool {
        let commitment = base_mul(&self.d) + self.c * public;
        bool::from(self.c.ct_eq(&challenge(tag, &[commitment])))
    }
}

/// Proof of knowledge of `r` and `y` in `P = r * G3`, `Q = r * G + y * G2`.
#[derive(Clone, Copy)]
pub(crate) struct CoordsProof {
    pub c: Scalar,
    pub d1: Scalar,
    pub d2: Scalar,
}

impl CoordsProof {
    pub fn prove(
        tag: u8,
        g2: &RistrettoPoint,
        g3: &RistrettoPoint,
        blinding: &Scalar,
        secret: &Scalar,
    ) -> Self {
        let r1 = random_scalar();
        let r2 = random_scalar();
        let c = challenge(tag, &[r1 * g3, base_mul(&r1) + r2 * g2]);
        let d1 = r1 - blinding * c;
        let d2 = r2 - secret * c;
        Self { c, d1, d2 }
    }

    pub fn verify(
        &self,
        tag: u8,
        g2: &RistrettoPoint,
        g3: &RistrettoPoint,
        p: &RistrettoPoint,
        q: &RistrettoPoint,
    ) -> bool {
        let t1 = self.d1 * g3 + self.c * p;
        let t2 = base_mul(&self.d1) + self.d2 * g2 + self.c * q;
        bool::from(self.c.ct_eq(&challenge(tag, &[t1, t2])))
    }
}

/// Proof that `R = x * B` for the same `x` behind `X = x * G`.
#[derive(Clone, Copy)]
pub(crate) struct LogEqProof {
    pub c: Scalar,
    pub d: Scalar,
}

impl LogEqProof {
    pub fn prove(tag: u8, exponent: &Scalar, base: &RistrettoPoint) -> Self {
        let r = random_scalar();
        let c = challenge(tag, &[base_mul(&r), r * base]);
        let d = r - exponent * c;
        Self { c, d }
    }

    pub fn verify(
        &self,
        tag: u8,
        public: &RistrettoPoint,
        base: &RistrettoPoint,
        result: &RistrettoPoint,
    ) -> bool {
        let t1 = base_mul(&self.d) + self.c * public;
        let t2 = self.d * base + self.c * result;
        bool::from(self.c.ct_eq(&challenge(tag, &[t1, t2])))
    }
}
