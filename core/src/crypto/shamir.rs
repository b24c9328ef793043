//! Shamir (t, n) secret sharing over a fixed 256-bit prime field
//!
//! Secrets are mapped into the field as SHA-256(secret) mod q, so a share
//! commits to the *handle* H(secret) and reconstruction yields that handle.
//! Downstream components dereference the handle against vaulted key
//! material; the raw private-key integers are never shared.

use base64::Engine as _;
use num_bigint::{BigInt, BigUint, RandBigInt};
use num_integer::Integer;
use num_traits::{One, Zero};
use rand::Rng;
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::constants::shamir_field_prime;
use crate::crypto::arith;
use crate::{Error, Result};

/// One trustee's share: the polynomial evaluated at x = trustee index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Share {
    pub index: u32,
    pub value: BigUint,
    pub threshold: u32,
    pub total: u32,
}

/// Map an arbitrary secret into Z_q via SHA-256.
pub fn hash_to_field(secret: &[u8]) -> BigUint {
    let digest = Sha256::digest(secret);
    BigUint::from_bytes_be(&digest) % shamir_field_prime()
}

/// Split a secret into `total` shares, any `threshold` of which reconstruct
/// H(secret). Coefficients a_1..a_{t-1} are sampled uniformly from Z_q.
pub fn split<R: Rng + ?Sized>(
    rng: &mut R,
    secret: &[u8],
    threshold: u32,
    total: u32,
) -> Result<Vec<Share>> {
    if threshold < 1 || threshold > total {
        return Err(Error::InvalidArgument(format!(
            "threshold must satisfy 1 <= t <= n, got t={threshold} n={total}"
        )));
    }
    let field = shamir_field_prime();
    let mut coefficients = vec![hash_to_field(secret)];
    for _ in 1..threshold {
        coefficients.push(rng.gen_biguint_below(&field));
    }

    let shares = (1..=total)
        .map(|i| Share {
            index: i,
            value: evaluate_poly(&coefficients, i, &field),
            threshold,
            total,
        })
        .collect();
    Ok(shares)
}

/// Reconstruct H(secret) by Lagrange interpolation at x = 0.
///
/// Requires at least `threshold` points with pairwise-distinct x
/// coordinates; fewer fail with `InsufficientShares`.
pub fn reconstruct(points: &[(u32, BigUint)], threshold: u32) -> Result<BigUint> {
    if points.len() < threshold as usize {
        return Err(Error::InsufficientShares {
            provided: points.len(),
            required: threshold as usize,
        });
    }
    for (i, (x, _)) in points.iter().enumerate() {
        if points[..i].iter().any(|(other, _)| other == x) {
            return Err(Error::InvalidArgument(format!(
                "duplicate share point at x = {x}"
            )));
        }
    }

    let field = shamir_field_prime();
    let field_int = BigInt::from(field.clone());
    let mut accumulator = BigInt::zero();

    for (i, (xi, yi)) in points.iter().enumerate() {
        let mut numerator = BigInt::one();
        let mut denominator = BigInt::one();
        for (j, (xj, _)) in points.iter().enumerate() {
            if i == j {
                continue;
            }
            numerator = (numerator * -BigInt::from(*xj)).mod_floor(&field_int);
            denominator =
                (denominator * (BigInt::from(*xi) - BigInt::from(*xj))).mod_floor(&field_int);
        }
        let denominator = denominator
            .to_biguint()
            .ok_or_else(|| Error::Internal("denominator normalization failed".into()))?;
        let inverse = arith::mod_inverse(&denominator, &field)?;
        let basis = (numerator * BigInt::from(inverse)).mod_floor(&field_int);
        accumulator = (accumulator + BigInt::from(yi.clone()) * basis).mod_floor(&field_int);
    }

    accumulator
        .to_biguint()
        .ok_or_else(|| Error::Internal("interpolation result normalization failed".into()))
}

/// Structural share check: x in [1, n], y in [0, q), parameters match.
///
/// Cryptographic verifiable secret sharing is out of scope; commitments are
/// opaque hashes of the share payload only.
pub fn verify(share: &Share, threshold: u32, total: u32) -> bool {
    share.index >= 1
        && share.index <= total
        && share.value < shamir_field_prime()
        && share.threshold == threshold
        && share.total == total
}

impl Share {
    /// Wire form issued to trustees: base64 of canonical JSON
    /// `{"share_id","threshold","total_trustees","x","y"}`.
    pub fn encode(&self) -> String {
        let payload = json!({
            "share_id": self.index,
            "x": self.index,
            "y": self.value.to_string(),
            "threshold": self.threshold,
            "total_trustees": self.total,
        });
        base64::engine::general_purpose::STANDARD.encode(payload.to_string())
    }

    pub fn decode(encoded: &str) -> Result<Self> {
        let raw = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|_| Error::InvalidArgument("share payload is not valid base64".into()))?;
        let payload: serde_json::Value = serde_json::from_slice(&raw)
            .map_err(|_| Error::InvalidArgument("share payload is not valid JSON".into()))?;

        let index = read_u32(&payload, "x")?;
        let threshold = read_u32(&payload, "threshold")?;
        let total = read_u32(&payload, "total_trustees")?;
        let value = payload
            .get("y")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<BigUint>().ok())
            .ok_or_else(|| Error::InvalidArgument("share payload is missing field `y`".into()))?;

        Ok(Self {
            index,
            value,
            threshold,
            total,
        })
    }
}

fn read_u32(payload: &serde_json::Value, key: &str) -> Result<u32> {
    payload
        .get(key)
        .and_then(|v| v.as_u64())
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| Error::InvalidArgument(format!("share payload is missing field `{key}`")))
}

fn evaluate_poly(coefficients: &[BigUint], x: u32, field: &BigUint) -> BigUint {
    let x = BigUint::from(x);
    let mut result = BigUint::zero();
    for coefficient in coefficients.iter().rev() {
        result = (result * &x + coefficient) % field;
    }
    result
}
