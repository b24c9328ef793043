//! Vector ciphertext codec
//!
//! A ballot is a length-k vector with exactly one encrypted 1 and k-1
//! encrypted 0s. Aggregation is elementwise homomorphic addition; the
//! decrypted aggregate decodes to per-candidate counts.
//!
//! Two serialized forms exist:
//! - wire: base64 of the canonical JSON payload `{"ciphertexts": [...]}`
//!   with decimal digit strings, byte-identical for independently computed
//!   equal aggregates;
//! - binary: a length prefix followed by fixed-width big-endian words, used
//!   as the digest pre-image.
//!
//! Per-ciphertext randomness is never part of either form.

use base64::Engine as _;
use num_bigint::BigUint;
use num_traits::{One, ToPrimitive, Zero};
use rand::Rng;
use rayon::prelude::*;
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::crypto::paillier::PublicKey;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CiphertextVector {
    values: Vec<BigUint>,
}

impl CiphertextVector {
    pub fn new(values: Vec<BigUint>) -> Self {
        Self { values }
    }

    /// Elementwise identity: 1 is a valid encryption of 0 (r = 1).
    pub fn identity(len: usize) -> Self {
        Self {
            values: vec![BigUint::one(); len],
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[BigUint] {
        &self.values
    }

    /// Encrypt a one-hot vote for `choice` over `candidates` options.
    pub fn encode_one_hot<R: Rng + ?Sized>(
        public_key: &PublicKey,
        rng: &mut R,
        choice: usize,
        candidates: usize,
    ) -> Result<Self> {
        if choice >= candidates {
            return Err(Error::InvalidArgument(format!(
                "unknown candidate index {choice}, election has {candidates} candidates"
            )));
        }
        let one = BigUint::one();
        let zero = BigUint::zero();
        let values = (0..candidates)
            .map(|i| public_key.encrypt(rng, if i == choice { &one } else { &zero }))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { values })
    }

    /// Check length and Z*_{n^2} membership of every component.
    pub fn validate(&self, public_key: &PublicKey, candidates: usize) -> Result<()> {
        if self.values.len() != candidates {
            return Err(Error::InvalidArgument(format!(
                "ballot vector has {} components, election has {candidates} candidates",
                self.values.len()
            )));
        }
        for value in &self.values {
            if !public_key.contains_ciphertext(value) {
                return Err(Error::InvalidCiphertext(
                    "ballot component is not an element of Z*_{n^2}".into(),
                ));
            }
        }
        Ok(())
    }

    /// Elementwise homomorphic addition.
    pub fn add(&self, other: &Self, public_key: &PublicKey) -> Result<Self> {
        if self.values.len() != other.values.len() {
            return Err(Error::InvalidArgument(
                "cannot add ciphertext vectors of different lengths".into(),
            ));
        }
        let values = self
            .values
            .iter()
            .zip(&other.values)
            .map(|(a, b)| public_key.add(a, b))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { values })
    }

    /// Over-the-wire form: base64 of canonical JSON.
    pub fn to_wire(&self) -> String {
        let digits: Vec<String> = self.values.iter().map(|v| v.to_string()).collect();
        let payload = json!({ "ciphertexts": digits });
        base64::engine::general_purpose::STANDARD.encode(payload.to_string())
    }

    pub fn from_wire(encoded: &str) -> Result<Self> {
        let raw = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|_| Error::InvalidCiphertext("ciphertext vector is not valid base64".into()))?;
        let payload: serde_json::Value = serde_json::from_slice(&raw)
            .map_err(|_| Error::InvalidCiphertext("ciphertext vector is not valid JSON".into()))?;
        let digits = payload
            .get("ciphertexts")
            .and_then(|v| v.as_array())
            .ok_or_else(|| {
                Error::InvalidCiphertext("ciphertext vector payload has no `ciphertexts`".into())
            })?;
        let values = digits
            .iter()
            .map(|d| {
                d.as_str()
                    .and_then(|s| s.parse::<BigUint>().ok())
                    .ok_or_else(|| {
                        Error::InvalidCiphertext("ciphertext component is not a decimal string".into())
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { values })
    }

    /// Binary form: u32 big-endian length prefix, then each component as a
    /// big-endian word of width ceil(log2 n^2) / 8 bytes.
    pub fn to_bytes(&self, public_key: &PublicKey) -> Result<Vec<u8>> {
        let width = ((public_key.n_squared().bits() + 7) / 8) as usize;
        let mut out = Vec::with_capacity(4 + width * self.values.len());
        out.extend_from_slice(&(self.values.len() as u32).to_be_bytes());
        for value in &self.values {
            let bytes = value.to_bytes_be();
            if bytes.len() > width {
                return Err(Error::InvalidCiphertext(
                    "ciphertext component exceeds the modulus width".into(),
                ));
            }
            out.resize(out.len() + width - bytes.len(), 0);
            out.extend_from_slice(&bytes);
        }
        Ok(out)
    }

    /// hex(SHA-256(binary form)); the commitment partial-decryption proofs
    /// bind to.
    pub fn digest_hex(&self, public_key: &PublicKey) -> Result<String> {
        Ok(hex::encode(Sha256::digest(self.to_bytes(public_key)?)))
    }
}

/// Aggregate ballot vectors into one ciphertext vector.
///
/// Validation runs up front; the reduction itself is embarrassingly
/// parallel and fans out across the bounded worker pool.
pub fn aggregate(
    public_key: &PublicKey,
    workers: &rayon::ThreadPool,
    ballots: &[CiphertextVector],
    candidates: usize,
) -> Result<CiphertextVector> {
    if ballots.is_empty() {
        return Err(Error::InvalidArgument("no votes to aggregate".into()));
    }
    for ballot in ballots {
        ballot.validate(public_key, candidates)?;
    }

    let n_squared = public_key.n_squared().clone();
    let values = workers.install(|| {
        ballots
            .par_iter()
            .map(|b| b.values.clone())
            .reduce(
                || CiphertextVector::identity(candidates).values,
                |mut acc, next| {
                    for (a, b) in acc.iter_mut().zip(&next) {
                        *a = (&*a * b) % &n_squared;
                    }
                    acc
                },
            )
    });
    Ok(CiphertextVector { values })
}

/// Decode the decrypted aggregate into per-candidate counts.
///
/// Every count must lie in [0, total_ballots] and the counts must sum to
/// total_ballots; a mismatch is fatal to the session.
pub fn decode_tally(plaintexts: &[BigUint], total_ballots: u64) -> Result<Vec<u64>> {
    let mut counts = Vec::with_capacity(plaintexts.len());
    let mut sum: u128 = 0;
    for value in plaintexts {
        let count = value.to_u64().ok_or_else(|| {
            Error::TallyInconsistent("candidate count does not fit the ballot total".into())
        })?;
        if count > total_ballots {
            return Err(Error::TallyInconsistent(format!(
                "candidate count {count} exceeds ballot total {total_ballots}"
            )));
        }
        sum += u128::from(count);
        counts.push(count);
    }
    if sum != u128::from(total_ballots) {
        return Err(Error::TallyInconsistent(format!(
            "candidate counts sum to {sum}, expected {total_ballots}"
        )));
    }
    Ok(counts)
}
