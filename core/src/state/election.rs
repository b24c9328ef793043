//! Election state

use chrono::{DateTime, Utc};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::paillier::PublicKey;
use crate::{Error, Result};

/// Election lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElectionStatus {
    /// Accepting ballots
    Active,
    /// A tally session is in flight
    Tallying,
    /// Result published
    Completed,
    /// Tallying hit a fatal cryptographic error
    Failed,
}

impl ElectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Tallying => "tallying",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(Self::Active),
            "tallying" => Ok(Self::Tallying),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(Error::InvalidArgument(format!(
                "unknown election status `{other}`"
            ))),
        }
    }
}

impl std::fmt::Display for ElectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ballot option with a stable zero-based index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub index: u32,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub party: Option<String>,
}

/// Public Paillier parameters attached to an election once key shares are
/// issued. The modulus is carried as a decimal string; g = n + 1 is implied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaillierParams {
    pub n: String,
    pub key_bits: u32,
}

impl PaillierParams {
    pub fn public_key(&self) -> Result<PublicKey> {
        let n: BigUint = self
            .n
            .parse()
            .map_err(|_| Error::InvalidArgument("stored modulus is not a decimal integer".into()))?;
        Ok(PublicKey::new(n))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Election {
    pub election_id: Uuid,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Ordered candidate list; index i matches position i of every ballot
    /// vector and of the decrypted tally.
    pub candidates: Vec<Candidate>,
    /// Set exactly once by key-share issuance, read-only afterwards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_params: Option<PaillierParams>,
    pub status: ElectionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Election {
    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }

    /// Public key, failing when shares have not been issued yet.
    pub fn public_key(&self) -> Result<PublicKey> {
        self.encryption_params
            .as_ref()
            .ok_or_else(|| {
                Error::invalid_state(self.status, "encryption keys have not been issued")
            })?
            .public_key()
    }
}

/// Vaulted private key material for an election.
///
/// Lives in its own table/column and is never returned by a read
/// operation; only the finalize path dereferences it, gated by a
/// reconstructed Shamir handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionKey {
    pub election_id: Uuid,
    pub material: String,
    pub created_at: DateTime<Utc>,
}
