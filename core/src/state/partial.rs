//! Partial decryption state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One trustee's contribution toward decrypting the pinned aggregate.
///
/// At most one record per (election, trustee) pair; violating inserts are
/// rejected with `DuplicateTrustee`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialDecryption {
    pub decryption_id: Uuid,
    pub election_id: Uuid,
    pub trustee_id: Uuid,
    /// Shamir x coordinate, copied from the trustee record at decrypt time.
    pub trustee_index: u32,
    /// Shamir y coordinate as a decimal string.
    pub share_value: String,
    /// k-element partial value vector: the aggregate residues this trustee
    /// observed, cross-checked against the pinned aggregate at combine time.
    pub partial_values: Vec<String>,
    /// Opaque decryption commitment, kept as an audit artifact.
    pub proof: String,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
}
