//! Published election result

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Final per-candidate counts plus the digest observers recompute.
///
/// Invariant: the counts sum to `total_votes`, the number of ballots present
/// in the session's aggregate when combining started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElectionResult {
    pub result_id: Uuid,
    /// Unique per election.
    pub election_id: Uuid,
    pub final_tally: BTreeMap<String, u64>,
    pub total_votes: u64,
    /// hex(SHA-256(canonical JSON)); see [`crate::digest`].
    pub verification_hash: String,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
}
