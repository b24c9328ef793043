//! Encrypted ballot state
//!
//! Voter identity is stripped before a ciphertext reaches this core; the
//! nonce is the only submission-level uniqueness handle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptedBallot {
    pub ballot_id: Uuid,
    pub election_id: Uuid,
    /// Wire-encoded ciphertext vector (one Paillier ciphertext per
    /// candidate), see [`crate::codec`].
    pub ciphertexts: String,
    /// Opaque ballot-validity proof blob, stored and echoed verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<String>,
    /// Unique per election; duplicate submissions are resolved by nonce.
    pub nonce: String,
    /// Set when a session that observed this ballot reached Completed.
    /// A tallied ballot is immutable.
    pub tallied: bool,
    pub submitted_at: DateTime<Utc>,
}
