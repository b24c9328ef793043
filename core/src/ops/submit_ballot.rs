//! Accept an encrypted ballot
//!
//! Voter identity is stripped before a ciphertext reaches this core; the
//! caller-supplied nonce is the only duplicate-submission handle. A replay
//! with identical content resolves idempotently, a nonce reused with
//! different content is surfaced as `DuplicateBallot`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::codec::CiphertextVector;
use crate::constants::{operations, SYSTEM_ACTOR};
use crate::context::AppContext;
use crate::state::{AuditEntry, ElectionStatus, EncryptedBallot};
use crate::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitBallotRequest {
    pub election_id: Uuid,
    /// Wire-encoded ciphertext vector, one component per candidate.
    pub ciphertexts: String,
    /// Opaque ballot-validity proof; stored verbatim, not enforced here.
    #[serde(default)]
    pub proof: Option<String>,
    pub nonce: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitBallotResponse {
    pub ballot_id: Uuid,
}

pub async fn submit_ballot(ctx: &AppContext, request: SubmitBallotRequest) -> Result<SubmitBallotResponse> {
    if request.nonce.trim().is_empty() {
        return Err(Error::InvalidArgument("ballot nonce must not be empty".into()));
    }

    let _guard = ctx.lock_election(request.election_id).await;
    let mut tx = ctx.store().begin().await?;

    let election = tx
        .election(request.election_id)
        .await?
        .ok_or_else(|| Error::not_found("election", request.election_id))?;
    let public_key = election.public_key()?;

    // 1. Re-encode into canonical wire form; garbage fails here.
    let vector = CiphertextVector::from_wire(&request.ciphertexts)?;
    let canonical = vector.to_wire();

    // 2. Resolve duplicates by nonce.
    if let Some(existing) = tx
        .ballot_by_nonce(request.election_id, &request.nonce)
        .await?
    {
        if existing.ciphertexts == canonical {
            debug!(ballot_id = %existing.ballot_id, "ballot replay resolved idempotently");
            return Ok(SubmitBallotResponse {
                ballot_id: existing.ballot_id,
            });
        }
        return Err(Error::DuplicateBallot(format!(
            "nonce {} was already used with different ballot content",
            request.nonce
        )));
    }

    // 3. Fresh submissions require an election that still accepts ballots.
    if election.status != ElectionStatus::Active {
        return Err(Error::invalid_state(
            election.status,
            "election is not accepting ballots",
        ));
    }
    vector.validate(&public_key, election.candidate_count())?;

    // 4. Persist ballot and audit entry together.
    let ballot = EncryptedBallot {
        ballot_id: Uuid::new_v4(),
        election_id: request.election_id,
        ciphertexts: canonical,
        proof: request.proof,
        nonce: request.nonce,
        tallied: false,
        submitted_at: Utc::now(),
    };
    tx.insert_ballot(&ballot).await?;
    tx.append_audit(&AuditEntry::success(
        Some(request.election_id),
        operations::SUBMIT_BALLOT,
        SYSTEM_ACTOR,
        json!({
            "ballot_id": ballot.ballot_id,
            "nonce": ballot.nonce.clone(),
        }),
    ))
    .await?;
    tx.commit().await?;

    info!(election_id = %request.election_id, ballot_id = %ballot.ballot_id, "ballot accepted");
    Ok(SubmitBallotResponse {
        ballot_id: ballot.ballot_id,
    })
}
