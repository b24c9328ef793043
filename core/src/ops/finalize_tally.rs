//! Combine partial decryptions and publish the final tally
//!
//! Deterministically selects the t lowest-indexed partials, reconstructs
//! the key handle, dereferences it against the vault, decrypts the pinned
//! aggregate, and decodes per-candidate counts. Cryptographic invariant
//! violations transition the session (and election) to Failed inside the
//! same transaction that records the failure audit entry; transient errors
//! roll everything back and may be retried.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use crate::codec::{self, CiphertextVector};
use crate::constants::{operations, SYSTEM_ACTOR};
use crate::context::AppContext;
use crate::crypto::threshold;
use crate::digest;
use crate::state::{
    AuditEntry, Election, ElectionResult, ElectionStatus, SessionStatus, TallySession,
};
use crate::store::StoreTx;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizeTallyResponse {
    pub result_id: Uuid,
    pub final_tally: BTreeMap<String, u64>,
    pub total_votes: u64,
    pub verification_hash: String,
}

pub async fn finalize_tally(ctx: &AppContext, election_id: Uuid) -> Result<FinalizeTallyResponse> {
    let _guard = ctx.lock_election(election_id).await;
    let mut tx = ctx.store().begin().await?;

    let mut session = tx
        .session_by_election(election_id)
        .await?
        .ok_or_else(|| Error::not_found("tally session for election", election_id))?;

    // 1. Replay after success returns the stored result.
    if session.status == SessionStatus::Completed {
        let result = tx
            .result_by_election(election_id)
            .await?
            .ok_or_else(|| Error::Internal("completed session has no stored result".into()))?;
        return Ok(FinalizeTallyResponse {
            result_id: result.result_id,
            final_tally: result.final_tally,
            total_votes: result.total_votes,
            verification_hash: result.verification_hash,
        });
    }

    // 2. Failed is terminal.
    if session.status == SessionStatus::Failed {
        return Err(Error::invalid_state(
            session.status,
            "session already failed and cannot be finalized",
        ));
    }

    // 3. Threshold gate: finalize only from Decrypting with >= t partials.
    if session.status != SessionStatus::Decrypting || !session.threshold_met() {
        return Err(Error::InsufficientTrustees {
            completed: session.completed_trustees,
            required: session.required_trustees,
        });
    }

    let mut election = tx
        .election(election_id)
        .await?
        .ok_or_else(|| Error::not_found("election", election_id))?;
    session.transition(SessionStatus::Combining)?;

    // 4. The cryptographic pipeline; its failure mode decides the session's
    //    fate.
    match combine_and_decode(tx.as_mut(), &session, &election).await {
        Ok(final_tally) => {
            let verification_hash = digest::result_digest(
                &election_id,
                &final_tally,
                session.total_votes,
                ctx.config().canonical_json_strict,
            )?;
            let result = ElectionResult {
                result_id: Uuid::new_v4(),
                election_id,
                final_tally: final_tally.clone(),
                total_votes: session.total_votes,
                verification_hash: verification_hash.clone(),
                is_verified: true,
                created_at: Utc::now(),
            };
            tx.insert_result(&result).await?;

            session.transition(SessionStatus::Completed)?;
            tx.put_session(&session).await?;
            election.status = ElectionStatus::Completed;
            election.updated_at = Utc::now();
            tx.put_election(&election).await?;
            tx.mark_ballots_tallied(election_id).await?;

            tx.append_audit(&AuditEntry::success(
                Some(election_id),
                operations::FINALIZE_TALLY,
                SYSTEM_ACTOR,
                json!({
                    "final_tally": final_tally.clone(),
                    "total_votes": session.total_votes,
                    "verification_hash": verification_hash.clone(),
                }),
            ))
            .await?;
            tx.commit().await?;

            info!(
                election_id = %election_id,
                total_votes = session.total_votes,
                "tally finalized"
            );
            Ok(FinalizeTallyResponse {
                result_id: result.result_id,
                final_tally,
                total_votes: session.total_votes,
                verification_hash,
            })
        }
        Err(err) if err.is_fatal_to_session() => {
            error!(election_id = %election_id, error = %err, "tally combination failed, session is dead");
            session.fail(err.to_string())?;
            tx.put_session(&session).await?;
            election.status = ElectionStatus::Failed;
            election.updated_at = Utc::now();
            tx.put_election(&election).await?;
            tx.append_audit(&AuditEntry::failure(
                Some(election_id),
                operations::FINALIZE_TALLY,
                SYSTEM_ACTOR,
                json!({
                    "error_kind": err.kind(),
                    "error": err.to_string(),
                }),
            ))
            .await?;
            tx.commit().await?;
            Err(err)
        }
        // Transient failures leave no partial writes behind.
        Err(err) => Err(err),
    }
}

async fn combine_and_decode(
    tx: &mut dyn StoreTx,
    session: &TallySession,
    election: &Election,
) -> Result<BTreeMap<String, u64>> {
    let partials = tx.verified_partials(session.election_id).await?;
    let key = tx
        .election_key(session.election_id)
        .await?
        .ok_or_else(|| Error::Internal("election key material is missing from the vault".into()))?;

    let aggregate_wire = session
        .aggregate
        .as_deref()
        .ok_or_else(|| Error::Internal("session has no pinned aggregate".into()))?;
    let aggregate = CiphertextVector::from_wire(aggregate_wire)?;

    let selected = threshold::select_partials(&partials, session.required_trustees)?;
    for partial in &selected {
        threshold::check_partial_consistency(partial, &aggregate)?;
    }

    let plaintexts = threshold::combine(
        &selected,
        session.required_trustees,
        &key.material,
        &aggregate,
    )?;
    let counts = codec::decode_tally(&plaintexts, session.total_votes)?;
    if counts.len() != election.candidate_count() {
        return Err(Error::TallyInconsistent(format!(
            "decoded {} counts for {} candidates",
            counts.len(),
            election.candidate_count()
        )));
    }

    Ok(election
        .candidates
        .iter()
        .zip(counts)
        .map(|(candidate, count)| (candidate.name.clone(), count))
        .collect())
}
