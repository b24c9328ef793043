//! Record a trustee's partial decryption
//!
//! The trustee's Shamir share is dereferenced and checked structurally, the
//! pinned aggregate is echoed into the partial record, and the session's
//! completed-trustee counter moves atomically with the insert. A replay by
//! the same trustee returns the original decryption id without touching
//! the counter or the audit log.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::codec::CiphertextVector;
use crate::constants::operations;
use crate::context::AppContext;
use crate::crypto::{shamir, threshold};
use crate::state::{AuditEntry, PartialDecryption, SessionStatus};
use crate::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialDecryptRequest {
    pub election_id: Uuid,
    pub trustee_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialDecryptResponse {
    pub decryption_id: Uuid,
    pub completed_trustees: u32,
    pub required_trustees: u32,
    pub can_finalize: bool,
}

pub async fn partial_decrypt(
    ctx: &AppContext,
    request: PartialDecryptRequest,
) -> Result<PartialDecryptResponse> {
    let _guard = ctx.lock_election(request.election_id).await;
    let mut tx = ctx.store().begin().await?;

    let mut session = tx
        .session_by_election(request.election_id)
        .await?
        .ok_or_else(|| Error::not_found("tally session for election", request.election_id))?;

    // 1. Replay: this trustee already contributed.
    if let Some(existing) = tx
        .partial_by_trustee(request.election_id, request.trustee_id)
        .await?
    {
        debug!(decryption_id = %existing.decryption_id, "partial decryption replay resolved idempotently");
        return Ok(PartialDecryptResponse {
            decryption_id: existing.decryption_id,
            completed_trustees: session.completed_trustees,
            required_trustees: session.required_trustees,
            can_finalize: session.threshold_met(),
        });
    }

    // 2. Partials are only accepted between aggregation and combination.
    if !session.status.accepts_partials() {
        return Err(Error::invalid_state(
            session.status,
            "partial decryption is not accepted in this state",
        ));
    }

    // 3. The trustee must be active and hold a structurally valid share.
    let trustee = tx
        .trustee(request.trustee_id)
        .await?
        .ok_or_else(|| Error::NotAuthorized("trustee is not registered".into()))?;
    if !trustee.is_active() {
        return Err(Error::NotAuthorized("trustee is inactive".into()));
    }
    let share_payload = trustee
        .share
        .as_deref()
        .ok_or_else(|| Error::NotAuthorized("trustee holds no key share".into()))?;
    let share = shamir::Share::decode(share_payload)?;
    if !shamir::verify(&share, session.required_trustees, ctx.config().threshold_n)
        || share.index != trustee.index
    {
        return Err(Error::InvalidArgument(
            "trustee share does not match the configured sharing parameters".into(),
        ));
    }

    // 4. Compute the partial against the pinned aggregate.
    let aggregate_wire = session.aggregate.clone().ok_or_else(|| {
        Error::invalid_state(session.status, "session has no pinned aggregate")
    })?;
    let aggregate = CiphertextVector::from_wire(&aggregate_wire)?;
    let election = tx
        .election(request.election_id)
        .await?
        .ok_or_else(|| Error::not_found("election", request.election_id))?;
    let ciphertext_digest = aggregate.digest_hex(&election.public_key()?)?;

    let now = Utc::now();
    let partial = PartialDecryption {
        decryption_id: Uuid::new_v4(),
        election_id: request.election_id,
        trustee_id: request.trustee_id,
        trustee_index: trustee.index,
        share_value: share.value.to_string(),
        partial_values: aggregate.values().iter().map(|v| v.to_string()).collect(),
        proof: threshold::decryption_proof(&request.trustee_id, &ciphertext_digest, now),
        verified: true,
        created_at: now,
    };

    // 5. Insert the partial and bump the counter in the same transaction;
    //    the first partial moves the session into Decrypting.
    tx.insert_partial(&partial).await?;
    session.completed_trustees += 1;
    if session.status == SessionStatus::Aggregating {
        session.transition(SessionStatus::Decrypting)?;
    }
    tx.put_session(&session).await?;
    tx.append_audit(&AuditEntry::success(
        Some(request.election_id),
        operations::PARTIAL_DECRYPT,
        request.trustee_id.to_string(),
        json!({
            "session_id": session.session_id,
            "trustee_count": session.completed_trustees,
        }),
    ))
    .await?;
    tx.commit().await?;

    info!(
        election_id = %request.election_id,
        trustee_id = %request.trustee_id,
        completed = session.completed_trustees,
        required = session.required_trustees,
        "partial decryption recorded"
    );
    Ok(PartialDecryptResponse {
        decryption_id: partial.decryption_id,
        completed_trustees: session.completed_trustees,
        required_trustees: session.required_trustees,
        can_finalize: session.threshold_met(),
    })
}
