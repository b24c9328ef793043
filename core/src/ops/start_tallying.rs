//! Start the tallying session for an election
//!
//! Reads every untallied ballot, aggregates homomorphically across the
//! worker pool, and pins the aggregate into a fresh session. A retry
//! against a live or completed session replays the original response;
//! only a failed session surfaces `SessionExists`, since `Failed` is
//! terminal and cannot be restarted.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::codec::{self, CiphertextVector};
use crate::constants::{operations, SYSTEM_ACTOR};
use crate::context::AppContext;
use crate::state::{AuditEntry, ElectionStatus, SessionStatus, TallySession};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartTallyResponse {
    pub session_id: Uuid,
    pub total_votes: u64,
    pub required_trustees: u32,
}

pub async fn start_tallying(ctx: &AppContext, election_id: Uuid) -> Result<StartTallyResponse> {
    let _guard = ctx.lock_election(election_id).await;
    let mut tx = ctx.store().begin().await?;

    let mut election = tx
        .election(election_id)
        .await?
        .ok_or_else(|| Error::not_found("election", election_id))?;

    // 1. Resolve retries against an existing session.
    if let Some(existing) = tx.session_by_election(election_id).await? {
        if existing.status == SessionStatus::Failed {
            return Err(Error::SessionExists(election_id));
        }
        return Ok(StartTallyResponse {
            session_id: existing.session_id,
            total_votes: existing.total_votes,
            required_trustees: existing.required_trustees,
        });
    }

    // 2. Only an active election can move into tallying.
    if election.status != ElectionStatus::Active {
        return Err(Error::invalid_state(
            election.status,
            "cannot start tallying for this election",
        ));
    }
    let public_key = election.public_key()?;

    // 3. Collect and deserialize every untallied ballot.
    let ballots = tx.untallied_ballots(election_id).await?;
    if ballots.is_empty() {
        return Err(Error::InvalidArgument("no votes to tally".into()));
    }
    let vectors = ballots
        .iter()
        .map(|b| CiphertextVector::from_wire(&b.ciphertexts))
        .collect::<Result<Vec<_>>>()?;

    // 4. Aggregate and pin. The ballot count taken here is the one the
    //    final consistency check and the published result both use.
    info!(election_id = %election_id, ballots = ballots.len(), "aggregating encrypted ballots");
    let aggregate = codec::aggregate(
        &public_key,
        ctx.workers(),
        &vectors,
        election.candidate_count(),
    )?;

    let mut session = TallySession::new(election_id, ctx.config().threshold_t);
    session.pin_aggregate(aggregate.to_wire(), ballots.len() as u64)?;

    // 5. Persist session, election status, and audit entry together.
    tx.insert_session(&session).await?;
    election.status = ElectionStatus::Tallying;
    election.updated_at = chrono::Utc::now();
    tx.put_election(&election).await?;
    tx.append_audit(&AuditEntry::success(
        Some(election_id),
        operations::START_TALLY,
        SYSTEM_ACTOR,
        json!({
            "session_id": session.session_id,
            "total_votes": session.total_votes,
        }),
    ))
    .await?;
    tx.commit().await?;

    info!(
        election_id = %election_id,
        session_id = %session.session_id,
        total_votes = session.total_votes,
        "tallying started"
    );
    Ok(StartTallyResponse {
        session_id: session.session_id,
        total_votes: session.total_votes,
        required_trustees: session.required_trustees,
    })
}
