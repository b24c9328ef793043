//! Read tally session progress

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::AppContext;
use crate::state::SessionStatus;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TallyStatusResponse {
    pub session_id: Uuid,
    pub election_id: Uuid,
    pub status: SessionStatus,
    pub total_votes: u64,
    pub required_trustees: u32,
    pub completed_trustees: u32,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

pub async fn tally_status(ctx: &AppContext, election_id: Uuid) -> Result<TallyStatusResponse> {
    let mut tx = ctx.store().begin().await?;
    let session = tx
        .session_by_election(election_id)
        .await?
        .ok_or_else(|| Error::not_found("tally session for election", election_id))?;

    Ok(TallyStatusResponse {
        session_id: session.session_id,
        election_id: session.election_id,
        status: session.status,
        total_votes: session.total_votes,
        required_trustees: session.required_trustees,
        completed_trustees: session.completed_trustees,
        started_at: session.started_at,
        completed_at: session.completed_at,
        error_message: session.error_message,
    })
}
