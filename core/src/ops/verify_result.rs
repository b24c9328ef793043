//! Independently re-verify a published result

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::context::AppContext;
use crate::digest;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyResultResponse {
    pub election_id: Uuid,
    pub is_valid: bool,
    pub recomputed_hash: String,
    pub stored_hash: String,
}

/// Recompute the verification digest over the stored tally and compare it
/// with the published hash. Read-only: any observer can do the same from
/// the published fields alone.
pub async fn verify_result(ctx: &AppContext, election_id: Uuid) -> Result<VerifyResultResponse> {
    let mut tx = ctx.store().begin().await?;
    let result = tx
        .result_by_election(election_id)
        .await?
        .ok_or_else(|| Error::not_found("result for election", election_id))?;

    let recomputed_hash = digest::result_digest(
        &result.election_id,
        &result.final_tally,
        result.total_votes,
        ctx.config().canonical_json_strict,
    )?;
    let is_valid = recomputed_hash == result.verification_hash;

    info!(election_id = %election_id, is_valid, "result verification completed");
    Ok(VerifyResultResponse {
        election_id,
        is_valid,
        recomputed_hash,
        stored_hash: result.verification_hash,
    })
}
