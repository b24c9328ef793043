//! Read an election's audit trail

use uuid::Uuid;

use crate::context::AppContext;
use crate::state::AuditEntry;
use crate::{Error, Result};

/// Audit entries for an election, newest first. The log is the
/// authoritative event history external observers consume.
pub async fn audit_trail(
    ctx: &AppContext,
    election_id: Uuid,
    offset: u64,
    limit: u64,
) -> Result<Vec<AuditEntry>> {
    let mut tx = ctx.store().begin().await?;
    if tx.election(election_id).await?.is_none() {
        return Err(Error::not_found("election", election_id));
    }
    tx.audit_entries(election_id, offset, limit).await
}
