//! Register a trustee and assign its stable share index

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::constants::{operations, SYSTEM_ACTOR};
use crate::context::AppContext;
use crate::state::{AuditEntry, Trustee, TrusteeStatus};
use crate::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterTrusteeRequest {
    pub name: String,
    pub email: String,
}

pub async fn register_trustee(ctx: &AppContext, request: RegisterTrusteeRequest) -> Result<Trustee> {
    // 1. Validate the application.
    if request.name.trim().is_empty() {
        return Err(Error::InvalidArgument("trustee name must not be empty".into()));
    }
    if !request.email.contains('@') {
        return Err(Error::InvalidArgument(format!(
            "`{}` is not a valid email address",
            request.email
        )));
    }

    let mut tx = ctx.store().begin().await?;

    // 2. Emails are unique; this operation is deliberately not idempotent.
    if tx.trustee_by_email(&request.email).await?.is_some() {
        return Err(Error::DuplicateTrustee(format!(
            "email {} is already registered",
            request.email
        )));
    }

    // 3. Assign the next free share index in [1, n].
    let index = tx.trustees().await?.len() as u32 + 1;
    let total = ctx.config().threshold_n;
    if index > total {
        return Err(Error::InvalidArgument(format!(
            "trustee roster is full: {total} trustees already registered"
        )));
    }

    let now = Utc::now();
    let trustee = Trustee {
        trustee_id: Uuid::new_v4(),
        name: request.name,
        email: request.email,
        index,
        status: TrusteeStatus::Active,
        share: None,
        created_at: now,
        updated_at: now,
    };

    tx.insert_trustee(&trustee).await?;
    tx.append_audit(&AuditEntry::success(
        None,
        operations::REGISTER_TRUSTEE,
        SYSTEM_ACTOR,
        json!({
            "trustee_id": trustee.trustee_id,
            "index": trustee.index,
        }),
    ))
    .await?;
    tx.commit().await?;

    info!(trustee_id = %trustee.trustee_id, index = trustee.index, "trustee registered");
    Ok(trustee)
}
