//! Generate the election keypair and issue Shamir shares to trustees
//!
//! The public parameters land on the election, the private key material in
//! the vault, and each trustee receives the share whose x coordinate is its
//! own index. What the shares split is the SHA-256 handle of the key
//! material, not the raw key integers.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::constants::{operations, SYSTEM_ACTOR};
use crate::context::AppContext;
use crate::crypto::{paillier::Keypair, shamir};
use crate::state::{AuditEntry, ElectionKey, ElectionStatus, PaillierParams};
use crate::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueKeySharesResponse {
    pub election_id: Uuid,
    pub public_key: PaillierParams,
    /// trustee id -> share id (the trustee's share index).
    pub shares: BTreeMap<Uuid, u32>,
}

pub async fn issue_key_shares(ctx: &AppContext, election_id: Uuid) -> Result<IssueKeySharesResponse> {
    let _guard = ctx.lock_election(election_id).await;
    let mut tx = ctx.store().begin().await?;

    let mut election = tx
        .election(election_id)
        .await?
        .ok_or_else(|| Error::not_found("election", election_id))?;
    let trustees = tx.trustees().await?;

    // 1. Idempotent replay: keys were already issued.
    if let Some(params) = election.encryption_params.clone() {
        let shares = trustees
            .iter()
            .filter(|t| t.has_share())
            .map(|t| (t.trustee_id, t.index))
            .collect();
        return Ok(IssueKeySharesResponse {
            election_id,
            public_key: params,
            shares,
        });
    }

    // 2. Keys can only be issued while the election still accepts ballots.
    if election.status != ElectionStatus::Active {
        return Err(Error::invalid_state(
            election.status,
            "encryption keys can only be issued for an active election",
        ));
    }

    // 3. The full roster must be registered: share x coordinates are
    //    trustee indices 1..=n.
    let threshold = ctx.config().threshold_t;
    let total = ctx.config().threshold_n;
    if trustees.len() as u32 != total {
        return Err(Error::InvalidArgument(format!(
            "key shares require exactly {total} registered trustees, found {}",
            trustees.len()
        )));
    }

    // 4. Generate the keypair and split the handle of its material.
    let key_bits = ctx.config().paillier_key_bits;
    info!(election_id = %election_id, key_bits, "generating election keypair");
    // The rng stays inside this block so the future remains Send.
    let (keypair, material, shares) = {
        let mut rng = rand::thread_rng();
        let keypair = Keypair::generate(&mut rng, key_bits)?;
        let material = keypair.private.to_material();
        let shares = shamir::split(&mut rng, material.as_bytes(), threshold, total)?;
        (keypair, material, shares)
    };

    // 5. Hand each trustee the share matching its index.
    let now = Utc::now();
    let mut assignments = BTreeMap::new();
    for mut trustee in trustees {
        let share = shares
            .iter()
            .find(|s| s.index == trustee.index)
            .ok_or_else(|| {
                Error::Internal(format!("no share generated for index {}", trustee.index))
            })?;
        trustee.share = Some(share.encode());
        trustee.updated_at = now;
        assignments.insert(trustee.trustee_id, share.index);
        tx.put_trustee(&trustee).await?;
    }

    // 6. Pin the public parameters and vault the private material.
    let params = PaillierParams {
        n: keypair.public.n().to_string(),
        key_bits: key_bits as u32,
    };
    election.encryption_params = Some(params.clone());
    election.updated_at = now;
    tx.put_election(&election).await?;
    tx.put_election_key(&ElectionKey {
        election_id,
        material,
        created_at: now,
    })
    .await?;

    tx.append_audit(&AuditEntry::success(
        Some(election_id),
        operations::ISSUE_KEY_SHARES,
        SYSTEM_ACTOR,
        json!({
            "key_bits": key_bits,
            "threshold": threshold,
            "total_trustees": total,
        }),
    ))
    .await?;
    tx.commit().await?;

    info!(election_id = %election_id, trustees = assignments.len(), "key shares issued");
    Ok(IssueKeySharesResponse {
        election_id,
        public_key: params,
        shares: assignments,
    })
}
