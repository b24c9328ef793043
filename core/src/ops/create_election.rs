//! Register an election with an ordered candidate list

use std::collections::HashSet;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::constants::{operations, SYSTEM_ACTOR};
use crate::context::AppContext;
use crate::state::{AuditEntry, Candidate, Election, ElectionStatus};
use crate::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateElectionRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub candidates: Vec<CandidateSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateSpec {
    pub name: String,
    #[serde(default)]
    pub party: Option<String>,
}

pub async fn create_election(ctx: &AppContext, request: CreateElectionRequest) -> Result<Election> {
    // 1. Validate the candidate list.
    if request.title.trim().is_empty() {
        return Err(Error::InvalidArgument("election title must not be empty".into()));
    }
    if request.candidates.is_empty() {
        return Err(Error::InvalidArgument(
            "election requires at least one candidate".into(),
        ));
    }
    let mut seen = HashSet::new();
    for candidate in &request.candidates {
        if candidate.name.trim().is_empty() {
            return Err(Error::InvalidArgument("candidate name must not be empty".into()));
        }
        if !seen.insert(candidate.name.as_str()) {
            return Err(Error::InvalidArgument(format!(
                "duplicate candidate name `{}`",
                candidate.name
            )));
        }
    }

    // 2. Build the election; encryption parameters are attached later by
    //    key-share issuance.
    let now = Utc::now();
    let election = Election {
        election_id: Uuid::new_v4(),
        title: request.title,
        description: request.description,
        candidates: request
            .candidates
            .into_iter()
            .enumerate()
            .map(|(index, spec)| Candidate {
                index: index as u32,
                name: spec.name,
                party: spec.party,
            })
            .collect(),
        encryption_params: None,
        status: ElectionStatus::Active,
        created_at: now,
        updated_at: now,
    };

    // 3. Persist with its audit entry.
    let mut tx = ctx.store().begin().await?;
    tx.insert_election(&election).await?;
    tx.append_audit(&AuditEntry::success(
        Some(election.election_id),
        operations::CREATE_ELECTION,
        SYSTEM_ACTOR,
        json!({
            "title": election.title.clone(),
            "candidates": election.candidate_count(),
        }),
    ))
    .await?;
    tx.commit().await?;

    info!(election_id = %election.election_id, candidates = election.candidate_count(), "election created");
    Ok(election)
}
