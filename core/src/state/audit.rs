//! Append-only audit log entries
//!
//! Every public mutating operation writes exactly one entry within the same
//! transaction as the state mutation it records, as does every terminal
//! Failed transition. Entries are immutable; reads are ordered by timestamp
//! descending.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }

    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            other => Err(crate::Error::InvalidArgument(format!(
                "unknown audit outcome `{other}`"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entry_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub election_id: Option<Uuid>,
    /// Operation name, see [`crate::constants::operations`].
    pub operation: String,
    /// Trustee UUID or the system actor.
    pub actor: String,
    pub details: serde_json::Value,
    pub outcome: AuditOutcome,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub fn success(
        election_id: Option<Uuid>,
        operation: &str,
        actor: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self::record(election_id, operation, actor, details, AuditOutcome::Success)
    }

    pub fn failure(
        election_id: Option<Uuid>,
        operation: &str,
        actor: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self::record(election_id, operation, actor, details, AuditOutcome::Failure)
    }

    fn record(
        election_id: Option<Uuid>,
        operation: &str,
        actor: impl Into<String>,
        details: serde_json::Value,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            entry_id: Uuid::new_v4(),
            election_id,
            operation: operation.to_string(),
            actor: actor.into(),
            details,
            outcome,
            timestamp: Utc::now(),
        }
    }
}
