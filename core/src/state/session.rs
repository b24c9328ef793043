//! Tally session state machine
//!
//! Transitions are strictly forward:
//!
//! ```text
//! Initiated -> Aggregating -> Decrypting -> Combining -> Completed
//!      \____________\_____________\_____________\______> Failed
//! ```
//!
//! `Failed` is terminal and reachable from any live state; no state may
//! loop back to an earlier one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Initiated,
    Aggregating,
    Decrypting,
    Combining,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::Aggregating => "aggregating",
            Self::Decrypting => "decrypting",
            Self::Combining => "combining",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "initiated" => Ok(Self::Initiated),
            "aggregating" => Ok(Self::Aggregating),
            "decrypting" => Ok(Self::Decrypting),
            "combining" => Ok(Self::Combining),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(Error::InvalidArgument(format!(
                "unknown session status `{other}`"
            ))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// States in which a trustee partial decryption is accepted.
    pub fn accepts_partials(&self) -> bool {
        matches!(self, Self::Aggregating | Self::Decrypting)
    }

    fn ordinal(&self) -> u8 {
        match self {
            Self::Initiated => 0,
            Self::Aggregating => 1,
            Self::Decrypting => 2,
            Self::Combining => 3,
            Self::Completed => 4,
            Self::Failed => 5,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TallySession {
    pub session_id: Uuid,
    /// One session per election, enforced by the store.
    pub election_id: Uuid,
    pub status: SessionStatus,
    /// Wire-encoded aggregate ciphertext vector, pinned exactly once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<String>,
    /// Ballot count captured when the aggregate was pinned.
    pub total_votes: u64,
    pub required_trustees: u32,
    /// Always equals the number of persisted partials for this election.
    pub completed_trustees: u32,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl TallySession {
    pub fn new(election_id: Uuid, required_trustees: u32) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            election_id,
            status: SessionStatus::Initiated,
            aggregate: None,
            total_votes: 0,
            required_trustees,
            completed_trustees: 0,
            started_at: Utc::now(),
            completed_at: None,
            error_message: None,
        }
    }

    pub fn threshold_met(&self) -> bool {
        self.completed_trustees >= self.required_trustees
    }

    /// Pin the aggregate ciphertext and move to `Aggregating`. Write-once.
    pub fn pin_aggregate(&mut self, aggregate: String, total_votes: u64) -> Result<()> {
        if self.aggregate.is_some() {
            return Err(Error::invalid_state(
                self.status,
                "aggregate ciphertext is already pinned",
            ));
        }
        self.aggregate = Some(aggregate);
        self.total_votes = total_votes;
        self.transition(SessionStatus::Aggregating)
    }

    /// Advance the state machine, rejecting backward or skipping moves.
    pub fn transition(&mut self, next: SessionStatus) -> Result<()> {
        let legal = if next == SessionStatus::Failed {
            !self.status.is_terminal()
        } else {
            next.ordinal() == self.status.ordinal() + 1
        };
        if !legal {
            return Err(Error::invalid_state(
                self.status,
                format!("cannot transition to {next}"),
            ));
        }
        self.status = next;
        if next == SessionStatus::Completed {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Terminal failure with an operator-readable message.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<()> {
        self.transition(SessionStatus::Failed)?;
        self.error_message = Some(message.into());
        Ok(())
    }
}
