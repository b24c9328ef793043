//! Trustee state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrusteeStatus {
    Active,
    Inactive,
}

impl TrusteeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            other => Err(Error::InvalidArgument(format!(
                "unknown trustee status `{other}`"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trustee {
    pub trustee_id: Uuid,
    pub name: String,
    /// Unique across all trustees.
    pub email: String,
    /// Stable share index in [1, n]; doubles as the Shamir x coordinate.
    pub index: u32,
    pub status: TrusteeStatus,
    /// Opaque share payload owned by the trustee. The core never inspects
    /// its semantics except to feed it back to the Shamir component.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trustee {
    pub fn is_active(&self) -> bool {
        self.status == TrusteeStatus::Active
    }

    pub fn has_share(&self) -> bool {
        self.share.is_some()
    }
}
