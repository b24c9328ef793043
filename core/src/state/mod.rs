//! Persistent entity types
//!
//! One module per entity kind, mirroring the persisted state layout:
//! elections own their ballots, session, partials, result, and audit
//! entries; trustees own their shares; results are shared-readable after
//! finalize.

pub mod audit;
pub mod ballot;
pub mod election;
pub mod partial;
pub mod result;
pub mod session;
pub mod trustee;

pub use audit::{AuditEntry, AuditOutcome};
pub use ballot::EncryptedBallot;
pub use election::{Candidate, Election, ElectionKey, ElectionStatus, PaillierParams};
pub use partial::PartialDecryption;
pub use result::ElectionResult;
pub use session::{SessionStatus, TallySession};
pub use trustee::{Trustee, TrusteeStatus};
