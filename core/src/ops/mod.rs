//! Public operations
//!
//! Transport-agnostic entry points; a REST layer is one valid binding.
//! Every mutating operation follows the same shape: acquire the election's
//! logical lock, open a transaction, validate, mutate, write its audit
//! entry, and commit. Retries of an already-successful operation replay
//! the original response without writing anything.

pub mod audit_trail;
pub mod create_election;
pub mod finalize_tally;
pub mod issue_key_shares;
pub mod partial_decrypt;
pub mod register_trustee;
pub mod start_tallying;
pub mod submit_ballot;
pub mod tally_status;
pub mod verify_result;

pub use audit_trail::audit_trail;
pub use create_election::{create_election, CandidateSpec, CreateElectionRequest};
pub use finalize_tally::{finalize_tally, FinalizeTallyResponse};
pub use issue_key_shares::{issue_key_shares, IssueKeySharesResponse};
pub use partial_decrypt::{partial_decrypt, PartialDecryptRequest, PartialDecryptResponse};
pub use register_trustee::{register_trustee, RegisterTrusteeRequest};
pub use start_tallying::{start_tallying, StartTallyResponse};
pub use submit_ballot::{submit_ballot, SubmitBallotRequest, SubmitBallotResponse};
pub use tally_status::{tally_status, TallyStatusResponse};
pub use verify_result::{verify_result, VerifyResultResponse};
