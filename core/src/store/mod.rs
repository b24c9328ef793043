//! Storage port
//!
//! The core depends on a transactional key-keyed store and assumes nothing
//! about the underlying engine. Every mutating operation runs inside one
//! [`StoreTx`]: either all of its writes commit or none do, with
//! SERIALIZABLE semantics across a single `partial_decrypt` or `finalize`
//! call. Dropping a transaction without committing rolls it back.
//!
//! Two adapters are provided: [`memory::MemoryStore`] for tests and
//! embedding, and a durable PostgreSQL adapter in the `veiltally-postgres`
//! crate. Schema migrations are the adapter's concern.

pub mod memory;

use async_trait::async_trait;
use uuid::Uuid;

use crate::state::{
    AuditEntry, Election, ElectionKey, ElectionResult, EncryptedBallot, PartialDecryption,
    TallySession, Trustee,
};
use crate::Result;

#[async_trait]
pub trait Store: Send + Sync {
    /// Open a transaction. All reads observe committed state as of this
    /// point plus the transaction's own writes.
    async fn begin(&self) -> Result<Box<dyn StoreTx>>;
}

#[async_trait]
pub trait StoreTx: Send {
    // ============ Elections ============
    async fn insert_election(&mut self, election: &Election) -> Result<()>;
    async fn election(&mut self, election_id: Uuid) -> Result<Option<Election>>;
    async fn put_election(&mut self, election: &Election) -> Result<()>;
    /// Cascade delete: removes the election's ballots, session, partials,
    /// result, key material, and audit entries.
    async fn delete_election(&mut self, election_id: Uuid) -> Result<()>;

    // ============ Election Keys (vault) ============
    async fn put_election_key(&mut self, key: &ElectionKey) -> Result<()>;
    async fn election_key(&mut self, election_id: Uuid) -> Result<Option<ElectionKey>>;

    // ============ Trustees ============
    /// Fails with `DuplicateTrustee` when the email is already registered.
    async fn insert_trustee(&mut self, trustee: &Trustee) -> Result<()>;
    async fn put_trustee(&mut self, trustee: &Trustee) -> Result<()>;
    async fn trustee(&mut self, trustee_id: Uuid) -> Result<Option<Trustee>>;
    async fn trustee_by_email(&mut self, email: &str) -> Result<Option<Trustee>>;
    /// All trustees ordered by share index.
    async fn trustees(&mut self) -> Result<Vec<Trustee>>;

    // ============ Ballots ============
    /// Fails with `DuplicateBallot` when the nonce is already used for this
    /// election.
    async fn insert_ballot(&mut self, ballot: &EncryptedBallot) -> Result<()>;
    async fn ballot_by_nonce(
        &mut self,
        election_id: Uuid,
        nonce: &str,
    ) -> Result<Option<EncryptedBallot>>;
    /// Ballots with `tallied = false`, ordered by submission time.
    async fn untallied_ballots(&mut self, election_id: Uuid) -> Result<Vec<EncryptedBallot>>;
    async fn mark_ballots_tallied(&mut self, election_id: Uuid) -> Result<()>;

    // ============ Tally Sessions ============
    /// Fails with `SessionExists` when the election already has a session.
    async fn insert_session(&mut self, session: &TallySession) -> Result<()>;
    async fn session_by_election(&mut self, election_id: Uuid) -> Result<Option<TallySession>>;
    async fn put_session(&mut self, session: &TallySession) -> Result<()>;

    // ============ Partial Decryptions ============
    /// Fails with `DuplicateTrustee` when this trustee already has a
    /// partial for this election.
    async fn insert_partial(&mut self, partial: &PartialDecryption) -> Result<()>;
    async fn partial_by_trustee(
        &mut self,
        election_id: Uuid,
        trustee_id: Uuid,
    ) -> Result<Option<PartialDecryption>>;
    /// Verified partials ordered by (trustee index, trustee id).
    async fn verified_partials(&mut self, election_id: Uuid) -> Result<Vec<PartialDecryption>>;

    // ============ Results ============
    async fn insert_result(&mut self, result: &ElectionResult) -> Result<()>;
    async fn put_result(&mut self, result: &ElectionResult) -> Result<()>;
    async fn result_by_election(&mut self, election_id: Uuid) -> Result<Option<ElectionResult>>;

    // ============ Audit Log ============
    /// Append-only; entries are never updated or deleted (short of a
    /// cascade delete of their election).
    async fn append_audit(&mut self, entry: &AuditEntry) -> Result<()>;
    /// Entries for an election, newest first.
    async fn audit_entries(
        &mut self,
        election_id: Uuid,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<AuditEntry>>;

    /// Atomically commit every write performed in this transaction.
    async fn commit(self: Box<Self>) -> Result<()>;
}
