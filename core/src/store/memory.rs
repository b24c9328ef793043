//! In-memory store adapter
//!
//! Transactions read from a snapshot taken at `begin` plus their own
//! buffered writes; `commit` replays the write log onto the shared state
//! under a single lock. Uniqueness rules are enforced against the
//! transaction's view; the per-election lock in the operations layer is
//! what serializes writers on the same election.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::state::{
    AuditEntry, Election, ElectionKey, ElectionResult, EncryptedBallot, PartialDecryption,
    TallySession, Trustee,
};
use crate::store::{Store, StoreTx};
use crate::{Error, Result};

#[derive(Debug, Default, Clone)]
struct MemoryState {
    elections: HashMap<Uuid, Election>,
    election_keys: HashMap<Uuid, ElectionKey>,
    trustees: HashMap<Uuid, Trustee>,
    ballots: HashMap<Uuid, EncryptedBallot>,
    sessions: HashMap<Uuid, TallySession>,
    partials: HashMap<Uuid, PartialDecryption>,
    results: HashMap<Uuid, ElectionResult>,
    audit: Vec<AuditEntry>,
}

#[derive(Debug, Clone)]
enum WriteOp {
    PutElection(Election),
    DeleteElection(Uuid),
    PutElectionKey(ElectionKey),
    PutTrustee(Trustee),
    InsertBallot(EncryptedBallot),
    MarkBallotsTallied(Uuid),
    PutSession(TallySession),
    InsertPartial(PartialDecryption),
    InsertResult(ElectionResult),
    AppendAudit(AuditEntry),
}

fn apply(state: &mut MemoryState, op: &WriteOp) {
    match op {
        WriteOp::PutElection(e) => {
            state.elections.insert(e.election_id, e.clone());
        }
        WriteOp::DeleteElection(id) => {
            state.elections.remove(id);
            state.election_keys.remove(id);
            state.ballots.retain(|_, b| b.election_id != *id);
            state.sessions.retain(|_, s| s.election_id != *id);
            state.partials.retain(|_, p| p.election_id != *id);
            state.results.retain(|_, r| r.election_id != *id);
            state.audit.retain(|a| a.election_id != Some(*id));
        }
        WriteOp::PutElectionKey(k) => {
            state.election_keys.insert(k.election_id, k.clone());
        }
        WriteOp::PutTrustee(t) => {
            state.trustees.insert(t.trustee_id, t.clone());
        }
        WriteOp::InsertBallot(b) => {
            state.ballots.insert(b.ballot_id, b.clone());
        }
        WriteOp::MarkBallotsTallied(id) => {
            for ballot in state.ballots.values_mut() {
                if ballot.election_id == *id {
                    ballot.tallied = true;
                }
            }
        }
        WriteOp::PutSession(s) => {
            state.sessions.insert(s.session_id, s.clone());
        }
        WriteOp::InsertPartial(p) => {
            state.partials.insert(p.decryption_id, p.clone());
        }
        WriteOp::InsertResult(r) => {
            state.results.insert(r.result_id, r.clone());
        }
        WriteOp::AppendAudit(a) => {
            state.audit.push(a.clone());
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let view = self.state.lock().clone();
        Ok(Box::new(MemoryTx {
            shared: Arc::clone(&self.state),
            view,
            log: Vec::new(),
        }))
    }
}

struct MemoryTx {
    shared: Arc<Mutex<MemoryState>>,
    view: MemoryState,
    log: Vec<WriteOp>,
}

impl MemoryTx {
    fn write(&mut self, op: WriteOp) {
        apply(&mut self.view, &op);
        self.log.push(op);
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn insert_election(&mut self, election: &Election) -> Result<()> {
        if self.view.elections.contains_key(&election.election_id) {
            return Err(Error::Internal(format!(
                "election {} already exists",
                election.election_id
            )));
        }
        self.write(WriteOp::PutElection(election.clone()));
        Ok(())
    }

    async fn election(&mut self, election_id: Uuid) -> Result<Option<Election>> {
        Ok(self.view.elections.get(&election_id).cloned())
    }

    async fn put_election(&mut self, election: &Election) -> Result<()> {
        self.write(WriteOp::PutElection(election.clone()));
        Ok(())
    }

    async fn delete_election(&mut self, election_id: Uuid) -> Result<()> {
        self.write(WriteOp::DeleteElection(election_id));
        Ok(())
    }

    async fn put_election_key(&mut self, key: &ElectionKey) -> Result<()> {
        self.write(WriteOp::PutElectionKey(key.clone()));
        Ok(())
    }

    async fn election_key(&mut self, election_id: Uuid) -> Result<Option<ElectionKey>> {
        Ok(self.view.election_keys.get(&election_id).cloned())
    }

    async fn insert_trustee(&mut self, trustee: &Trustee) -> Result<()> {
        if self
            .view
            .trustees
            .values()
            .any(|t| t.email == trustee.email)
        {
            return Err(Error::DuplicateTrustee(format!(
                "email {} is already registered",
                trustee.email
            )));
        }
        self.write(WriteOp::PutTrustee(trustee.clone()));
        Ok(())
    }

    async fn put_trustee(&mut self, trustee: &Trustee) -> Result<()> {
        self.write(WriteOp::PutTrustee(trustee.clone()));
        Ok(())
    }

    async fn trustee(&mut self, trustee_id: Uuid) -> Result<Option<Trustee>> {
        Ok(self.view.trustees.get(&trustee_id).cloned())
    }

    async fn trustee_by_email(&mut self, email: &str) -> Result<Option<Trustee>> {
        Ok(self
            .view
            .trustees
            .values()
            .find(|t| t.email == email)
            .cloned())
    }

    async fn trustees(&mut self) -> Result<Vec<Trustee>> {
        let mut trustees: Vec<Trustee> = self.view.trustees.values().cloned().collect();
        trustees.sort_by_key(|t| t.index);
        Ok(trustees)
    }

    async fn insert_ballot(&mut self, ballot: &EncryptedBallot) -> Result<()> {
        if self
            .view
            .ballots
            .values()
            .any(|b| b.election_id == ballot.election_id && b.nonce == ballot.nonce)
        {
            return Err(Error::DuplicateBallot(format!(
                "nonce {} is already used for this election",
                ballot.nonce
            )));
        }
        self.write(WriteOp::InsertBallot(ballot.clone()));
        Ok(())
    }

    async fn ballot_by_nonce(
        &mut self,
        election_id: Uuid,
        nonce: &str,
    ) -> Result<Option<EncryptedBallot>> {
        Ok(self
            .view
            .ballots
            .values()
            .find(|b| b.election_id == election_id && b.nonce == nonce)
            .cloned())
    }

    async fn untallied_ballots(&mut self, election_id: Uuid) -> Result<Vec<EncryptedBallot>> {
        let mut ballots: Vec<EncryptedBallot> = self
            .view
            .ballots
            .values()
            .filter(|b| b.election_id == election_id && !b.tallied)
            .cloned()
            .collect();
        ballots.sort_by(|a, b| {
            a.submitted_at
                .cmp(&b.submitted_at)
                .then_with(|| a.ballot_id.cmp(&b.ballot_id))
        });
        Ok(ballots)
    }

    async fn mark_ballots_tallied(&mut self, election_id: Uuid) -> Result<()> {
        self.write(WriteOp::MarkBallotsTallied(election_id));
        Ok(())
    }

    async fn insert_session(&mut self, session: &TallySession) -> Result<()> {
        if self
            .view
            .sessions
            .values()
            .any(|s| s.election_id == session.election_id)
        {
            return Err(Error::SessionExists(session.election_id));
        }
        self.write(WriteOp::PutSession(session.clone()));
        Ok(())
    }

    async fn session_by_election(&mut self, election_id: Uuid) -> Result<Option<TallySession>> {
        Ok(self
            .view
            .sessions
            .values()
            .find(|s| s.election_id == election_id)
            .cloned())
    }

    async fn put_session(&mut self, session: &TallySession) -> Result<()> {
        self.write(WriteOp::PutSession(session.clone()));
        Ok(())
    }

    async fn insert_partial(&mut self, partial: &PartialDecryption) -> Result<()> {
        if self
            .view
            .partials
            .values()
            .any(|p| p.election_id == partial.election_id && p.trustee_id == partial.trustee_id)
        {
            return Err(Error::DuplicateTrustee(format!(
                "trustee {} already submitted a partial decryption",
                partial.trustee_id
            )));
        }
        self.write(WriteOp::InsertPartial(partial.clone()));
        Ok(())
    }

    async fn partial_by_trustee(
        &mut self,
        election_id: Uuid,
        trustee_id: Uuid,
    ) -> Result<Option<PartialDecryption>> {
        Ok(self
            .view
            .partials
            .values()
            .find(|p| p.election_id == election_id && p.trustee_id == trustee_id)
            .cloned())
    }

    async fn verified_partials(&mut self, election_id: Uuid) -> Result<Vec<PartialDecryption>> {
        let mut partials: Vec<PartialDecryption> = self
            .view
            .partials
            .values()
            .filter(|p| p.election_id == election_id && p.verified)
            .cloned()
            .collect();
        partials.sort_by(|a, b| {
            a.trustee_index
                .cmp(&b.trustee_index)
                .then_with(|| a.trustee_id.cmp(&b.trustee_id))
        });
        Ok(partials)
    }

    async fn insert_result(&mut self, result: &ElectionResult) -> Result<()> {
        if self
            .view
            .results
            .values()
            .any(|r| r.election_id == result.election_id)
        {
            return Err(Error::Internal(format!(
                "result already recorded for election {}",
                result.election_id
            )));
        }
        self.write(WriteOp::InsertResult(result.clone()));
        Ok(())
    }

    async fn put_result(&mut self, result: &ElectionResult) -> Result<()> {
        self.write(WriteOp::InsertResult(result.clone()));
        Ok(())
    }

    async fn result_by_election(&mut self, election_id: Uuid) -> Result<Option<ElectionResult>> {
        Ok(self
            .view
            .results
            .values()
            .find(|r| r.election_id == election_id)
            .cloned())
    }

    async fn append_audit(&mut self, entry: &AuditEntry) -> Result<()> {
        self.write(WriteOp::AppendAudit(entry.clone()));
        Ok(())
    }

    async fn audit_entries(
        &mut self,
        election_id: Uuid,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<AuditEntry>> {
        let mut entries: Vec<AuditEntry> = self
            .view
            .audit
            .iter()
            .filter(|a| a.election_id == Some(election_id))
            .cloned()
            .collect();
        entries.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.entry_id.cmp(&a.entry_id))
        });
        Ok(entries
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut shared = self.shared.lock();
        for op in &self.log {
            apply(&mut shared, op);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{ElectionStatus, TrusteeStatus};
    use chrono::Utc;

    fn election() -> Election {
        Election {
            election_id: Uuid::new_v4(),
            title: "Board election".into(),
            description: None,
            candidates: vec![],
            encryption_params: None,
            status: ElectionStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn trustee(email: &str, index: u32) -> Trustee {
        Trustee {
            trustee_id: Uuid::new_v4(),
            name: "Trustee".into(),
            email: email.into(),
            index,
            status: TrusteeStatus::Active,
            share: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_invisible() {
        let store = MemoryStore::new();
        let e = election();

        let mut tx = store.begin().await.unwrap();
        tx.insert_election(&e).await.unwrap();
        assert!(tx.election(e.election_id).await.unwrap().is_some());
        drop(tx); // rollback

        let mut tx = store.begin().await.unwrap();
        assert!(tx.election(e.election_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_publishes_writes() {
        let store = MemoryStore::new();
        let e = election();

        let mut tx = store.begin().await.unwrap();
        tx.insert_election(&e).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert_eq!(
            tx.election(e.election_id).await.unwrap().unwrap().title,
            e.title
        );
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_trustee(&trustee("a@example.com", 1)).await.unwrap();
        let err = tx
            .insert_trustee(&trustee("a@example.com", 2))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateTrustee(_)));
    }

    #[tokio::test]
    async fn test_trustees_ordered_by_index() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        for (email, index) in [("c@x.io", 3), ("a@x.io", 1), ("b@x.io", 2)] {
            tx.insert_trustee(&trustee(email, index)).await.unwrap();
        }
        let indices: Vec<u32> = tx.trustees().await.unwrap().iter().map(|t| t.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_cascade_delete() {
        let store = MemoryStore::new();
        let e = election();
        let mut tx = store.begin().await.unwrap();
        tx.insert_election(&e).await.unwrap();
        tx.insert_ballot(&EncryptedBallot {
            ballot_id: Uuid::new_v4(),
            election_id: e.election_id,
            ciphertexts: "c".into(),
            proof: None,
            nonce: "n1".into(),
            tallied: false,
            submitted_at: Utc::now(),
        })
        .await
        .unwrap();
        tx.append_audit(&AuditEntry::success(
            Some(e.election_id),
            "submit_ballot",
            "system",
            serde_json::json!({}),
        ))
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.delete_election(e.election_id).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(tx.election(e.election_id).await.unwrap().is_none());
        assert!(tx
            .untallied_ballots(e.election_id)
            .await
            .unwrap()
            .is_empty());
        assert!(tx
            .audit_entries(e.election_id, 0, 10)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_session_uniqueness_per_election() {
        let store = MemoryStore::new();
        let e = election();
        let mut tx = store.begin().await.unwrap();
        tx.insert_session(&TallySession::new(e.election_id, 3))
            .await
            .unwrap();
        let err = tx
            .insert_session(&TallySession::new(e.election_id, 3))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SessionExists(_)));
    }
}
