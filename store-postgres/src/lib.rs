//! Durable PostgreSQL adapter for the tallying core's storage port
//!
//! Schema lives in `migrations/`; the unique indexes there back the
//! duplicate rules the port promises (`DuplicateTrustee`, `DuplicateBallot`,
//! `SessionExists`). Queries are bound at runtime so the crate builds
//! without a live database.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use tracing::info;
use uuid::Uuid;

use veiltally::state::{
    AuditEntry, AuditOutcome, Candidate, Election, ElectionKey, ElectionResult, ElectionStatus,
    EncryptedBallot, PaillierParams, PartialDecryption, SessionStatus, TallySession, Trustee,
    TrusteeStatus,
};
use veiltally::store::{Store, StoreTx};
use veiltally::{Error, Result};

/// Connection pool wrapper around the tallying schema.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to the database named by `DATABASE_URL`.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await
            .map_err(internal)?;
        Ok(Self { pool })
    }

    /// Run schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Internal(format!("migration failed: {e}")))?;
        info!("database migrations applied");
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await.map_err(internal)?;
        Ok(Box::new(PgTx { tx }))
    }
}

struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn insert_election(&mut self, election: &Election) -> Result<()> {
        sqlx::query(
            "INSERT INTO elections \
             (election_id, title, description, candidates, encryption_params, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(election.election_id)
        .bind(&election.title)
        .bind(&election.description)
        .bind(serde_json::to_value(&election.candidates).map_err(json_err)?)
        .bind(
            election
                .encryption_params
                .as_ref()
                .map(serde_json::to_value)
                .transpose()
                .map_err(json_err)?,
        )
        .bind(election.status.as_str())
        .bind(election.created_at)
        .bind(election.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        Ok(())
    }

    async fn election(&mut self, election_id: Uuid) -> Result<Option<Election>> {
        sqlx::query("SELECT * FROM elections WHERE election_id = $1")
            .bind(election_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(internal)?
            .map(|row| election_from_row(&row))
            .transpose()
    }

    async fn put_election(&mut self, election: &Election) -> Result<()> {
        sqlx::query(
            "UPDATE elections SET title = $2, description = $3, candidates = $4, \
             encryption_params = $5, status = $6, updated_at = $7 \
             WHERE election_id = $1",
        )
        .bind(election.election_id)
        .bind(&election.title)
        .bind(&election.description)
        .bind(serde_json::to_value(&election.candidates).map_err(json_err)?)
        .bind(
            election
                .encryption_params
                .as_ref()
                .map(serde_json::to_value)
                .transpose()
                .map_err(json_err)?,
        )
        .bind(election.status.as_str())
        .bind(election.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn delete_election(&mut self, election_id: Uuid) -> Result<()> {
        // Ballots, session, partials, result, key, and audit entries all
        // cascade from the foreign keys.
        sqlx::query("DELETE FROM elections WHERE election_id = $1")
            .bind(election_id)
            .execute(&mut *self.tx)
            .await
            .map_err(internal)?;
        Ok(())
    }

    async fn put_election_key(&mut self, key: &ElectionKey) -> Result<()> {
        sqlx::query(
            "INSERT INTO election_keys (election_id, material, created_at) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (election_id) DO UPDATE SET material = EXCLUDED.material",
        )
        .bind(key.election_id)
        .bind(&key.material)
        .bind(key.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn election_key(&mut self, election_id: Uuid) -> Result<Option<ElectionKey>> {
        sqlx::query("SELECT * FROM election_keys WHERE election_id = $1")
            .bind(election_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(internal)?
            .map(|row| {
                Ok(ElectionKey {
                    election_id: row.try_get("election_id").map_err(internal)?,
                    material: row.try_get("material").map_err(internal)?,
                    created_at: row.try_get("created_at").map_err(internal)?,
                })
            })
            .transpose()
    }

    async fn insert_trustee(&mut self, trustee: &Trustee) -> Result<()> {
        sqlx::query(
            "INSERT INTO trustees \
             (trustee_id, name, email, share_index, status, share, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(trustee.trustee_id)
        .bind(&trustee.name)
        .bind(&trustee.email)
        .bind(trustee.index as i32)
        .bind(trustee.status.as_str())
        .bind(&trustee.share)
        .bind(trustee.created_at)
        .bind(trustee.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        Ok(())
    }

    async fn put_trustee(&mut self, trustee: &Trustee) -> Result<()> {
        sqlx::query(
            "UPDATE trustees SET name = $2, email = $3, share_index = $4, status = $5, \
             share = $6, updated_at = $7 WHERE trustee_id = $1",
        )
        .bind(trustee.trustee_id)
        .bind(&trustee.name)
        .bind(&trustee.email)
        .bind(trustee.index as i32)
        .bind(trustee.status.as_str())
        .bind(&trustee.share)
        .bind(trustee.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        Ok(())
    }

    async fn trustee(&mut self, trustee_id: Uuid) -> Result<Option<Trustee>> {
        sqlx::query("SELECT * FROM trustees WHERE trustee_id = $1")
            .bind(trustee_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(internal)?
            .map(|row| trustee_from_row(&row))
            .transpose()
    }

    async fn trustee_by_email(&mut self, email: &str) -> Result<Option<Trustee>> {
        sqlx::query("SELECT * FROM trustees WHERE email = $1")
            .bind(email)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(internal)?
            .map(|row| trustee_from_row(&row))
            .transpose()
    }

    async fn trustees(&mut self) -> Result<Vec<Trustee>> {
        sqlx::query("SELECT * FROM trustees ORDER BY share_index ASC")
            .fetch_all(&mut *self.tx)
            .await
            .map_err(internal)?
            .iter()
            .map(trustee_from_row)
            .collect()
    }

    async fn insert_ballot(&mut self, ballot: &EncryptedBallot) -> Result<()> {
        sqlx::query(
            "INSERT INTO ballots \
             (ballot_id, election_id, ciphertexts, proof, nonce, tallied, submitted_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(ballot.ballot_id)
        .bind(ballot.election_id)
        .bind(&ballot.ciphertexts)
        .bind(&ballot.proof)
        .bind(&ballot.nonce)
        .bind(ballot.tallied)
        .bind(ballot.submitted_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        Ok(())
    }

    async fn ballot_by_nonce(
        &mut self,
        election_id: Uuid,
        nonce: &str,
    ) -> Result<Option<EncryptedBallot>> {
        sqlx::query("SELECT * FROM ballots WHERE election_id = $1 AND nonce = $2")
            .bind(election_id)
            .bind(nonce)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(internal)?
            .map(|row| ballot_from_row(&row))
            .transpose()
    }

    async fn untallied_ballots(&mut self, election_id: Uuid) -> Result<Vec<EncryptedBallot>> {
        sqlx::query(
            "SELECT * FROM ballots WHERE election_id = $1 AND NOT tallied \
             ORDER BY submitted_at ASC, ballot_id ASC",
        )
        .bind(election_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(internal)?
        .iter()
        .map(ballot_from_row)
        .collect()
    }

    async fn mark_ballots_tallied(&mut self, election_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE ballots SET tallied = TRUE WHERE election_id = $1")
            .bind(election_id)
            .execute(&mut *self.tx)
            .await
            .map_err(internal)?;
        Ok(())
    }

    async fn insert_session(&mut self, session: &TallySession) -> Result<()> {
        sqlx::query(
            "INSERT INTO tally_sessions \
             (session_id, election_id, status, aggregate, total_votes, required_trustees, \
              completed_trustees, started_at, completed_at, error_message) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(session.session_id)
        .bind(session.election_id)
        .bind(session.status.as_str())
        .bind(&session.aggregate)
        .bind(session.total_votes as i64)
        .bind(session.required_trustees as i32)
        .bind(session.completed_trustees as i32)
        .bind(session.started_at)
        .bind(session.completed_at)
        .bind(&session.error_message)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            if constraint_of(&e) == Some("tally_sessions_election_key") {
                Error::SessionExists(session.election_id)
            } else {
                map_db_error(e)
            }
        })?;
        Ok(())
    }

    async fn session_by_election(&mut self, election_id: Uuid) -> Result<Option<TallySession>> {
        sqlx::query("SELECT * FROM tally_sessions WHERE election_id = $1")
            .bind(election_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(internal)?
            .map(|row| session_from_row(&row))
            .transpose()
    }

    async fn put_session(&mut self, session: &TallySession) -> Result<()> {
        sqlx::query(
            "UPDATE tally_sessions SET status = $2, aggregate = $3, total_votes = $4, \
             completed_trustees = $5, completed_at = $6, error_message = $7 \
             WHERE session_id = $1",
        )
        .bind(session.session_id)
        .bind(session.status.as_str())
        .bind(&session.aggregate)
        .bind(session.total_votes as i64)
        .bind(session.completed_trustees as i32)
        .bind(session.completed_at)
        .bind(&session.error_message)
        .execute(&mut *self.tx)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn insert_partial(&mut self, partial: &PartialDecryption) -> Result<()> {
        sqlx::query(
            "INSERT INTO partial_decryptions \
             (decryption_id, election_id, trustee_id, trustee_index, share_value, \
              partial_values, proof, verified, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(partial.decryption_id)
        .bind(partial.election_id)
        .bind(partial.trustee_id)
        .bind(partial.trustee_index as i32)
        .bind(&partial.share_value)
        .bind(serde_json::to_value(&partial.partial_values).map_err(json_err)?)
        .bind(&partial.proof)
        .bind(partial.verified)
        .bind(partial.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        Ok(())
    }

    async fn partial_by_trustee(
        &mut self,
        election_id: Uuid,
        trustee_id: Uuid,
    ) -> Result<Option<PartialDecryption>> {
        sqlx::query(
            "SELECT * FROM partial_decryptions WHERE election_id = $1 AND trustee_id = $2",
        )
        .bind(election_id)
        .bind(trustee_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(internal)?
        .map(|row| partial_from_row(&row))
        .transpose()
    }

    async fn verified_partials(&mut self, election_id: Uuid) -> Result<Vec<PartialDecryption>> {
        sqlx::query(
            "SELECT * FROM partial_decryptions WHERE election_id = $1 AND verified \
             ORDER BY trustee_index ASC, trustee_id ASC",
        )
        .bind(election_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(internal)?
        .iter()
        .map(partial_from_row)
        .collect()
    }

    async fn insert_result(&mut self, result: &ElectionResult) -> Result<()> {
        sqlx::query(
            "INSERT INTO election_results \
             (result_id, election_id, final_tally, total_votes, verification_hash, \
              is_verified, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(result.result_id)
        .bind(result.election_id)
        .bind(serde_json::to_value(&result.final_tally).map_err(json_err)?)
        .bind(result.total_votes as i64)
        .bind(&result.verification_hash)
        .bind(result.is_verified)
        .bind(result.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        Ok(())
    }

    async fn put_result(&mut self, result: &ElectionResult) -> Result<()> {
        sqlx::query(
            "UPDATE election_results SET final_tally = $2, total_votes = $3, \
             verification_hash = $4, is_verified = $5 WHERE result_id = $1",
        )
        .bind(result.result_id)
        .bind(serde_json::to_value(&result.final_tally).map_err(json_err)?)
        .bind(result.total_votes as i64)
        .bind(&result.verification_hash)
        .bind(result.is_verified)
        .execute(&mut *self.tx)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn result_by_election(&mut self, election_id: Uuid) -> Result<Option<ElectionResult>> {
        sqlx::query("SELECT * FROM election_results WHERE election_id = $1")
            .bind(election_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(internal)?
            .map(|row| result_from_row(&row))
            .transpose()
    }

    async fn append_audit(&mut self, entry: &AuditEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO audit_log \
             (entry_id, election_id, operation, actor, details, outcome, recorded_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(entry.entry_id)
        .bind(entry.election_id)
        .bind(&entry.operation)
        .bind(&entry.actor)
        .bind(&entry.details)
        .bind(entry.outcome.as_str())
        .bind(entry.timestamp)
        .execute(&mut *self.tx)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn audit_entries(
        &mut self,
        election_id: Uuid,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<AuditEntry>> {
        sqlx::query(
            "SELECT * FROM audit_log WHERE election_id = $1 \
             ORDER BY recorded_at DESC, entry_id DESC OFFSET $2 LIMIT $3",
        )
        .bind(election_id)
        .bind(offset as i64)
        .bind(limit as i64)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(internal)?
        .iter()
        .map(audit_from_row)
        .collect()
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let this = *self;
        this.tx.commit().await.map_err(internal)
    }
}

// ============ Row Mapping ============

fn election_from_row(row: &PgRow) -> Result<Election> {
    let candidates: serde_json::Value = row.try_get("candidates").map_err(internal)?;
    let params: Option<serde_json::Value> = row.try_get("encryption_params").map_err(internal)?;
    let status: String = row.try_get("status").map_err(internal)?;
    Ok(Election {
        election_id: row.try_get("election_id").map_err(internal)?,
        title: row.try_get("title").map_err(internal)?,
        description: row.try_get("description").map_err(internal)?,
        candidates: serde_json::from_value::<Vec<Candidate>>(candidates).map_err(json_err)?,
        encryption_params: params
            .map(serde_json::from_value::<PaillierParams>)
            .transpose()
            .map_err(json_err)?,
        status: ElectionStatus::parse(&status)?,
        created_at: row.try_get("created_at").map_err(internal)?,
        updated_at: row.try_get("updated_at").map_err(internal)?,
    })
}

fn trustee_from_row(row: &PgRow) -> Result<Trustee> {
    let status: String = row.try_get("status").map_err(internal)?;
    let index: i32 = row.try_get("share_index").map_err(internal)?;
    Ok(Trustee {
        trustee_id: row.try_get("trustee_id").map_err(internal)?,
        name: row.try_get("name").map_err(internal)?,
        email: row.try_get("email").map_err(internal)?,
        index: index as u32,
        status: TrusteeStatus::parse(&status)?,
        share: row.try_get("share").map_err(internal)?,
        created_at: row.try_get("created_at").map_err(internal)?,
        updated_at: row.try_get("updated_at").map_err(internal)?,
    })
}

fn ballot_from_row(row: &PgRow) -> Result<EncryptedBallot> {
    Ok(EncryptedBallot {
        ballot_id: row.try_get("ballot_id").map_err(internal)?,
        election_id: row.try_get("election_id").map_err(internal)?,
        ciphertexts: row.try_get("ciphertexts").map_err(internal)?,
        proof: row.try_get("proof").map_err(internal)?,
        nonce: row.try_get("nonce").map_err(internal)?,
        tallied: row.try_get("tallied").map_err(internal)?,
        submitted_at: row.try_get("submitted_at").map_err(internal)?,
    })
}

fn session_from_row(row: &PgRow) -> Result<TallySession> {
    let status: String = row.try_get("status").map_err(internal)?;
    let total_votes: i64 = row.try_get("total_votes").map_err(internal)?;
    let required: i32 = row.try_get("required_trustees").map_err(internal)?;
    let completed: i32 = row.try_get("completed_trustees").map_err(internal)?;
    Ok(TallySession {
        session_id: row.try_get("session_id").map_err(internal)?,
        election_id: row.try_get("election_id").map_err(internal)?,
        status: SessionStatus::parse(&status)?,
        aggregate: row.try_get("aggregate").map_err(internal)?,
        total_votes: total_votes as u64,
        required_trustees: required as u32,
        completed_trustees: completed as u32,
        started_at: row.try_get("started_at").map_err(internal)?,
        completed_at: row.try_get("completed_at").map_err(internal)?,
        error_message: row.try_get("error_message").map_err(internal)?,
    })
}

fn partial_from_row(row: &PgRow) -> Result<PartialDecryption> {
    let index: i32 = row.try_get("trustee_index").map_err(internal)?;
    let values: serde_json::Value = row.try_get("partial_values").map_err(internal)?;
    Ok(PartialDecryption {
        decryption_id: row.try_get("decryption_id").map_err(internal)?,
        election_id: row.try_get("election_id").map_err(internal)?,
        trustee_id: row.try_get("trustee_id").map_err(internal)?,
        trustee_index: index as u32,
        share_value: row.try_get("share_value").map_err(internal)?,
        partial_values: serde_json::from_value(values).map_err(json_err)?,
        proof: row.try_get("proof").map_err(internal)?,
        verified: row.try_get("verified").map_err(internal)?,
        created_at: row.try_get("created_at").map_err(internal)?,
    })
}

fn result_from_row(row: &PgRow) -> Result<ElectionResult> {
    let tally: serde_json::Value = row.try_get("final_tally").map_err(internal)?;
    let total_votes: i64 = row.try_get("total_votes").map_err(internal)?;
    Ok(ElectionResult {
        result_id: row.try_get("result_id").map_err(internal)?,
        election_id: row.try_get("election_id").map_err(internal)?,
        final_tally: serde_json::from_value(tally).map_err(json_err)?,
        total_votes: total_votes as u64,
        verification_hash: row.try_get("verification_hash").map_err(internal)?,
        is_verified: row.try_get("is_verified").map_err(internal)?,
        created_at: row.try_get("created_at").map_err(internal)?,
    })
}

fn audit_from_row(row: &PgRow) -> Result<AuditEntry> {
    let outcome: String = row.try_get("outcome").map_err(internal)?;
    Ok(AuditEntry {
        entry_id: row.try_get("entry_id").map_err(internal)?,
        election_id: row.try_get("election_id").map_err(internal)?,
        operation: row.try_get("operation").map_err(internal)?,
        actor: row.try_get("actor").map_err(internal)?,
        details: row.try_get("details").map_err(internal)?,
        outcome: AuditOutcome::parse(&outcome)?,
        timestamp: row.try_get("recorded_at").map_err(internal)?,
    })
}

// ============ Error Mapping ============

fn internal(err: sqlx::Error) -> Error {
    Error::Internal(err.to_string())
}

fn json_err(err: serde_json::Error) -> Error {
    Error::Internal(format!("entity serialization failed: {err}"))
}

fn constraint_of(err: &sqlx::Error) -> Option<&str> {
    match err {
        sqlx::Error::Database(db) => db.constraint(),
        _ => None,
    }
}

/// Translate unique-index violations into the port's duplicate errors.
fn map_db_error(err: sqlx::Error) -> Error {
    match constraint_of(&err) {
        Some("trustees_email_key") => {
            Error::DuplicateTrustee("email is already registered".into())
        }
        Some("ballots_election_nonce_key") => {
            Error::DuplicateBallot("nonce is already used for this election".into())
        }
        Some("partial_decryptions_election_trustee_key") => Error::DuplicateTrustee(
            "trustee already submitted a partial decryption".into(),
        ),
        _ => internal(err),
    }
}
