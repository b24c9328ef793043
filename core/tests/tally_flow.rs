//! End-to-end tallying scenarios against the in-memory store

use std::sync::Arc;

use num_bigint::RandBigInt;
use uuid::Uuid;

use veiltally::codec::CiphertextVector;
use veiltally::constants::operations;
use veiltally::crypto::paillier::PublicKey;
use veiltally::ops::{
    audit_trail, create_election, finalize_tally, issue_key_shares, partial_decrypt,
    register_trustee, start_tallying, submit_ballot, tally_status, verify_result, CandidateSpec,
    CreateElectionRequest, PartialDecryptRequest, RegisterTrusteeRequest, SubmitBallotRequest,
};
use veiltally::state::{ElectionStatus, SessionStatus, Trustee};
use veiltally::store::memory::MemoryStore;
use veiltally::store::{Store, StoreTx};
use veiltally::{AppContext, Error, TallyConfig};

fn test_config() -> TallyConfig {
    TallyConfig {
        database_url: None,
        // Small keys keep safe-prime generation fast in tests.
        paillier_key_bits: 128,
        threshold_t: 3,
        threshold_n: 5,
        worker_parallelism: 2,
        canonical_json_strict: true,
    }
}

fn context() -> AppContext {
    AppContext::new(Arc::new(MemoryStore::new()), test_config()).unwrap()
}

/// Create an [A, B, C] election with a full trustee roster and issued keys.
async fn setup(ctx: &AppContext) -> (Uuid, Vec<Trustee>) {
    let election = create_election(
        ctx,
        CreateElectionRequest {
            title: "Board election".into(),
            description: None,
            candidates: ["A", "B", "C"]
                .iter()
                .map(|name| CandidateSpec {
                    name: name.to_string(),
                    party: None,
                })
                .collect(),
        },
    )
    .await
    .unwrap();

    let mut trustees = Vec::new();
    for i in 1..=5 {
        trustees.push(
            register_trustee(
                ctx,
                RegisterTrusteeRequest {
                    name: format!("Trustee {i}"),
                    email: format!("trustee{i}@example.com"),
                },
            )
            .await
            .unwrap(),
        );
    }

    issue_key_shares(ctx, election.election_id).await.unwrap();
    (election.election_id, trustees)
}

async fn public_key(ctx: &AppContext, election_id: Uuid) -> PublicKey {
    let mut tx = ctx.store().begin().await.unwrap();
    tx.election(election_id)
        .await
        .unwrap()
        .unwrap()
        .public_key()
        .unwrap()
}

/// Encrypt and submit a one-hot ballot for candidate `choice`.
async fn cast(ctx: &AppContext, election_id: Uuid, choice: usize, nonce: &str) -> Uuid {
    let pk = public_key(ctx, election_id).await;
    let mut rng = rand::thread_rng();
    let vector = CiphertextVector::encode_one_hot(&pk, &mut rng, choice, 3).unwrap();
    submit_ballot(
        ctx,
        SubmitBallotRequest {
            election_id,
            ciphertexts: vector.to_wire(),
            proof: None,
            nonce: nonce.into(),
        },
    )
    .await
    .unwrap()
    .ballot_id
}

async fn cast_scenario_ballots(ctx: &AppContext, election_id: Uuid) {
    // Votes: A, A, B, A, C
    for (i, choice) in [0usize, 0, 1, 0, 2].iter().enumerate() {
        cast(ctx, election_id, *choice, &format!("nonce-{i}")).await;
    }
}

#[tokio::test]
async fn scenario_happy_path() {
    let ctx = context();
    let (election_id, trustees) = setup(&ctx).await;
    cast_scenario_ballots(&ctx, election_id).await;

    let start = start_tallying(&ctx, election_id).await.unwrap();
    assert_eq!(start.total_votes, 5);
    assert_eq!(start.required_trustees, 3);

    for trustee in &trustees[..3] {
        let response = partial_decrypt(
            &ctx,
            PartialDecryptRequest {
                election_id,
                trustee_id: trustee.trustee_id,
            },
        )
        .await
        .unwrap();
        assert_eq!(response.required_trustees, 3);
    }

    let result = finalize_tally(&ctx, election_id).await.unwrap();
    assert_eq!(result.total_votes, 5);
    assert_eq!(result.final_tally["A"], 3);
    assert_eq!(result.final_tally["B"], 1);
    assert_eq!(result.final_tally["C"], 1);
    assert_eq!(result.verification_hash.len(), 64);

    let status = tally_status(&ctx, election_id).await.unwrap();
    assert_eq!(status.status, SessionStatus::Completed);
    assert!(status.completed_at.is_some());

    // Ballots observed by a completed session are tallied and the election
    // is closed out.
    let mut tx = ctx.store().begin().await.unwrap();
    assert!(tx.untallied_ballots(election_id).await.unwrap().is_empty());
    let election = tx.election(election_id).await.unwrap().unwrap();
    assert_eq!(election.status, ElectionStatus::Completed);
}

#[tokio::test]
async fn scenario_insufficient_trustees() {
    let ctx = context();
    let (election_id, trustees) = setup(&ctx).await;
    cast_scenario_ballots(&ctx, election_id).await;
    start_tallying(&ctx, election_id).await.unwrap();

    for trustee in &trustees[..2] {
        partial_decrypt(
            &ctx,
            PartialDecryptRequest {
                election_id,
                trustee_id: trustee.trustee_id,
            },
        )
        .await
        .unwrap();
    }

    let err = finalize_tally(&ctx, election_id).await.unwrap_err();
    assert!(matches!(
        err,
        Error::InsufficientTrustees {
            completed: 2,
            required: 3
        }
    ));

    // The session stays in Decrypting; a third partial unblocks finalize.
    let status = tally_status(&ctx, election_id).await.unwrap();
    assert_eq!(status.status, SessionStatus::Decrypting);

    partial_decrypt(
        &ctx,
        PartialDecryptRequest {
            election_id,
            trustee_id: trustees[2].trustee_id,
        },
    )
    .await
    .unwrap();
    let result = finalize_tally(&ctx, election_id).await.unwrap();
    assert_eq!(result.total_votes, 5);
}

#[tokio::test]
async fn scenario_duplicate_trustee_is_idempotent() {
    let ctx = context();
    let (election_id, trustees) = setup(&ctx).await;
    cast_scenario_ballots(&ctx, election_id).await;
    start_tallying(&ctx, election_id).await.unwrap();

    let request = PartialDecryptRequest {
        election_id,
        trustee_id: trustees[0].trustee_id,
    };
    let first = partial_decrypt(&ctx, request.clone()).await.unwrap();
    let second = partial_decrypt(&ctx, request).await.unwrap();

    assert_eq!(first.decryption_id, second.decryption_id);
    assert_eq!(second.completed_trustees, 1);

    let entries = audit_trail(&ctx, election_id, 0, 100).await.unwrap();
    let partial_entries = entries
        .iter()
        .filter(|e| e.operation == operations::PARTIAL_DECRYPT)
        .count();
    assert_eq!(partial_entries, 1);
}

#[tokio::test]
async fn scenario_tampered_aggregate_fails_closed() {
    let ctx = context();
    let (election_id, trustees) = setup(&ctx).await;
    cast_scenario_ballots(&ctx, election_id).await;
    start_tallying(&ctx, election_id).await.unwrap();

    for trustee in &trustees[..3] {
        partial_decrypt(
            &ctx,
            PartialDecryptRequest {
                election_id,
                trustee_id: trustee.trustee_id,
            },
        )
        .await
        .unwrap();
    }

    // Attacker swaps one stored aggregate component for a random element
    // of Z_{n^2}.
    let pk = public_key(&ctx, election_id).await;
    {
        let mut tx = ctx.store().begin().await.unwrap();
        let mut session = tx.session_by_election(election_id).await.unwrap().unwrap();
        let aggregate = CiphertextVector::from_wire(session.aggregate.as_deref().unwrap()).unwrap();
        let mut values = aggregate.values().to_vec();
        values[0] = rand::thread_rng().gen_biguint_below(pk.n_squared());
        session.aggregate = Some(CiphertextVector::new(values).to_wire());
        tx.put_session(&session).await.unwrap();
        tx.commit().await.unwrap();
    }

    let err = finalize_tally(&ctx, election_id).await.unwrap_err();
    assert!(matches!(
        err,
        Error::TallyInconsistent(_) | Error::InvalidCiphertext(_)
    ));

    // No completed result is ever persisted; the session is dead.
    let mut tx = ctx.store().begin().await.unwrap();
    assert!(tx.result_by_election(election_id).await.unwrap().is_none());
    let session = tx.session_by_election(election_id).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Failed);
    assert!(session.error_message.is_some());
    let election = tx.election(election_id).await.unwrap().unwrap();
    assert_eq!(election.status, ElectionStatus::Failed);
}

#[tokio::test]
async fn scenario_empty_election() {
    let ctx = context();
    let (election_id, _) = setup(&ctx).await;

    let err = start_tallying(&ctx, election_id).await.unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(msg) if msg.contains("no votes to tally")));

    // No session was created.
    assert!(matches!(
        tally_status(&ctx, election_id).await,
        Err(Error::NotFound { .. })
    ));
}

#[tokio::test]
async fn scenario_verification() {
    let ctx = context();
    let (election_id, trustees) = setup(&ctx).await;
    cast_scenario_ballots(&ctx, election_id).await;
    start_tallying(&ctx, election_id).await.unwrap();
    for trustee in &trustees[..3] {
        partial_decrypt(
            &ctx,
            PartialDecryptRequest {
                election_id,
                trustee_id: trustee.trustee_id,
            },
        )
        .await
        .unwrap();
    }
    finalize_tally(&ctx, election_id).await.unwrap();

    let verification = verify_result(&ctx, election_id).await.unwrap();
    assert!(verification.is_valid);
    assert_eq!(verification.recomputed_hash, verification.stored_hash);

    // Mutating a count invalidates the stored hash.
    {
        let mut tx = ctx.store().begin().await.unwrap();
        let mut result = tx.result_by_election(election_id).await.unwrap().unwrap();
        *result.final_tally.get_mut("B").unwrap() += 1;
        tx.put_result(&result).await.unwrap();
        tx.commit().await.unwrap();
    }
    let verification = verify_result(&ctx, election_id).await.unwrap();
    assert!(!verification.is_valid);
    assert_ne!(verification.recomputed_hash, verification.stored_hash);
}

#[tokio::test]
async fn replays_are_byte_identical_and_silent() {
    let ctx = context();
    let (election_id, trustees) = setup(&ctx).await;
    cast_scenario_ballots(&ctx, election_id).await;

    let first_start = start_tallying(&ctx, election_id).await.unwrap();
    for trustee in &trustees[..3] {
        partial_decrypt(
            &ctx,
            PartialDecryptRequest {
                election_id,
                trustee_id: trustee.trustee_id,
            },
        )
        .await
        .unwrap();
    }
    let first_finalize = finalize_tally(&ctx, election_id).await.unwrap();
    let entries_before = audit_trail(&ctx, election_id, 0, 100).await.unwrap().len();

    // Replays of every phase return the original identifiers...
    let replay_start = start_tallying(&ctx, election_id).await.unwrap();
    assert_eq!(replay_start, first_start);
    let replay_partial = partial_decrypt(
        &ctx,
        PartialDecryptRequest {
            election_id,
            trustee_id: trustees[0].trustee_id,
        },
    )
    .await
    .unwrap();
    assert_eq!(replay_partial.completed_trustees, 3);
    let replay_finalize = finalize_tally(&ctx, election_id).await.unwrap();
    assert_eq!(replay_finalize, first_finalize);

    // ...and add no audit entries.
    let entries_after = audit_trail(&ctx, election_id, 0, 100).await.unwrap().len();
    assert_eq!(entries_before, entries_after);
}

#[tokio::test]
async fn ballot_nonce_replay_and_conflict() {
    let ctx = context();
    let (election_id, _) = setup(&ctx).await;
    let pk = public_key(&ctx, election_id).await;
    let mut rng = rand::thread_rng();

    let vector = CiphertextVector::encode_one_hot(&pk, &mut rng, 0, 3).unwrap();
    let request = SubmitBallotRequest {
        election_id,
        ciphertexts: vector.to_wire(),
        proof: None,
        nonce: "voter-nonce".into(),
    };

    let first = submit_ballot(&ctx, request.clone()).await.unwrap();
    let replay = submit_ballot(&ctx, request).await.unwrap();
    assert_eq!(first.ballot_id, replay.ballot_id);

    // Same nonce, different content: surfaced instead of resolved.
    let other = CiphertextVector::encode_one_hot(&pk, &mut rng, 1, 3).unwrap();
    let err = submit_ballot(
        &ctx,
        SubmitBallotRequest {
            election_id,
            ciphertexts: other.to_wire(),
            proof: None,
            nonce: "voter-nonce".into(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::DuplicateBallot(_)));
}

#[tokio::test]
async fn inactive_trustee_is_not_authorized() {
    let ctx = context();
    let (election_id, trustees) = setup(&ctx).await;
    cast_scenario_ballots(&ctx, election_id).await;
    start_tallying(&ctx, election_id).await.unwrap();

    {
        let mut tx = ctx.store().begin().await.unwrap();
        let mut trustee = tx.trustee(trustees[0].trustee_id).await.unwrap().unwrap();
        trustee.status = veiltally::state::TrusteeStatus::Inactive;
        tx.put_trustee(&trustee).await.unwrap();
        tx.commit().await.unwrap();
    }

    let err = partial_decrypt(
        &ctx,
        PartialDecryptRequest {
            election_id,
            trustee_id: trustees[0].trustee_id,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::NotAuthorized(_)));
}

#[tokio::test]
async fn partial_decrypt_requires_started_session() {
    let ctx = context();
    let (election_id, trustees) = setup(&ctx).await;
    cast(&ctx, election_id, 0, "n1").await;

    // start_tallying strictly precedes any partial_decrypt.
    let err = partial_decrypt(
        &ctx,
        PartialDecryptRequest {
            election_id,
            trustee_id: trustees[0].trustee_id,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

#[tokio::test]
async fn trustee_roster_is_bounded_and_emails_unique() {
    let ctx = context();
    for i in 1..=5 {
        register_trustee(
            &ctx,
            RegisterTrusteeRequest {
                name: format!("Trustee {i}"),
                email: format!("trustee{i}@example.com"),
            },
        )
        .await
        .unwrap();
    }

    let err = register_trustee(
        &ctx,
        RegisterTrusteeRequest {
            name: "Sixth".into(),
            email: "sixth@example.com".into(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));

    let ctx = context();
    register_trustee(
        &ctx,
        RegisterTrusteeRequest {
            name: "First".into(),
            email: "same@example.com".into(),
        },
    )
    .await
    .unwrap();
    let err = register_trustee(
        &ctx,
        RegisterTrusteeRequest {
            name: "Second".into(),
            email: "same@example.com".into(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::DuplicateTrustee(_)));
}
