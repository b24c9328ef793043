//! Property-based invariants for the cryptographic pipeline

use std::collections::BTreeMap;
use std::sync::OnceLock;

use num_bigint::{BigUint, RandBigInt};
use proptest::prelude::*;

use veiltally::codec::{self, CiphertextVector};
use veiltally::constants::shamir_field_prime;
use veiltally::crypto::paillier::Keypair;
use veiltally::crypto::shamir;
use veiltally::digest::{canonical_json, result_digest};
use veiltally::Error;

/// One keypair for the whole run; the properties quantify over ballots and
/// shares, not keys, and safe-prime generation dominates runtime.
fn keypair() -> &'static Keypair {
    static KEYPAIR: OnceLock<Keypair> = OnceLock::new();
    KEYPAIR.get_or_init(|| Keypair::generate(&mut rand::thread_rng(), 128).unwrap())
}

fn workers() -> &'static rayon::ThreadPool {
    static POOL: OnceLock<rayon::ThreadPool> = OnceLock::new();
    POOL.get_or_init(|| {
        rayon::ThreadPoolBuilder::new()
            .num_threads(2)
            .build()
            .unwrap()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    /// Homomorphic correctness: decrypting the aggregate of encrypted
    /// one-hot ballots yields the plaintext per-candidate tally.
    #[test]
    fn homomorphic_tally_matches_plaintext_count(
        raw_choices in proptest::collection::vec(0usize..32, 1..20),
        candidates in 2usize..=5,
    ) {
        let keypair = keypair();
        let mut rng = rand::thread_rng();

        let choices: Vec<usize> = raw_choices.iter().map(|c| c % candidates).collect();
        let mut expected = vec![0u64; candidates];
        for &choice in &choices {
            expected[choice] += 1;
        }

        let ballots: Vec<CiphertextVector> = choices
            .iter()
            .map(|&choice| {
                CiphertextVector::encode_one_hot(&keypair.public, &mut rng, choice, candidates)
                    .unwrap()
            })
            .collect();
        let aggregate = codec::aggregate(&keypair.public, workers(), &ballots, candidates).unwrap();

        let plaintexts: Vec<BigUint> = aggregate
            .values()
            .iter()
            .map(|c| keypair.private.decrypt(c).unwrap())
            .collect();
        let counts = codec::decode_tally(&plaintexts, choices.len() as u64).unwrap();
        prop_assert_eq!(counts, expected);
    }

    /// Commutativity: any permutation of ballot submissions produces the
    /// same aggregate ciphertext and the same decoded tally.
    #[test]
    fn aggregation_is_permutation_invariant(
        raw_choices in proptest::collection::vec(0usize..3, 2..12),
        rotation in 1usize..12,
    ) {
        let keypair = keypair();
        let mut rng = rand::thread_rng();

        let ballots: Vec<CiphertextVector> = raw_choices
            .iter()
            .map(|&c| CiphertextVector::encode_one_hot(&keypair.public, &mut rng, c % 3, 3).unwrap())
            .collect();
        let mut rotated = ballots.clone();
        rotated.rotate_left(rotation % ballots.len());

        let a = codec::aggregate(&keypair.public, workers(), &ballots, 3).unwrap();
        let b = codec::aggregate(&keypair.public, workers(), &rotated, 3).unwrap();
        prop_assert_eq!(a.to_wire(), b.to_wire());
    }

    /// Shamir round-trip: every size-t window of the n shares reconstructs
    /// H(secret); any t-1 shares fail with InsufficientShares.
    #[test]
    fn shamir_roundtrip_over_subsets(
        secret in proptest::collection::vec(any::<u8>(), 1..48),
        threshold in 2u32..=6,
        spare in 0u32..=3,
    ) {
        let total = threshold + spare;
        let mut rng = rand::thread_rng();
        let shares = shamir::split(&mut rng, &secret, threshold, total).unwrap();
        let expected = shamir::hash_to_field(&secret);

        let points: Vec<(u32, BigUint)> =
            shares.iter().map(|s| (s.index, s.value.clone())).collect();
        for window in points.windows(threshold as usize) {
            prop_assert_eq!(shamir::reconstruct(window, threshold).unwrap(), expected.clone());
        }

        let short = &points[..(threshold - 1) as usize];
        let is_insufficient = matches!(
            shamir::reconstruct(short, threshold),
            Err(Error::InsufficientShares { .. })
        );
        prop_assert!(is_insufficient);
    }

    /// Threshold safety: t-1 honest shares plus an adversarially chosen
    /// forged point do not reconstruct the true handle.
    #[test]
    fn forged_share_does_not_recover_the_handle(
        secret in proptest::collection::vec(any::<u8>(), 1..48),
        forged_index in 100u32..200,
    ) {
        let mut rng = rand::thread_rng();
        let shares = shamir::split(&mut rng, &secret, 3, 5).unwrap();

        let mut points: Vec<(u32, BigUint)> = shares[..2]
            .iter()
            .map(|s| (s.index, s.value.clone()))
            .collect();
        points.push((forged_index, rng.gen_biguint_below(&shamir_field_prime())));

        let reconstructed = shamir::reconstruct(&points, 3).unwrap();
        prop_assert_ne!(reconstructed, shamir::hash_to_field(&secret));
    }

    /// Digest stability: the canonical form is independent of the textual
    /// key order of its input and sensitive to every count.
    #[test]
    fn digest_is_order_independent_and_count_sensitive(
        counts in proptest::collection::btree_map("[a-z]{1,8}", 0u64..1_000, 1..6),
        total in 0u64..100_000,
    ) {
        let election_id = uuid::Uuid::nil();
        let first = result_digest(&election_id, &counts, total, true).unwrap();
        prop_assert_eq!(result_digest(&election_id, &counts, total, true).unwrap(), first.clone());

        // Feed the same object through differently ordered JSON texts.
        let ordered: Vec<(&String, &u64)> = counts.iter().collect();
        let forward = ordered
            .iter()
            .map(|(k, v)| format!("\"{k}\":{v}"))
            .collect::<Vec<_>>()
            .join(",");
        let backward = ordered
            .iter()
            .rev()
            .map(|(k, v)| format!("\"{k}\":{v}"))
            .collect::<Vec<_>>()
            .join(",");
        let a: serde_json::Value = serde_json::from_str(&format!("{{{forward}}}")).unwrap();
        let b: serde_json::Value = serde_json::from_str(&format!("{{{backward}}}")).unwrap();
        prop_assert_eq!(canonical_json(&a, true).unwrap(), canonical_json(&b, true).unwrap());

        // Any count change moves the digest.
        let mut mutated = counts.clone();
        let key = mutated.keys().next().unwrap().clone();
        *mutated.get_mut(&key).unwrap() += 1;
        prop_assert_ne!(result_digest(&election_id, &mutated, total, true).unwrap(), first);
    }
}

/// Scalar multiplication stays consistent with repeated addition.
#[test]
fn scalar_mul_matches_repeated_addition() {
    let keypair = keypair();
    let mut rng = rand::thread_rng();
    let m = BigUint::from(5u32);

    let c = keypair.public.encrypt(&mut rng, &m).unwrap();
    let tripled = keypair.public.scalar_mul(&c, &BigUint::from(3u32)).unwrap();

    let mut sum = c.clone();
    sum = keypair.public.add(&sum, &c).unwrap();
    sum = keypair.public.add(&sum, &c).unwrap();

    assert_eq!(
        keypair.private.decrypt(&tripled).unwrap(),
        keypair.private.decrypt(&sum).unwrap()
    );
}

/// A BTreeMap built from shuffled insertions digests identically.
#[test]
fn digest_ignores_insertion_order() {
    let id = uuid::Uuid::new_v4();
    let forward: BTreeMap<String, u64> =
        [("a", 1u64), ("b", 2), ("c", 3)].map(|(k, v)| (k.to_string(), v)).into();
    let backward: BTreeMap<String, u64> =
        [("c", 3u64), ("b", 2), ("a", 1)].map(|(k, v)| (k.to_string(), v)).into();
    assert_eq!(
        result_digest(&id, &forward, 6, true).unwrap(),
        result_digest(&id, &backward, 6, true).unwrap()
    );
}
