//! Threshold decryption orchestration
//!
//! Trustees contribute partial decryptions in arbitrary order; combining
//! any t of them from distinct trustees yields the same plaintext vector as
//! a direct decryption with the reconstructed key. The subset actually
//! combined is chosen deterministically so replays produce identical
//! results.

use chrono::{DateTime, Utc};
use num_bigint::BigUint;
use serde_json::json;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::codec::CiphertextVector;
use crate::crypto::paillier::PrivateKey;
use crate::crypto::shamir;
use crate::state::PartialDecryption;
use crate::{Error, Result};

/// Non-interactive decryption commitment recorded with each partial:
/// hex(SHA-256 over {trustee_id, ciphertext_digest, timestamp}).
///
/// Kept as an audit artifact only; combine does not verify it.
pub fn decryption_proof(
    trustee_id: &Uuid,
    ciphertext_digest: &str,
    timestamp: DateTime<Utc>,
) -> String {
    let payload = json!({
        "trustee_id": trustee_id.to_string(),
        "ciphertext_digest": ciphertext_digest,
        "timestamp": timestamp.to_rfc3339(),
    });
    hex::encode(Sha256::digest(payload.to_string()))
}

/// Deterministically pick the t partials to combine: lowest trustee indices
/// first, ties broken by trustee UUID.
pub fn select_partials(
    partials: &[PartialDecryption],
    threshold: u32,
) -> Result<Vec<&PartialDecryption>> {
    if (partials.len() as u32) < threshold {
        return Err(Error::InsufficientTrustees {
            completed: partials.len() as u32,
            required: threshold,
        });
    }
    let mut ordered: Vec<&PartialDecryption> = partials.iter().collect();
    ordered.sort_by(|a, b| {
        a.trustee_index
            .cmp(&b.trustee_index)
            .then_with(|| a.trustee_id.cmp(&b.trustee_id))
    });
    ordered.truncate(threshold as usize);
    Ok(ordered)
}

/// Cross-check a partial's echoed value vector against the pinned aggregate.
pub fn check_partial_consistency(
    partial: &PartialDecryption,
    aggregate: &CiphertextVector,
) -> Result<()> {
    if partial.partial_values.len() != aggregate.len() {
        return Err(Error::TallyInconsistent(format!(
            "partial {} covers {} components, aggregate has {}",
            partial.decryption_id,
            partial.partial_values.len(),
            aggregate.len()
        )));
    }
    for (observed, pinned) in partial.partial_values.iter().zip(aggregate.values()) {
        if observed != &pinned.to_string() {
            return Err(Error::TallyInconsistent(format!(
                "partial {} observed a different aggregate than the pinned one",
                partial.decryption_id
            )));
        }
    }
    Ok(())
}

/// Combine selected partials into the plaintext vector.
///
/// Reconstructs the key handle from the carried share points, dereferences
/// it against the vaulted key material, and decrypts the aggregate. A
/// handle mismatch means the shares and the vault disagree about which key
/// this election uses, which is fatal to the session.
pub fn combine(
    selected: &[&PartialDecryption],
    threshold: u32,
    key_material: &str,
    aggregate: &CiphertextVector,
) -> Result<Vec<BigUint>> {
    let points = selected
        .iter()
        .map(|partial| {
            let value = partial.share_value.parse::<BigUint>().map_err(|_| {
                Error::InvalidArgument(format!(
                    "partial {} carries a malformed share value",
                    partial.decryption_id
                ))
            })?;
            Ok((partial.trustee_index, value))
        })
        .collect::<Result<Vec<_>>>()?;

    let handle = shamir::reconstruct(&points, threshold)?;
    let expected = shamir::hash_to_field(key_material.as_bytes());
    if handle != expected {
        return Err(Error::TallyInconsistent(
            "reconstructed key handle does not match the election key".into(),
        ));
    }

    let private_key = PrivateKey::from_material(key_material)?;
    aggregate
        .values()
        .iter()
        .map(|c| private_key.decrypt(c))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::crypto::paillier::Keypair;
    use num_traits::ToPrimitive;

    fn partial_for(share: &shamir::Share, aggregate: &CiphertextVector) -> PartialDecryption {
        PartialDecryption {
            decryption_id: Uuid::new_v4(),
            election_id: Uuid::nil(),
            trustee_id: Uuid::new_v4(),
            trustee_index: share.index,
            share_value: share.value.to_string(),
            partial_values: aggregate.values().iter().map(|v| v.to_string()).collect(),
            proof: "proof".into(),
            verified: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_combine_matches_direct_decryption() {
        let mut rng = rand::thread_rng();
        let keypair = Keypair::generate(&mut rng, 128).unwrap();
        let material = keypair.private.to_material();
        let shares = shamir::split(&mut rng, material.as_bytes(), 3, 5).unwrap();

        let workers = rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap();
        let ballots: Vec<_> = [0usize, 1, 0]
            .iter()
            .map(|&c| CiphertextVector::encode_one_hot(&keypair.public, &mut rng, c, 2).unwrap())
            .collect();
        let aggregate = codec::aggregate(&keypair.public, &workers, &ballots, 2).unwrap();

        let direct: Vec<BigUint> = aggregate
            .values()
            .iter()
            .map(|c| keypair.private.decrypt(c).unwrap())
            .collect();

        // Every size-3 window of trustees combines to the same plaintext.
        for window in shares.windows(3) {
            let partials: Vec<_> = window.iter().map(|s| partial_for(s, &aggregate)).collect();
            let selected: Vec<&PartialDecryption> = partials.iter().collect();
            let combined = combine(&selected, 3, &material, &aggregate).unwrap();
            assert_eq!(combined, direct);
        }
        assert_eq!(
            direct.iter().map(|v| v.to_u64().unwrap()).collect::<Vec<_>>(),
            vec![2, 1]
        );
    }

    #[test]
    fn test_combine_detects_wrong_key_material() {
        let mut rng = rand::thread_rng();
        let keypair = Keypair::generate(&mut rng, 128).unwrap();
        let other = Keypair::generate(&mut rng, 128).unwrap();
        let material = keypair.private.to_material();
        let shares = shamir::split(&mut rng, material.as_bytes(), 2, 3).unwrap();

        let aggregate = CiphertextVector::encode_one_hot(&keypair.public, &mut rng, 0, 2).unwrap();
        let partials: Vec<_> = shares[..2]
            .iter()
            .map(|s| partial_for(s, &aggregate))
            .collect();
        let selected: Vec<&PartialDecryption> = partials.iter().collect();

        let err = combine(&selected, 2, &other.private.to_material(), &aggregate).unwrap_err();
        assert!(matches!(err, Error::TallyInconsistent(_)));
    }

    #[test]
    fn test_selection_is_deterministic() {
        let mut rng = rand::thread_rng();
        let keypair = Keypair::generate(&mut rng, 128).unwrap();
        let material = keypair.private.to_material();
        let shares = shamir::split(&mut rng, material.as_bytes(), 2, 4).unwrap();
        let aggregate = CiphertextVector::encode_one_hot(&keypair.public, &mut rng, 0, 1).unwrap();

        // Insert out of order; selection must still pick indices 1 and 2.
        let partials: Vec<_> = [3usize, 0, 2, 1]
            .iter()
            .map(|&i| partial_for(&shares[i], &aggregate))
            .collect();
        let selected = select_partials(&partials, 2).unwrap();
        assert_eq!(selected[0].trustee_index, 1);
        assert_eq!(selected[1].trustee_index, 2);

        assert!(matches!(
            select_partials(&partials[..1], 2),
            Err(Error::InsufficientTrustees { .. })
        ));
    }

    #[test]
    fn test_partial_consistency_check() {
        let mut rng = rand::thread_rng();
        let keypair = Keypair::generate(&mut rng, 128).unwrap();
        let material = keypair.private.to_material();
        let shares = shamir::split(&mut rng, material.as_bytes(), 2, 2).unwrap();
        let aggregate = CiphertextVector::encode_one_hot(&keypair.public, &mut rng, 0, 2).unwrap();

        let good = partial_for(&shares[0], &aggregate);
        assert!(check_partial_consistency(&good, &aggregate).is_ok());

        let mut tampered = partial_for(&shares[1], &aggregate);
        tampered.partial_values[0] = "12345".into();
        assert!(matches!(
            check_partial_consistency(&tampered, &aggregate),
            Err(Error::TallyInconsistent(_))
        ));
    }

    #[test]
    fn test_proof_is_stable_for_fixed_inputs() {
        let trustee = Uuid::new_v4();
        let now = Utc::now();
        let a = decryption_proof(&trustee, "digest", now);
        let b = decryption_proof(&trustee, "digest", now);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, decryption_proof(&trustee, "other", now));
    }
}
