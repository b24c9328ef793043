//! Protocol constants and audit operation names

use num_bigint::BigUint;
use num_traits::One;

/// Miller-Rabin rounds used for every primality check.
pub const MILLER_RABIN_ROUNDS: usize = 40;

/// Minimum Paillier modulus size accepted by the key generator, in bits.
/// Production deployments are held to a higher floor by [`crate::config`].
pub const MIN_PAILLIER_BITS: u64 = 64;

/// Prime field for Shamir secret sharing:
/// q = 2^256 - 2^224 + 2^192 + 2^96 - 1.
///
/// Larger than any 256-bit key handle being shared; fixed by the wire format.
pub fn shamir_field_prime() -> BigUint {
    (BigUint::one() << 256u32) - (BigUint::one() << 224u32)
        + (BigUint::one() << 192u32)
        + (BigUint::one() << 96u32)
        - BigUint::one()
}

/// Operation names recorded in audit entries.
pub mod operations {
    pub const CREATE_ELECTION: &str = "create_election";
    pub const REGISTER_TRUSTEE: &str = "register_trustee";
    pub const ISSUE_KEY_SHARES: &str = "issue_key_shares";
    pub const SUBMIT_BALLOT: &str = "submit_ballot";
    pub const START_TALLY: &str = "start_tally";
    pub const PARTIAL_DECRYPT: &str = "partial_decrypt";
    pub const FINALIZE_TALLY: &str = "finalize_tally";
}

/// Actor recorded for operations not attributable to a trustee.
pub const SYSTEM_ACTOR: &str = "system";
