//! Modular arithmetic over arbitrary-precision unsigned integers
//!
//! Operands run to several thousand bits, so everything is built on
//! `num-bigint`. All operations are total: division by zero and
//! non-invertible inverses fail with `InvalidArgument` instead of panicking.

use num_bigint::{BigInt, BigUint, RandBigInt};
use num_integer::Integer;
use num_traits::{One, ToPrimitive, Zero};
use rand::Rng;

use crate::constants::MILLER_RABIN_ROUNDS;
use crate::{Error, Result};

/// Trial-division sieve applied before any Miller-Rabin round.
const SMALL_PRIMES: [u64; 58] = [
    3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71, 73, 79, 83, 89, 97,
    101, 103, 107, 109, 113, 127, 131, 137, 139, 149, 151, 157, 163, 167, 173, 179, 181, 191, 193,
    197, 199, 211, 223, 227, 229, 233, 239, 241, 251, 257, 263, 269, 271, 277,
];

/// (a * b) mod m.
pub fn mod_mul(a: &BigUint, b: &BigUint, m: &BigUint) -> Result<BigUint> {
    ensure_nonzero_modulus(m)?;
    Ok((a * b) % m)
}

/// base^exp mod m via square-and-multiply.
pub fn mod_exp(base: &BigUint, exp: &BigUint, m: &BigUint) -> Result<BigUint> {
    ensure_nonzero_modulus(m)?;
    Ok(base.modpow(exp, m))
}

/// Modular inverse of `a` modulo `m` via the extended Euclidean algorithm.
///
/// Fails with `InvalidArgument` when gcd(a, m) != 1.
pub fn mod_inverse(a: &BigUint, m: &BigUint) -> Result<BigUint> {
    ensure_nonzero_modulus(m)?;
    let modulus = BigInt::from(m.clone());
    let mut r0 = modulus.clone();
    let mut r1 = BigInt::from(a.clone()) % &modulus;
    let mut t0 = BigInt::zero();
    let mut t1 = BigInt::one();

    while !r1.is_zero() {
        let q = &r0 / &r1;
        let r2 = &r0 - &q * &r1;
        r0 = std::mem::replace(&mut r1, r2);
        let t2 = &t0 - &q * &t1;
        t0 = std::mem::replace(&mut t1, t2);
    }

    if !r0.is_one() {
        return Err(Error::InvalidArgument(
            "value is not invertible modulo the given modulus".into(),
        ));
    }
    t0.mod_floor(&modulus)
        .to_biguint()
        .ok_or_else(|| Error::Internal("inverse normalization produced a negative value".into()))
}

/// Jacobi symbol (a / n) for odd positive n.
pub fn jacobi(a: &BigUint, n: &BigUint) -> Result<i8> {
    if n.is_zero() || n.is_even() {
        return Err(Error::InvalidArgument(
            "Jacobi symbol requires an odd positive modulus".into(),
        ));
    }
    let mut a = a % n;
    let mut n = n.clone();
    let mut result: i8 = 1;
    let three = BigUint::from(3u32);

    while !a.is_zero() {
        while a.is_even() {
            a >>= 1u32;
            let residue = (&n % BigUint::from(8u32)).to_u32().unwrap_or(0);
            if residue == 3 || residue == 5 {
                result = -result;
            }
        }
        std::mem::swap(&mut a, &mut n);
        if (&a % BigUint::from(4u32)) == three && (&n % BigUint::from(4u32)) == three {
            result = -result;
        }
        a = &a % &n;
    }

    if n.is_one() {
        Ok(result)
    } else {
        Ok(0)
    }
}

/// Miller-Rabin primality test with `rounds` random witnesses.
pub fn is_probable_prime<R: Rng + ?Sized>(rng: &mut R, n: &BigUint, rounds: usize) -> bool {
    let two = BigUint::from(2u32);
    if n < &two {
        return false;
    }
    if n == &two || n == &three() {
        return true;
    }
    if n.is_even() {
        return false;
    }
    for p in SMALL_PRIMES {
        let p = BigUint::from(p);
        if *n == p {
            return true;
        }
        if (n % &p).is_zero() {
            return false;
        }
    }

    // n - 1 = d * 2^s with d odd
    let n_minus_one = n - BigUint::one();
    let s = n_minus_one.trailing_zeros().unwrap_or(0);
    let d = &n_minus_one >> s;

    'witness: for _ in 0..rounds {
        let a = rng.gen_biguint_range(&two, &n_minus_one);
        let mut x = a.modpow(&d, n);
        if x.is_one() || x == n_minus_one {
            continue;
        }
        for _ in 1..s {
            x = x.modpow(&two, n);
            if x == n_minus_one {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

/// Generate a random prime of exactly `bits` bits.
pub fn gen_prime<R: Rng + ?Sized>(rng: &mut R, bits: u64) -> Result<BigUint> {
    if bits < 8 {
        return Err(Error::InvalidArgument(format!(
            "prime size must be at least 8 bits, got {bits}"
        )));
    }
    loop {
        let mut candidate = rng.gen_biguint(bits);
        candidate |= BigUint::one() << (bits - 1);
        candidate |= BigUint::one();
        if passes_sieve(&candidate) && is_probable_prime(rng, &candidate, MILLER_RABIN_ROUNDS) {
            return Ok(candidate);
        }
    }
}

/// Generate a safe prime p = 2q + 1 of exactly `bits` bits, with q prime.
pub fn gen_safe_prime<R: Rng + ?Sized>(rng: &mut R, bits: u64) -> Result<BigUint> {
    if bits < 16 {
        return Err(Error::InvalidArgument(format!(
            "safe prime size must be at least 16 bits, got {bits}"
        )));
    }
    loop {
        let mut q = rng.gen_biguint(bits - 1);
        // Top two bits set: a product of two such primes keeps exact double width.
        q |= BigUint::one() << (bits - 2);
        q |= BigUint::one() << (bits - 3);
        q |= BigUint::one();
        let p = (&q << 1u32) + BigUint::one();

        // Sieve both halves before paying for Miller-Rabin.
        if !passes_sieve(&q) || !passes_sieve(&p) {
            continue;
        }
        if is_probable_prime(rng, &q, MILLER_RABIN_ROUNDS)
            && is_probable_prime(rng, &p, MILLER_RABIN_ROUNDS)
        {
            return Ok(p);
        }
    }
}

fn passes_sieve(n: &BigUint) -> bool {
    for p in SMALL_PRIMES {
        let p = BigUint::from(p);
        if (n % &p).is_zero() && *n != p {
            return false;
        }
    }
    true
}

fn three() -> BigUint {
    BigUint::from(3u32)
}

fn ensure_nonzero_modulus(m: &BigUint) -> Result<()> {
    if m.is_zero() {
        return Err(Error::InvalidArgument("modulus must be nonzero".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mod_exp_matches_known_values() {
        let base = BigUint::from(4u32);
        let exp = BigUint::from(13u32);
        let m = BigUint::from(497u32);
        assert_eq!(mod_exp(&base, &exp, &m).unwrap(), BigUint::from(445u32));
    }

    #[test]
    fn test_zero_modulus_rejected() {
        let one = BigUint::one();
        assert!(mod_exp(&one, &one, &BigUint::zero()).is_err());
        assert!(mod_mul(&one, &one, &BigUint::zero()).is_err());
        assert!(mod_inverse(&one, &BigUint::zero()).is_err());
    }

    #[test]
    fn test_mod_inverse_roundtrip() {
        let m = BigUint::from(65537u32);
        for a in [2u32, 3, 17, 65535] {
            let a = BigUint::from(a);
            let inv = mod_inverse(&a, &m).unwrap();
            assert_eq!((a * inv) % &m, BigUint::one());
        }
    }

    #[test]
    fn test_mod_inverse_of_non_coprime_fails() {
        let a = BigUint::from(6u32);
        let m = BigUint::from(9u32);
        assert!(matches!(
            mod_inverse(&a, &m),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_jacobi_known_values() {
        // (1/1) = 1, (2/7) = 1, (3/7) = -1, (7/21) = 0
        assert_eq!(
            jacobi(&BigUint::from(2u32), &BigUint::from(7u32)).unwrap(),
            1
        );
        assert_eq!(
            jacobi(&BigUint::from(3u32), &BigUint::from(7u32)).unwrap(),
            -1
        );
        assert_eq!(
            jacobi(&BigUint::from(7u32), &BigUint::from(21u32)).unwrap(),
            0
        );
        assert!(jacobi(&BigUint::from(3u32), &BigUint::from(8u32)).is_err());
    }

    #[test]
    fn test_miller_rabin_classifies_known_numbers() {
        let mut rng = rand::thread_rng();
        for p in [2u32, 3, 5, 104729, 65537] {
            assert!(is_probable_prime(&mut rng, &BigUint::from(p), 40), "{p}");
        }
        for c in [1u32, 4, 561, 104730, 65536] {
            assert!(!is_probable_prime(&mut rng, &BigUint::from(c), 40), "{c}");
        }
    }

    #[test]
    fn test_gen_prime_has_exact_size() {
        let mut rng = rand::thread_rng();
        let p = gen_prime(&mut rng, 64).unwrap();
        assert_eq!(p.bits(), 64);
        assert!(is_probable_prime(&mut rng, &p, 40));
    }

    #[test]
    fn test_gen_safe_prime_structure() {
        let mut rng = rand::thread_rng();
        let p = gen_safe_prime(&mut rng, 64).unwrap();
        assert_eq!(p.bits(), 64);
        assert!(is_probable_prime(&mut rng, &p, 40));
        let q = (&p - BigUint::one()) >> 1u32;
        assert!(is_probable_prime(&mut rng, &q, 40));
    }
}
