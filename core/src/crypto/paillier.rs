//! Paillier additively homomorphic cryptosystem
//!
//! Keys use safe primes p = 2p' + 1 and q = 2q' + 1 with n = pq and the
//! standard simplification g = n + 1, which makes the L-function trivial:
//! (1 + n)^m = 1 + mn (mod n^2). The choice of g is fixed and part of the
//! wire format.

use base64::Engine as _;
use num_bigint::{BigUint, RandBigInt};
use num_integer::Integer;
use num_traits::{One, Zero};
use rand::Rng;
use serde_json::json;

use crate::constants::MIN_PAILLIER_BITS;
use crate::crypto::arith;
use crate::{Error, Result};

/// Public half of a Paillier keypair: the modulus n (g = n + 1 is implied).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    n: BigUint,
    n_squared: BigUint,
}

/// Secret half: the prime factors plus the precomputed lambda and mu.
#[derive(Clone)]
pub struct PrivateKey {
    p: BigUint,
    q: BigUint,
    lambda: BigUint,
    mu: BigUint,
    public: PublicKey,
}

pub struct Keypair {
    pub public: PublicKey,
    pub private: PrivateKey,
}

impl PublicKey {
    pub fn new(n: BigUint) -> Self {
        let n_squared = &n * &n;
        Self { n, n_squared }
    }

    pub fn n(&self) -> &BigUint {
        &self.n
    }

    pub fn n_squared(&self) -> &BigUint {
        &self.n_squared
    }

    /// Modulus size in bits.
    pub fn bits(&self) -> u64 {
        self.n.bits()
    }

    /// Membership test for Z*_{n^2}: the domain of valid ciphertexts.
    pub fn contains_ciphertext(&self, c: &BigUint) -> bool {
        !c.is_zero() && c < &self.n_squared && c.gcd(&self.n_squared).is_one()
    }

    /// Encrypt m in [0, n) with fresh randomness r in Z*_n:
    /// c = (1 + mn) * r^n mod n^2.
    pub fn encrypt<R: Rng + ?Sized>(&self, rng: &mut R, m: &BigUint) -> Result<BigUint> {
        if m >= &self.n {
            return Err(Error::InvalidArgument(
                "plaintext must be less than the public modulus".into(),
            ));
        }
        let r = self.sample_unit(rng);
        let g_m = (BigUint::one() + m * &self.n) % &self.n_squared;
        let r_n = r.modpow(&self.n, &self.n_squared);
        arith::mod_mul(&g_m, &r_n, &self.n_squared)
    }

    /// Homomorphic addition: Dec(add(c1, c2)) = Dec(c1) + Dec(c2) mod n.
    pub fn add(&self, c1: &BigUint, c2: &BigUint) -> Result<BigUint> {
        self.check_range(c1)?;
        self.check_range(c2)?;
        arith::mod_mul(c1, c2, &self.n_squared)
    }

    /// Homomorphic scalar multiplication: Dec(scalar_mul(c, k)) = k * Dec(c) mod n.
    pub fn scalar_mul(&self, c: &BigUint, k: &BigUint) -> Result<BigUint> {
        self.check_range(c)?;
        arith::mod_exp(c, k, &self.n_squared)
    }

    fn check_range(&self, c: &BigUint) -> Result<()> {
        if c.is_zero() || c >= &self.n_squared {
            return Err(Error::InvalidCiphertext(
                "ciphertext outside [1, n^2)".into(),
            ));
        }
        Ok(())
    }

    /// Rejection-sample r uniform in Z*_n.
    fn sample_unit<R: Rng + ?Sized>(&self, rng: &mut R) -> BigUint {
        loop {
            let r = rng.gen_biguint_below(&self.n);
            if !r.is_zero() && r.gcd(&self.n).is_one() {
                return r;
            }
        }
    }
}

impl Keypair {
    /// Generate a keypair with an n of exactly `bits` bits from two safe
    /// primes of `bits / 2` each.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R, bits: u64) -> Result<Self> {
        if bits < MIN_PAILLIER_BITS || bits % 2 != 0 {
            return Err(Error::InvalidArgument(format!(
                "modulus size must be even and >= {MIN_PAILLIER_BITS} bits, got {bits}"
            )));
        }
        let prime_bits = bits / 2;
        let p = arith::gen_safe_prime(rng, prime_bits)?;
        let q = loop {
            let q = arith::gen_safe_prime(rng, prime_bits)?;
            if q != p {
                break q;
            }
        };
        let private = PrivateKey::from_primes(p, q)?;
        Ok(Self {
            public: private.public.clone(),
            private,
        })
    }
}

impl PrivateKey {
    /// Assemble a private key from its prime factors, precomputing
    /// lambda = lcm(p-1, q-1) and mu = lambda^-1 mod n.
    pub fn from_primes(p: BigUint, q: BigUint) -> Result<Self> {
        if p == q || p.is_one() || q.is_one() {
            return Err(Error::InvalidArgument(
                "private key requires two distinct primes".into(),
            ));
        }
        let n = &p * &q;
        let lambda = (&p - BigUint::one()).lcm(&(&q - BigUint::one()));
        let public = PublicKey::new(n);
        let mu = arith::mod_inverse(&lambda, public.n()).map_err(|_| {
            Error::Internal("generated key has a non-invertible lambda".into())
        })?;
        Ok(Self {
            p,
            q,
            lambda,
            mu,
            public,
        })
    }

    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    /// Decrypt c in Z*_{n^2}: m = L(c^lambda mod n^2) * mu mod n,
    /// where L(u) = (u - 1) / n.
    pub fn decrypt(&self, c: &BigUint) -> Result<BigUint> {
        if !self.public.contains_ciphertext(c) {
            return Err(Error::InvalidCiphertext(
                "ciphertext is not an element of Z*_{n^2}".into(),
            ));
        }
        let u = c.modpow(&self.lambda, self.public.n_squared());
        let l = l_function(&u, self.public.n())?;
        arith::mod_mul(&l, &self.mu, self.public.n())
    }

    /// Serialized key material: base64 of `{"p": <dec>, "q": <dec>}`.
    ///
    /// This string is what the key vault persists and what the Shamir handle
    /// commits to. It is never exposed by a read operation.
    pub fn to_material(&self) -> String {
        let payload = json!({
            "p": self.p.to_string(),
            "q": self.q.to_string(),
        });
        base64::engine::general_purpose::STANDARD.encode(payload.to_string())
    }

    pub fn from_material(material: &str) -> Result<Self> {
        let raw = base64::engine::general_purpose::STANDARD
            .decode(material)
            .map_err(|_| Error::InvalidArgument("key material is not valid base64".into()))?;
        let payload: serde_json::Value = serde_json::from_slice(&raw)
            .map_err(|_| Error::InvalidArgument("key material is not valid JSON".into()))?;
        let p = parse_field(&payload, "p")?;
        let q = parse_field(&payload, "q")?;
        Self::from_primes(p, q)
    }
}

// Keep prime factors out of accidental debug output.
impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKey")
            .field("n_bits", &self.public.bits())
            .finish_non_exhaustive()
    }
}

/// L(u) = (u - 1) / n; the division must be exact for valid inputs.
fn l_function(u: &BigUint, n: &BigUint) -> Result<BigUint> {
    let u_minus_one = u - BigUint::one();
    if !(&u_minus_one % n).is_zero() {
        return Err(Error::InvalidCiphertext(
            "L-function input is not congruent to 1 modulo n".into(),
        ));
    }
    Ok(u_minus_one / n)
}

fn parse_field(payload: &serde_json::Value, key: &str) -> Result<BigUint> {
    payload
        .get(key)
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<BigUint>().ok())
        .ok_or_else(|| Error::InvalidArgument(format!("key material is missing field `{key}`")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_keypair() -> Keypair {
        let mut rng = rand::thread_rng();
        Keypair::generate(&mut rng, 128).unwrap()
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let mut rng = rand::thread_rng();
        let keypair = test_keypair();
        let messages = [
            BigUint::zero(),
            BigUint::one(),
            BigUint::from(123456u64),
            keypair.public.n() - BigUint::one(),
        ];
        for m in messages {
            let c = keypair.public.encrypt(&mut rng, &m).unwrap();
            assert_eq!(keypair.private.decrypt(&c).unwrap(), m);
        }
    }

    #[test]
    fn test_homomorphic_add() {
        let mut rng = rand::thread_rng();
        let keypair = test_keypair();
        let m1 = BigUint::from(100u64);
        let m2 = BigUint::from(50u64);

        let c1 = keypair.public.encrypt(&mut rng, &m1).unwrap();
        let c2 = keypair.public.encrypt(&mut rng, &m2).unwrap();
        let sum = keypair.public.add(&c1, &c2).unwrap();

        assert_eq!(
            keypair.private.decrypt(&sum).unwrap(),
            (&m1 + &m2) % keypair.public.n()
        );
    }

    #[test]
    fn test_scalar_mul() {
        let mut rng = rand::thread_rng();
        let keypair = test_keypair();
        let m = BigUint::from(21u64);
        let k = BigUint::from(3u64);

        let c = keypair.public.encrypt(&mut rng, &m).unwrap();
        let scaled = keypair.public.scalar_mul(&c, &k).unwrap();
        assert_eq!(
            keypair.private.decrypt(&scaled).unwrap(),
            BigUint::from(63u64)
        );
    }

    #[test]
    fn test_encrypt_rejects_oversized_plaintext() {
        let mut rng = rand::thread_rng();
        let keypair = test_keypair();
        let too_big = keypair.public.n().clone();
        assert!(matches!(
            keypair.public.encrypt(&mut rng, &too_big),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_decrypt_rejects_out_of_group_ciphertexts() {
        let keypair = test_keypair();
        // Outside [1, n^2)
        assert!(matches!(
            keypair.private.decrypt(&BigUint::zero()),
            Err(Error::InvalidCiphertext(_))
        ));
        assert!(keypair
            .private
            .decrypt(keypair.public.n_squared())
            .is_err());
        // Multiple of n shares a factor with n^2
        assert!(matches!(
            keypair.private.decrypt(keypair.public.n()),
            Err(Error::InvalidCiphertext(_))
        ));
    }

    #[test]
    fn test_keypair_rejects_bad_sizes() {
        let mut rng = rand::thread_rng();
        assert!(Keypair::generate(&mut rng, 63).is_err());
        assert!(Keypair::generate(&mut rng, 62).is_err());
    }

    #[test]
    fn test_key_material_roundtrip() {
        let mut rng = rand::thread_rng();
        let keypair = test_keypair();
        let material = keypair.private.to_material();
        let restored = PrivateKey::from_material(&material).unwrap();
        assert_eq!(restored.public(), keypair.private.public());

        let m = BigUint::from(7u64);
        let c = keypair.public.encrypt(&mut rng, &m).unwrap();
        assert_eq!(restored.decrypt(&c).unwrap(), m);
    }

    #[test]
    fn test_key_material_rejects_garbage() {
        assert!(PrivateKey::from_material("not base64!!!").is_err());
        let garbage = base64::engine::general_purpose::STANDARD.encode("{\"p\": \"abc\"}");
        assert!(PrivateKey::from_material(&garbage).is_err());
    }
}
