//! Core configuration
//!
//! All knobs are environment-driven; [`TallyConfig::from_env`] applies the
//! documented defaults and validates ranges before any key material is
//! generated.

use serde::Deserialize;

use crate::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct TallyConfig {
    /// PostgreSQL database URL. Only required by the durable store adapter;
    /// the in-memory adapter ignores it.
    pub database_url: Option<String>,

    /// Paillier modulus size in bits (two safe primes of half this size).
    pub paillier_key_bits: u64,

    /// Trustees required to decrypt (t of n).
    pub threshold_t: u32,

    /// Total trustees holding key shares (n).
    pub threshold_n: u32,

    /// Worker threads for CPU-bound ciphertext aggregation.
    pub worker_parallelism: usize,

    /// Reject non-integer counts during digest canonicalization instead of
    /// coercing integral floats.
    pub canonical_json_strict: bool,
}

impl Default for TallyConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            paillier_key_bits: 2048,
            threshold_t: 3,
            threshold_n: 5,
            worker_parallelism: default_parallelism(),
            canonical_json_strict: true,
        }
    }
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl TallyConfig {
    /// Build configuration from the environment, falling back to defaults.
    ///
    /// Recognized variables: `DATABASE_URL`, `PAILLIER_KEY_BITS`,
    /// `THRESHOLD_T`, `THRESHOLD_N`, `WORKER_PARALLELISM`,
    /// `CANONICAL_JSON_STRICT`.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            database_url: std::env::var("DATABASE_URL").ok(),
            paillier_key_bits: read_var("PAILLIER_KEY_BITS", defaults.paillier_key_bits)?,
            threshold_t: read_var("THRESHOLD_T", defaults.threshold_t)?,
            threshold_n: read_var("THRESHOLD_N", defaults.threshold_n)?,
            worker_parallelism: read_var("WORKER_PARALLELISM", defaults.worker_parallelism)?,
            canonical_json_strict: read_var(
                "CANONICAL_JSON_STRICT",
                defaults.canonical_json_strict,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Range checks for environment-provided values.
    pub fn validate(&self) -> Result<()> {
        if self.paillier_key_bits < 1024 || self.paillier_key_bits % 2 != 0 {
            return Err(Error::InvalidArgument(format!(
                "PAILLIER_KEY_BITS must be even and >= 1024, got {}",
                self.paillier_key_bits
            )));
        }
        self.validate_threshold()?;
        if self.worker_parallelism == 0 {
            return Err(Error::InvalidArgument(
                "WORKER_PARALLELISM must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Threshold sanity alone; used by tests that shrink key sizes.
    pub fn validate_threshold(&self) -> Result<()> {
        if self.threshold_t < 1 || self.threshold_t > self.threshold_n {
            return Err(Error::InvalidArgument(format!(
                "THRESHOLD_T must satisfy 1 <= T <= N, got T={} N={}",
                self.threshold_t, self.threshold_n
            )));
        }
        Ok(())
    }
}

fn read_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| Error::InvalidArgument(format!("{name} has an unparseable value"))),
        Err(_) => Ok(default),
    }
}
