//! VeilTally - Privacy-Preserving Tallying Core
//!
//! The cryptographic tallying pipeline of an electronic voting platform:
//! ballots are encrypted as one-hot Paillier ciphertext vectors, aggregated
//! homomorphically, and decrypted only through cooperation of a threshold of
//! trustees holding Shamir shares of the decryption key handle. Final
//! per-candidate counts are published together with a verification digest any
//! observer can recompute.
//!
//! Transport bindings (HTTP or otherwise) and durable storage engines live
//! outside this crate; see the [`store`] port for the persistence contract.

pub mod codec;
pub mod config;
pub mod constants;
pub mod context;
pub mod crypto;
pub mod digest;
pub mod errors;
pub mod ops;
pub mod state;
pub mod store;

pub use config::TallyConfig;
pub use context::AppContext;
pub use errors::{Error, Result};
