//! Cryptographic building blocks
//!
//! Layered bottom-up: [`arith`] supplies modular arithmetic over
//! arbitrary-precision integers, [`paillier`] the additively homomorphic
//! cryptosystem, [`shamir`] threshold secret sharing over a fixed prime
//! field, and [`threshold`] the orchestration glue that combines trustee
//! partials into a plaintext tally.

pub mod arith;
pub mod paillier;
pub mod shamir;
pub mod threshold;
