//! Cryptographic utilities: canonical hashing and Ed25519 wallet signatures.

mod hash;
mod signing;

pub use hash::*;
pub use signing::*;
