//! Shared cryptographic primitives for witnessd: domain-separated Blake3
//! hashing, HMAC-SHA256 MACs, and Ed25519 signing.
//!
//! Downstream crates (`witnessd-mmr`, `witnessd-eventlog`, `witnessd-vdf`,
//! `witnessd-anchor`, `witnessd-evidence`) depend on this crate instead of
//! reaching for `blake3`/`hmac`/`ed25519-dalek` directly, so that domain
//! tags stay centralized and auditable in one place.

mod error;
pub mod hash;
pub mod mac;
pub mod signing;

pub use error::{Error, Result};
