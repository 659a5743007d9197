//! External timestamp anchoring: submits a 32-byte fingerprint to one or
//! more external providers (an RFC 3161 TSA, OpenTimestamps, a blockchain,
//! a randomness beacon) and verifies the proofs they return.
//!
//! [`registry::Registry`] fans a commit out across every enabled
//! [`provider::AnchorProvider`] concurrently; [`registry::RetryConfig`]
//! governs `commit_with_retry`'s exponential backoff.

#![warn(missing_docs)]

pub mod beacon;
pub mod blockchain;
pub mod der;
mod error;
pub mod merkle_batch;
pub mod ots;
pub mod provider;
pub mod registry;
pub mod tsa;

pub use error::{Error, Result};
pub use provider::{AnchorProvider, AnchorRecord, ProviderKind};
pub use registry::{CommitOutcome, Registry, RetryConfig};
