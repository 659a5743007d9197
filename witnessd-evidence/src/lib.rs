//! Evidence packets: a self-contained, offline-verifiable JSON document
//! covering a file's full checkpoint history, and the four-level
//! verification pipeline ([`verifier::Level::Quick`] through
//! [`verifier::Level::Paranoid`]) that grades one.

#![warn(missing_docs)]

pub mod classify;
mod error;
pub mod packet;
pub mod verifier;

pub use classify::EvidenceClass;
pub use error::{Error, Result};
pub use packet::EvidencePacket;
pub use verifier::{verify, ComponentResult, Level, Status, VerificationReport, VerifyOptions};
