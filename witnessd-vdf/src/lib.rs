//! Verifiable delay function: a sequential hash chain that binds a minimum
//! wall-clock elapsed time to a proof, independent of parallel hardware.
//!
//! [`proof::compute`] runs the chain and measures elapsed time;
//! [`verifier::verify`] re-executes it (or merely bounds-checks it, under
//! [`verifier::Strategy::Quick`]) to confirm the claim.

#![warn(missing_docs)]

mod error;
mod params;
mod proof;
mod verifier;

pub use error::{Error, Result};
pub use params::Parameters;
pub use proof::{compute, min_elapsed, quick_verify, verify, Proof};
pub use verifier::{verify as verify_async, verify_batch, Strategy};
