//! Secure event log: a tamper-evident, MAC-chained record of per-file
//! checkpoint events backed by an embedded SQLite store.
//!
//! [`EventLog::open`] runs [`EventLog::verify_integrity`] before returning;
//! a tampered store opens successfully but degrades to read-only rather
//! than erroring, per the open-time failure model.

#![warn(missing_docs)]

mod error;
mod hashing;
mod schema;
mod store;
mod types;

pub use error::{Error, Result};
pub use store::EventLog;
pub use types::{
    ContentHash, DeviceId, EventHash, EventLogConfig, IntegrityRecord, SecureEvent, Timestamp,
};
