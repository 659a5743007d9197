/// Alias for `core::result::Result<T, Error>`.
pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for secure event log operations, mapping onto the
/// `ChainBroken`/`ReadOnly`/`NotFound` rows of the evidentiary-engine error
/// taxonomy.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The underlying SQLite store returned an error.
    #[error("event log store error: {0}")]
    Sql(#[from] rusqlite::Error),
    /// Open-time `verify_integrity` detected a tamper: a hash/MAC mismatch
    /// or a broken `previous_hash` link.
    #[error("event log chain integrity check failed: {0}")]
    ChainBroken(String),
    /// A write was attempted on a log that failed its open-time integrity
    /// check and has degraded to read-only.
    #[error("event log is read-only: integrity check failed at open")]
    ReadOnly,
    /// No event matched the query.
    #[error("no secure event found for path {0}")]
    NotFound(String),
    /// Invalid input parameters.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}
