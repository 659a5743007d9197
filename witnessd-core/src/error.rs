/// Alias for `core::result::Result<T, Error>`.
pub type Result<T> = core::result::Result<T, Error>;

/// The engine's aggregated error type: each sub-crate's error comes through
/// unchanged via `#[from]`, plus the handful of failure modes that belong
/// to orchestration itself (state directory setup, key material, commit
/// preconditions).
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An MMR operation failed.
    #[error(transparent)]
    Mmr(#[from] witnessd_mmr::Error),
    /// A secure event log operation failed.
    #[error(transparent)]
    EventLog(#[from] witnessd_eventlog::Error),
    /// A VDF computation or verification failed.
    #[error(transparent)]
    Vdf(#[from] witnessd_vdf::Error),
    /// An anchor registry operation failed.
    #[error(transparent)]
    Anchor(#[from] witnessd_anchor::Error),
    /// An evidence packet operation failed.
    #[error(transparent)]
    Evidence(#[from] witnessd_evidence::Error),
    /// A cryptographic primitive (signing, key loading) failed.
    #[error(transparent)]
    Crypto(#[from] witnessd_crypto::Error),
    /// The state directory could not be created or validated.
    #[error("state directory error: {0}")]
    StateDir(String),
    /// An I/O failure reading or writing state-directory files.
    #[error("state directory I/O error performing {operation}: {source}")]
    Io {
        /// What the engine was trying to do.
        operation: &'static str,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Invalid engine configuration supplied by the embedder.
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),
    /// `commit` was attempted against a read-only event log.
    #[error("commit refused: event log is read-only after a failed integrity check")]
    ReadOnly,
}
