/// Alias for `core::result::Result<T, Error>`.
pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for VDF computation and verification.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// `proof.iterations` fell outside `[min_iterations, max_iterations]`.
    #[error("iteration count {actual} out of bounds [{min}, {max}]")]
    OutOfBounds { actual: u64, min: u64, max: u64 },
    /// Recomputing the hash chain produced a different output than claimed.
    #[error("VDF output does not match recomputed chain")]
    OutputMismatch,
    /// Full verification was cancelled before it could complete.
    #[error("VDF verification cancelled")]
    Cancelled,
    /// Full verification exceeded its allotted timeout.
    #[error("VDF verification timed out")]
    TimedOut,
    /// Invalid parameters (e.g. `min_iterations > max_iterations`).
    #[error("invalid VDF parameters: {0}")]
    InvalidParameters(String),
}
