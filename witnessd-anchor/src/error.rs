/// Alias for `core::result::Result<T, Error>`.
pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for anchor submission, verification, and registry
/// orchestration.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A single provider's submission or verification attempt failed.
    #[error("provider {provider} failed: {message}")]
    ProviderFailed {
        /// The provider's configured name.
        provider: String,
        /// What went wrong.
        message: String,
    },
    /// `commit` was attempted with every enabled provider failing.
    #[error("all {0} anchor providers failed")]
    AllAnchorsFailed(usize),
    /// An HTTP transport error talking to a provider.
    #[error("anchor transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// A malformed or unparseable provider response.
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
    /// A structural or cryptographic verification failure.
    #[error("anchor proof invalid: {0}")]
    ProofInvalid(String),
    /// The batch Merkle tree was asked to prove a leaf it doesn't contain.
    #[error("leaf index {0} out of range for batch of size {1}")]
    LeafOutOfRange(usize, usize),
    /// `commit_with_retry` exhausted its retry budget.
    #[error("exhausted {0} retries")]
    RetriesExhausted(u32),
    /// A submission or verification call was cancelled.
    #[error("anchor operation cancelled")]
    Cancelled,
    /// Invalid registry or provider configuration.
    #[error("invalid anchor configuration: {0}")]
    InvalidConfig(String),
}
