/// Alias for `core::result::Result<T, Error>`.
pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for evidence packet construction and verification.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A packet field failed basic structural validation (I8).
    #[error("evidence packet structure invalid: {0}")]
    InvalidStructure(String),
    /// A hex or base64 field in the wire format failed to decode.
    #[error("malformed packet field {field}: {reason}")]
    MalformedField {
        /// The field name that failed to decode.
        field: String,
        /// The decode error.
        reason: String,
    },
    /// JSON (de)serialization failure.
    #[error("evidence packet JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
