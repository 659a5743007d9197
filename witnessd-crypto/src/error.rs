/// Alias for `core::result::Result<T, Error>`.
pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for `witnessd-crypto` operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A hex string did not decode to the expected number of bytes.
    #[error("invalid hex length: expected {expected} bytes, got {actual}")]
    InvalidHexLength {
        /// expected byte length
        expected: usize,
        /// actual decoded byte length
        actual: usize,
    },
    /// A hex string contained non-hex characters.
    #[error("invalid hex encoding: {0}")]
    InvalidHex(#[from] hex::FromHexError),
    /// Ed25519 key or signature bytes were malformed.
    #[error("invalid ed25519 key material: {0}")]
    InvalidKeyMaterial(String),
    /// Ed25519 signature verification failed.
    #[error("signature verification failed")]
    SignatureInvalid,
}
