/// Alias for `core::result::Result<T, Error>`.
pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for MMR operations, mapping onto the shared
/// evidentiary-engine taxonomy (`InvalidInput`, `CorruptedStore`,
/// `ProofInvalid`).
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Tried to compute the root hash of an empty MMR.
    #[error("cannot compute root of an empty MMR")]
    GetRootOnEmpty,
    /// The backing store returned data inconsistent with the expected MMR
    /// geometry (a position that should exist returned `None`).
    #[error("inconsistent MMR store: missing node at expected position")]
    InconsistentStore,
    /// An error propagated from the underlying storage layer (I/O failure).
    #[error("MMR store error: {0}")]
    StoreError(String),
    /// The node file is not a multiple of the fixed 41-byte record size.
    #[error("corrupted MMR store: file size {0} is not a multiple of 41")]
    CorruptedStore(u64),
    /// A node's on-disk index did not match its expected position.
    #[error("corrupted MMR store: node at position {expected} has index {actual}")]
    IndexMismatch {
        /// the position read from
        expected: u64,
        /// the index stored in the record
        actual: u64,
    },
    /// Requested a proof for a position that is not a leaf.
    #[error("position {0} is not a leaf (height > 0)")]
    NotALeaf(u64),
    /// The requested position is out of range for the current MMR size.
    #[error("position {0} out of range for MMR of size {1}")]
    OutOfRange(u64, u64),
    /// A requested leaf range spans more than one peak; unsupported by
    /// `generate_range_proof` (spec: "Single-peak result").
    #[error("leaf range [{0}, {1}) spans more than one MMR peak")]
    RangeSpansMultiplePeaks(u64, u64),
    /// Invalid input parameters (empty position list, inverted range, etc).
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Proof recomputation did not match the claimed root/peak.
    #[error("proof invalid: {0}")]
    ProofInvalid(String),
}
