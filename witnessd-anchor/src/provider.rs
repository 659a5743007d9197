//! The pluggable external-timestamp provider contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// A timestamp provider's closed tag set, used to pick verification policy
/// at degrade-to-structural-only time (§4.4 "unknown providers at verify
/// time degrade to structural-only verification").
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// RFC 3161 trusted timestamping authority.
    Rfc3161,
    /// OpenTimestamps calendar server.
    OpenTimestamps,
    /// Direct or batched blockchain anchoring.
    Blockchain,
    /// Drand-style randomness beacon (stub).
    Beacon,
}

/// The result of a successful submission to one provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnchorRecord {
    /// Which provider produced this record.
    pub provider: ProviderKind,
    /// The provider's configured name (distinguishes multiple instances of
    /// the same kind, e.g. two RFC-3161 TSAs).
    pub provider_name: String,
    /// The fingerprint this record anchors.
    pub hash: [u8; 32],
    /// Opaque, provider-specific proof bytes (DER timestamp token, OTS
    /// file, batch inclusion proof encoding, …).
    pub proof: Vec<u8>,
    /// Whether the anchor has reached its provider's notion of "confirmed"
    /// (e.g. a Bitcoin block commitment for OpenTimestamps).
    pub confirmed: bool,
    /// When the record was created locally.
    pub submitted_at: DateTime<Utc>,
}

/// A single external timestamp provider.
///
/// `upgrade` is a capability method: most providers return `Ok(None)` by
/// default (nothing to upgrade), and only OpenTimestamps-style providers
/// override it to poll for a stronger commitment.
#[async_trait]
pub trait AnchorProvider: Send + Sync {
    /// The provider kind, for registry bookkeeping and verify-time fallback.
    fn kind(&self) -> ProviderKind;

    /// A human-readable name distinguishing this provider instance.
    fn name(&self) -> &str;

    /// Submit `hash` for anchoring, returning the resulting record.
    async fn submit(&self, hash: [u8; 32], cancel: &CancellationToken) -> Result<AnchorRecord>;

    /// Re-check a previously submitted record for a stronger commitment.
    ///
    /// Returns `Ok(None)` if this provider has nothing new to report.
    async fn upgrade(&self, record: &AnchorRecord, cancel: &CancellationToken) -> Result<Option<AnchorRecord>> {
        let _ = (record, cancel);
        Ok(None)
    }

    /// Verify `record` structurally (and, where the provider supports it,
    /// against external state such as a blockchain transaction).
    async fn verify(&self, record: &AnchorRecord) -> Result<bool>;
}
