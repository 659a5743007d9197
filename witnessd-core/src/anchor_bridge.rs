//! The seam between `witnessd_anchor`'s submission records and the
//! evidence packet's `AnchorReference` wire shape (spec §6). Both a
//! direct registry submission and a flushed blockchain batch entry end up
//! here on their way into a checkpoint or a packet's external anchors.

use witnessd_anchor::{AnchorRecord, ProviderKind};
use witnessd_evidence::packet::AnchorReference;

/// The lowercase provider tag the packet wire format and its verifier
/// agree on.
pub fn provider_tag(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::Rfc3161 => "rfc3161",
        ProviderKind::OpenTimestamps => "opentimestamps",
        ProviderKind::Blockchain => "blockchain",
        ProviderKind::Beacon => "beacon",
    }
}

/// Convert one anchor record — direct or a batched entry produced by
/// [`crate::engine::Engine::flush_batch_anchor_if_due`] — into the form an
/// evidence packet carries.
pub fn to_anchor_reference(record: &AnchorRecord) -> AnchorReference {
    AnchorReference {
        provider: provider_tag(record.provider).to_string(),
        proof: record.proof.clone(),
        confirmed: record.confirmed,
    }
}
