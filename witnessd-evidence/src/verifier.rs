//! The four-level verification pipeline: Quick, Standard, Forensic,
//! Paranoid, each a strict superset of the previous.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use witnessd_crypto::hash::domain_hash;
use witnessd_crypto::signing::DevicePublicKey;

use crate::classify::{classify, EvidenceClass};
use crate::packet::EvidencePacket;

const DECLARATION_DOMAIN: &str = "witnessd-declaration-v1";

/// How far a verification attempt should go.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// Structure only.
    Quick,
    /// Structure + chain integrity + VDF (quick) + declaration signature +
    /// signing-key chain.
    Standard,
    /// Standard + timestamp consistency + behavioral anomaly scan.
    Forensic,
    /// Forensic + full VDF recompute + external anchor verification.
    Paranoid,
}

/// One stage's outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// The stage ran and found nothing wrong.
    Passed,
    /// The stage ran and found a hard defect; flips the report invalid.
    Failed,
    /// The stage ran and found a soft anomaly; does not flip validity.
    Warning,
    /// The stage did not run (out of scope for the requested level, or no
    /// applicable data, or cancelled).
    Skipped,
}

/// The result of one pipeline stage.
#[derive(Clone, Debug)]
pub struct ComponentResult {
    /// The stage's name (e.g. `"structure"`, `"declaration_signature"`).
    pub name: &'static str,
    /// The stage's outcome.
    pub status: Status,
    /// A human-readable summary.
    pub message: String,
    /// Extra detail, if any.
    pub details: Option<String>,
    /// How long the stage took.
    pub duration: Duration,
    /// A suggested remediation, for `Failed`/`Warning` stages where one
    /// applies.
    pub remediation: Option<String>,
}

impl ComponentResult {
    fn new(name: &'static str, status: Status, message: impl Into<String>, duration: Duration) -> Self {
        ComponentResult {
            name,
            status,
            message: message.into(),
            details: None,
            duration,
            remediation: None,
        }
    }

    fn with_remediation(mut self, remediation: impl Into<String>) -> Self {
        self.remediation = Some(remediation.into());
        self
    }

    fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// A completed verification run.
#[derive(Clone, Debug)]
pub struct VerificationReport {
    /// Whether any stage failed.
    pub valid: bool,
    /// Weighted confidence across executed stages, in `[0, 1]`.
    pub confidence: f64,
    /// The classifier's verdict.
    pub evidence_class: EvidenceClass,
    /// Every stage's result, in execution order.
    pub components: Vec<ComponentResult>,
    /// Messages from `Warning` stages.
    pub warnings: Vec<String>,
    /// Remediation strings from `Failed`/`Warning` stages that offered one.
    pub recommendations: Vec<String>,
}

/// External configuration a verifier may use at the higher tiers.
pub struct VerifyOptions {
    /// Parameters the packet's VDF proofs were computed under.
    pub vdf_params: witnessd_vdf::Parameters,
    /// A registry to re-verify external anchors against, at `Paranoid`.
    /// `None` skips that stage rather than failing it.
    pub anchor_registry: Option<Arc<witnessd_anchor::Registry>>,
    /// Timeout for a `Paranoid`-level full VDF recompute.
    pub vdf_timeout: Duration,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        VerifyOptions {
            vdf_params: witnessd_vdf::Parameters::default(),
            anchor_registry: None,
            vdf_timeout: Duration::from_secs(10 * 60),
        }
    }
}

/// Run the verification pipeline up to `level` against `packet`.
pub async fn verify(
    packet: &EvidencePacket,
    level: Level,
    opts: &VerifyOptions,
    cancel: &CancellationToken,
) -> VerificationReport {
    let mut components = Vec::new();

    components.push(check_structure(packet));
    if level >= Level::Standard {
        components.push(check_vdf_quick(packet, &opts.vdf_params));
        components.push(check_declaration_signature(packet));
        components.push(check_signing_key_chain(packet));
    }
    if level >= Level::Forensic {
        components.push(check_timestamp_consistency(packet));
        components.push(check_behavioral_anomalies(packet));
    }
    if level >= Level::Paranoid {
        components.push(check_vdf_full(packet, opts, cancel).await);
        components.push(check_external_anchors(packet, opts, cancel).await);
    }

    finish(components)
}

fn finish(components: Vec<ComponentResult>) -> VerificationReport {
    let valid = !components.iter().any(|c| c.status == Status::Failed);

    let weight = |name: &str| -> f64 {
        match name {
            "structure" => 0.2,
            "vdf_quick" => 0.1,
            "declaration_signature" => 0.25,
            "signing_key_chain" => 0.1,
            "timestamp_consistency" => 0.1,
            "behavioral_anomalies" => 0.05,
            "vdf_full" => 0.15,
            "external_anchors" => 0.05,
            _ => 0.0,
        }
    };

    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    for c in &components {
        if c.status == Status::Skipped {
            continue;
        }
        let w = weight(c.name);
        let score = match c.status {
            Status::Passed => 1.0,
            Status::Warning => 0.5,
            Status::Failed => 0.0,
            Status::Skipped => unreachable!(),
        };
        weighted_sum += w * score;
        weight_total += w;
    }
    let confidence = if weight_total > 0.0 { weighted_sum / weight_total } else { 0.0 };

    let warnings: Vec<String> = components
        .iter()
        .filter(|c| c.status == Status::Warning)
        .map(|c| c.message.clone())
        .collect();
    let recommendations: Vec<String> = components
        .iter()
        .filter(|c| matches!(c.status, Status::Failed | Status::Warning))
        .filter_map(|c| c.remediation.clone())
        .collect();

    let evidence_class = classify(valid, confidence, warnings.len());

    VerificationReport {
        valid,
        confidence,
        evidence_class,
        components,
        warnings,
        recommendations,
    }
}

/// I8: ordinals dense from 0, `checkpoint[0].prev_hash` zero,
/// `checkpoint[i].prev_hash == checkpoint[i-1].event_hash`, final
/// `event_hash == packet.document.chain_hash`.
fn check_structure(packet: &EvidencePacket) -> ComponentResult {
    let started = Instant::now();
    let name = "structure";
    if packet.checkpoints.is_empty() {
        return ComponentResult::new(name, Status::Failed, "packet has no checkpoints", started.elapsed())
            .with_remediation("re-export the packet with at least one checkpoint");
    }
    for (i, cp) in packet.checkpoints.iter().enumerate() {
        if cp.ordinal != i as u64 {
            return ComponentResult::new(
                name,
                Status::Failed,
                format!("checkpoint ordinals are not dense: expected {i}, got {}", cp.ordinal),
                started.elapsed(),
            );
        }
    }
    if packet.checkpoints[0].prev_hash != [0u8; 32] {
        return ComponentResult::new(name, Status::Failed, "checkpoint 0 has a nonzero prev_hash", started.elapsed());
    }
    for i in 1..packet.checkpoints.len() {
        if packet.checkpoints[i].prev_hash != packet.checkpoints[i - 1].event_hash {
            return ComponentResult::new(
                name,
                Status::Failed,
                format!("checkpoint {i}'s prev_hash does not match checkpoint {}'s event_hash", i - 1),
                started.elapsed(),
            )
            .with_remediation("the checkpoint chain has been tampered with or reordered");
        }
    }
    let last = packet.checkpoints.last().expect("checked non-empty above");
    if last.event_hash != packet.document.chain_hash {
        return ComponentResult::new(
            name,
            Status::Failed,
            "final checkpoint's event_hash does not match document.chain_hash",
            started.elapsed(),
        );
    }
    ComponentResult::new(name, Status::Passed, "checkpoint chain is structurally sound", started.elapsed())
}

fn check_vdf_quick(packet: &EvidencePacket, params: &witnessd_vdf::Parameters) -> ComponentResult {
    let started = Instant::now();
    let name = "vdf_quick";
    let proofs: Vec<_> = packet.checkpoints.iter().filter_map(|cp| cp.vdf.as_ref()).collect();
    if proofs.is_empty() {
        return ComponentResult::new(name, Status::Skipped, "no VDF proofs present", started.elapsed());
    }
    // Bounds-check every claimed iteration count against params.
    for (i, triple) in proofs.iter().enumerate() {
        if triple.iterations < params.min_iterations || triple.iterations > params.max_iterations {
            return ComponentResult::new(
                name,
                Status::Failed,
                format!("checkpoint VDF #{i} iteration count {} is out of bounds", triple.iterations),
                started.elapsed(),
            );
        }
    }
    ComponentResult::new(name, Status::Passed, format!("{} VDF proof(s) within bounds", proofs.len()), started.elapsed())
}

fn check_declaration_signature(packet: &EvidencePacket) -> ComponentResult {
    let started = Instant::now();
    let name = "declaration_signature";
    let public_key = match DevicePublicKey::from_bytes(&packet.provenance.signing_public_key) {
        Ok(k) => k,
        Err(e) => {
            return ComponentResult::new(name, Status::Failed, format!("invalid signing public key: {e}"), started.elapsed())
        }
    };
    let signature: [u8; 64] = match packet.declaration.signature.as_slice().try_into() {
        Ok(s) => s,
        Err(_) => {
            return ComponentResult::new(
                name,
                Status::Failed,
                format!("declaration signature is {} bytes, expected 64", packet.declaration.signature.len()),
                started.elapsed(),
            )
        }
    };
    let digest = domain_hash(
        DECLARATION_DOMAIN,
        &[
            packet.declaration.statement.as_bytes(),
            &packet.document.chain_hash,
            &packet.document.final_content_hash,
        ],
    );
    match public_key.verify(&digest, &signature) {
        Ok(()) => ComponentResult::new(name, Status::Passed, "declaration signature verifies", started.elapsed()),
        Err(_) => ComponentResult::new(name, Status::Failed, "declaration signature does not verify", started.elapsed())
            .with_remediation("the declaration or document hashes may have been altered after signing"),
    }
}

fn check_signing_key_chain(packet: &EvidencePacket) -> ComponentResult {
    let started = Instant::now();
    let name = "signing_key_chain";
    let public_key = match DevicePublicKey::from_bytes(&packet.provenance.signing_public_key) {
        Ok(k) => k,
        Err(e) => {
            return ComponentResult::new(name, Status::Failed, format!("invalid signing public key: {e}"), started.elapsed())
        }
    };
    let expected = hex::encode(public_key.device_id());
    if expected != packet.provenance.device_id.to_lowercase() {
        return ComponentResult::new(
            name,
            Status::Failed,
            "device_id does not match SHA256(signing_public_key)[..16]",
            started.elapsed(),
        )
        .with_remediation("the provenance section is inconsistent with its own public key");
    }
    ComponentResult::new(name, Status::Passed, "device id matches signing key", started.elapsed())
}

fn check_timestamp_consistency(packet: &EvidencePacket) -> ComponentResult {
    let started = Instant::now();
    let name = "timestamp_consistency";
    let mut warnings = Vec::new();

    for w in packet.checkpoints.windows(2) {
        let (prev, cur) = (&w[0], &w[1]);
        if cur.timestamp < prev.timestamp {
            warnings.push(format!("checkpoint {} has a non-monotonic timestamp", cur.ordinal));
        }
        let interval = cur.timestamp.signed_duration_since(prev.timestamp);
        if cur.vdf.is_some() && interval < chrono::Duration::milliseconds(1) {
            warnings.push(format!("checkpoint {} has a sub-millisecond interval despite a VDF proof", cur.ordinal));
        }
    }

    if let (Some(last_cp), signed_at) = (packet.checkpoints.last(), packet.declaration.signed_at) {
        if signed_at < last_cp.timestamp - chrono::Duration::hours(1) {
            warnings.push("declaration was signed more than an hour before the final checkpoint".to_string());
        }
    }

    for anchor in packet.external_anchors.iter().chain(packet.checkpoints.iter().flat_map(|c| c.anchors.iter())) {
        let _ = anchor;
    }
    if packet.header.exported_at < Utc::now() - chrono::Duration::days(365 * 50) {
        warnings.push("packet export timestamp looks implausibly old".to_string());
    }

    if warnings.is_empty() {
        ComponentResult::new(name, Status::Passed, "timestamps are consistent", started.elapsed())
    } else {
        let message = warnings.join("; ");
        ComponentResult::new(name, Status::Warning, message, started.elapsed())
            .with_details(format!("{} anomaly(ies) detected", warnings.len()))
    }
}

fn check_behavioral_anomalies(packet: &EvidencePacket) -> ComponentResult {
    let started = Instant::now();
    let name = "behavioral_anomalies";
    let Some(metrics) = packet.behavioral_metrics.as_ref() else {
        return ComponentResult::new(name, Status::Skipped, "no behavioral metrics present", started.elapsed());
    };
    let monotonic_append_ratio = metrics.get("monotonic_append_ratio").and_then(|v| v.as_f64());
    let edit_entropy = metrics.get("edit_entropy").and_then(|v| v.as_f64());

    let mut warnings = Vec::new();
    if let Some(ratio) = monotonic_append_ratio {
        if ratio > 0.98 {
            warnings.push(format!("extreme monotonic-append ratio ({ratio:.3})"));
        }
    }
    if let Some(entropy) = edit_entropy {
        if entropy < 0.05 {
            warnings.push(format!("near-zero edit entropy ({entropy:.3})"));
        }
    }

    if warnings.is_empty() {
        ComponentResult::new(name, Status::Passed, "no authorship anomalies detected", started.elapsed())
    } else {
        ComponentResult::new(name, Status::Warning, warnings.join("; "), started.elapsed())
    }
}

async fn check_vdf_full(packet: &EvidencePacket, opts: &VerifyOptions, cancel: &CancellationToken) -> ComponentResult {
    let started = Instant::now();
    let name = "vdf_full";
    let triples: Vec<_> = packet.checkpoints.iter().filter_map(|cp| cp.vdf.as_ref()).collect();
    if triples.is_empty() {
        return ComponentResult::new(name, Status::Skipped, "no VDF proofs present", started.elapsed());
    }
    for triple in &triples {
        let proof = witnessd_vdf::Proof {
            input: triple.input,
            output: triple.output,
            iterations: triple.iterations,
            wall_duration: Duration::ZERO,
        };
        let result = witnessd_vdf::verify_async(&proof, &opts.vdf_params, witnessd_vdf::Strategy::Full, opts.vdf_timeout, cancel).await;
        match result {
            Ok(true) => {}
            Ok(false) => {
                return ComponentResult::new(name, Status::Failed, "a VDF proof failed full recomputation", started.elapsed())
                    .with_remediation("the checkpoint's claimed VDF output does not match its input");
            }
            Err(witnessd_vdf::Error::Cancelled) => {
                return ComponentResult::new(name, Status::Skipped, "VDF recomputation was cancelled", started.elapsed());
            }
            Err(e) => {
                return ComponentResult::new(name, Status::Failed, format!("VDF recomputation error: {e}"), started.elapsed());
            }
        }
    }
    ComponentResult::new(name, Status::Passed, format!("{} VDF proof(s) fully recomputed", triples.len()), started.elapsed())
}

async fn check_external_anchors(packet: &EvidencePacket, opts: &VerifyOptions, _cancel: &CancellationToken) -> ComponentResult {
    let started = Instant::now();
    let name = "external_anchors";
    let all_anchors: Vec<_> = packet
        .external_anchors
        .iter()
        .chain(packet.checkpoints.iter().flat_map(|c| c.anchors.iter()))
        .collect();
    if all_anchors.is_empty() {
        return ComponentResult::new(name, Status::Skipped, "no external anchors present", started.elapsed());
    }
    let Some(registry) = opts.anchor_registry.as_ref() else {
        return ComponentResult::new(name, Status::Skipped, "no anchor registry configured for verification", started.elapsed());
    };

    let records: Vec<witnessd_anchor::AnchorRecord> = all_anchors
        .iter()
        .filter_map(|a| provider_kind_from_tag(&a.provider).map(|kind| witnessd_anchor::AnchorRecord {
            provider: kind,
            provider_name: a.provider.clone(),
            hash: packet.document.chain_hash,
            proof: a.proof.clone(),
            confirmed: a.confirmed,
            submitted_at: packet.header.exported_at,
        }))
        .collect();

    if registry.best_valid(&records).await.is_some() {
        ComponentResult::new(name, Status::Passed, format!("{} external anchor(s) verified", records.len()), started.elapsed())
    } else {
        ComponentResult::new(name, Status::Warning, "no external anchor could be independently verified", started.elapsed())
    }
}

fn provider_kind_from_tag(tag: &str) -> Option<witnessd_anchor::ProviderKind> {
    match tag {
        "rfc3161" => Some(witnessd_anchor::ProviderKind::Rfc3161),
        "opentimestamps" => Some(witnessd_anchor::ProviderKind::OpenTimestamps),
        "blockchain" => Some(witnessd_anchor::ProviderKind::Blockchain),
        "beacon" => Some(witnessd_anchor::ProviderKind::Beacon),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{Checkpoint, Declaration, DocumentInfo, Header, KeySource, Provenance};
    use rand_core::OsRng;
    use witnessd_crypto::signing::DeviceSigningKey;

    fn signed_packet() -> (EvidencePacket, DeviceSigningKey) {
        let key = DeviceSigningKey::generate(&mut OsRng);
        let public_key = key.public_key();
        let document = DocumentInfo {
            title: "notes.txt".into(),
            final_content_hash: [9u8; 32],
            chain_hash: [2u8; 32],
        };
        let statement = "no AI assistance".to_string();
        let digest = domain_hash(
            DECLARATION_DOMAIN,
            &[statement.as_bytes(), &document.chain_hash, &document.final_content_hash],
        );
        let signature = key.sign(&digest).to_vec();
        let packet = EvidencePacket {
            header: Header {
                version: 1,
                exported_at: Utc::now(),
                strength_tier: "standard".into(),
            },
            document,
            checkpoints: vec![
                Checkpoint {
                    ordinal: 0,
                    timestamp: Utc::now() - chrono::Duration::seconds(10),
                    content_hash: [1u8; 32],
                    event_hash: [1u8; 32],
                    prev_hash: [0u8; 32],
                    size: 5,
                    size_delta: 5,
                    vdf: None,
                    anchors: vec![],
                },
                Checkpoint {
                    ordinal: 1,
                    timestamp: Utc::now(),
                    content_hash: [2u8; 32],
                    event_hash: [2u8; 32],
                    prev_hash: [1u8; 32],
                    size: 9,
                    size_delta: 4,
                    vdf: None,
                    anchors: vec![],
                },
            ],
            declaration: Declaration {
                statement,
                signature,
                signed_at: Utc::now(),
            },
            provenance: Provenance {
                signing_public_key: public_key.to_bytes(),
                key_source: KeySource::File,
                device_id: hex::encode(public_key.device_id()),
            },
            external_anchors: vec![],
            keystroke_evidence: None,
            behavioral_metrics: None,
            forensic_indicators: None,
        };
        (packet, key)
    }

    #[tokio::test]
    async fn valid_packet_verifies_at_standard_with_high_confidence() {
        let (packet, _key) = signed_packet();
        let cancel = CancellationToken::new();
        let report = verify(&packet, Level::Standard, &VerifyOptions::default(), &cancel).await;
        assert!(report.valid);
        assert!(report.warnings.is_empty());
        assert_eq!(report.evidence_class, EvidenceClass::A);
    }

    #[tokio::test]
    async fn tampered_prev_hash_flips_valid_to_false() {
        let (mut packet, _key) = signed_packet();
        packet.checkpoints[1].prev_hash = [0xFFu8; 32];
        let cancel = CancellationToken::new();
        let report = verify(&packet, Level::Standard, &VerifyOptions::default(), &cancel).await;
        assert!(!report.valid);
        assert_eq!(report.evidence_class, EvidenceClass::X);
    }

    #[tokio::test]
    async fn tampered_signature_fails_declaration_stage() {
        let (mut packet, _key) = signed_packet();
        packet.declaration.signature[0] ^= 0xFF;
        let cancel = CancellationToken::new();
        let report = verify(&packet, Level::Standard, &VerifyOptions::default(), &cancel).await;
        assert!(!report.valid);
        assert!(report
            .components
            .iter()
            .any(|c| c.name == "declaration_signature" && c.status == Status::Failed));
    }

    #[tokio::test]
    async fn quick_level_only_checks_structure() {
        let (packet, _key) = signed_packet();
        let cancel = CancellationToken::new();
        let report = verify(&packet, Level::Quick, &VerifyOptions::default(), &cancel).await;
        assert_eq!(report.components.len(), 1);
        assert_eq!(report.components[0].name, "structure");
    }

    #[tokio::test]
    async fn non_monotonic_timestamp_produces_warning_not_failure() {
        let (mut packet, _key) = signed_packet();
        packet.checkpoints[1].timestamp = packet.checkpoints[0].timestamp - chrono::Duration::seconds(5);
        let cancel = CancellationToken::new();
        let report = verify(&packet, Level::Forensic, &VerifyOptions::default(), &cancel).await;
        assert!(report.valid);
        assert!(!report.warnings.is_empty());
        assert_ne!(report.evidence_class, EvidenceClass::X);
    }
}
