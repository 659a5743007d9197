//! The evidence packet shape (spec §4.5) and its JSON wire format (§6):
//! 32-byte hashes as lowercase hex, RFC 3339 timestamps, base64 proof
//! bytes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A bare 32-byte digest, serialized as lowercase hex.
pub type Hash32 = [u8; 32];

mod hex32 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|v: Vec<u8>| serde::de::Error::custom(format!("expected 32 bytes, got {}", v.len())))
    }
}

mod b64 {
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(&s)
            .map_err(serde::de::Error::custom)
    }
}

/// Packet header: format version, export time, and the declared evidentiary
/// strength the producer intends (informational; the verifier computes its
/// own class independently).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Header {
    /// Wire format version.
    pub version: u32,
    /// When this packet was exported.
    pub exported_at: DateTime<Utc>,
    /// The producer's declared strength tier (e.g. `"standard"`).
    pub strength_tier: String,
}

/// The document this packet attests to.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DocumentInfo {
    /// A human-readable title.
    pub title: String,
    /// The final observed content hash.
    #[serde(with = "hex32")]
    pub final_content_hash: Hash32,
    /// The last checkpoint's event hash, repeated here as the packet's
    /// chain anchor (I8: must equal `checkpoints.last().event_hash`).
    #[serde(with = "hex32")]
    pub chain_hash: Hash32,
}

/// A VDF proof triple attached to a checkpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VdfTriple {
    /// The VDF's input seed.
    #[serde(with = "hex32")]
    pub input: Hash32,
    /// The VDF's claimed output.
    #[serde(with = "hex32")]
    pub output: Hash32,
    /// The claimed iteration count.
    pub iterations: u64,
}

/// A reference to an external anchor attested for a checkpoint or the
/// packet as a whole.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnchorReference {
    /// The provider's kind, as a lowercase tag (`"rfc3161"`,
    /// `"opentimestamps"`, `"blockchain"`, `"beacon"`).
    pub provider: String,
    /// Opaque provider-specific proof bytes.
    #[serde(with = "b64")]
    pub proof: Vec<u8>,
    /// Whether the provider reported this as confirmed.
    pub confirmed: bool,
}

/// One checkpoint in the document's history.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Position in the checkpoint sequence, starting at 0.
    pub ordinal: u64,
    /// When the checkpoint was recorded.
    pub timestamp: DateTime<Utc>,
    /// The observed content hash at this checkpoint.
    #[serde(with = "hex32")]
    pub content_hash: Hash32,
    /// This checkpoint's own event hash.
    #[serde(with = "hex32")]
    pub event_hash: Hash32,
    /// The previous checkpoint's event hash (zero for ordinal 0).
    #[serde(with = "hex32")]
    pub prev_hash: Hash32,
    /// Observed file size at this checkpoint.
    pub size: u64,
    /// Signed size delta from the previous checkpoint.
    pub size_delta: i64,
    /// An optional VDF proof binding a minimum elapsed time since the
    /// previous checkpoint.
    #[serde(default)]
    pub vdf: Option<VdfTriple>,
    /// Any external anchors recorded for this checkpoint.
    #[serde(default)]
    pub anchors: Vec<AnchorReference>,
}

/// Where the signing key material lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeySource {
    /// A plain file on disk.
    File,
    /// A TPM-backed key.
    Tpm,
    /// A secure enclave (e.g. Apple Secure Enclave).
    SecureEnclave,
}

/// A signed statement of authorship/AI usage.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Declaration {
    /// The free-text declaration statement.
    pub statement: String,
    /// Ed25519 signature over `domain_hash("witnessd-declaration-v1",
    /// [statement, document.chain_hash, document.final_content_hash])`.
    #[serde(with = "b64")]
    pub signature: Vec<u8>,
    /// When the declaration was signed.
    pub signed_at: DateTime<Utc>,
}

/// The signing identity behind a packet's declaration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Provenance {
    /// The Ed25519 public key that should verify `declaration.signature`.
    #[serde(with = "hex32")]
    pub signing_public_key: Hash32,
    /// Where the signing key is held.
    pub key_source: KeySource,
    /// Lowercase hex of the 16-byte device id (`SHA256(pub)[..16]`).
    pub device_id: String,
}

/// A self-contained, offline-verifiable record of a document's history.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvidencePacket {
    /// Format/export metadata.
    pub header: Header,
    /// The document being attested.
    pub document: DocumentInfo,
    /// Ordered checkpoint history (dense ordinals starting at 0).
    pub checkpoints: Vec<Checkpoint>,
    /// The signed authorship declaration.
    pub declaration: Declaration,
    /// The signing identity.
    pub provenance: Provenance,
    /// Packet-level external anchors (as distinct from per-checkpoint ones).
    #[serde(default)]
    pub external_anchors: Vec<AnchorReference>,
    /// Optional keystroke-dynamics evidence, opaque to the verifier's
    /// structural checks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keystroke_evidence: Option<serde_json::Value>,
    /// Optional behavioral metrics (edit cadence, entropy, …) consumed by
    /// the forensic authorship scan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub behavioral_metrics: Option<serde_json::Value>,
    /// Optional forensic indicators a prior analysis already flagged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forensic_indicators: Option<serde_json::Value>,
}

impl EvidencePacket {
    /// Serialize to the packet's canonical JSON wire format.
    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a packet from its JSON wire format.
    pub fn from_json(s: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_packet() -> EvidencePacket {
        EvidencePacket {
            header: Header {
                version: 1,
                exported_at: Utc::now(),
                strength_tier: "standard".into(),
            },
            document: DocumentInfo {
                title: "notes.txt".into(),
                final_content_hash: [1u8; 32],
                chain_hash: [2u8; 32],
            },
            checkpoints: vec![Checkpoint {
                ordinal: 0,
                timestamp: Utc::now(),
                content_hash: [1u8; 32],
                event_hash: [2u8; 32],
                prev_hash: [0u8; 32],
                size: 10,
                size_delta: 10,
                vdf: None,
                anchors: vec![],
            }],
            declaration: Declaration {
                statement: "authored without AI assistance".into(),
                signature: vec![0u8; 64],
                signed_at: Utc::now(),
            },
            provenance: Provenance {
                signing_public_key: [3u8; 32],
                key_source: KeySource::File,
                device_id: "00112233445566778899aabbccddeeff".into(),
            },
            external_anchors: vec![],
            keystroke_evidence: None,
            behavioral_metrics: None,
            forensic_indicators: None,
        }
    }

    #[test]
    fn round_trips_through_json() {
        let packet = sample_packet();
        let json = packet.to_json().unwrap();
        assert!(json.contains("\"final_content_hash\""));
        let parsed = EvidencePacket::from_json(&json).unwrap();
        assert_eq!(parsed.document.final_content_hash, packet.document.final_content_hash);
        assert_eq!(parsed.checkpoints.len(), 1);
    }

    #[test]
    fn hashes_serialize_as_lowercase_hex() {
        let packet = sample_packet();
        let json = packet.to_json().unwrap();
        assert!(json.contains("0101010101010101010101010101010101010101010101010101010101010101"));
    }

    #[test]
    fn rejects_malformed_hex() {
        let bad = r#"{"header":{"version":1,"exported_at":"2026-01-01T00:00:00Z","strength_tier":"x"},
            "document":{"title":"t","final_content_hash":"zz","chain_hash":"00"},
            "checkpoints":[],"declaration":{"statement":"s","signature":"","signed_at":"2026-01-01T00:00:00Z"},
            "provenance":{"signing_public_key":"00","key_source":"file","device_id":"00"}}"#;
        assert!(EvidencePacket::from_json(bad).is_err());
    }
}
