//! RFC 3161 trusted timestamping authority provider.
//!
//! Implements only the strict verification form: a proof is valid only if
//! the token's message imprint matches the caller-supplied hash. The
//! lenient, imprint-ignoring form named in the original design is
//! deliberately not implemented.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::der::{self, DerError};
use crate::error::{Error, Result};
use crate::provider::{AnchorProvider, AnchorRecord, ProviderKind};

/// Default bound on how far in the future a TSA's claimed generation time
/// may sit relative to our local clock before we reject it.
pub const DEFAULT_MAX_SKEW: Duration = Duration::from_secs(5 * 60);

/// An RFC 3161 TSA reachable over HTTP, POSTing
/// `application/timestamp-query` requests and parsing
/// `application/timestamp-reply` responses.
pub struct Rfc3161Anchor {
    name: String,
    endpoint: String,
    client: reqwest::Client,
    max_skew: Duration,
}

impl Rfc3161Anchor {
    /// Build a provider targeting `endpoint` (e.g. a public TSA URL).
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Rfc3161Anchor {
            name: name.into(),
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
            max_skew: DEFAULT_MAX_SKEW,
        }
    }

    /// Override the default 5-minute future-skew tolerance.
    pub fn with_max_skew(mut self, max_skew: Duration) -> Self {
        self.max_skew = max_skew;
        self
    }

    fn build_request(hash: &[u8; 32], nonce: u64) -> Vec<u8> {
        let message_imprint = der::sequence(&[
            der::sequence(&[der::oid(der::OID_SHA256), der::null()]),
            der::octet_string(hash),
        ]);
        der::sequence(&[
            der::integer_u64(1),
            message_imprint,
            der::integer_u64(nonce),
            der::boolean(true),
        ])
    }
}

fn parse_status(response: &[u8]) -> std::result::Result<i64, DerError> {
    let body = der::expect_sequence(response)?;
    let (status_info, _rest) = der::read_tlv(body)?;
    let status_body = if status_info.tag == der::TAG_SEQUENCE {
        status_info.value
    } else {
        return Err(DerError("expected PKIStatusInfo SEQUENCE"));
    };
    let (status, _) = der::read_tlv(status_body)?;
    der::integer_to_i64(status.value)
}

#[async_trait]
impl AnchorProvider for Rfc3161Anchor {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Rfc3161
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn submit(&self, hash: [u8; 32], cancel: &CancellationToken) -> Result<AnchorRecord> {
        let nonce = u64::from_be_bytes(hash[0..8].try_into().expect("8 bytes"));
        let request = Self::build_request(&hash, nonce);
        let send = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/timestamp-query")
            .body(request)
            .send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            result = send => result?,
        };
        let body = response.bytes().await?.to_vec();

        let status = parse_status(&body)
            .map_err(|e| Error::MalformedResponse(format!("RFC3161 status parse failed: {}", e.0)))?;
        if status != 0 && status != 1 {
            return Err(Error::ProviderFailed {
                provider: self.name.clone(),
                message: format!("TSA returned PKIStatus {status}"),
            });
        }

        Ok(AnchorRecord {
            provider: ProviderKind::Rfc3161,
            provider_name: self.name.clone(),
            hash,
            proof: body,
            confirmed: true,
            submitted_at: Utc::now(),
        })
    }

    async fn verify(&self, record: &AnchorRecord) -> Result<bool> {
        let status = parse_status(&record.proof)
            .map_err(|e| Error::MalformedResponse(format!("RFC3161 status parse failed: {}", e.0)))?;
        if status != 0 && status != 1 {
            return Ok(false);
        }
        if !der::contains_octet_string(&record.proof, &record.hash) {
            return Ok(false);
        }
        if let Some(gen_time) = der::find_generalized_time(&record.proof) {
            let skew = gen_time.signed_duration_since(Utc::now());
            if skew > chrono::Duration::from_std(self.max_skew).unwrap_or(chrono::Duration::zero()) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_is_well_formed_der() {
        let request = Rfc3161Anchor::build_request(&[7u8; 32], 42);
        let body = der::expect_sequence(&request).unwrap();
        let (version, rest) = der::read_tlv(body).unwrap();
        assert_eq!(der::integer_to_i64(version.value).unwrap(), 1);
        let (imprint, _rest) = der::read_tlv(rest).unwrap();
        assert_eq!(imprint.tag, der::TAG_SEQUENCE);
        assert!(der::contains_octet_string(&request, &[7u8; 32]));
    }

    #[test]
    fn parse_status_reads_granted() {
        let resp = der::sequence(&[der::sequence(&[der::integer_u64(0)])]);
        assert_eq!(parse_status(&resp).unwrap(), 0);
    }

    #[test]
    fn parse_status_rejects_truncated_response() {
        assert!(parse_status(&[0x30, 0x02, 0x30]).is_err());
    }
}
