//! OpenTimestamps provider: submits a hash to a calendar server and later
//! "upgrades" the resulting proof until a Bitcoin block commitment is
//! attached.

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::provider::{AnchorProvider, AnchorRecord, ProviderKind};

/// Marker byte OpenTimestamps calendar servers prepend to a pending
/// (not-yet-Bitcoin-confirmed) attestation, distinguishing it from an
/// upgraded proof that carries a block height.
const PENDING_MARKER: u8 = 0x00;
/// Marker byte for a proof that has been upgraded to a Bitcoin attestation.
const BITCOIN_MARKER: u8 = 0x01;

/// An OpenTimestamps calendar server.
pub struct OpenTimestampsAnchor {
    name: String,
    submit_endpoint: String,
    upgrade_endpoint: String,
    client: reqwest::Client,
}

impl OpenTimestampsAnchor {
    /// Build a provider targeting a calendar server's submit/upgrade
    /// endpoints (conventionally `{base}/digest` and `{base}/timestamp/{hex}`).
    pub fn new(name: impl Into<String>, submit_endpoint: impl Into<String>, upgrade_endpoint: impl Into<String>) -> Self {
        OpenTimestampsAnchor {
            name: name.into(),
            submit_endpoint: submit_endpoint.into(),
            upgrade_endpoint: upgrade_endpoint.into(),
            client: reqwest::Client::new(),
        }
    }

    fn proof_is_confirmed(proof: &[u8]) -> bool {
        proof.first() == Some(&BITCOIN_MARKER)
    }
}

#[async_trait]
impl AnchorProvider for OpenTimestampsAnchor {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenTimestamps
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn submit(&self, hash: [u8; 32], cancel: &CancellationToken) -> Result<AnchorRecord> {
        let send = self.client.post(&self.submit_endpoint).body(hash.to_vec()).send();
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            result = send => result?,
        };
        let mut proof = response.bytes().await?.to_vec();
        if proof.is_empty() {
            proof.push(PENDING_MARKER);
        }
        Ok(AnchorRecord {
            provider: ProviderKind::OpenTimestamps,
            provider_name: self.name.clone(),
            hash,
            confirmed: Self::proof_is_confirmed(&proof),
            proof,
            submitted_at: Utc::now(),
        })
    }

    async fn upgrade(&self, record: &AnchorRecord, cancel: &CancellationToken) -> Result<Option<AnchorRecord>> {
        if record.confirmed {
            return Ok(None);
        }
        let url = format!("{}/{}", self.upgrade_endpoint, hex::encode(record.hash));
        let send = self.client.get(&url).send();
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            result = send => result?,
        };
        let proof = response.bytes().await?.to_vec();
        if proof.is_empty() || !Self::proof_is_confirmed(&proof) {
            return Ok(None);
        }
        Ok(Some(AnchorRecord {
            proof,
            confirmed: true,
            ..record.clone()
        }))
    }

    async fn verify(&self, record: &AnchorRecord) -> Result<bool> {
        if record.proof.is_empty() {
            return Ok(false);
        }
        match record.proof[0] {
            PENDING_MARKER | BITCOIN_MARKER => Ok(true),
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_proof_is_not_confirmed() {
        assert!(!OpenTimestampsAnchor::proof_is_confirmed(&[PENDING_MARKER]));
    }

    #[test]
    fn bitcoin_proof_is_confirmed() {
        assert!(OpenTimestampsAnchor::proof_is_confirmed(&[BITCOIN_MARKER, 1, 2, 3]));
    }
}
