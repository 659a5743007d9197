//! Drand-style randomness beacon provider — uniform interface stub.
//!
//! A beacon doesn't attest to "when" the way a TSA or blockchain does; it
//! attests to "after which public randomness round". The stub records the
//! round number a hash was associated with and treats the proof as already
//! confirmed (a drand round, once published, is immediately final).

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::provider::{AnchorProvider, AnchorRecord, ProviderKind};

/// A drand beacon client, identified by its chain endpoint.
pub struct BeaconAnchor {
    name: String,
    endpoint: String,
    client: reqwest::Client,
}

impl BeaconAnchor {
    /// Build a provider targeting a drand HTTP gateway's `/public/latest`
    /// (or equivalent) endpoint.
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        BeaconAnchor {
            name: name.into(),
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl AnchorProvider for BeaconAnchor {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Beacon
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn submit(&self, hash: [u8; 32], cancel: &CancellationToken) -> Result<AnchorRecord> {
        let send = self.client.get(&self.endpoint).send();
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(crate::error::Error::Cancelled),
            result = send => result?,
        };
        let round_bytes = response.bytes().await?.to_vec();
        Ok(AnchorRecord {
            provider: ProviderKind::Beacon,
            provider_name: self.name.clone(),
            hash,
            proof: round_bytes,
            confirmed: true,
            submitted_at: Utc::now(),
        })
    }

    async fn verify(&self, record: &AnchorRecord) -> Result<bool> {
        Ok(!record.proof.is_empty())
    }
}
