//! Blockchain anchoring: a direct per-hash `OP_RETURN` path, and a batched
//! path that anchors a [`crate::merkle_batch::BatchTree`] root instead of
//! each hash individually.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::merkle_batch::{BatchProof, BatchTree};
use crate::provider::{AnchorProvider, AnchorRecord, ProviderKind};

/// First byte of a batched anchor record's `proof` bytes, distinguishing
/// a `[txid, BatchProof]` composite from a direct record's bare txid
/// bytes. `0xBA` is not a valid leading byte of any UTF-8 txid this crate
/// produces (`"txid-…"` or a real hex txid), so the two forms never
/// collide.
const BATCH_ANCHOR_MARKER: u8 = 0xBA;

/// Pack a txid and its batch inclusion proof into one `AnchorRecord`
/// proof blob, so a batched entry carries everything `verify`/`upgrade`
/// need without a second lookup.
fn encode_batch_anchor_proof(txid: &str, proof: &BatchProof) -> Vec<u8> {
    let txid_bytes = txid.as_bytes();
    let mut buf = Vec::with_capacity(1 + 4 + txid_bytes.len() + 8 + 32 + 4 + proof.path.len() * 33 + 32);
    buf.push(BATCH_ANCHOR_MARKER);
    buf.extend_from_slice(&(txid_bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(txid_bytes);
    buf.extend_from_slice(&proof.to_bytes());
    buf
}

fn decode_batch_anchor_proof(bytes: &[u8]) -> Result<(String, BatchProof)> {
    if bytes.len() < 5 {
        return Err(Error::MalformedResponse("batched anchor proof truncated".into()));
    }
    let txid_len = u32::from_be_bytes(bytes[1..5].try_into().unwrap()) as usize;
    let txid_end = 5 + txid_len;
    let txid_bytes = bytes
        .get(5..txid_end)
        .ok_or_else(|| Error::MalformedResponse("batched anchor proof truncated".into()))?;
    let txid = String::from_utf8(txid_bytes.to_vec())
        .map_err(|_| Error::MalformedResponse("batched anchor proof txid is not valid utf-8".into()))?;
    let proof = BatchProof::from_bytes(&bytes[txid_end..])?;
    Ok((txid, proof))
}

/// What a `BlockchainAnchor` record's `proof` bytes decode to: either the
/// bare txid a direct submission produced, or a txid paired with the
/// batch inclusion proof for one entry of a batched submission.
enum DecodedProof {
    Direct(String),
    Batched { txid: String, proof: BatchProof },
}

fn decode_proof(bytes: &[u8]) -> Result<DecodedProof> {
    if bytes.first() == Some(&BATCH_ANCHOR_MARKER) {
        let (txid, proof) = decode_batch_anchor_proof(bytes)?;
        Ok(DecodedProof::Batched { txid, proof })
    } else {
        let txid = String::from_utf8(bytes.to_vec())
            .map_err(|_| Error::MalformedResponse("blockchain record proof is not a valid txid".into()))?;
        Ok(DecodedProof::Direct(txid))
    }
}

/// An owner-configured Bitcoin wallet/node RPC surface, reduced to the two
/// operations anchoring needs: broadcasting a 32-byte payload inside an
/// `OP_RETURN` output, and reading one back from a confirmed transaction.
#[async_trait]
pub trait BitcoinRpcClient: Send + Sync {
    /// Broadcast a transaction carrying `payload` in an `OP_RETURN` output,
    /// returning the transaction id.
    async fn broadcast_op_return(&self, payload: &[u8; 32]) -> Result<String>;

    /// Fetch the `OP_RETURN` payload of a previously broadcast transaction,
    /// if it has confirmed.
    async fn fetch_op_return_payload(&self, txid: &str) -> Result<Option<[u8; 32]>>;
}

/// Direct (non-batched) Bitcoin anchoring: each `commit` broadcasts its own
/// `OP_RETURN` transaction.
pub struct BlockchainAnchor {
    name: String,
    rpc: std::sync::Arc<dyn BitcoinRpcClient>,
}

impl BlockchainAnchor {
    /// Build a provider over `rpc`.
    pub fn new(name: impl Into<String>, rpc: std::sync::Arc<dyn BitcoinRpcClient>) -> Self {
        BlockchainAnchor { name: name.into(), rpc }
    }
}

#[async_trait]
impl AnchorProvider for BlockchainAnchor {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Blockchain
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn submit(&self, hash: [u8; 32], cancel: &CancellationToken) -> Result<AnchorRecord> {
        let broadcast = self.rpc.broadcast_op_return(&hash);
        let txid = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            result = broadcast => result?,
        };
        Ok(AnchorRecord {
            provider: ProviderKind::Blockchain,
            provider_name: self.name.clone(),
            hash,
            proof: txid.into_bytes(),
            confirmed: false,
            submitted_at: Utc::now(),
        })
    }

    async fn upgrade(&self, record: &AnchorRecord, cancel: &CancellationToken) -> Result<Option<AnchorRecord>> {
        if record.confirmed {
            return Ok(None);
        }
        // A batched entry's on-chain commitment is to the batch root, not
        // the entry's own hash; its inclusion proof bridges the two.
        let (txid, expected) = match decode_proof(&record.proof)? {
            DecodedProof::Direct(txid) => (txid, record.hash),
            DecodedProof::Batched { txid, proof } => {
                if proof.leaf != record.hash || !proof.verify() {
                    return Err(Error::ProofInvalid("batch inclusion proof does not verify".into()));
                }
                (txid, proof.root)
            }
        };
        let fetch = self.rpc.fetch_op_return_payload(&txid);
        let payload = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            result = fetch => result?,
        };
        match payload {
            Some(bytes) if bytes == expected => Ok(Some(AnchorRecord {
                confirmed: true,
                ..record.clone()
            })),
            _ => Ok(None),
        }
    }

    async fn verify(&self, record: &AnchorRecord) -> Result<bool> {
        match decode_proof(&record.proof)? {
            DecodedProof::Direct(txid) => match self.rpc.fetch_op_return_payload(&txid).await? {
                Some(bytes) => Ok(bytes == record.hash),
                None => Ok(false),
            },
            DecodedProof::Batched { txid, proof } => {
                if proof.leaf != record.hash || !proof.verify() {
                    return Ok(false);
                }
                match self.rpc.fetch_op_return_payload(&txid).await? {
                    Some(bytes) => Ok(bytes == proof.root),
                    None => Ok(false),
                }
            }
        }
    }
}

/// Accumulates fingerprints and flushes them as one [`BatchTree`], anchoring
/// only the root via an underlying [`BlockchainAnchor`].
pub struct BatchAnchorBuffer {
    anchor: BlockchainAnchor,
    max_batch_size: usize,
    max_interval: Duration,
    pending: Vec<[u8; 32]>,
    opened_at: Instant,
}

/// The result of flushing a batch: the root's own anchor record, one raw
/// inclusion proof per entry, and — the form that actually reaches an
/// evidence packet — one self-contained [`AnchorRecord`] per entry, each
/// carrying the root's txid and that entry's inclusion proof together so
/// `BlockchainAnchor::verify`/`upgrade` can check it without the caller
/// re-supplying the batch.
pub struct FlushedBatch {
    /// The anchor record for the batch root.
    pub record: AnchorRecord,
    /// Per-entry inclusion proofs, in push order.
    pub proofs: Vec<BatchProof>,
    /// Per-entry anchor records, in push order, ready to attach to the
    /// checkpoint each entry's hash belongs to.
    pub entries: Vec<AnchorRecord>,
}

impl BatchAnchorBuffer {
    /// Build an empty buffer flushing at `max_batch_size` entries or
    /// `max_interval` elapsed, whichever comes first.
    pub fn new(anchor: BlockchainAnchor, max_batch_size: usize, max_interval: Duration) -> Self {
        BatchAnchorBuffer {
            anchor,
            max_batch_size,
            max_interval,
            pending: Vec::new(),
            opened_at: Instant::now(),
        }
    }

    /// Add `hash` to the pending batch, returning its index within the
    /// eventual flush.
    pub fn push(&mut self, hash: [u8; 32]) -> usize {
        if self.pending.is_empty() {
            self.opened_at = Instant::now();
        }
        self.pending.push(hash);
        self.pending.len() - 1
    }

    /// Whether the buffer has accumulated enough entries, or enough time
    /// has elapsed, to warrant a flush.
    pub fn should_flush(&self) -> bool {
        !self.pending.is_empty()
            && (self.pending.len() >= self.max_batch_size || self.opened_at.elapsed() >= self.max_interval)
    }

    /// Number of entries currently pending.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether the buffer currently holds no entries.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Build the batch Merkle tree over all pending entries, submit its
    /// root via the underlying direct anchor, and return per-entry proofs
    /// alongside ready-to-attach per-entry anchor records. Clears the
    /// buffer on success.
    pub async fn flush(&mut self, cancel: &CancellationToken) -> Result<FlushedBatch> {
        if self.pending.is_empty() {
            return Err(Error::InvalidConfig("cannot flush an empty batch".into()));
        }
        let tree = BatchTree::build(self.pending.clone())?;
        let record = self.anchor.submit(tree.root(), cancel).await?;
        let txid = match decode_proof(&record.proof)? {
            DecodedProof::Direct(txid) => txid,
            DecodedProof::Batched { .. } => {
                return Err(Error::MalformedResponse("root submission unexpectedly returned a batched proof".into()));
            }
        };
        let proofs = (0..tree.len())
            .map(|i| tree.prove(i))
            .collect::<Result<Vec<_>>>()?;
        let entries = proofs
            .iter()
            .map(|proof| AnchorRecord {
                provider: ProviderKind::Blockchain,
                provider_name: self.anchor.name.clone(),
                hash: proof.leaf,
                proof: encode_batch_anchor_proof(&txid, proof),
                confirmed: record.confirmed,
                submitted_at: record.submitted_at,
            })
            .collect();
        self.pending.clear();
        Ok(FlushedBatch { record, proofs, entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FakeRpc {
        broadcasts: Mutex<Vec<[u8; 32]>>,
    }

    #[async_trait]
    impl BitcoinRpcClient for FakeRpc {
        async fn broadcast_op_return(&self, payload: &[u8; 32]) -> Result<String> {
            let mut broadcasts = self.broadcasts.lock().unwrap();
            broadcasts.push(*payload);
            Ok(format!("txid-{}", broadcasts.len() - 1))
        }

        async fn fetch_op_return_payload(&self, txid: &str) -> Result<Option<[u8; 32]>> {
            let index: usize = txid.strip_prefix("txid-").unwrap().parse().unwrap();
            Ok(self.broadcasts.lock().unwrap().get(index).copied())
        }
    }

    #[tokio::test]
    async fn direct_anchor_round_trips_through_verify() {
        let rpc = std::sync::Arc::new(FakeRpc { broadcasts: Mutex::new(Vec::new()) });
        let anchor = BlockchainAnchor::new("test-chain", rpc);
        let cancel = CancellationToken::new();
        let record = anchor.submit([9u8; 32], &cancel).await.unwrap();
        assert!(anchor.verify(&record).await.unwrap());
    }

    #[tokio::test]
    async fn direct_anchor_upgrade_confirms_once_payload_matches() {
        let rpc = std::sync::Arc::new(FakeRpc { broadcasts: Mutex::new(Vec::new()) });
        let anchor = BlockchainAnchor::new("test-chain", rpc);
        let cancel = CancellationToken::new();
        let record = anchor.submit([1u8; 32], &cancel).await.unwrap();
        assert!(!record.confirmed);
        let upgraded = anchor.upgrade(&record, &cancel).await.unwrap().unwrap();
        assert!(upgraded.confirmed);
    }

    #[tokio::test]
    async fn batch_flushes_at_size_threshold() {
        let rpc = std::sync::Arc::new(FakeRpc { broadcasts: Mutex::new(Vec::new()) });
        let anchor = BlockchainAnchor::new("test-chain", rpc);
        let mut buffer = BatchAnchorBuffer::new(anchor, 3, Duration::from_secs(3600));
        buffer.push([1u8; 32]);
        buffer.push([2u8; 32]);
        assert!(!buffer.should_flush());
        buffer.push([3u8; 32]);
        assert!(buffer.should_flush());

        let cancel = CancellationToken::new();
        let flushed = buffer.flush(&cancel).await.unwrap();
        assert_eq!(flushed.proofs.len(), 3);
        for proof in &flushed.proofs {
            assert!(proof.verify());
        }
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn batch_flush_rejects_when_empty() {
        let rpc = std::sync::Arc::new(FakeRpc { broadcasts: Mutex::new(Vec::new()) });
        let anchor = BlockchainAnchor::new("test-chain", rpc);
        let mut buffer = BatchAnchorBuffer::new(anchor, 3, Duration::from_secs(3600));
        let cancel = CancellationToken::new();
        assert!(buffer.flush(&cancel).await.is_err());
    }

    #[tokio::test]
    async fn flushed_entry_records_verify_against_the_batch_root() {
        let rpc = std::sync::Arc::new(FakeRpc { broadcasts: Mutex::new(Vec::new()) });
        let anchor = BlockchainAnchor::new("test-chain", rpc.clone());
        let mut buffer = BatchAnchorBuffer::new(anchor, 3, Duration::from_secs(3600));
        buffer.push([1u8; 32]);
        buffer.push([2u8; 32]);
        buffer.push([3u8; 32]);

        let cancel = CancellationToken::new();
        let flushed = buffer.flush(&cancel).await.unwrap();
        assert_eq!(flushed.entries.len(), 3);

        let checker = BlockchainAnchor::new("test-chain", rpc);
        for (entry, hash) in flushed.entries.iter().zip([[1u8; 32], [2u8; 32], [3u8; 32]]) {
            assert_eq!(entry.hash, hash);
            assert!(checker.verify(entry).await.unwrap());
        }
    }

    #[tokio::test]
    async fn flushed_entry_rejects_a_substituted_hash() {
        let rpc = std::sync::Arc::new(FakeRpc { broadcasts: Mutex::new(Vec::new()) });
        let anchor = BlockchainAnchor::new("test-chain", rpc.clone());
        let mut buffer = BatchAnchorBuffer::new(anchor, 2, Duration::from_secs(3600));
        buffer.push([1u8; 32]);
        buffer.push([2u8; 32]);

        let cancel = CancellationToken::new();
        let mut flushed = buffer.flush(&cancel).await.unwrap();
        flushed.entries[0].hash = [9u8; 32];

        let checker = BlockchainAnchor::new("test-chain", rpc);
        assert!(!checker.verify(&flushed.entries[0]).await.unwrap());
    }
}
