//! The `Commit` pipeline (spec §2): wires the MMR, secure event log, VDF
//! engine, and anchor registry together into the six-step control flow a
//! checkpoint goes through on its way from an observed file state to a
//! durable, chain-linked, delay-proofed record.

use std::fs;
use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use rand_core::OsRng;
use tokio_util::sync::CancellationToken;

use witnessd_crypto::{
    hash::domain_hash,
    signing::{DeviceId, DevicePublicKey, DeviceSigningKey},
};
use witnessd_eventlog::{ContentHash, EventHash, EventLog, EventLogConfig, SecureEvent, Timestamp};
use witnessd_mmr::{FileStore, Mmr};

use crate::anchor_bridge;
use crate::error::{Error, Result};
use crate::state_dir::StateDirConfig;

const COMMIT_VDF_DOMAIN: &str = "witnessd-commit-vdf-seed-v1";

/// Everything the engine needs at construction time. No file-format
/// parsing, no environment reads — the embedder resolves all of this and
/// hands it over as plain values, same as `eventlog::EventLogConfig` or
/// `vdf::Parameters`.
pub struct EngineConfig {
    /// Where persistent state lives on disk.
    pub state_dir: StateDirConfig,
    /// The per-device secret used to MAC secure events.
    pub mac_key: Vec<u8>,
    /// VDF calibration for [`Engine::commit`].
    pub vdf_params: witnessd_vdf::Parameters,
    /// Enabled external anchor providers, if any are configured.
    pub anchor_registry: Option<Arc<witnessd_anchor::Registry>>,
    /// A blockchain batch-anchor buffer, if batched (rather than
    /// per-commit) blockchain anchoring is enabled. Entries queued via
    /// commits accumulate here until [`Engine::flush_batch_anchor_if_due`]
    /// flushes them, independent of `anchor_registry`'s own (unbatched)
    /// providers.
    pub batch_anchor: Option<tokio::sync::Mutex<witnessd_anchor::blockchain::BatchAnchorBuffer>>,
}

/// The result of one successful [`Engine::commit`] call.
#[derive(Debug)]
pub struct CommitResult {
    /// The secure event appended to the per-path chain.
    pub event: SecureEvent,
    /// The VDF proof binding a minimum elapsed time since the path's
    /// previous event.
    pub vdf: witnessd_vdf::Proof,
    /// The MMR leaf index this commit's event hash was appended at.
    pub mmr_leaf_index: u64,
    /// The MMR root immediately after this commit.
    pub mmr_root: [u8; 32],
    /// The outcome of submitting `event.event_hash` to the anchor
    /// registry, if one was configured and submission was requested.
    pub anchor: Option<witnessd_anchor::CommitOutcome>,
}

/// The evidentiary engine: a per-device MMR, secure event log, and signing
/// identity, orchestrated through [`Engine::commit`].
pub struct Engine {
    state_dir: StateDirConfig,
    mmr: RwLock<Mmr<FileStore>>,
    event_log: EventLog,
    signing_key: DeviceSigningKey,
    device_id: DeviceId,
    vdf_params: witnessd_vdf::Parameters,
    anchor_registry: Option<Arc<witnessd_anchor::Registry>>,
    batch_anchor: Option<tokio::sync::Mutex<witnessd_anchor::blockchain::BatchAnchorBuffer>>,
}

impl Engine {
    /// Open (or initialize) the engine's state directory: ensures the
    /// directory layout exists, loads or generates the device's signing
    /// key, and opens the MMR and secure event log over their respective
    /// files.
    pub fn open(config: EngineConfig) -> Result<Self> {
        config.state_dir.ensure()?;

        let signing_key = load_or_generate_signing_key(&config.state_dir)?;
        let device_id = signing_key.public_key().device_id();

        let store = FileStore::open(config.state_dir.mmr_nodes())?;
        let mmr = Mmr::new(store.len(), store);

        let event_log = EventLog::open(
            config.state_dir.events_db(),
            EventLogConfig {
                mac_key: config.mac_key,
            },
        )?;

        Ok(Engine {
            state_dir: config.state_dir,
            mmr: RwLock::new(mmr),
            event_log,
            signing_key,
            device_id,
            vdf_params: config.vdf_params,
            anchor_registry: config.anchor_registry,
            batch_anchor: config.batch_anchor,
        })
    }

    /// This device's stable identifier (first 16 bytes of `SHA256(pub)`).
    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    /// The device's public key, for embedding in evidence packet
    /// provenance sections.
    pub fn public_key(&self) -> DevicePublicKey {
        self.signing_key.public_key()
    }

    /// `true` if the secure event log has degraded to read-only after a
    /// failed integrity check; [`Engine::commit`] always fails in this
    /// state.
    pub fn is_read_only(&self) -> bool {
        self.event_log.is_read_only()
    }

    /// Run the six-step commit pipeline (spec §2) for a freshly observed
    /// `(path, content_hash, size)` triple from the file watcher:
    ///
    /// 1. the caller already computed `content_hash`/`size`; this step
    ///    derives `size_delta` against the path's previous event;
    /// 2. fetch the path's previous secure event for the chain link;
    /// 3. compute a VDF proof over `domain_hash(previous_event_hash ||
    ///    content_hash)`, enforcing at least `min_duration` of wall-clock
    ///    elapsed since the previous event;
    /// 4. insert the new `SecureEvent` (chain-linked, MAC'd) in one atomic
    ///    transaction that also advances the integrity record;
    /// 5. append an MMR leaf `H(0x00 || event_hash)` (via `Mmr::append`,
    ///    which applies the leaf domain tag itself);
    /// 6. if an anchor registry is configured and `submit_anchor` is set,
    ///    submit `event_hash` to every enabled provider.
    ///
    /// The VDF computation blocks the calling thread; callers on an async
    /// runtime should not call this from a latency-sensitive context
    /// without `spawn_blocking`-ing the whole pipeline themselves, since
    /// steps 2-6 are cheap relative to step 3.
    pub async fn commit(
        &self,
        path: &str,
        content_hash: ContentHash,
        size: u64,
        min_duration: Duration,
        submit_anchor: bool,
        cancel: &CancellationToken,
    ) -> Result<CommitResult> {
        if self.event_log.is_read_only() {
            return Err(Error::ReadOnly);
        }

        // Step 1 + 2: previous event for this path, and the size delta
        // against it.
        let previous = self.event_log.get_last_secure_event_for(path)?;
        let (previous_event_hash, size_delta): (EventHash, i64) = match &previous {
            Some(event) => (event.event_hash, size as i64 - event.size as i64),
            None => (EventHash::GENESIS, size as i64),
        };

        // Step 3: VDF proof over the chain link and the new content hash.
        let seed = domain_hash(COMMIT_VDF_DOMAIN, &[previous_event_hash.0.as_slice(), content_hash.0.as_slice()]);
        let params = self.vdf_params;
        let proof = tokio::task::spawn_blocking(move || witnessd_vdf::compute(seed, min_duration, &params))
            .await
            .map_err(|_| witnessd_vdf::Error::Cancelled)??;

        // Step 4: append the secure event atomically.
        let ts: Timestamp = Utc::now().timestamp_nanos_opt().unwrap_or(0);
        let delta = size_delta.to_be_bytes().to_vec();
        let event = self
            .event_log
            .insert_secure_event(path, self.device_id, ts, content_hash, size, Some(delta))?;

        // Step 5: append the MMR leaf under the writer lock end to end.
        let (mmr_leaf_index, mmr_root) = {
            let mut mmr = self.mmr.write();
            let leaf_index = mmr.append(&event.event_hash.0)?;
            let root = mmr.root()?;
            (leaf_index, root)
        };

        // Step 6: optional external anchoring — immediate per-provider
        // submission via the registry, and/or queuing into the blockchain
        // batch buffer for a later flush.
        let anchor = if submit_anchor {
            match &self.anchor_registry {
                Some(registry) => Some(registry.commit(event.event_hash.0, cancel).await?),
                None => None,
            }
        } else {
            None
        };
        if submit_anchor {
            if let Some(buffer) = &self.batch_anchor {
                buffer.lock().await.push(event.event_hash.0);
            }
        }

        tracing::debug!(
            path,
            monotonic_event_id = event.monotonic_event_id,
            mmr_leaf_index,
            iterations = proof.iterations,
            "committed checkpoint"
        );

        Ok(CommitResult {
            event,
            vdf: proof,
            mmr_leaf_index,
            mmr_root,
            anchor,
        })
    }

    /// Sign the current MMR root and append a line to `signatures.log`
    /// (`"<rfc3339> <root-hex> <signature-hex> <size>"`, per spec §6).
    /// Intended to be called periodically by the embedder, independent of
    /// any single commit, so external observers get a freshly signed
    /// attestation of the whole store's current shape.
    pub fn sign_current_root(&self) -> Result<()> {
        let mmr = self.mmr.read();
        if mmr.is_empty() {
            return Ok(());
        }
        let root = mmr.root()?;
        let size = mmr.size();
        drop(mmr);

        let signature = self.signing_key.sign(&root);
        let line = format!(
            "{} {} {} {}\n",
            Utc::now().to_rfc3339(),
            hex::encode(root),
            hex::encode(signature),
            size
        );
        append_line(&self.state_dir.signatures_log(), &line)
    }

    /// If a batch-anchor buffer is configured and has accumulated enough
    /// entries or waited long enough, flush it and return each entry's
    /// event hash alongside the packet-ready [`witnessd_evidence::packet::AnchorReference`]
    /// the embedder should attach to that checkpoint. Returns an empty
    /// vec if no buffer is configured or none is due yet.
    pub async fn flush_batch_anchor_if_due(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<(EventHash, witnessd_evidence::packet::AnchorReference)>> {
        let Some(buffer) = &self.batch_anchor else {
            return Ok(Vec::new());
        };
        let mut guard = buffer.lock().await;
        if !guard.should_flush() {
            return Ok(Vec::new());
        }
        let flushed = guard.flush(cancel).await?;
        drop(guard);

        Ok(flushed
            .entries
            .into_iter()
            .map(|record| (EventHash(record.hash), anchor_bridge::to_anchor_reference(&record)))
            .collect())
    }

    /// Direct access to the event log, for read-only queries (history,
    /// integrity status) that don't go through the commit pipeline.
    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    /// The MMR's current root, or `None` if nothing has been committed yet.
    pub fn mmr_root(&self) -> Result<Option<[u8; 32]>> {
        let mmr = self.mmr.read();
        if mmr.is_empty() {
            Ok(None)
        } else {
            Ok(Some(mmr.root()?))
        }
    }
}

fn load_or_generate_signing_key(state_dir: &StateDirConfig) -> Result<DeviceSigningKey> {
    let key_path = state_dir.signing_key();
    if key_path.exists() {
        let bytes = zeroize::Zeroizing::new(fs::read(&key_path).map_err(|e| Error::Io {
            operation: "read signing key",
            source: e,
        })?);
        return Ok(DeviceSigningKey::from_bytes(&bytes)?);
    }

    let key = DeviceSigningKey::generate(&mut OsRng);
    write_owner_only(&key_path, &key.to_bytes()[..])?;
    write_owner_only(&state_dir.signing_key_pub(), &key.public_key().to_bytes())?;
    Ok(key)
}

fn write_owner_only(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes).map_err(|e| Error::Io {
        operation: "write key material",
        source: e,
    })?;
    restrict_to_owner(path);
    Ok(())
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::Io {
            operation: "open signatures log",
            source: e,
        })?;
    file.write_all(line.as_bytes()).map_err(|e| Error::Io {
        operation: "append to signatures log",
        source: e,
    })?;
    restrict_to_owner(path);
    Ok(())
}

#[cfg(unix)]
fn restrict_to_owner(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(meta) = fs::metadata(path) {
        let mut perms = meta.permissions();
        perms.set_mode(0o600);
        let _ = fs::set_permissions(path, perms);
    }
}

#[cfg(not(unix))]
fn restrict_to_owner(_path: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_engine() -> (tempfile::TempDir, Engine) {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::open(EngineConfig {
            state_dir: StateDirConfig::new(dir.path().join("state")),
            mac_key: b"test-device-secret".to_vec(),
            vdf_params: witnessd_vdf::Parameters {
                iterations_per_second: 1_000_000,
                min_iterations: 10,
                max_iterations: 10_000,
            },
            anchor_registry: None,
            batch_anchor: None,
        })
        .unwrap();
        (dir, engine)
    }

    #[tokio::test]
    async fn first_commit_chains_to_genesis_and_appends_one_leaf() {
        let (_dir, engine) = open_engine();
        let cancel = CancellationToken::new();
        let result = engine
            .commit("/tmp/doc.txt", ContentHash([1u8; 32]), 100, Duration::from_millis(0), false, &cancel)
            .await
            .unwrap();

        assert_eq!(result.event.previous_hash, EventHash::GENESIS);
        assert_eq!(result.mmr_leaf_index, 0);
        assert_eq!(engine.mmr_root().unwrap(), Some(result.mmr_root));
    }

    #[tokio::test]
    async fn second_commit_chains_to_first_and_derives_size_delta() {
        let (_dir, engine) = open_engine();
        let cancel = CancellationToken::new();
        let first = engine
            .commit("/tmp/doc.txt", ContentHash([1u8; 32]), 100, Duration::from_millis(0), false, &cancel)
            .await
            .unwrap();
        let second = engine
            .commit("/tmp/doc.txt", ContentHash([2u8; 32]), 150, Duration::from_millis(0), false, &cancel)
            .await
            .unwrap();

        assert_eq!(second.event.previous_hash, first.event.event_hash);
        assert_eq!(second.mmr_leaf_index, 1);
        assert_ne!(second.mmr_root, first.mmr_root);
    }

    #[tokio::test]
    async fn distinct_paths_do_not_share_chain_state() {
        let (_dir, engine) = open_engine();
        let cancel = CancellationToken::new();
        engine
            .commit("/tmp/a.txt", ContentHash([1u8; 32]), 10, Duration::from_millis(0), false, &cancel)
            .await
            .unwrap();
        let b = engine
            .commit("/tmp/b.txt", ContentHash([2u8; 32]), 20, Duration::from_millis(0), false, &cancel)
            .await
            .unwrap();

        assert_eq!(b.event.previous_hash, EventHash::GENESIS);
    }

    #[tokio::test]
    async fn vdf_proof_is_bound_to_previous_hash_and_content_hash() {
        let (_dir, engine) = open_engine();
        let cancel = CancellationToken::new();
        let result = engine
            .commit("/tmp/doc.txt", ContentHash([9u8; 32]), 10, Duration::from_millis(0), false, &cancel)
            .await
            .unwrap();

        let expected_seed = domain_hash(COMMIT_VDF_DOMAIN, &[EventHash::GENESIS.0.as_slice(), [9u8; 32].as_slice()]);
        assert_eq!(result.vdf.input, expected_seed);
        assert!(witnessd_vdf::verify(&result.vdf, &engine.vdf_params).unwrap());
    }

    #[tokio::test]
    async fn reopening_resumes_mmr_and_event_log_state() {
        let dir = tempfile::tempdir().unwrap();
        let state_dir = StateDirConfig::new(dir.path().join("state"));
        let cancel = CancellationToken::new();

        let first_root = {
            let engine = Engine::open(EngineConfig {
                state_dir: state_dir.clone(),
                mac_key: b"secret".to_vec(),
                vdf_params: witnessd_vdf::Parameters {
                    iterations_per_second: 1_000_000,
                    min_iterations: 10,
                    max_iterations: 10_000,
                },
                anchor_registry: None,
                batch_anchor: None,
            })
            .unwrap();
            engine
                .commit("/tmp/doc.txt", ContentHash([1u8; 32]), 10, Duration::from_millis(0), false, &cancel)
                .await
                .unwrap()
                .mmr_root
        };

        let reopened = Engine::open(EngineConfig {
            state_dir,
            mac_key: b"secret".to_vec(),
            vdf_params: witnessd_vdf::Parameters {
                iterations_per_second: 1_000_000,
                min_iterations: 10,
                max_iterations: 10_000,
            },
            anchor_registry: None,
            batch_anchor: None,
        })
        .unwrap();
        assert_eq!(reopened.mmr_root().unwrap(), Some(first_root));
        assert_eq!(reopened.event_log().count_events_for("/tmp/doc.txt").unwrap(), 1);
    }

    #[tokio::test]
    async fn sign_current_root_appends_a_signatures_log_line() {
        let (_dir, engine) = open_engine();
        let cancel = CancellationToken::new();
        engine
            .commit("/tmp/doc.txt", ContentHash([1u8; 32]), 10, Duration::from_millis(0), false, &cancel)
            .await
            .unwrap();
        engine.sign_current_root().unwrap();

        let contents = fs::read_to_string(engine.state_dir.signatures_log()).unwrap();
        assert_eq!(contents.lines().count(), 1);
        let root_hex = hex::encode(engine.mmr_root().unwrap().unwrap());
        assert!(contents.contains(&root_hex));
    }

    struct FakeRpc {
        broadcasts: std::sync::Mutex<Vec<[u8; 32]>>,
    }

    #[async_trait::async_trait]
    impl witnessd_anchor::blockchain::BitcoinRpcClient for FakeRpc {
        async fn broadcast_op_return(&self, payload: &[u8; 32]) -> witnessd_anchor::Result<String> {
            let mut broadcasts = self.broadcasts.lock().unwrap();
            broadcasts.push(*payload);
            Ok(format!("txid-{}", broadcasts.len() - 1))
        }

        async fn fetch_op_return_payload(&self, txid: &str) -> witnessd_anchor::Result<Option<[u8; 32]>> {
            let index: usize = txid.strip_prefix("txid-").unwrap().parse().unwrap();
            Ok(self.broadcasts.lock().unwrap().get(index).copied())
        }
    }

    #[tokio::test]
    async fn queued_commits_flush_into_evidence_ready_anchor_references() {
        let dir = tempfile::tempdir().unwrap();
        let rpc = std::sync::Arc::new(FakeRpc {
            broadcasts: std::sync::Mutex::new(Vec::new()),
        });
        let anchor = witnessd_anchor::blockchain::BlockchainAnchor::new("test-chain", rpc);
        let buffer = witnessd_anchor::blockchain::BatchAnchorBuffer::new(anchor, 2, Duration::from_secs(3600));

        let engine = Engine::open(EngineConfig {
            state_dir: StateDirConfig::new(dir.path().join("state")),
            mac_key: b"test-device-secret".to_vec(),
            vdf_params: witnessd_vdf::Parameters {
                iterations_per_second: 1_000_000,
                min_iterations: 10,
                max_iterations: 10_000,
            },
            anchor_registry: None,
            batch_anchor: Some(tokio::sync::Mutex::new(buffer)),
        })
        .unwrap();
        let cancel = CancellationToken::new();

        let first = engine
            .commit("/tmp/a.txt", ContentHash([1u8; 32]), 10, Duration::from_millis(0), true, &cancel)
            .await
            .unwrap();
        assert!(engine.flush_batch_anchor_if_due(&cancel).await.unwrap().is_empty());

        let second = engine
            .commit("/tmp/b.txt", ContentHash([2u8; 32]), 20, Duration::from_millis(0), true, &cancel)
            .await
            .unwrap();

        let flushed = engine.flush_batch_anchor_if_due(&cancel).await.unwrap();
        assert_eq!(flushed.len(), 2);
        let hashes: Vec<_> = flushed.iter().map(|(hash, _)| *hash).collect();
        assert!(hashes.contains(&first.event.event_hash));
        assert!(hashes.contains(&second.event.event_hash));
        for (_, reference) in &flushed {
            assert_eq!(reference.provider, "blockchain");
            assert!(!reference.proof.is_empty());
        }
    }
}
