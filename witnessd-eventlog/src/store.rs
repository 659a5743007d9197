//! The secure event log store: opens a SQLite database, verifies its chain
//! at open time (§4.2), and serializes writes through an in-process cache
//! of the integrity head.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};

use crate::{
    Error, Result,
    hashing::{event_hash, event_mac, integrity_mac},
    schema::SCHEMA,
    types::{ContentHash, DeviceId, EventHash, EventLogConfig, IntegrityRecord, SecureEvent, Timestamp},
};

/// A tamper-evident, MAC-chained secure event log.
pub struct EventLog {
    conn: Mutex<Connection>,
    config: EventLogConfig,
    head: Mutex<IntegrityRecord>,
    integrity_ok: Mutex<bool>,
}

impl EventLog {
    /// Open (creating if absent) the event log at `path`, apply the owner-only
    /// permission policy, and run [`EventLog::verify_integrity`].
    ///
    /// A failed integrity check does not return an error: the log opens
    /// successfully but degrades to read-only (`is_read_only() == true`),
    /// per §4.2's "open-time integrity failure degrades the log to
    /// read-only" failure model.
    pub fn open(path: impl AsRef<Path>, config: EventLogConfig) -> Result<Self> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| Error::InvalidInput(e.to_string()))?;
            restrict_to_owner_dir(dir);
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        restrict_to_owner_file(path);

        let head = load_or_init_integrity(&conn, &config.mac_key)?;

        let log = EventLog {
            conn: Mutex::new(conn),
            config,
            head: Mutex::new(head),
            integrity_ok: Mutex::new(true),
        };
        let ok = log.verify_integrity()?;
        *log.integrity_ok.lock() = ok;
        if !ok {
            tracing::error!("secure event log chain integrity check failed at open; degrading to read-only");
        }
        Ok(log)
    }

    /// `false` once an open-time (or runtime) integrity check has failed;
    /// all writes are refused while this is `false`.
    pub fn is_read_only(&self) -> bool {
        !*self.integrity_ok.lock()
    }

    /// Insert a new secure event for `path`, extending the global chain.
    ///
    /// Refuses the insert with [`Error::ReadOnly`] if the log is degraded.
    /// On any failure during the transaction the in-memory cached head is
    /// left untouched (it is only advanced after a successful commit).
    #[allow(clippy::too_many_arguments)]
    pub fn insert_secure_event(
        &self,
        file_path: &str,
        device_id: DeviceId,
        ts: Timestamp,
        content_hash: ContentHash,
        size: u64,
        delta: Option<Vec<u8>>,
    ) -> Result<SecureEvent> {
        if self.is_read_only() {
            return Err(Error::ReadOnly);
        }

        let prior_head = self.head.lock().clone();
        let delta_bytes: &[u8] = delta.as_deref().unwrap_or(&[]);

        let mut conn = self.conn.lock();
        let previous_hash: EventHash = conn
            .query_row(
                "SELECT event_hash FROM events WHERE file_path = ?1 ORDER BY monotonic_event_id DESC LIMIT 1",
                params![file_path],
                |row| {
                    let raw: Vec<u8> = row.get(0)?;
                    Ok(EventHash(to_array(&raw)))
                },
            )
            .optional()?
            .unwrap_or(EventHash::GENESIS);

        let event_hash = event_hash(
            &device_id,
            ts,
            file_path,
            &content_hash,
            size,
            delta_bytes,
            &previous_hash,
        );
        let mac = event_mac(
            &self.config.mac_key,
            &device_id,
            ts,
            file_path,
            &content_hash,
            size,
            delta_bytes,
            &previous_hash,
        );

        let new_count = prior_head.event_count + 1;
        let new_integrity_mac = integrity_mac(&self.config.mac_key, &event_hash, new_count);

        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO events (file_path, device_id, ts, content_hash, size, delta, previous_hash, event_hash, mac)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                file_path,
                device_id.as_slice(),
                ts,
                content_hash.0.as_slice(),
                size as i64,
                delta.as_deref(),
                previous_hash.0.as_slice(),
                event_hash.0.as_slice(),
                mac.as_slice(),
            ],
        )?;
        let monotonic_event_id = tx.last_insert_rowid() as u64;
        tx.execute(
            "UPDATE integrity SET chain_hash = ?1, event_count = ?2, mac = ?3 WHERE id = 0",
            params![event_hash.0.as_slice(), new_count as i64, new_integrity_mac.as_slice()],
        )?;
        tx.commit()?;
        drop(conn);

        *self.head.lock() = IntegrityRecord {
            chain_hash: event_hash,
            event_count: new_count,
            mac: new_integrity_mac,
        };

        Ok(SecureEvent {
            monotonic_event_id,
            file_path: file_path.to_string(),
            device_id,
            ts,
            content_hash,
            size,
            delta,
            previous_hash,
            event_hash,
            mac,
        })
    }

    /// The most recent event recorded for `path`, if any.
    pub fn get_last_secure_event_for(&self, path: &str) -> Result<Option<SecureEvent>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT monotonic_event_id, file_path, device_id, ts, content_hash, size, delta, previous_hash, event_hash, mac
             FROM events WHERE file_path = ?1 ORDER BY monotonic_event_id DESC LIMIT 1",
            params![path],
            row_to_event,
        )
        .optional()
        .map_err(Error::from)
    }

    /// All events recorded for `path`, optionally restricted to a
    /// `[start, end)` range of monotonic ids, in id order.
    pub fn get_events_for(&self, path: &str, range: Option<(u64, u64)>) -> Result<Vec<SecureEvent>> {
        let conn = self.conn.lock();
        let mut events = Vec::new();
        let mut stmt = conn.prepare(
            "SELECT monotonic_event_id, file_path, device_id, ts, content_hash, size, delta, previous_hash, event_hash, mac
             FROM events WHERE file_path = ?1 ORDER BY monotonic_event_id ASC",
        )?;
        let rows = stmt.query_map(params![path], row_to_event)?;
        for row in rows {
            let event = row?;
            if let Some((start, end)) = range {
                if event.monotonic_event_id < start || event.monotonic_event_id >= end {
                    continue;
                }
            }
            events.push(event);
        }
        Ok(events)
    }

    /// Total number of events recorded for `path`.
    pub fn count_events_for(&self, path: &str) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM events WHERE file_path = ?1",
            params![path],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Stream every event in id order, recomputing its hash and MAC and
    /// checking the chain link to the previous event for the same path;
    /// then check the integrity row's own MAC and that it matches the
    /// last event seen. Returns `false` (not an error) on any mismatch —
    /// that's a tamper signal, handled by degrading to read-only, not by
    /// propagating an I/O-style error.
    pub fn verify_integrity(&self) -> Result<bool> {
        let conn = self.conn.lock();
        let head = load_integrity_record(&conn)?;
        let expected_mac = integrity_mac(&self.config.mac_key, &head.chain_hash, head.event_count);
        if expected_mac != head.mac {
            tracing::warn!("integrity row MAC mismatch");
            return Ok(false);
        }

        let mut stmt = conn.prepare(
            "SELECT monotonic_event_id, file_path, device_id, ts, content_hash, size, delta, previous_hash, event_hash, mac
             FROM events ORDER BY monotonic_event_id ASC",
        )?;
        let rows = stmt.query_map([], row_to_event)?;

        use std::collections::HashMap;
        let mut last_hash_per_path: HashMap<String, EventHash> = HashMap::new();
        let mut seen = 0u64;
        let mut last_event_hash = EventHash::GENESIS;

        for row in rows {
            let event = row?;
            let expected_prev = last_hash_per_path
                .get(&event.file_path)
                .copied()
                .unwrap_or(EventHash::GENESIS);
            if event.previous_hash != expected_prev {
                tracing::warn!(path = %event.file_path, "broken previous_hash link");
                return Ok(false);
            }

            let delta_bytes: &[u8] = event.delta.as_deref().unwrap_or(&[]);
            let recomputed_hash = event_hash(
                &event.device_id,
                event.ts,
                &event.file_path,
                &event.content_hash,
                event.size,
                delta_bytes,
                &event.previous_hash,
            );
            if recomputed_hash != event.event_hash {
                tracing::warn!(id = event.monotonic_event_id, "event_hash mismatch");
                return Ok(false);
            }
            let recomputed_mac = event_mac(
                &self.config.mac_key,
                &event.device_id,
                event.ts,
                &event.file_path,
                &event.content_hash,
                event.size,
                delta_bytes,
                &event.previous_hash,
            );
            if recomputed_mac != event.mac {
                tracing::warn!(id = event.monotonic_event_id, "event MAC mismatch");
                return Ok(false);
            }

            last_hash_per_path.insert(event.file_path.clone(), event.event_hash);
            last_event_hash = event.event_hash;
            seen += 1;
        }

        if seen != head.event_count {
            tracing::warn!(seen, expected = head.event_count, "event count mismatch");
            return Ok(false);
        }
        if seen > 0 && last_event_hash != head.chain_hash {
            tracing::warn!("chain_hash does not match last event's event_hash");
            return Ok(false);
        }
        Ok(true)
    }
}

fn row_to_event(row: &rusqlite::Row) -> rusqlite::Result<SecureEvent> {
    let device_id_raw: Vec<u8> = row.get(2)?;
    let content_hash_raw: Vec<u8> = row.get(4)?;
    let previous_hash_raw: Vec<u8> = row.get(7)?;
    let event_hash_raw: Vec<u8> = row.get(8)?;
    let mac_raw: Vec<u8> = row.get(9)?;
    Ok(SecureEvent {
        monotonic_event_id: row.get::<_, i64>(0)? as u64,
        file_path: row.get(1)?,
        device_id: to_array(&device_id_raw),
        ts: row.get(3)?,
        content_hash: ContentHash(to_array(&content_hash_raw)),
        size: row.get::<_, i64>(5)? as u64,
        delta: row.get(6)?,
        previous_hash: EventHash(to_array(&previous_hash_raw)),
        event_hash: EventHash(to_array(&event_hash_raw)),
        mac: to_array(&mac_raw),
    })
}

fn to_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    bytes.try_into().expect("column width matches fixed hash/mac size")
}

fn load_integrity_record(conn: &Connection) -> Result<IntegrityRecord> {
    conn.query_row(
        "SELECT chain_hash, event_count, mac FROM integrity WHERE id = 0",
        [],
        |row| {
            let chain_hash: Vec<u8> = row.get(0)?;
            let event_count: i64 = row.get(1)?;
            let mac: Vec<u8> = row.get(2)?;
            Ok(IntegrityRecord {
                chain_hash: EventHash(to_array(&chain_hash)),
                event_count: event_count as u64,
                mac: to_array(&mac),
            })
        },
    )
    .map_err(Error::from)
}

fn load_or_init_integrity(conn: &Connection, mac_key: &[u8]) -> Result<IntegrityRecord> {
    let existing = conn
        .query_row("SELECT 1 FROM integrity WHERE id = 0", [], |_| Ok(()))
        .optional()?;
    if existing.is_none() {
        let genesis = IntegrityRecord::genesis();
        let mac = integrity_mac(mac_key, &genesis.chain_hash, genesis.event_count);
        conn.execute(
            "INSERT INTO integrity (id, chain_hash, event_count, mac) VALUES (0, ?1, ?2, ?3)",
            params![genesis.chain_hash.0.as_slice(), genesis.event_count as i64, mac.as_slice()],
        )?;
        return Ok(IntegrityRecord { mac, ..genesis });
    }
    load_integrity_record(conn)
}

#[cfg(unix)]
fn restrict_to_owner_dir(dir: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(meta) = std::fs::metadata(dir) {
        let mut perms = meta.permissions();
        perms.set_mode(0o700);
        let _ = std::fs::set_permissions(dir, perms);
    }
}

#[cfg(not(unix))]
fn restrict_to_owner_dir(_dir: &Path) {}

#[cfg(unix)]
fn restrict_to_owner_file(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(meta) = std::fs::metadata(path) {
        let mut perms = meta.permissions();
        perms.set_mode(0o600);
        let _ = std::fs::set_permissions(path, perms);
    }
}

#[cfg(not(unix))]
fn restrict_to_owner_file(_path: &Path) {}
