//! Data types for the secure event log: the event record itself, and the
//! small newtypes that keep hash kinds from being mixed up positionally.

/// A device's stable identifier (first 16 bytes of `SHA256(pubkey)`, per
/// `witnessd_crypto::signing::DevicePublicKey::device_id`).
pub type DeviceId = [u8; 16];

/// A content hash over a file's bytes at checkpoint time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContentHash(pub [u8; 32]);

/// The domain-separated hash identifying one secure event (I4).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EventHash(pub [u8; 32]);

impl EventHash {
    /// The all-zero genesis hash used as `previous_hash` for a path's first
    /// event (I5).
    pub const GENESIS: EventHash = EventHash([0u8; 32]);
}

/// Nanoseconds since the Unix epoch. Deterministic and portable, unlike
/// `SystemTime`, so it can be hashed directly into `event_hash`.
pub type Timestamp = i64;

/// One row of the secure event log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecureEvent {
    /// Monotonic id assigned by the store (`AUTOINCREMENT` primary key).
    pub monotonic_event_id: u64,
    /// The file path this checkpoint covers.
    pub file_path: String,
    /// The device that produced this event.
    pub device_id: DeviceId,
    /// Event timestamp.
    pub ts: Timestamp,
    /// Content hash of the file at checkpoint time.
    pub content_hash: ContentHash,
    /// File size in bytes at checkpoint time.
    pub size: u64,
    /// Optional binary delta against the previous checkpoint.
    pub delta: Option<Vec<u8>>,
    /// The previous event's `event_hash` for this path (I5); all-zero for
    /// the first event.
    pub previous_hash: EventHash,
    /// This event's own hash (I4).
    pub event_hash: EventHash,
    /// `HMAC(domain, same fields as event_hash)` (I4).
    pub mac: [u8; 32],
}

/// The singleton integrity record: the current chain head and its MAC (I6).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntegrityRecord {
    /// `event_hash` of the most recently inserted event across all paths.
    pub chain_hash: EventHash,
    /// Total number of events ever inserted.
    pub event_count: u64,
    /// `HMAC(domain, chain_hash || event_count)`.
    pub mac: [u8; 32],
}

impl IntegrityRecord {
    /// The record for a brand-new, empty log.
    pub fn genesis() -> Self {
        IntegrityRecord {
            chain_hash: EventHash::GENESIS,
            event_count: 0,
            mac: [0u8; 32],
        }
    }
}

/// Configuration for opening a [`crate::EventLog`].
#[derive(Clone)]
pub struct EventLogConfig {
    /// The per-device secret used to compute event and integrity MACs.
    pub mac_key: Vec<u8>,
}
