//! SQLite schema for the secure event log.

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS integrity (
    id INTEGER PRIMARY KEY CHECK (id = 0),
    chain_hash BLOB NOT NULL,
    event_count INTEGER NOT NULL,
    mac BLOB NOT NULL
);

CREATE TABLE IF NOT EXISTS events (
    monotonic_event_id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_path TEXT NOT NULL,
    device_id BLOB NOT NULL,
    ts INTEGER NOT NULL,
    content_hash BLOB NOT NULL,
    size INTEGER NOT NULL,
    delta BLOB,
    previous_hash BLOB NOT NULL,
    event_hash BLOB NOT NULL UNIQUE,
    mac BLOB NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_events_path_id
    ON events (file_path, monotonic_event_id);

CREATE TABLE IF NOT EXISTS regions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id INTEGER NOT NULL REFERENCES events (monotonic_event_id),
    label TEXT NOT NULL,
    start_offset INTEGER NOT NULL,
    end_offset INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS contexts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id INTEGER NOT NULL REFERENCES events (monotonic_event_id),
    key TEXT NOT NULL,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS verification_index (
    event_id INTEGER PRIMARY KEY REFERENCES events (monotonic_event_id),
    verified_at INTEGER,
    verifier TEXT
);
"#;
