//! Event hash and MAC computation per I4: both cover the same fields,
//! distinguished only by domain prefix, so a forged MAC can't be
//! reconstructed without the per-device secret even if `event_hash` leaks.

use witnessd_crypto::{hash::domain_hash, mac};

use crate::types::{ContentHash, DeviceId, EventHash, Timestamp};

const EVENT_DOMAIN: &str = "witnessd-event-v1";
const EVENT_MAC_DOMAIN: &str = "witnessd-event-mac-v1";
const INTEGRITY_DOMAIN: &str = "witnessd-integrity-v1";

#[allow(clippy::too_many_arguments)]
fn event_fields<'a>(
    device_id: &'a DeviceId,
    ts_be: &'a [u8; 8],
    path: &'a [u8],
    content_hash: &'a ContentHash,
    size_be: &'a [u8; 8],
    delta: &'a [u8],
    previous_hash: &'a EventHash,
) -> [&'a [u8]; 7] {
    [
        device_id.as_slice(),
        ts_be.as_slice(),
        path,
        content_hash.0.as_slice(),
        size_be.as_slice(),
        delta,
        previous_hash.0.as_slice(),
    ]
}

/// `event_hash = H(domain || device_id || ts || path || content_hash ||
/// size || delta || prev_hash)` (I4).
pub fn event_hash(
    device_id: &DeviceId,
    ts: Timestamp,
    path: &str,
    content_hash: &ContentHash,
    size: u64,
    delta: &[u8],
    previous_hash: &EventHash,
) -> EventHash {
    let ts_be = ts.to_be_bytes();
    let size_be = size.to_be_bytes();
    let fields = event_fields(
        device_id,
        &ts_be,
        path.as_bytes(),
        content_hash,
        &size_be,
        delta,
        previous_hash,
    );
    EventHash(domain_hash(EVENT_DOMAIN, &fields))
}

/// The event's MAC: same fields as `event_hash`, different domain prefix
/// (I4), keyed on the device's secret.
pub fn event_mac(
    key: &[u8],
    device_id: &DeviceId,
    ts: Timestamp,
    path: &str,
    content_hash: &ContentHash,
    size: u64,
    delta: &[u8],
    previous_hash: &EventHash,
) -> [u8; 32] {
    let ts_be = ts.to_be_bytes();
    let size_be = size.to_be_bytes();
    let fields = event_fields(
        device_id,
        &ts_be,
        path.as_bytes(),
        content_hash,
        &size_be,
        delta,
        previous_hash,
    );
    mac::compute(key, EVENT_MAC_DOMAIN, &fields)
}

/// The integrity record's MAC: `HMAC(domain, chain_hash || event_count)` (I6).
pub fn integrity_mac(key: &[u8], chain_hash: &EventHash, event_count: u64) -> [u8; 32] {
    let count_be = event_count.to_be_bytes();
    mac::compute(key, INTEGRITY_DOMAIN, &[chain_hash.0.as_slice(), &count_be])
}
