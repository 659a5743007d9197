//! HMAC-SHA256 keyed MAC, used to bind the event log's integrity record and
//! each secure event to a per-device secret so that tampering with the
//! on-disk database (which has no signing key access) cannot forge a
//! consistent chain.

use hmac::{Hmac, Mac as _};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// A 32-byte HMAC-SHA256 tag.
pub type Tag = [u8; 32];

/// Compute `HMAC-SHA256(key, domain || parts...)`.
pub fn compute(key: &[u8], domain: &'static str, parts: &[&[u8]]) -> Tag {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(domain.as_bytes());
    for part in parts {
        mac.update(part);
    }
    mac.finalize().into_bytes().into()
}

/// Verify a MAC in constant time via `hmac`'s own `verify_slice`.
pub fn verify(key: &[u8], domain: &'static str, parts: &[&[u8]], tag: &Tag) -> bool {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(domain.as_bytes());
    for part in parts {
        mac.update(part);
    }
    mac.verify_slice(tag).is_ok()
}
