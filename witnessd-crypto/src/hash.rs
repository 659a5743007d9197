//! Domain-separated Blake3 hashing.
//!
//! Every hash witnessd produces is tagged with a literal ASCII domain
//! string so that values from different contexts (an MMR leaf, an MMR
//! internal merge, a secure-event hash, a VDF round) can never collide
//! even if their raw inputs happen to coincide. This mirrors the
//! leaf/internal tag discipline in the MMR engine (I3), generalized to a
//! `&str` domain tag instead of a single reserved byte, since witnessd has
//! more than two hash kinds.

/// A 32-byte Blake3 digest.
pub type Digest = [u8; 32];

/// Domain tag for MMR leaf hashes: `H(0x00 || data)`.
pub const MMR_LEAF_TAG: u8 = 0x00;
/// Domain tag for MMR internal merges: `H(0x01 || left || right)`.
pub const MMR_INTERNAL_TAG: u8 = 0x01;

/// `blake3(tag || data)`.
pub fn tagged_hash(tag: u8, data: &[u8]) -> Digest {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[tag]);
    hasher.update(data);
    *hasher.finalize().as_bytes()
}

/// MMR leaf hash per I3: `H(0x00 || data)`.
pub fn mmr_leaf_hash(data: &[u8]) -> Digest {
    tagged_hash(MMR_LEAF_TAG, data)
}

/// MMR internal merge per I3: `H(0x01 || left || right)`.
pub fn mmr_internal_hash(left: &Digest, right: &Digest) -> Digest {
    let mut input = [0u8; 65];
    input[0] = MMR_INTERNAL_TAG;
    input[1..33].copy_from_slice(left);
    input[33..65].copy_from_slice(right);
    *blake3::hash(&input).as_bytes()
}

/// `blake3(domain_ascii || data)`, used for any hash outside the MMR's own
/// leaf/internal scheme (event hashes, VDF rounds, declaration digests).
pub fn domain_hash(domain: &'static str, parts: &[&[u8]]) -> Digest {
    let mut hasher = blake3::Hasher::new();
    hasher.update(domain.as_bytes());
    for part in parts {
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_and_internal_tags_diverge() {
        let leaf = mmr_leaf_hash(b"abc");
        let plain = *blake3::hash(b"abc").as_bytes();
        assert_ne!(leaf, plain, "leaf hash must use the domain tag");
    }

    #[test]
    fn internal_merge_is_order_sensitive() {
        let a = mmr_leaf_hash(b"a");
        let b = mmr_leaf_hash(b"b");
        assert_ne!(mmr_internal_hash(&a, &b), mmr_internal_hash(&b, &a));
    }

    #[test]
    fn domain_hash_separates_contexts() {
        let a = domain_hash("witnessd-event-v1", &[b"same-bytes"]);
        let b = domain_hash("witnessd-integrity-v1", &[b"same-bytes"]);
        assert_ne!(a, b);
    }
}
