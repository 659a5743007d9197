//! The MMR node record: a position, a height, and a domain-separated hash.
//!
//! §6's on-disk format is a strictly append-only file of fixed 41-byte
//! records: `u64 index | u8 height | 32 bytes hash`. Leaves carry no raw
//! value — the caller hashes its own data with [`leaf_hash`] before
//! appending, so the store only ever holds opaque 32-byte digests.

use witnessd_crypto::hash::{mmr_internal_hash, mmr_leaf_hash};

use crate::{Error, Result};

/// Fixed on-disk/in-memory record size: 8 (index) + 1 (height) + 32 (hash).
pub const NODE_RECORD_SIZE: usize = 41;

/// One node in the MMR: either a leaf (height 0) or an internal merge node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Node {
    index: u64,
    height: u8,
    hash: [u8; 32],
}

impl Node {
    /// Construct a leaf node at `index` from its domain-separated hash.
    pub fn leaf(index: u64, hash: [u8; 32]) -> Self {
        Node {
            index,
            height: 0,
            hash,
        }
    }

    /// Construct an internal node at `index` and `height` from its merge hash.
    pub fn internal(index: u64, height: u8, hash: [u8; 32]) -> Self {
        Node {
            index,
            height,
            hash,
        }
    }

    /// This node's position in the MMR.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// This node's height (0 for leaves).
    pub fn height(&self) -> u8 {
        self.height
    }

    /// The 32-byte domain-separated hash identifying this node.
    pub fn hash(&self) -> [u8; 32] {
        self.hash
    }

    /// Merge two siblings into their parent: `H(0x01 || left || right)`.
    pub fn merge(index: u64, height: u8, left: &Node, right: &Node) -> Node {
        Node::internal(index, height, mmr_internal_hash(&left.hash, &right.hash))
    }

    /// Serialize to the fixed 41-byte on-disk record.
    pub fn to_record(self) -> [u8; NODE_RECORD_SIZE] {
        let mut buf = [0u8; NODE_RECORD_SIZE];
        buf[0..8].copy_from_slice(&self.index.to_be_bytes());
        buf[8] = self.height;
        buf[9..41].copy_from_slice(&self.hash);
        buf
    }

    /// Deserialize from a 41-byte record, checking that the stored index
    /// matches the position it was read from.
    pub fn from_record(record: &[u8], expected_index: u64) -> Result<Self> {
        if record.len() != NODE_RECORD_SIZE {
            return Err(Error::InvalidInput(format!(
                "node record must be {} bytes, got {}",
                NODE_RECORD_SIZE,
                record.len()
            )));
        }
        let index = u64::from_be_bytes(record[0..8].try_into().expect("8 bytes"));
        if index != expected_index {
            return Err(Error::IndexMismatch {
                expected: expected_index,
                actual: index,
            });
        }
        let height = record[8];
        let hash: [u8; 32] = record[9..41].try_into().expect("32 bytes");
        Ok(Node {
            index,
            height,
            hash,
        })
    }
}

/// Compute the domain-separated leaf hash: `H(0x00 || data)`.
pub fn leaf_hash(data: &[u8]) -> [u8; 32] {
    mmr_leaf_hash(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_round_trips() {
        let node = Node::leaf(3, leaf_hash(b"data"));
        let record = node.to_record();
        let decoded = Node::from_record(&record, 3).expect("decode");
        assert_eq!(node, decoded);
    }

    #[test]
    fn record_is_exactly_41_bytes() {
        let node = Node::internal(7, 2, [0xAB; 32]);
        assert_eq!(node.to_record().len(), NODE_RECORD_SIZE);
    }

    #[test]
    fn index_mismatch_detected() {
        let node = Node::leaf(3, leaf_hash(b"data"));
        let record = node.to_record();
        let err = Node::from_record(&record, 4).unwrap_err();
        assert!(matches!(err, Error::IndexMismatch { expected: 4, actual: 3 }));
    }

    #[test]
    fn merge_matches_domain_separated_hash() {
        let left = Node::leaf(0, leaf_hash(b"left"));
        let right = Node::leaf(1, leaf_hash(b"right"));
        let parent = Node::merge(2, 1, &left, &right);
        assert_eq!(parent.hash(), mmr_internal_hash(&left.hash(), &right.hash()));
        assert_ne!(parent.hash(), left.hash());
    }
}
