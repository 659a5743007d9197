//! Bitcoin-style batch Merkle tree for blockchain anchor batching.
//!
//! Distinct from [`witnessd_mmr::Mmr`]'s append-only forest and bagging
//! rule: this is a plain binary tree built once over a fixed batch of
//! leaves, using the standard Bitcoin convention of duplicating a lone
//! right-edge hash when a level has an odd count. It reuses the MMR's
//! leaf/internal domain tags (I3) so a batch leaf and an MMR leaf over the
//! same bytes still diverge from a bare, untagged hash.

use witnessd_crypto::hash::{mmr_internal_hash, mmr_leaf_hash, Digest};

use crate::error::{Error, Result};

/// One step of a batch inclusion proof: the sibling hash and which side it
/// sits on (`true` = sibling is on the left, matching the wire convention
/// `0 = sibling on the left`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchProofStep {
    /// The sibling's hash at this level.
    pub sibling: Digest,
    /// Whether the sibling sits to the left of the current node.
    pub sibling_on_left: bool,
}

/// An inclusion proof that a 32-byte fingerprint was included at a given
/// index in a [`BatchTree`]'s leaf set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchProof {
    /// The leaf's index within the batch.
    pub leaf_index: usize,
    /// The leaf's raw (pre-hash) fingerprint.
    pub leaf: Digest,
    /// Sibling path from the leaf up to the root.
    pub path: Vec<BatchProofStep>,
    /// The batch root.
    pub root: Digest,
}

impl BatchProof {
    /// Recompute the root from `leaf` and `path` and compare to the
    /// recorded root.
    pub fn verify(&self) -> bool {
        let mut current = mmr_leaf_hash(&self.leaf);
        for step in &self.path {
            current = if step.sibling_on_left {
                mmr_internal_hash(&step.sibling, &current)
            } else {
                mmr_internal_hash(&current, &step.sibling)
            };
        }
        current == self.root
    }

    /// Encode per spec: `leaf_index (u64 BE) | leaf (32) | path_len (u32
    /// BE) | path... | root (32)`, each path element `[direction_byte,
    /// sibling]` with `0 = sibling on the left`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + 32 + 4 + self.path.len() * 33 + 32);
        buf.extend_from_slice(&(self.leaf_index as u64).to_be_bytes());
        buf.extend_from_slice(&self.leaf);
        buf.extend_from_slice(&(self.path.len() as u32).to_be_bytes());
        for step in &self.path {
            buf.push(if step.sibling_on_left { 0 } else { 1 });
            buf.extend_from_slice(&step.sibling);
        }
        buf.extend_from_slice(&self.root);
        buf
    }

    /// Decode the wire form produced by [`BatchProof::to_bytes`].
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        let mut pos = 0usize;
        let mut take = |n: usize| -> Result<&[u8]> {
            let end = pos
                .checked_add(n)
                .filter(|&end| end <= buf.len())
                .ok_or_else(|| Error::MalformedResponse("batch proof truncated".into()))?;
            let slice = &buf[pos..end];
            pos = end;
            Ok(slice)
        };

        let leaf_index = u64::from_be_bytes(take(8)?.try_into().unwrap()) as usize;
        let leaf: Digest = take(32)?.try_into().unwrap();
        let path_len = u32::from_be_bytes(take(4)?.try_into().unwrap()) as usize;
        let mut path = Vec::with_capacity(path_len);
        for _ in 0..path_len {
            let direction = take(1)?[0];
            let sibling: Digest = take(32)?.try_into().unwrap();
            path.push(BatchProofStep {
                sibling,
                sibling_on_left: direction == 0,
            });
        }
        let root: Digest = take(32)?.try_into().unwrap();
        if pos != buf.len() {
            return Err(Error::MalformedResponse("batch proof has trailing bytes".into()));
        }

        Ok(BatchProof { leaf_index, leaf, path, root })
    }
}

/// A one-shot Merkle tree built over a fixed batch of 32-byte fingerprints,
/// levels stored bottom-up for proof generation.
pub struct BatchTree {
    leaves: Vec<Digest>,
    levels: Vec<Vec<Digest>>,
}

impl BatchTree {
    /// Build a tree over `leaves`. Errors if `leaves` is empty.
    pub fn build(leaves: Vec<Digest>) -> Result<Self> {
        if leaves.is_empty() {
            return Err(Error::InvalidConfig("batch tree requires at least one leaf".into()));
        }
        let mut level: Vec<Digest> = leaves.iter().map(|l| mmr_leaf_hash(l)).collect();
        let mut levels = vec![level.clone()];
        while level.len() > 1 {
            let mut next = Vec::with_capacity(level.len().div_ceil(2));
            let mut i = 0;
            while i < level.len() {
                let left = level[i];
                let right = if i + 1 < level.len() { level[i + 1] } else { level[i] };
                next.push(mmr_internal_hash(&left, &right));
                i += 2;
            }
            levels.push(next.clone());
            level = next;
        }
        Ok(BatchTree { leaves, levels })
    }

    /// The batch root (top of the tree).
    pub fn root(&self) -> Digest {
        self.levels.last().expect("build always leaves at least one level")[0]
    }

    /// Number of leaves in the batch.
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    /// Whether the batch is empty (never true for a successfully built tree).
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Generate an inclusion proof for the leaf at `index`.
    pub fn prove(&self, index: usize) -> Result<BatchProof> {
        if index >= self.leaves.len() {
            return Err(Error::LeafOutOfRange(index, self.leaves.len()));
        }
        let mut path = Vec::new();
        let mut pos = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let is_right = pos % 2 == 1;
            let sibling_pos = if is_right { pos - 1 } else { pos + 1 };
            let sibling = if sibling_pos < level.len() {
                level[sibling_pos]
            } else {
                level[pos]
            };
            path.push(BatchProofStep {
                sibling,
                sibling_on_left: is_right,
            });
            pos /= 2;
        }
        Ok(BatchProof {
            leaf_index: index,
            leaf: self.leaves[index],
            path,
            root: self.root(),
        })
    }
}
