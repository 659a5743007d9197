//! Inclusion and range proofs, and their bit-exact §6 wire encoding.
//!
//! A proof step is `(sibling_hash, is_left)`: `is_left` means the sibling
//! sits to the left of the node being folded, so verification combines
//! `H_internal(sibling, current)`; otherwise `H_internal(current, sibling)`.

use witnessd_crypto::hash::mmr_internal_hash;

use crate::{Error, Result};

/// One step of a Merkle path: the sibling hash and which side it's on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProofStep {
    /// The sibling's hash.
    pub sibling_hash: [u8; 32],
    /// `true` if the sibling is the left child of their shared parent.
    pub is_left: bool,
}

/// Fold a leaf hash up a Merkle path to its containing peak.
pub fn fold_path(leaf_hash: [u8; 32], path: &[ProofStep]) -> [u8; 32] {
    path.iter().fold(leaf_hash, |acc, step| {
        if step.is_left {
            mmr_internal_hash(&step.sibling_hash, &acc)
        } else {
            mmr_internal_hash(&acc, &step.sibling_hash)
        }
    })
}

/// Bag a peak list right-to-left: `root = peaks[last]; for i = last-1..0:
/// root = H_internal(peaks[i], root)`.
pub fn bag_peaks(peaks: &[[u8; 32]]) -> Result<[u8; 32]> {
    let mut iter = peaks.iter().rev();
    let mut root = *iter.next().ok_or(Error::GetRootOnEmpty)?;
    for peak in iter {
        root = mmr_internal_hash(peak, &root);
    }
    Ok(root)
}

/// A proof that a single leaf is included in the MMR at a given witness root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InclusionProof {
    /// The leaf's MMR position (`leaf_mmr_index` in the operation contract).
    pub leaf_index: u64,
    /// The leaf's own hash (`H(0x00 || data)`).
    pub leaf_hash: [u8; 32],
    /// Sibling path from the leaf up to its containing peak.
    pub path: Vec<ProofStep>,
    /// All peak hashes, left to right, at proof-generation time.
    pub peaks: Vec<[u8; 32]>,
    /// Which entry of `peaks` the leaf's path lands on.
    pub peak_position: u16,
    /// The MMR size at proof-generation time.
    pub mmr_size: u64,
    /// The witness root at proof-generation time.
    pub root: [u8; 32],
}

impl InclusionProof {
    /// Recompute the leaf's peak from `leaf_hash` + `path`, check it against
    /// the recorded peak, then re-bag all peaks and check against `root`.
    pub fn verify(&self) -> Result<bool> {
        let peak = *self
            .peaks
            .get(self.peak_position as usize)
            .ok_or_else(|| Error::ProofInvalid("peak_position out of range".into()))?;
        let folded = fold_path(self.leaf_hash, &self.path);
        if folded != peak {
            return Ok(false);
        }
        let bagged = bag_peaks(&self.peaks)?;
        Ok(bagged == self.root)
    }

    /// Serialize per §6: `version=1 | type=0x01 | leaf_index | leaf_hash |
    /// path_len | path... | peaks_len | peaks... | peak_position | mmr_size
    /// | root`.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        if self.path.len() > u16::MAX as usize {
            return Err(Error::InvalidInput("path too long to encode".into()));
        }
        if self.peaks.len() > u16::MAX as usize {
            return Err(Error::InvalidInput("too many peaks to encode".into()));
        }
        let mut buf = Vec::with_capacity(47 + self.path.len() * 33 + self.peaks.len() * 32);
        buf.push(1u8); // version
        buf.push(0x01); // type: inclusion proof
        buf.extend_from_slice(&self.leaf_index.to_be_bytes());
        buf.extend_from_slice(&self.leaf_hash);
        buf.extend_from_slice(&(self.path.len() as u16).to_be_bytes());
        for step in &self.path {
            buf.extend_from_slice(&step.sibling_hash);
            buf.push(step.is_left as u8);
        }
        buf.extend_from_slice(&(self.peaks.len() as u16).to_be_bytes());
        for peak in &self.peaks {
            buf.extend_from_slice(peak);
        }
        buf.extend_from_slice(&self.peak_position.to_be_bytes());
        buf.extend_from_slice(&self.mmr_size.to_be_bytes());
        buf.extend_from_slice(&self.root);
        Ok(buf)
    }

    /// Deserialize the §6 wire format.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        let mut r = Reader::new(buf);
        let version = r.u8()?;
        if version != 1 {
            return Err(Error::InvalidInput(format!("unsupported version {}", version)));
        }
        let kind = r.u8()?;
        if kind != 0x01 {
            return Err(Error::InvalidInput(format!(
                "expected inclusion proof type 0x01, got 0x{:02x}",
                kind
            )));
        }
        let leaf_index = r.u64()?;
        let leaf_hash = r.hash32()?;
        let path_len = r.u16()? as usize;
        let mut path = Vec::with_capacity(path_len);
        for _ in 0..path_len {
            let sibling_hash = r.hash32()?;
            let is_left = r.u8()? != 0;
            path.push(ProofStep { sibling_hash, is_left });
        }
        let peaks_len = r.u16()? as usize;
        let mut peaks = Vec::with_capacity(peaks_len);
        for _ in 0..peaks_len {
            peaks.push(r.hash32()?);
        }
        let peak_position = r.u16()?;
        let mmr_size = r.u64()?;
        let root = r.hash32()?;
        r.finish()?;
        Ok(InclusionProof {
            leaf_index,
            leaf_hash,
            path,
            peaks,
            peak_position,
            mmr_size,
            root,
        })
    }
}

/// A proof that a contiguous range of leaves is included in the MMR,
/// restricted (per the operation contract) to ranges that fall entirely
/// within one peak's subtree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RangeProof {
    /// First leaf ordinal covered (inclusive).
    pub start_leaf: u64,
    /// Last leaf ordinal covered (exclusive).
    pub end_leaf: u64,
    /// The covered leaves' `(mmr_position, hash)` pairs, in position order.
    pub leaves: Vec<(u64, [u8; 32])>,
    /// Sibling path from the range's subtree root up to its containing peak.
    pub path: Vec<ProofStep>,
    /// All peak hashes, left to right, at proof-generation time.
    pub peaks: Vec<[u8; 32]>,
    /// Which entry of `peaks` the range's path lands on.
    pub peak_position: u16,
    /// The MMR size at proof-generation time.
    pub mmr_size: u64,
    /// The witness root at proof-generation time.
    pub root: [u8; 32],
}

impl RangeProof {
    /// Serialize per §6: same tail as [`InclusionProof`], with a
    /// `start_leaf | end_leaf | leaves...` header instead of a single leaf.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        if self.leaves.len() > u16::MAX as usize {
            return Err(Error::InvalidInput("too many leaves to encode".into()));
        }
        if self.path.len() > u16::MAX as usize {
            return Err(Error::InvalidInput("path too long to encode".into()));
        }
        if self.peaks.len() > u16::MAX as usize {
            return Err(Error::InvalidInput("too many peaks to encode".into()));
        }
        let mut buf = Vec::new();
        buf.push(1u8);
        buf.push(0x02); // type: range proof
        buf.extend_from_slice(&self.start_leaf.to_be_bytes());
        buf.extend_from_slice(&self.end_leaf.to_be_bytes());
        buf.extend_from_slice(&(self.leaves.len() as u16).to_be_bytes());
        for (index, _) in &self.leaves {
            buf.extend_from_slice(&index.to_be_bytes());
        }
        for (_, hash) in &self.leaves {
            buf.extend_from_slice(hash);
        }
        buf.extend_from_slice(&(self.path.len() as u16).to_be_bytes());
        for step in &self.path {
            buf.extend_from_slice(&step.sibling_hash);
            buf.push(step.is_left as u8);
        }
        buf.extend_from_slice(&(self.peaks.len() as u16).to_be_bytes());
        for peak in &self.peaks {
            buf.extend_from_slice(peak);
        }
        buf.extend_from_slice(&self.peak_position.to_be_bytes());
        buf.extend_from_slice(&self.mmr_size.to_be_bytes());
        buf.extend_from_slice(&self.root);
        Ok(buf)
    }

    /// Deserialize the §6 wire format.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        let mut r = Reader::new(buf);
        let version = r.u8()?;
        if version != 1 {
            return Err(Error::InvalidInput(format!("unsupported version {}", version)));
        }
        let kind = r.u8()?;
        if kind != 0x02 {
            return Err(Error::InvalidInput(format!(
                "expected range proof type 0x02, got 0x{:02x}",
                kind
            )));
        }
        let start_leaf = r.u64()?;
        let end_leaf = r.u64()?;
        let leaves_len = r.u16()? as usize;
        let mut indices = Vec::with_capacity(leaves_len);
        for _ in 0..leaves_len {
            indices.push(r.u64()?);
        }
        let mut leaves = Vec::with_capacity(leaves_len);
        for index in indices {
            leaves.push((index, r.hash32()?));
        }
        let path_len = r.u16()? as usize;
        let mut path = Vec::with_capacity(path_len);
        for _ in 0..path_len {
            let sibling_hash = r.hash32()?;
            let is_left = r.u8()? != 0;
            path.push(ProofStep { sibling_hash, is_left });
        }
        let peaks_len = r.u16()? as usize;
        let mut peaks = Vec::with_capacity(peaks_len);
        for _ in 0..peaks_len {
            peaks.push(r.hash32()?);
        }
        let peak_position = r.u16()?;
        let mmr_size = r.u64()?;
        let root = r.hash32()?;
        r.finish()?;
        Ok(RangeProof {
            start_leaf,
            end_leaf,
            leaves,
            path,
            peaks,
            peak_position,
            mmr_size,
            root,
        })
    }
}

/// A minimal cursor over a proof byte buffer, erroring on truncation instead
/// of panicking — the buffer may come straight off an untrusted IPC socket.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.buf.len() {
            return Err(Error::InvalidInput("proof buffer truncated".into()));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.take(2)?.try_into().expect("2 bytes")))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.take(8)?.try_into().expect("8 bytes")))
    }

    fn hash32(&mut self) -> Result<[u8; 32]> {
        Ok(self.take(32)?.try_into().expect("32 bytes"))
    }

    fn finish(self) -> Result<()> {
        if self.pos != self.buf.len() {
            return Err(Error::InvalidInput("trailing bytes after proof".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_leaf_proof() -> InclusionProof {
        let leaf_hash = witnessd_crypto::hash::mmr_leaf_hash(b"only leaf");
        InclusionProof {
            leaf_index: 0,
            leaf_hash,
            path: vec![],
            peaks: vec![leaf_hash],
            peak_position: 0,
            mmr_size: 1,
            root: leaf_hash,
        }
    }

    #[test]
    fn single_leaf_inclusion_proof_matches_spec_example() {
        // For a 1-leaf MMR with leaf hash L: version=1, type=0x01,
        // leaf_index=0, path_len=0, peaks_len=1, peak_position=0, mmr_size=1,
        // root=L.
        let proof = single_leaf_proof();
        assert!(proof.verify().unwrap());
        let bytes = proof.to_bytes().unwrap();
        assert_eq!(bytes[0], 1);
        assert_eq!(bytes[1], 0x01);
        let decoded = InclusionProof::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, proof);
    }

    #[test]
    fn tampered_leaf_hash_fails_verification() {
        let mut proof = single_leaf_proof();
        proof.leaf_hash[0] ^= 0xFF;
        assert!(!proof.verify().unwrap());
    }

    #[test]
    fn two_leaf_inclusion_proof_round_trips() {
        let l0 = witnessd_crypto::hash::mmr_leaf_hash(b"leaf0");
        let l1 = witnessd_crypto::hash::mmr_leaf_hash(b"leaf1");
        let root = mmr_internal_hash(&l0, &l1);
        let proof = InclusionProof {
            leaf_index: 0,
            leaf_hash: l0,
            path: vec![ProofStep {
                sibling_hash: l1,
                is_left: false,
            }],
            peaks: vec![root],
            peak_position: 0,
            mmr_size: 3,
            root,
        };
        assert!(proof.verify().unwrap());
        let bytes = proof.to_bytes().unwrap();
        let decoded = InclusionProof::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, proof);
    }

    #[test]
    fn range_proof_round_trips() {
        let l0 = witnessd_crypto::hash::mmr_leaf_hash(b"leaf0");
        let l1 = witnessd_crypto::hash::mmr_leaf_hash(b"leaf1");
        let root = mmr_internal_hash(&l0, &l1);
        let proof = RangeProof {
            start_leaf: 0,
            end_leaf: 2,
            leaves: vec![(0, l0), (1, l1)],
            path: vec![],
            peaks: vec![root],
            peak_position: 0,
            mmr_size: 3,
            root,
        };
        let bytes = proof.to_bytes().unwrap();
        assert_eq!(bytes[1], 0x02);
        let decoded = RangeProof::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, proof);
    }

    #[test]
    fn truncated_buffer_rejected() {
        let proof = single_leaf_proof();
        let bytes = proof.to_bytes().unwrap();
        assert!(InclusionProof::from_bytes(&bytes[..bytes.len() - 3]).is_err());
    }

    #[test]
    fn bag_peaks_empty_is_error() {
        assert!(bag_peaks(&[]).is_err());
    }

    #[test]
    fn bag_peaks_single_is_identity() {
        let peak = [9u8; 32];
        assert_eq!(bag_peaks(&[peak]).unwrap(), peak);
    }
}
