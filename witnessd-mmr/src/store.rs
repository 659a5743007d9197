//! Pluggable MMR backing stores.
//!
//! [`NodeStore`] is the read/write contract the [`crate::Mmr`] engine needs.
//! [`MemStore`] is a `BTreeMap`-backed store for tests and ephemeral
//! computations; [`FileStore`] is the append-only 41-byte-record file
//! described in §6.

use std::{
    cell::RefCell,
    collections::BTreeMap,
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::Path,
};

use crate::{
    Error, Result,
    node::{NODE_RECORD_SIZE, Node},
};

/// Read access to the MMR backing store.
pub trait NodeStoreReader {
    /// Retrieve the node at `pos`, if it has been written.
    fn get(&self, pos: u64) -> Result<Option<Node>>;
}

/// Append-only write access to the MMR backing store.
pub trait NodeStoreWriter {
    /// Persist `nodes` starting at the current end of the store.
    ///
    /// Implementations may assume `nodes` are contiguous and begin exactly
    /// at the store's current size (callers never rewrite existing
    /// positions — see I1).
    fn append(&mut self, nodes: &[Node]) -> Result<()>;
}

/// An in-memory MMR store backed by a `BTreeMap`.
///
/// Used for tests and for MMRs that don't need to survive the process
/// (e.g. verifying a standalone proof against an ad-hoc reconstruction).
#[derive(Clone, Default)]
pub struct MemStore(RefCell<BTreeMap<u64, Node>>);

impl MemStore {
    /// Create an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl NodeStoreReader for MemStore {
    fn get(&self, pos: u64) -> Result<Option<Node>> {
        Ok(self.0.borrow().get(&pos).copied())
    }
}

impl NodeStoreWriter for MemStore {
    fn append(&mut self, nodes: &[Node]) -> Result<()> {
        let mut store = self.0.borrow_mut();
        for node in nodes {
            store.insert(node.index(), *node);
        }
        Ok(())
    }
}

/// The append-only node file described in §6: fixed 41-byte records,
/// `u64 index | u8 height | 32 bytes hash`, opened with a size check
/// (`file_size % 41 == 0`) so a truncated final record is caught at open
/// rather than silently misread.
#[derive(Debug)]
pub struct FileStore {
    file: File,
    len_nodes: u64,
}

impl FileStore {
    /// Open (creating if absent) the node file at `path`.
    ///
    /// Returns [`Error::CorruptedStore`] if the file size is not a multiple
    /// of [`NODE_RECORD_SIZE`] — a partial final record from a crash
    /// mid-write. The caller is expected to run a recovery pass that
    /// truncates to the last valid record boundary before reopening.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)
            .map_err(|e| Error::StoreError(e.to_string()))?;
        let size = file
            .metadata()
            .map_err(|e| Error::StoreError(e.to_string()))?
            .len();
        if size % NODE_RECORD_SIZE as u64 != 0 {
            return Err(Error::CorruptedStore(size));
        }
        Ok(FileStore {
            file,
            len_nodes: size / NODE_RECORD_SIZE as u64,
        })
    }

    /// The number of nodes currently persisted.
    pub fn len(&self) -> u64 {
        self.len_nodes
    }

    /// `true` if no nodes have been written yet.
    pub fn is_empty(&self) -> bool {
        self.len_nodes == 0
    }

    /// Truncate the file to the last valid 41-byte record boundary.
    ///
    /// Recovery path for [`Error::CorruptedStore`]: call this on a file
    /// opened directly (bypassing [`FileStore::open`]'s size check) to
    /// discard a partial trailing record, then reopen normally.
    pub fn recover(path: impl AsRef<Path>) -> Result<()> {
        let file = OpenOptions::new()
            .write(true)
            .open(&path)
            .map_err(|e| Error::StoreError(e.to_string()))?;
        let size = file
            .metadata()
            .map_err(|e| Error::StoreError(e.to_string()))?
            .len();
        let valid_len = (size / NODE_RECORD_SIZE as u64) * NODE_RECORD_SIZE as u64;
        file.set_len(valid_len)
            .map_err(|e| Error::StoreError(e.to_string()))?;
        Ok(())
    }
}

impl NodeStoreReader for FileStore {
    fn get(&self, pos: u64) -> Result<Option<Node>> {
        if pos >= self.len_nodes {
            return Ok(None);
        }
        // Flush is unnecessary here: append() uses File directly (not a
        // buffered writer), so every write already reached the OS.
        let mut file = &self.file;
        file.seek(SeekFrom::Start(pos * NODE_RECORD_SIZE as u64))
            .map_err(|e| Error::StoreError(e.to_string()))?;
        let mut buf = [0u8; NODE_RECORD_SIZE];
        file.read_exact(&mut buf)
            .map_err(|e| Error::StoreError(e.to_string()))?;
        Ok(Some(Node::from_record(&buf, pos)?))
    }
}

impl NodeStoreWriter for FileStore {
    fn append(&mut self, nodes: &[Node]) -> Result<()> {
        for (i, node) in nodes.iter().enumerate() {
            let expected = self.len_nodes + i as u64;
            if node.index() != expected {
                return Err(Error::IndexMismatch {
                    expected,
                    actual: node.index(),
                });
            }
        }
        let mut buf = Vec::with_capacity(nodes.len() * NODE_RECORD_SIZE);
        for node in nodes {
            buf.extend_from_slice(&node.to_record());
        }
        self.file
            .write_all(&buf)
            .map_err(|e| Error::StoreError(e.to_string()))?;
        self.file
            .sync_data()
            .map_err(|e| Error::StoreError(e.to_string()))?;
        self.len_nodes += nodes.len() as u64;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_store_round_trips() {
        let mut store = MemStore::new();
        let node = Node::leaf(0, [1u8; 32]);
        store.append(&[node]).unwrap();
        assert_eq!(store.get(0).unwrap(), Some(node));
        assert_eq!(store.get(1).unwrap(), None);
    }

    #[test]
    fn file_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nodes.bin");
        let mut store = FileStore::open(&path).unwrap();
        assert!(store.is_empty());

        let nodes = [Node::leaf(0, [2u8; 32]), Node::internal(1, 1, [3u8; 32])];
        store.append(&nodes).unwrap();
        assert_eq!(store.len(), 2);

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.get(0).unwrap(), Some(nodes[0]));
        assert_eq!(reopened.get(1).unwrap(), Some(nodes[1]));
    }

    #[test]
    fn file_store_rejects_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nodes.bin");
        {
            let mut store = FileStore::open(&path).unwrap();
            store.append(&[Node::leaf(0, [4u8; 32])]).unwrap();
        }
        // Corrupt: truncate to a non-multiple-of-41 size.
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(NODE_RECORD_SIZE as u64 - 5).unwrap();

        let err = FileStore::open(&path).unwrap_err();
        assert!(matches!(err, Error::CorruptedStore(_)));

        FileStore::recover(&path).unwrap();
        let recovered = FileStore::open(&path).unwrap();
        assert_eq!(recovered.len(), 0);
    }
}
