//! The persistent state directory layout (spec §6): one directory per
//! device holding the MMR node file, the secure event log, signing key
//! material, the root-signature log, and (on Unix) the IPC socket.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Resolved paths under a device's state directory.
///
/// The caller supplies `root`; [`StateDirConfig::ensure`] validates it and
/// creates it (and the `mmr/` subdirectory) with owner-only permissions if
/// absent. Nothing here parses a config file or reads an environment
/// variable — the embedder decides `root` and passes it in.
#[derive(Clone, Debug)]
pub struct StateDirConfig {
    root: PathBuf,
}

impl StateDirConfig {
    /// Point at `root`, without touching the filesystem yet.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        StateDirConfig { root: root.into() }
    }

    /// The root directory itself.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The append-only MMR node file: `mmr/nodes.bin`.
    pub fn mmr_nodes(&self) -> PathBuf {
        self.root.join("mmr").join("nodes.bin")
    }

    /// The secure event log's SQLite database: `events.db`.
    pub fn events_db(&self) -> PathBuf {
        self.root.join("events.db")
    }

    /// The device's Ed25519 private key: `signing_key`.
    pub fn signing_key(&self) -> PathBuf {
        self.root.join("signing_key")
    }

    /// The device's Ed25519 public key: `signing_key.pub`.
    pub fn signing_key_pub(&self) -> PathBuf {
        self.root.join("signing_key.pub")
    }

    /// The newline-delimited root-signature log: `signatures.log`.
    pub fn signatures_log(&self) -> PathBuf {
        self.root.join("signatures.log")
    }

    /// The local IPC endpoint, Unix only: `daemon.sock`.
    pub fn daemon_sock(&self) -> PathBuf {
        self.root.join("daemon.sock")
    }

    /// Create `root` and its `mmr/` subdirectory if absent, restricting
    /// both to owner-only access on Unix. Fails if `root`'s parent exists
    /// but is not writable.
    pub fn ensure(&self) -> Result<()> {
        if let Some(parent) = self.root.parent() {
            if parent.exists() {
                let meta = std::fs::metadata(parent).map_err(|e| Error::Io {
                    operation: "stat state directory parent",
                    source: e,
                })?;
                if meta.permissions().readonly() {
                    return Err(Error::StateDir(format!(
                        "state directory parent {} is not writable",
                        parent.display()
                    )));
                }
            }
        }
        std::fs::create_dir_all(self.root.join("mmr")).map_err(|e| Error::Io {
            operation: "create state directory",
            source: e,
        })?;
        restrict_to_owner(&self.root);
        restrict_to_owner(&self.root.join("mmr"));
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_to_owner(dir: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(meta) = std::fs::metadata(dir) {
        let mut perms = meta.permissions();
        perms.set_mode(0o700);
        let _ = std::fs::set_permissions(dir, perms);
    }
}

#[cfg(not(unix))]
fn restrict_to_owner(_dir: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_rooted_under_the_state_directory() {
        let config = StateDirConfig::new("/tmp/witnessd-device-a");
        assert_eq!(config.mmr_nodes(), Path::new("/tmp/witnessd-device-a/mmr/nodes.bin"));
        assert_eq!(config.events_db(), Path::new("/tmp/witnessd-device-a/events.db"));
        assert_eq!(config.daemon_sock(), Path::new("/tmp/witnessd-device-a/daemon.sock"));
    }

    #[test]
    fn ensure_creates_the_directory_tree() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("state");
        let config = StateDirConfig::new(&root);
        config.ensure().unwrap();
        assert!(config.root().is_dir());
        assert!(config.mmr_nodes().parent().unwrap().is_dir());
    }

    #[test]
    #[cfg(unix)]
    fn ensure_restricts_permissions_to_owner() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("state");
        let config = StateDirConfig::new(&root);
        config.ensure().unwrap();
        let mode = std::fs::metadata(config.root()).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o700);
    }
}
