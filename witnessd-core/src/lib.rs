//! The evidentiary engine's orchestration layer.
//!
//! This crate wires together the five core modules — [`witnessd_mmr`],
//! [`witnessd_eventlog`], [`witnessd_vdf`], [`witnessd_anchor`], and
//! [`witnessd_evidence`] — behind a single [`engine::Engine`] that runs the
//! checkpoint commit pipeline described in spec §2. It also defines the
//! state directory layout (§6) and the type-only contracts the two
//! out-of-scope collaborators (file watcher, IPC server) share with the
//! engine; it implements neither collaborator itself.

#![warn(missing_docs)]

pub mod anchor_bridge;
pub mod contracts;
pub mod engine;
mod error;
pub mod state_dir;

pub use engine::{CommitResult, Engine, EngineConfig};
pub use error::{Error, Result};
pub use state_dir::StateDirConfig;
