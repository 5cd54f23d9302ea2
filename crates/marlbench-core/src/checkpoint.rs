//! Experiment checkpoints.
//!
//! A checkpoint snapshots the counters, the collector, and every group's loss
//! and replay-buffer state as one JSON document. It is written atomically and
//! restored all at once.

use crate::error::RestoreError;
use marlbench_abstraction::{CheckpointStorage, CollaboratorError, GroupMap};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Progress counters, persisted and restored together.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Counters {
    /// Wall time spent in collection and training, in seconds.
    pub total_time: f64,
    pub total_frames: u64,
    pub n_iters_performed: u64,
    pub mean_return: f64,
}

/// Serialized experiment state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentCheckpoint {
    pub state: Counters,
    pub collector: serde_json::Value,
    pub losses: BTreeMap<String, serde_json::Value>,
    pub buffers: BTreeMap<String, serde_json::Value>,
}

impl ExperimentCheckpoint {
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8], path: &Path) -> Result<Self, RestoreError> {
        serde_json::from_slice(bytes)
            .map_err(|err| RestoreError::Corrupt { path: path.to_path_buf(), reason: err.to_string() })
    }

    /// Loads a checkpoint from `storage`.
    pub fn read(storage: &dyn CheckpointStorage, path: &Path) -> Result<Self, RestoreError> {
        let bytes =
            storage.read(path).map_err(|source| RestoreError::Read { path: path.to_path_buf(), source })?;
        Self::from_bytes(&bytes, path)
    }

    /// Checks that the checkpoint holds state for exactly the groups in `groups`.
    pub fn check_groups(&self, groups: &GroupMap) -> Result<(), RestoreError> {
        for group in groups.groups() {
            if !self.losses.contains_key(group) {
                return Err(RestoreError::MissingGroupState { group: group.to_string(), kind: "loss" });
            }
            if !self.buffers.contains_key(group) {
                return Err(RestoreError::MissingGroupState { group: group.to_string(), kind: "buffer" });
            }
        }
        if let Some(extra) = self.losses.keys().chain(self.buffers.keys()).find(|g| !groups.contains(g)) {
            return Err(RestoreError::UnexpectedGroupState { group: extra.clone() });
        }
        Ok(())
    }
}

/// Path of the checkpoint written after `total_frames` frames.
pub fn checkpoint_file_name(total_frames: u64) -> String {
    format!("checkpoint_{}.json", total_frames)
}

/// Stores checkpoints on the local filesystem.
///
/// Blobs are written to a temporary file in the target directory and then
/// renamed into place.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsCheckpointStorage;

impl CheckpointStorage for FsCheckpointStorage {
    fn write(&self, blob: &[u8], path: &Path) -> marlbench_abstraction::Result<()> {
        let dir = path.parent().map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        std::fs::create_dir_all(&dir)?;
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(blob)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|err| CollaboratorError::Io(err.error))?;
        Ok(())
    }

    fn read(&self, path: &Path) -> marlbench_abstraction::Result<Vec<u8>> {
        Ok(std::fs::read(path)?)
    }
}
