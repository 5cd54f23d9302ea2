//! Checkpoint blob storage.

use crate::error::Result;
use std::path::Path;

/// Persists checkpoint blobs.
pub trait CheckpointStorage: Send + Sync {
    /// Writes `blob` to `path`. A reader never observes a partially written blob.
    fn write(&self, blob: &[u8], path: &Path) -> Result<()>;

    fn read(&self, path: &Path) -> Result<Vec<u8>>;
}
