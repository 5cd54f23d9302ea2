use crate::checkpoint::checkpoint_file_name;
use crate::error::{Result, RestoreError};
use chrono::Local;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Filesystem layout of one experiment.
///
/// ```text
/// <folder>/
///   <name>.json
///   checkpoints/checkpoint_<frames>.json
///   scalars/<key>.csv
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentLayout {
    folder: PathBuf,
    name: String,
}

/// `<algorithm>_<task>_<model>_<uuid8>_<yy_mm_dd-hh_mm_ss>`, lower-cased.
pub fn experiment_name(algorithm: &str, task: &str, model: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    let stamp = Local::now().format("%y_%m_%d-%H_%M_%S");
    format!("{}_{}_{}_{}_{}", algorithm, task, model, &id[..8], stamp).to_lowercase()
}

impl ExperimentLayout {
    #[must_use]
    pub fn new(folder: PathBuf, name: String) -> Self {
        Self { folder, name }
    }

    /// Layout for a new experiment under `save_folder`, or the current directory.
    pub fn fresh(save_folder: Option<&Path>, algorithm: &str, task: &str, model: &str) -> Result<Self> {
        let root = match save_folder {
            Some(folder) => folder.to_path_buf(),
            None => std::env::current_dir()?,
        };
        let name = experiment_name(algorithm, task, model);
        Ok(Self::new(root.join(&name), name))
    }

    /// Layout of the experiment a checkpoint belongs to: the checkpoint's grandparent folder.
    pub fn for_restore(restore_file: &Path) -> Result<Self> {
        let folder = restore_file.parent().and_then(Path::parent).ok_or_else(|| RestoreError::Corrupt {
            path: restore_file.to_path_buf(),
            reason: "checkpoint must live in <experiment>/checkpoints/".to_string(),
        })?;
        let folder = if folder.as_os_str().is_empty() { std::env::current_dir()? } else { folder.to_path_buf() };
        let folder = std::fs::canonicalize(&folder).unwrap_or(folder);
        let name = folder.file_name().map(|n| n.to_string_lossy().into_owned()).ok_or_else(|| {
            RestoreError::Corrupt {
                path: restore_file.to_path_buf(),
                reason: "experiment folder has no name".to_string(),
            }
        })?;
        Ok(Self::new(folder, name))
    }

    #[must_use]
    pub fn folder(&self) -> &Path {
        &self.folder
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn checkpoints_dir(&self) -> PathBuf {
        self.folder.join("checkpoints")
    }

    #[must_use]
    pub fn checkpoint_path(&self, total_frames: u64) -> PathBuf {
        self.checkpoints_dir().join(checkpoint_file_name(total_frames))
    }

    #[must_use]
    pub fn scalars_dir(&self) -> PathBuf {
        self.folder.join("scalars")
    }

    #[must_use]
    pub fn json_path(&self) -> PathBuf {
        self.folder.join(format!("{}.json", self.name))
    }

    pub fn ensure_folder(&self) -> Result<()> {
        std::fs::create_dir_all(&self.folder)?;
        Ok(())
    }
}
