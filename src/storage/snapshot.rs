//! Atomic JSON snapshot of the active loop.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::warn;

use super::SnapshotStore;
use crate::error::{LoopError, Result};
use crate::state::LoopState;

/// Temporary file suffix for atomic writes.
const TMP_SUFFIX: &str = ".tmp";

/// Lock file suffix guarding concurrent writes from this process.
const LOCK_SUFFIX: &str = ".lock";

/// Snapshot store backed by a single JSON file.
///
/// Writes go to a temporary sibling that is synced and renamed over the real
/// file, so a crash never leaves a half-written snapshot behind.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    /// Create a store for the snapshot at `path`.
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Path of the snapshot file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(suffix);
        self.path.with_file_name(name)
    }

    /// Path of the temporary file used during writes.
    #[must_use]
    pub fn tmp_path(&self) -> PathBuf {
        self.sibling(TMP_SUFFIX)
    }

    /// Path of the lock file.
    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.sibling(LOCK_SUFFIX)
    }

    /// Whether a snapshot file exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    fn write_atomic(&self, state: &LoopState) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let lock_file = File::create(self.lock_path())?;
        FileExt::lock_exclusive(&lock_file)?;

        let json = serde_json::to_string_pretty(state)?;
        let tmp_path = self.tmp_path();
        let mut tmp_file = File::create(&tmp_path)?;
        tmp_file.write_all(json.as_bytes())?;
        tmp_file.sync_all()?;
        fs::rename(&tmp_path, &self.path)?;

        FileExt::unlock(&lock_file)?;
        Ok(())
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn load(&self) -> Result<Option<LoopState>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                warn!(
                    "Unreadable loop snapshot at {}: {}. Treating as no active loop.",
                    self.path.display(),
                    e
                );
                return Ok(None);
            }
        };

        let state: LoopState = match serde_json::from_str(&content) {
            Ok(state) => state,
            Err(e) => {
                warn!(
                    "Corrupted loop snapshot at {}: {}. Treating as no active loop.",
                    self.path.display(),
                    e
                );
                return Ok(None);
            }
        };

        if !state.active {
            return Ok(None);
        }

        Ok(Some(state))
    }

    fn save(&self, state: &LoopState) -> Result<()> {
        self.write_atomic(state)
            .map_err(|e| LoopError::persistence("save snapshot", &self.path, e))
    }

    fn delete(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LoopError::persistence("delete snapshot", &self.path, e)),
        }
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
