//! Append-only JSONL history log.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use super::HistoryLog;
use crate::error::{LoopError, Result};
use crate::state::IterationRecord;

/// History log storing one serialized [`IterationRecord`] per line.
///
/// Lines are only ever appended. Nothing in the crate rewrites, compacts or
/// deletes the file.
#[derive(Debug, Clone)]
pub struct JsonlHistoryLog {
    path: PathBuf,
}

impl JsonlHistoryLog {
    /// Create a log at `path`. The file is created on first append.
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_line(&self, record: &IterationRecord) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string(record)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", json)?;
        file.sync_data()?;
        Ok(())
    }
}

impl HistoryLog for JsonlHistoryLog {
    fn append(&self, record: &IterationRecord) -> Result<()> {
        self.write_line(record)
            .map_err(|e| LoopError::persistence("append history", &self.path, e))
    }

    fn read_all(&self) -> Result<Vec<IterationRecord>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(LoopError::persistence("read history", &self.path, e)),
        };

        let mut records = Vec::new();
        for (line_num, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| LoopError::persistence("read history", &self.path, e))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<IterationRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(
                    "Skipping malformed history entry at {}:{}: {}",
                    self.path.display(),
                    line_num + 1,
                    e
                ),
            }
        }

        Ok(records)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
