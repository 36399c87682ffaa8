//! In-memory and mock implementations of the storage and collaborator traits.
//!
//! Every mock is cheap to clone and clones share their contents, so a test can
//! keep a handle, move a clone into a controller and inspect it afterwards.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::collab::git::{CommitResult, DiffSummary, GitStatus, VersionControl};
use crate::collab::tools::ToolRunner;
use crate::error::{LoopError, Result};
use crate::state::{IterationRecord, LoopState, ToolResult};
use crate::storage::{HistoryLog, SnapshotStore};

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A write observed by the in-memory stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageEvent {
    SnapshotSaved { iteration: u32 },
    SnapshotDeleted,
    HistoryAppended { iteration: u32 },
}

/// Ordered record of writes shared between stores.
///
/// # Example
///
/// ```rust
/// use loopwright::testing::{MemoryHistoryLog, MemorySnapshotStore, StorageJournal};
///
/// let journal = StorageJournal::new();
/// let snapshot = MemorySnapshotStore::new().with_journal(journal.clone());
/// let log = MemoryHistoryLog::new().with_journal(journal.clone());
/// assert!(journal.events().is_empty());
/// # drop((snapshot, log));
/// ```
#[derive(Debug, Clone, Default)]
pub struct StorageJournal {
    events: Arc<Mutex<Vec<StorageEvent>>>,
}

impl StorageJournal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, event: StorageEvent) {
        locked(&self.events).push(event);
    }

    /// Events in the order they happened.
    #[must_use]
    pub fn events(&self) -> Vec<StorageEvent> {
        locked(&self.events).clone()
    }
}

/// In-memory [`SnapshotStore`] with failure injection.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshotStore {
    state: Arc<Mutex<Option<LoopState>>>,
    fail_writes: Arc<AtomicBool>,
    journal: StorageJournal,
}

impl MemorySnapshotStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a stored snapshot.
    #[must_use]
    pub fn with_state(self, state: LoopState) -> Self {
        *locked(&self.state) = Some(state);
        self
    }

    #[must_use]
    pub fn with_journal(mut self, journal: StorageJournal) -> Self {
        self.journal = journal;
        self
    }

    /// Make subsequent saves and deletes fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::SeqCst);
    }

    /// The stored snapshot, active or not.
    #[must_use]
    pub fn stored(&self) -> Option<LoopState> {
        locked(&self.state).clone()
    }

    fn check_writable(&self, operation: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(LoopError::persistence(
                operation,
                PathBuf::from("memory://snapshot"),
                "injected failure",
            ));
        }
        Ok(())
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self) -> Result<Option<LoopState>> {
        Ok(self.stored().filter(|state| state.active))
    }

    fn save(&self, state: &LoopState) -> Result<()> {
        self.check_writable("save snapshot")?;
        *locked(&self.state) = Some(state.clone());
        self.journal.record(StorageEvent::SnapshotSaved {
            iteration: state.iteration,
        });
        Ok(())
    }

    fn delete(&self) -> Result<()> {
        self.check_writable("delete snapshot")?;
        *locked(&self.state) = None;
        self.journal.record(StorageEvent::SnapshotDeleted);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory://snapshot".to_string()
    }
}

/// In-memory [`HistoryLog`] with failure injection.
#[derive(Debug, Clone, Default)]
pub struct MemoryHistoryLog {
    records: Arc<Mutex<Vec<IterationRecord>>>,
    fail_appends: Arc<AtomicBool>,
    journal: StorageJournal,
}

impl MemoryHistoryLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_journal(mut self, journal: StorageJournal) -> Self {
        self.journal = journal;
        self
    }

    /// Make subsequent appends fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.fail_appends.store(failing, Ordering::SeqCst);
    }

    /// Appended records.
    #[must_use]
    pub fn records(&self) -> Vec<IterationRecord> {
        locked(&self.records).clone()
    }
}

impl HistoryLog for MemoryHistoryLog {
    fn append(&self, record: &IterationRecord) -> Result<()> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(LoopError::persistence(
                "append history",
                PathBuf::from("memory://history"),
                "injected failure",
            ));
        }
        locked(&self.records).push(record.clone());
        self.journal.record(StorageEvent::HistoryAppended {
            iteration: record.iteration,
        });
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<IterationRecord>> {
        Ok(self.records())
    }

    fn describe(&self) -> String {
        "memory://history".to_string()
    }
}

/// Mock [`VersionControl`].
///
/// # Example
///
/// ```rust
/// use loopwright::collab::VersionControl;
/// use loopwright::testing::MockVersionControl;
///
/// let git = MockVersionControl::new().with_commit_hash("abc1234");
/// let result = git.create_commit("fix", 1);
/// assert_eq!(result.commit.as_deref(), Some("abc1234"));
/// ```
#[derive(Debug, Clone)]
pub struct MockVersionControl {
    status: GitStatus,
    status_error: Option<String>,
    commit_hash: String,
    commit_error: Option<String>,
    commits: Arc<Mutex<Vec<(u32, String)>>>,
}

impl Default for MockVersionControl {
    fn default() -> Self {
        Self {
            status: GitStatus {
                branch: "main".to_string(),
                commit: "0000000".to_string(),
                ..GitStatus::default()
            },
            status_error: None,
            commit_hash: "1234567".to_string(),
            commit_error: None,
            commits: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl MockVersionControl {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_modified_files(mut self, files: Vec<String>) -> Self {
        self.status.modified = files;
        self
    }

    #[must_use]
    pub fn with_commit_hash(mut self, hash: &str) -> Self {
        self.commit_hash = hash.to_string();
        self
    }

    /// Make every commit attempt fail with `error`.
    #[must_use]
    pub fn with_commit_error(mut self, error: &str) -> Self {
        self.commit_error = Some(error.to_string());
        self
    }

    /// Make `status` fail with `error`.
    #[must_use]
    pub fn with_status_error(mut self, error: &str) -> Self {
        self.status_error = Some(error.to_string());
        self
    }

    /// Successful commits as `(iteration, message)`.
    #[must_use]
    pub fn commits(&self) -> Vec<(u32, String)> {
        locked(&self.commits).clone()
    }
}

impl VersionControl for MockVersionControl {
    fn status(&self) -> Result<GitStatus> {
        match &self.status_error {
            Some(error) => Err(LoopError::git("status", error.clone())),
            None => Ok(self.status.clone()),
        }
    }

    fn create_commit(&self, message: &str, iteration: u32) -> CommitResult {
        if let Some(error) = &self.commit_error {
            return CommitResult::failed(error.clone());
        }
        locked(&self.commits).push((iteration, message.to_string()));
        CommitResult::committed(self.commit_hash.clone())
    }

    fn diff(&self) -> Result<DiffSummary> {
        Ok(DiffSummary {
            files: self.status.changed_files(),
            ..DiffSummary::default()
        })
    }

    fn log(&self, count: usize) -> Result<Vec<String>> {
        Ok(self
            .commits()
            .into_iter()
            .rev()
            .take(count)
            .map(|(iteration, message)| {
                format!("{} - [loop {}] {}", self.commit_hash, iteration, message)
            })
            .collect())
    }
}

/// Mock [`ToolRunner`] returning canned results per preset.
#[derive(Debug, Clone, Default)]
pub struct MockToolRunner {
    presets: BTreeMap<String, Vec<ToolResult>>,
    failures: BTreeMap<String, String>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockToolRunner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_preset(mut self, name: &str, results: Vec<ToolResult>) -> Self {
        self.presets.insert(name.to_string(), results);
        self
    }

    /// Make `name` fail with a tool execution error.
    #[must_use]
    pub fn with_failure(mut self, name: &str, message: &str) -> Self {
        self.failures.insert(name.to_string(), message.to_string());
        self
    }

    /// Presets requested so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        locked(&self.calls).clone()
    }
}

#[async_trait]
impl ToolRunner for MockToolRunner {
    async fn run_preset(&self, name: &str) -> Result<Vec<ToolResult>> {
        locked(&self.calls).push(name.to_string());
        if let Some(message) = self.failures.get(name) {
            return Err(LoopError::tool(name, message.clone()));
        }
        self.presets
            .get(name)
            .cloned()
            .ok_or_else(|| LoopError::UnknownPreset {
                name: name.to_string(),
            })
    }

    fn preset_names(&self) -> Vec<String> {
        self.presets.keys().cloned().collect()
    }
}
