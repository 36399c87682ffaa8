//! Durable storage for loop state.
//!
//! Two independent stores back the controller:
//!
//! - [`SnapshotStore`]: the single current-loop document, rewritten in full on
//!   every mutation and deleted when the loop ends.
//! - [`HistoryLog`]: an append-only record of every processed iteration that
//!   outlives the snapshot.
//!
//! The controller writes the log entry for iteration N before it rewrites the
//! snapshot for iteration N+1. After a crash the log may therefore be one
//! entry ahead of the snapshot, and recovery should trust the log.
//!
//! Both traits take `&self`; in-memory fakes in [`crate::testing`] share their
//! contents through cheap clones so tests can inspect them after handing them
//! to a controller.

pub mod history_log;
pub mod snapshot;

pub use history_log::JsonlHistoryLog;
pub use snapshot::FileSnapshotStore;

use crate::error::Result;
use crate::state::{IterationRecord, LoopState};

/// Storage for the single current-loop snapshot.
pub trait SnapshotStore: Send {
    /// Load the snapshot.
    ///
    /// Returns `Ok(None)` when there is no active loop, including when the
    /// stored document is corrupt (degraded load).
    ///
    /// # Errors
    ///
    /// Returns an error only for unexpected I/O failures.
    fn load(&self) -> Result<Option<LoopState>>;

    /// Replace the snapshot with `state`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::LoopError::Persistence`] when the write fails.
    fn save(&self, state: &LoopState) -> Result<()>;

    /// Remove the snapshot. Removing a missing snapshot succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`crate::LoopError::Persistence`] when removal fails.
    fn delete(&self) -> Result<()>;

    /// Human-readable location, used in log messages.
    fn describe(&self) -> String;
}

/// Append-only storage for iteration records.
pub trait HistoryLog: Send {
    /// Append one record.
    ///
    /// # Errors
    ///
    /// Returns [`crate::LoopError::Persistence`] when the append fails.
    fn append(&self, record: &IterationRecord) -> Result<()>;

    /// Read every record in append order.
    ///
    /// # Errors
    ///
    /// Returns an error when the log exists but cannot be read.
    fn read_all(&self) -> Result<Vec<IterationRecord>>;

    /// Number of records in the log.
    ///
    /// # Errors
    ///
    /// Returns an error when the log exists but cannot be read.
    fn entry_count(&self) -> Result<usize> {
        Ok(self.read_all()?.len())
    }

    /// Human-readable location, used in log messages.
    fn describe(&self) -> String;
}
