//! Testing infrastructure for loopwright.
//!
//! In-memory stores and collaborator mocks let the controller be exercised
//! without touching the file system, git or external tools.
//!
//! # Example
//!
//! ```rust
//! use loopwright::controller::LoopController;
//! use loopwright::progress::ProgressAnalyzer;
//! use loopwright::testing::{MemoryHistoryLog, MemorySnapshotStore};
//!
//! let snapshot = MemorySnapshotStore::new();
//! let log = MemoryHistoryLog::new();
//! let controller = LoopController::with_storage(
//!     Box::new(snapshot.clone()),
//!     Box::new(log.clone()),
//!     ProgressAnalyzer::default(),
//! );
//! assert!(!controller.is_loop_active());
//! ```

#[cfg(test)]
pub mod fixtures;
pub mod mocks;

#[cfg(test)]
pub use fixtures::*;
pub use mocks::*;
