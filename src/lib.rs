//! Loopwright - iterative loop controller with progress analysis
//!
//! Drives a task through repeated iterations until the output fulfils a
//! completion promise, an iteration limit is reached, or the loop is
//! cancelled. Every iteration is recorded durably and analyzed for signs of
//! stagnation.
//!
//! # Architecture
//!
//! - [`controller`] - The `Idle`/`Active` state machine and its reports
//! - [`state`] - Loop state, iteration records and options
//! - [`completion`] - `<promise>` tag extraction and matching
//! - [`progress`] - Error normalization and stagnation heuristics
//! - [`storage`] - Snapshot store and append-only history log
//! - [`collab`] - Git, tool runner and template collaborators
//! - [`config`] - Configuration loading and validation
//! - [`error`] - Custom error types and handling
//! - [`testing`] - In-memory stores and collaborator mocks
//!
//! # Example
//!
//! ```rust
//! use loopwright::testing::{MemoryHistoryLog, MemorySnapshotStore};
//! use loopwright::{IterationMetadata, LoopController, LoopOptions, ProgressAnalyzer};
//!
//! let mut controller = LoopController::with_storage(
//!     Box::new(MemorySnapshotStore::new()),
//!     Box::new(MemoryHistoryLog::new()),
//!     ProgressAnalyzer::default(),
//! );
//! controller
//!     .start_loop(LoopOptions::new("Make the tests pass").completion_promise("DONE"))
//!     .unwrap();
//!
//! let outcome = controller.process_iteration("still failing", IterationMetadata::new());
//! assert!(!outcome.is_completed());
//!
//! let outcome = controller.process_iteration("<promise>DONE</promise>", IterationMetadata::new());
//! assert!(outcome.completion_detected());
//! assert!(!controller.is_loop_active());
//! ```

pub mod collab;
pub mod completion;
pub mod config;
pub mod controller;
pub mod error;
pub mod progress;
pub mod state;
pub mod storage;
pub mod testing;

// Re-export commonly used types
pub use error::{LoopError, Result};

pub use config::LoopwrightConfig;
pub use controller::{IterationOutcome, LoopController, TerminationReason};
pub use progress::{normalize_error, ProgressAnalyzer, ProgressMetrics};
pub use state::{IterationMetadata, IterationRecord, LoopOptions, LoopState, ToolResult};
pub use storage::{FileSnapshotStore, HistoryLog, JsonlHistoryLog, SnapshotStore};
