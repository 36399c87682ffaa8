//! The loop controller: a two-state machine (`Idle`, `Active`) over a single
//! owned [`LoopState`].
//!
//! # Lifecycle
//!
//! - **Construct**: the snapshot is loaded once. A missing, inactive or
//!   corrupt snapshot leaves the controller `Idle`.
//! - **Start**: options are validated (the only hard failure), iteration 1 is
//!   created and the snapshot is written.
//! - **Iterate**: each processed iteration is appended to the history log
//!   *before* the snapshot is rewritten for the next iteration.
//! - **Terminate**: completion, the iteration limit or a cancel deletes the
//!   snapshot. The history log is never touched.
//!
//! Persistence failures are logged and swallowed. The in-memory state always
//! advances, so callers never see an I/O error from an iteration.

mod report;

pub use report::{format_elapsed, render_history, render_status};

use chrono::Utc;
use serde::ser::{Serialize, Serializer};
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::completion::is_completion;
use crate::config::LoopwrightConfig;
use crate::error::Result;
use crate::progress::{ProgressAnalyzer, ProgressMetrics};
use crate::state::{IterationMetadata, IterationRecord, LoopOptions, LoopState};
use crate::storage::{FileSnapshotStore, HistoryLog, JsonlHistoryLog, SnapshotStore};

/// Why a loop stopped, or why an iteration could not be processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    CompletionPromise,
    MaxIterations,
    NoActiveLoop,
}

impl TerminationReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CompletionPromise => "completion promise detected",
            Self::MaxIterations => "max iterations reached",
            Self::NoActiveLoop => "no active loop",
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of [`LoopController::process_iteration`].
#[derive(Debug, Clone, PartialEq)]
pub enum IterationOutcome {
    /// There was no loop to advance. Nothing was recorded.
    NoActiveLoop,
    /// The loop ended after recording `iteration`.
    Completed {
        iteration: u32,
        reason: TerminationReason,
        completion_detected: bool,
    },
    /// The loop continues with `iteration`.
    Continue {
        iteration: u32,
        next_prompt: String,
        progress: ProgressMetrics,
    },
}

impl IterationOutcome {
    /// True for every outcome except [`IterationOutcome::Continue`].
    #[must_use]
    pub fn is_completed(&self) -> bool {
        !matches!(self, Self::Continue { .. })
    }

    #[must_use]
    pub fn reason(&self) -> Option<TerminationReason> {
        match self {
            Self::NoActiveLoop => Some(TerminationReason::NoActiveLoop),
            Self::Completed { reason, .. } => Some(*reason),
            Self::Continue { .. } => None,
        }
    }

    #[must_use]
    pub fn completion_detected(&self) -> bool {
        matches!(
            self,
            Self::Completed {
                completion_detected: true,
                ..
            }
        )
    }

    /// The iteration just recorded (completed) or now in progress (continue).
    #[must_use]
    pub fn iteration(&self) -> Option<u32> {
        match self {
            Self::NoActiveLoop => None,
            Self::Completed { iteration, .. } | Self::Continue { iteration, .. } => {
                Some(*iteration)
            }
        }
    }

    #[must_use]
    pub fn progress(&self) -> Option<&ProgressMetrics> {
        match self {
            Self::Continue { progress, .. } => Some(progress),
            _ => None,
        }
    }
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct OutcomeDocument<'a> {
    completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    completion_detected: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    iteration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_prompt: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    progress: Option<&'a ProgressMetrics>,
}

impl Serialize for IterationOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let document = match self {
            Self::NoActiveLoop => OutcomeDocument {
                completed: true,
                reason: Some(TerminationReason::NoActiveLoop.as_str()),
                completion_detected: None,
                iteration: None,
                next_prompt: None,
                progress: None,
            },
            Self::Completed {
                iteration,
                reason,
                completion_detected,
            } => OutcomeDocument {
                completed: true,
                reason: Some(reason.as_str()),
                completion_detected: Some(*completion_detected),
                iteration: Some(*iteration),
                next_prompt: None,
                progress: None,
            },
            Self::Continue {
                iteration,
                next_prompt,
                progress,
            } => OutcomeDocument {
                completed: false,
                reason: None,
                completion_detected: None,
                iteration: Some(*iteration),
                next_prompt: Some(next_prompt.as_str()),
                progress: Some(progress),
            },
        };
        document.serialize(serializer)
    }
}

/// Owns the active loop and its storage.
pub struct LoopController {
    state: Option<LoopState>,
    snapshot: Box<dyn SnapshotStore>,
    log: Box<dyn HistoryLog>,
    analyzer: ProgressAnalyzer,
}

impl fmt::Debug for LoopController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopController")
            .field("state", &self.state)
            .field("snapshot", &self.snapshot.describe())
            .field("log", &self.log.describe())
            .finish_non_exhaustive()
    }
}

impl LoopController {
    /// Controller over the file-backed stores configured for `project_dir`.
    #[must_use]
    pub fn open(project_dir: &Path, config: &LoopwrightConfig) -> Self {
        Self::with_storage(
            Box::new(FileSnapshotStore::new(
                config.storage.snapshot_path(project_dir),
            )),
            Box::new(JsonlHistoryLog::new(config.storage.history_path(project_dir))),
            ProgressAnalyzer::new(config.analyzer.clone()),
        )
    }

    /// Controller over injected stores. Loads the snapshot immediately.
    #[must_use]
    pub fn with_storage(
        snapshot: Box<dyn SnapshotStore>,
        log: Box<dyn HistoryLog>,
        analyzer: ProgressAnalyzer,
    ) -> Self {
        let state = match snapshot.load() {
            Ok(Some(state)) => {
                debug!(
                    "Resuming loop at iteration {} from {}",
                    state.iteration,
                    snapshot.describe()
                );
                Some(state)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Could not load loop snapshot: {}. Starting idle.", e);
                None
            }
        };

        Self {
            state,
            snapshot,
            log,
            analyzer,
        }
    }

    /// Start a new loop at iteration 1.
    ///
    /// An already active loop is superseded. Callers that must not overwrite a
    /// running loop check [`Self::is_loop_active`] first.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when `options` are invalid. In that case
    /// nothing changes.
    pub fn start_loop(&mut self, options: LoopOptions) -> Result<&LoopState> {
        options.validate()?;

        if let Some(previous) = &self.state {
            warn!(
                "Superseding active loop at iteration {}",
                previous.iteration
            );
        }

        let state = LoopState::start(options);
        save_snapshot(self.snapshot.as_ref(), &state);
        info!(
            "Started loop (max iterations: {}, completion promise: {})",
            if state.is_bounded() {
                state.max_iterations.to_string()
            } else {
                "unbounded".to_string()
            },
            state.completion_promise.as_deref().unwrap_or("none")
        );
        Ok(&*self.state.insert(state))
    }

    /// Record the outcome of the current iteration and decide what happens next.
    pub fn process_iteration(
        &mut self,
        output: &str,
        metadata: IterationMetadata,
    ) -> IterationOutcome {
        let Some(state) = self.state.as_mut() else {
            debug!("Iteration reported with no active loop");
            return IterationOutcome::NoActiveLoop;
        };

        let iteration = state.iteration;
        let completion_detected = is_completion(output, state.completion_promise.as_deref());
        let duration = Some(state.iteration_elapsed_ms(Utc::now()));
        let record =
            IterationRecord::new(iteration, output, completion_detected, duration, metadata);

        if let Err(e) = self.log.append(&record) {
            warn!("Could not append iteration {} to history log: {}", iteration, e);
        }
        state.history.push(record);

        if completion_detected {
            self.terminate(TerminationReason::CompletionPromise);
            return IterationOutcome::Completed {
                iteration,
                reason: TerminationReason::CompletionPromise,
                completion_detected: true,
            };
        }

        if state.at_iteration_limit() {
            self.terminate(TerminationReason::MaxIterations);
            return IterationOutcome::Completed {
                iteration,
                reason: TerminationReason::MaxIterations,
                completion_detected: false,
            };
        }

        let progress = self.analyzer.analyze(&state.history);
        if progress.stagnation_detected {
            warn!(
                "Iteration {}: {}",
                iteration,
                progress
                    .stagnation_reason
                    .as_deref()
                    .unwrap_or("stagnation detected")
            );
        }

        state.advance();
        save_snapshot(self.snapshot.as_ref(), state);
        debug!("Advanced to iteration {}", state.iteration);

        IterationOutcome::Continue {
            iteration: state.iteration,
            next_prompt: state.prompt.clone(),
            progress,
        }
    }

    /// Cancel the active loop. Returns `false` when there is none.
    pub fn cancel_loop(&mut self) -> bool {
        if self.state.is_none() {
            return false;
        }
        info!("Loop cancelled");
        self.clear();
        true
    }

    fn terminate(&mut self, reason: TerminationReason) {
        if let Some(state) = &self.state {
            info!(
                "Loop finished after {} iterations: {}",
                state.completed_iterations(),
                reason
            );
        }
        self.clear();
    }

    fn clear(&mut self) {
        self.state = None;
        if let Err(e) = self.snapshot.delete() {
            warn!("Could not delete loop snapshot: {}", e);
        }
    }

    #[must_use]
    pub fn is_loop_active(&self) -> bool {
        self.state.as_ref().is_some_and(|state| state.active)
    }

    #[must_use]
    pub fn state(&self) -> Option<&LoopState> {
        self.state.as_ref()
    }

    /// In-memory history of the active loop, empty when idle.
    #[must_use]
    pub fn history(&self) -> &[IterationRecord] {
        self.state
            .as_ref()
            .map(|state| state.history.as_slice())
            .unwrap_or_default()
    }

    /// Analyzer metrics for the active loop's history.
    #[must_use]
    pub fn progress(&self) -> Option<ProgressMetrics> {
        self.state
            .as_ref()
            .map(|state| self.analyzer.analyze(&state.history))
    }

    /// Every record in the durable history log, across all loops.
    ///
    /// # Errors
    ///
    /// Returns an error when the log exists but cannot be read.
    pub fn read_log(&self) -> Result<Vec<IterationRecord>> {
        self.log.read_all()
    }

    /// Human-readable status of the controller.
    #[must_use]
    pub fn status(&self) -> String {
        let progress = self
            .state
            .as_ref()
            .filter(|state| state.history.len() >= self.analyzer.config().min_history)
            .map(|state| self.analyzer.analyze(&state.history));
        render_status(self.state.as_ref(), progress.as_ref())
    }

    /// Human-readable report of the active loop's history.
    #[must_use]
    pub fn history_report(&self) -> String {
        render_history(self.history())
    }
}

fn save_snapshot(store: &dyn SnapshotStore, state: &LoopState) {
    if let Err(e) = store.save(state) {
        warn!(
            "Could not save loop snapshot for iteration {}: {}",
            state.iteration, e
        );
    }
}
