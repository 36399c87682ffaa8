//! Loop state types, iteration records and start-up validation.
//!
//! These are the plain data types shared by the controller, the storage layer
//! and the progress analyzer. Field names serialize in camelCase so the
//! snapshot and history log keep the documented on-disk shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LoopError, Result};

/// Maximum number of characters of iteration output kept in a record.
pub const MAX_OUTPUT_CHARS: usize = 1000;

/// Maximum characters of tool output quoted in a derived error string.
const TOOL_ERROR_EXCERPT_CHARS: usize = 200;

/// Truncate `text` to at most `limit` characters (not bytes).
#[must_use]
pub fn truncate_output(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

/// Result of one external tool invocation.
///
/// # Example
///
/// ```
/// use loopwright::state::ToolResult;
///
/// let result = ToolResult::new("test", "cargo test", 101, "error[E0308]: mismatched types", 1200);
/// assert!(!result.succeeded());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    /// Short tool name (e.g. `test`, `lint`).
    pub name: String,
    /// Command line that was run.
    pub command: String,
    /// Process exit code; `-1` when the tool timed out or failed to spawn.
    pub exit_code: i32,
    /// Combined stdout/stderr.
    pub output: String,
    /// Wall-clock duration in milliseconds.
    pub duration: u64,
}

impl ToolResult {
    /// Create a tool result.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        command: impl Into<String>,
        exit_code: i32,
        output: impl Into<String>,
        duration: u64,
    ) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            exit_code,
            output: output.into(),
            duration,
        }
    }

    /// Whether the tool exited with status zero.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }

    /// Error string recorded for a failed tool, `None` on success.
    #[must_use]
    pub fn failure_message(&self) -> Option<String> {
        if self.succeeded() {
            return None;
        }
        let excerpt = self
            .output
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(|line| truncate_output(line, TOOL_ERROR_EXCERPT_CHARS))
            .unwrap_or_default();
        Some(format!(
            "{} failed with exit code {}: {}",
            self.name, self.exit_code, excerpt
        ))
    }
}

/// Optional per-iteration details reported alongside the output.
///
/// `None` means "not reported"; `Some(vec![])` means "reported as zero items".
/// The distinction is preserved all the way into the stored record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files_modified: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commands_run: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_tools_run: Option<Vec<ToolResult>>,
}

impl IterationMetadata {
    /// Create empty metadata (nothing reported).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Report the files modified this iteration.
    #[must_use]
    pub fn with_files_modified(mut self, files: Vec<String>) -> Self {
        self.files_modified = Some(files);
        self
    }

    /// Report the commands run this iteration.
    #[must_use]
    pub fn with_commands_run(mut self, commands: Vec<String>) -> Self {
        self.commands_run = Some(commands);
        self
    }

    /// Report the errors seen this iteration.
    #[must_use]
    pub fn with_errors(mut self, errors: Vec<String>) -> Self {
        self.errors = Some(errors);
        self
    }

    /// Report the commit created for this iteration.
    #[must_use]
    pub fn with_git_commit(mut self, commit: impl Into<String>) -> Self {
        self.git_commit = Some(commit.into());
        self
    }

    /// Report the external tools run this iteration.
    #[must_use]
    pub fn with_tools(mut self, tools: Vec<ToolResult>) -> Self {
        self.external_tools_run = Some(tools);
        self
    }

    /// Append an error, creating the list if nothing was reported yet.
    pub fn push_error(&mut self, error: impl Into<String>) {
        self.errors.get_or_insert_with(Vec::new).push(error.into());
    }
}

/// Immutable record of one processed iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationRecord {
    /// The iteration number this record concludes.
    pub iteration: u32,
    pub timestamp: DateTime<Utc>,
    /// Milliseconds since the previous record was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    /// Reported output, truncated to [`MAX_OUTPUT_CHARS`].
    pub output: String,
    pub completion_detected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files_modified: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commands_run: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_tools_run: Option<Vec<ToolResult>>,
}

impl IterationRecord {
    /// Build a record from the reported output and metadata.
    ///
    /// The output is truncated and every failed tool contributes an error
    /// string to `errors`.
    #[must_use]
    pub fn new(
        iteration: u32,
        output: &str,
        completion_detected: bool,
        duration: Option<u64>,
        metadata: IterationMetadata,
    ) -> Self {
        let mut metadata = metadata;
        let tool_failures: Vec<String> = metadata
            .external_tools_run
            .iter()
            .flatten()
            .filter_map(ToolResult::failure_message)
            .collect();
        for failure in tool_failures {
            metadata.push_error(failure);
        }

        Self {
            iteration,
            timestamp: Utc::now(),
            duration,
            output: truncate_output(output, MAX_OUTPUT_CHARS),
            completion_detected,
            files_modified: metadata.files_modified,
            commands_run: metadata.commands_run,
            errors: metadata.errors,
            git_commit: metadata.git_commit,
            external_tools_run: metadata.external_tools_run,
        }
    }

    /// Errors recorded for this iteration (empty when not reported).
    #[must_use]
    pub fn errors(&self) -> &[String] {
        self.errors.as_deref().unwrap_or_default()
    }

    /// Length of the stored output in characters.
    #[must_use]
    pub fn output_len(&self) -> usize {
        self.output.chars().count()
    }
}

/// Parameters for starting a loop.
///
/// # Example
///
/// ```
/// use loopwright::state::LoopOptions;
///
/// let options = LoopOptions::new("Make the tests pass")
///     .max_iterations(10)
///     .completion_promise("DONE");
/// assert!(options.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopOptions {
    pub prompt: String,
    /// Zero means unbounded.
    pub max_iterations: u32,
    pub completion_promise: Option<String>,
    pub git_enabled: bool,
    pub auto_commit: bool,
}

impl LoopOptions {
    /// Options with the given prompt, unbounded and without a promise.
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            max_iterations: 0,
            completion_promise: None,
            git_enabled: false,
            auto_commit: false,
        }
    }

    #[must_use]
    pub fn max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    #[must_use]
    pub fn completion_promise(mut self, promise: impl Into<String>) -> Self {
        self.completion_promise = Some(promise.into());
        self
    }

    #[must_use]
    pub fn git_enabled(mut self, enabled: bool) -> Self {
        self.git_enabled = enabled;
        self
    }

    #[must_use]
    pub fn auto_commit(mut self, enabled: bool) -> Self {
        self.auto_commit = enabled;
        self
    }

    /// Validate the options.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError::InvalidConfig`] when the prompt is empty or
    /// whitespace-only, or when a completion promise is given but blank.
    pub fn validate(&self) -> Result<()> {
        if self.prompt.trim().is_empty() {
            return Err(LoopError::invalid(
                "prompt",
                "must be a non-empty, non-whitespace string",
            ));
        }
        if let Some(promise) = &self.completion_promise {
            if promise.trim().is_empty() {
                return Err(LoopError::invalid(
                    "completionPromise",
                    "must be omitted or a non-blank string",
                ));
            }
        }
        Ok(())
    }
}

/// Parse a textual max-iteration value into a non-negative integer.
///
/// # Errors
///
/// Returns [`LoopError::InvalidConfig`] for negative, fractional or
/// non-numeric input.
///
/// # Example
///
/// ```
/// use loopwright::state::parse_max_iterations;
///
/// assert_eq!(parse_max_iterations("0").unwrap(), 0);
/// assert!(parse_max_iterations("-1").is_err());
/// assert!(parse_max_iterations("2.5").is_err());
/// ```
pub fn parse_max_iterations(raw: &str) -> Result<u32> {
    raw.trim().parse::<u32>().map_err(|_| {
        LoopError::invalid(
            "maxIterations",
            format!("expected a non-negative integer, got '{}'", raw),
        )
    })
}

/// State of the single active loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopState {
    pub active: bool,
    /// The iteration currently in progress (1-based).
    pub iteration: u32,
    /// Zero means unbounded.
    pub max_iterations: u32,
    #[serde(default)]
    pub completion_promise: Option<String>,
    pub started_at: DateTime<Utc>,
    pub prompt: String,
    #[serde(default)]
    pub history: Vec<IterationRecord>,
    #[serde(default)]
    pub git_enabled: bool,
    #[serde(default)]
    pub auto_commit: bool,
}

impl LoopState {
    /// Create the state for a freshly started loop at iteration 1.
    #[must_use]
    pub fn start(options: LoopOptions) -> Self {
        Self {
            active: true,
            iteration: 1,
            max_iterations: options.max_iterations,
            completion_promise: options.completion_promise,
            started_at: Utc::now(),
            prompt: options.prompt,
            history: Vec::new(),
            git_enabled: options.git_enabled,
            auto_commit: options.auto_commit,
        }
    }

    /// Number of iterations already processed.
    #[must_use]
    pub fn completed_iterations(&self) -> usize {
        self.history.len()
    }

    /// Whether the loop has an iteration limit.
    #[must_use]
    pub fn is_bounded(&self) -> bool {
        self.max_iterations > 0
    }

    /// Whether the current iteration is the last one allowed.
    #[must_use]
    pub fn at_iteration_limit(&self) -> bool {
        self.is_bounded() && self.iteration >= self.max_iterations
    }

    /// When the current iteration was requested: the previous record's time,
    /// or the loop start for iteration 1.
    #[must_use]
    pub fn iteration_started_at(&self) -> DateTime<Utc> {
        self.history
            .last()
            .map_or(self.started_at, |record| record.timestamp)
    }

    /// Wall-clock milliseconds since [`Self::iteration_started_at`].
    #[must_use]
    pub fn iteration_elapsed_ms(&self, now: DateTime<Utc>) -> u64 {
        let elapsed = now - self.iteration_started_at();
        u64::try_from(elapsed.num_milliseconds()).unwrap_or(0)
    }

    /// Move on to the next iteration.
    pub fn advance(&mut self) {
        self.iteration += 1;
    }
}
