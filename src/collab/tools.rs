//! Tool Runner collaborator: runs external test/lint commands.
//!
//! Tools in a preset run concurrently. Each one is bounded by a timeout, and a
//! timeout or spawn failure is reported as a failed [`ToolResult`] (exit code
//! `-1`) rather than an error, so one broken tool never aborts an iteration.

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::ToolsConfig;
use crate::error::{LoopError, Result};
use crate::state::{truncate_output, ToolResult, MAX_OUTPUT_CHARS};

/// Default per-tool timeout.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Exit code reported for tools that timed out or could not be started.
pub const FAILED_TO_RUN_EXIT_CODE: i32 = -1;

/// One tool in a preset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub command: String,
}

impl ToolSpec {
    #[must_use]
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
        }
    }
}

/// Built-in presets for common toolchains.
#[must_use]
pub fn builtin_presets() -> BTreeMap<String, Vec<ToolSpec>> {
    let mut presets = BTreeMap::new();
    presets.insert(
        "rust".to_string(),
        vec![
            ToolSpec::new("test", "cargo test --quiet"),
            ToolSpec::new("lint", "cargo clippy --quiet -- -D warnings"),
            ToolSpec::new("fmt", "cargo fmt --check"),
        ],
    );
    presets.insert(
        "node".to_string(),
        vec![
            ToolSpec::new("test", "npm test --silent"),
            ToolSpec::new("lint", "npm run lint --silent"),
        ],
    );
    presets.insert(
        "python".to_string(),
        vec![
            ToolSpec::new("test", "pytest -q"),
            ToolSpec::new("lint", "ruff check ."),
        ],
    );
    presets.insert(
        "go".to_string(),
        vec![
            ToolSpec::new("test", "go test ./..."),
            ToolSpec::new("vet", "go vet ./..."),
        ],
    );
    presets
}

/// Runs named presets of external tools.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run every tool of a preset and return one result per tool.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError::UnknownPreset`] when the preset does not exist.
    /// Tool failures are reported in the results, not as errors.
    async fn run_preset(&self, name: &str) -> Result<Vec<ToolResult>>;

    /// Names of the available presets.
    fn preset_names(&self) -> Vec<String>;
}

/// Tool runner that executes commands through `sh -c`.
#[derive(Debug, Clone)]
pub struct CommandToolRunner {
    working_dir: PathBuf,
    presets: BTreeMap<String, Vec<ToolSpec>>,
    timeout: Duration,
}

impl CommandToolRunner {
    /// Runner with the built-in presets and the default timeout.
    #[must_use]
    pub fn new(working_dir: impl AsRef<Path>) -> Self {
        Self {
            working_dir: working_dir.as_ref().to_path_buf(),
            presets: builtin_presets(),
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    /// Runner with built-ins extended/overridden by configured presets.
    #[must_use]
    pub fn from_config(working_dir: impl AsRef<Path>, config: &ToolsConfig) -> Self {
        let mut runner =
            Self::new(working_dir).with_timeout(Duration::from_secs(config.timeout_secs));
        for (name, specs) in &config.presets {
            runner.presets.insert(name.clone(), specs.clone());
        }
        runner
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_preset(mut self, name: impl Into<String>, specs: Vec<ToolSpec>) -> Self {
        self.presets.insert(name.into(), specs);
        self
    }

    /// Configured presets.
    #[must_use]
    pub fn presets(&self) -> &BTreeMap<String, Vec<ToolSpec>> {
        &self.presets
    }

    /// Run a single tool. Failing to run it at all is reported as a failed
    /// result with exit code -1.
    pub async fn run_tool(&self, spec: &ToolSpec) -> ToolResult {
        let started = Instant::now();
        debug!("Running tool '{}': {}", spec.name, spec.command);

        let (exit_code, output) = match self.execute(spec).await {
            Ok(finished) => finished,
            Err(e) => {
                warn!("{}", e);
                (FAILED_TO_RUN_EXIT_CODE, e.to_string())
            }
        };

        ToolResult::new(
            &spec.name,
            &spec.command,
            exit_code,
            truncate_output(&output, MAX_OUTPUT_CHARS),
            elapsed_ms(started),
        )
    }

    async fn execute(&self, spec: &ToolSpec) -> Result<(i32, String)> {
        let child = Command::new("sh")
            .arg("-c")
            .arg(&spec.command)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| LoopError::tool(&spec.name, format!("failed to start: {e}")))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                LoopError::tool(
                    &spec.name,
                    format!("timed out after {}ms", self.timeout.as_millis()),
                )
            })?
            .map_err(|e| LoopError::tool(&spec.name, format!("failed to wait: {e}")))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&stderr);
        }
        Ok((
            output.status.code().unwrap_or(FAILED_TO_RUN_EXIT_CODE),
            combined.trim().to_string(),
        ))
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[async_trait]
impl ToolRunner for CommandToolRunner {
    async fn run_preset(&self, name: &str) -> Result<Vec<ToolResult>> {
        let specs = self
            .presets
            .get(name)
            .ok_or_else(|| LoopError::UnknownPreset {
                name: name.to_string(),
            })?;

        let results = join_all(specs.iter().map(|spec| self.run_tool(spec))).await;
        let failed = results.iter().filter(|r| !r.succeeded()).count();
        debug!(
            "Preset '{}' finished: {} tools, {} failed",
            name,
            results.len(),
            failed
        );
        Ok(results)
    }

    fn preset_names(&self) -> Vec<String> {
        self.presets.keys().cloned().collect()
    }
}
