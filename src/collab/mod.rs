//! Collaborators that enrich iteration metadata before it reaches the
//! controller: version control, external tools and prompt templates.
//!
//! The controller itself never talks to git or runs tools. Callers gather
//! metadata with [`prepare_iteration`] and then hand it to
//! [`crate::controller::LoopController::process_iteration`].

pub mod git;
pub mod templates;
pub mod tools;

pub use git::{CommitResult, DiffSummary, GitCli, GitStatus, VersionControl};
pub use templates::{LoopTemplate, TemplateCatalog};
pub use tools::{builtin_presets, CommandToolRunner, ToolRunner, ToolSpec};

use tracing::{debug, warn};

use crate::error::Result;
use crate::state::{truncate_output, IterationMetadata, LoopState};

/// Maximum length of an auto-commit summary line.
const COMMIT_SUMMARY_CHARS: usize = 72;

/// Commit summary for an iteration: the first non-empty output line.
#[must_use]
pub fn commit_summary(output: &str, iteration: u32) -> String {
    output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| truncate_output(line, COMMIT_SUMMARY_CHARS))
        .unwrap_or_else(|| format!("iteration {iteration}"))
}

/// Gather collaborator metadata for the current iteration.
///
/// Runs the tool preset (if any), fills `filesModified` from the working tree
/// when git is enabled and the caller did not report files, and creates the
/// auto-commit. Recoverable collaborator failures are logged and leave the
/// corresponding field as it was.
///
/// # Errors
///
/// Returns [`crate::LoopError::UnknownPreset`] when `preset` names a preset the
/// runner does not have. Nothing has been run or committed in that case.
pub async fn prepare_iteration(
    state: &LoopState,
    mut metadata: IterationMetadata,
    output: &str,
    git: Option<&dyn VersionControl>,
    tools: Option<&dyn ToolRunner>,
    preset: Option<&str>,
) -> Result<IterationMetadata> {
    if let (Some(runner), Some(preset)) = (tools, preset) {
        match runner.run_preset(preset).await {
            Ok(results) => {
                debug!("Preset '{}' produced {} results", preset, results.len());
                metadata
                    .external_tools_run
                    .get_or_insert_with(Vec::new)
                    .extend(results);
            }
            Err(e) if e.is_recoverable() => warn!("Skipping tools: {}", e),
            Err(e) => return Err(e),
        }
    }

    let Some(git) = git else {
        return Ok(metadata);
    };

    if state.git_enabled && metadata.files_modified.is_none() {
        match git.status() {
            Ok(status) => metadata.files_modified = Some(status.changed_files()),
            Err(e) => warn!("Could not read working tree status: {}", e),
        }
    }

    if state.auto_commit {
        let result = git.create_commit(&commit_summary(output, state.iteration), state.iteration);
        match (result.success, result.commit) {
            (true, Some(commit)) => metadata.git_commit = Some(commit),
            _ => warn!(
                "Auto-commit for iteration {} failed: {}",
                state.iteration,
                result.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }

    Ok(metadata)
}
