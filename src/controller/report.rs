//! Plain-text status and history reports.

use chrono::{Duration, Utc};
use std::fmt::Write;

use crate::progress::ProgressMetrics;
use crate::state::{IterationRecord, LoopState};

/// Characters of output quoted per history line.
const OUTPUT_PREVIEW_CHARS: usize = 60;

/// Format an elapsed duration as `1h 02m 03s`, `4m 05s` or `6s`.
#[must_use]
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.num_seconds().max(0);
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}h {minutes:02}m {seconds:02}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds:02}s")
    } else {
        format!("{seconds}s")
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

/// Render the status of `state`, or the idle message when there is none.
#[must_use]
pub fn render_status(state: Option<&LoopState>, progress: Option<&ProgressMetrics>) -> String {
    let Some(state) = state else {
        return "No active loop.\n".to_string();
    };

    let limit = if state.is_bounded() {
        state.max_iterations.to_string()
    } else {
        "∞".to_string()
    };

    let mut out = String::new();
    let _ = writeln!(out, "Loop active: {}", yes_no(state.active));
    let _ = writeln!(out, "Iteration: {}/{}", state.iteration, limit);
    let _ = writeln!(
        out,
        "Elapsed: {}",
        format_elapsed(Utc::now() - state.started_at)
    );
    let _ = writeln!(
        out,
        "Completion promise: {}",
        state.completion_promise.as_deref().unwrap_or("(none)")
    );
    let _ = writeln!(
        out,
        "Git: {} (auto-commit: {})",
        yes_no(state.git_enabled),
        yes_no(state.auto_commit)
    );

    if let Some(progress) = progress {
        let _ = writeln!(out, "Progress: {}", progress.summary());
        if !progress.repeated_errors.is_empty() {
            let _ = writeln!(out, "Repeated errors:");
            for error in &progress.repeated_errors {
                let _ = writeln!(out, "  - {error}");
            }
        }
        if !progress.suggested_actions.is_empty() {
            let _ = writeln!(out, "Suggestions:");
            for action in &progress.suggested_actions {
                let _ = writeln!(out, "  - {action}");
            }
        }
    }
    out
}

fn count(items: Option<&Vec<String>>) -> String {
    items.map_or_else(|| "-".to_string(), |v| v.len().to_string())
}

/// Render one line per record, oldest first.
#[must_use]
pub fn render_history(history: &[IterationRecord]) -> String {
    if history.is_empty() {
        return "No iterations recorded.\n".to_string();
    }

    let mut out = String::new();
    for record in history {
        let duration = record
            .duration
            .map_or_else(|| "-".to_string(), |ms| format!("{:.1}s", ms as f64 / 1000.0));
        let marker = if record.completion_detected { " ✓" } else { "" };
        let preview: String = record
            .output
            .lines()
            .next()
            .unwrap_or("")
            .chars()
            .take(OUTPUT_PREVIEW_CHARS)
            .collect();

        let _ = write!(
            out,
            "#{}{} [{}] files: {}, commands: {}, errors: {}",
            record.iteration,
            marker,
            duration,
            count(record.files_modified.as_ref()),
            count(record.commands_run.as_ref()),
            count(record.errors.as_ref()),
        );
        if let Some(commit) = &record.git_commit {
            let _ = write!(out, ", commit: {commit}");
        }
        let _ = writeln!(out, "\n    {preview}");
    }
    out
}
