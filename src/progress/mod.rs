//! Heuristic progress analysis over iteration history.
//!
//! The analyzer is a pure function of the history. It looks for two kinds of
//! stagnation and derives an advisory convergence estimate:
//!
//! ```text
//! history ──┬── error signatures ──> repeated errors ──┐
//!           │                                          ├──> ProgressMetrics
//!           ├── last N output lengths ──> shape check ─┤
//!           └── signature diversity ──> convergence ───┘
//! ```
//!
//! Nothing here gates the loop. The controller only reports the metrics.

pub mod signature;

pub use signature::normalize_error;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{LoopError, Result};
use crate::state::IterationRecord;

/// Convergence rate reported when no errors have been recorded.
pub const NEUTRAL_CONVERGENCE: f64 = 0.5;

const REPEATED_ERROR_ACTIONS: [&str; 2] = [
    "Try a different approach to the repeated error",
    "Review the repeated error pattern before the next attempt",
];

const SIMILAR_OUTPUT_ACTIONS: [&str; 2] = [
    "Break the task into smaller sub-tasks",
    "Review the prompt for clarity and concrete success criteria",
];

const SIMILAR_OUTPUT_REASON: &str = "Output length and structure similar - may be stuck";

/// Tunables for the analyzer. Defaults reproduce the documented behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Minimum history length before any analysis happens.
    pub min_history: usize,
    /// Occurrences at which a signature counts as repeated.
    pub repeat_threshold: usize,
    /// Number of trailing records compared for output-shape stagnation.
    pub window: usize,
    /// Allowed relative deviation from the first length in the window.
    pub length_tolerance: f64,
    /// Repeated signatures quoted in the stagnation reason.
    pub max_reason_errors: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            min_history: 3,
            repeat_threshold: 3,
            window: 3,
            length_tolerance: 0.10,
            max_reason_errors: 2,
        }
    }
}

impl AnalyzerConfig {
    /// Validate the tunables.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError::InvalidConfig`] for zero counts or a tolerance
    /// outside `[0, 1]`.
    pub fn validate(&self) -> Result<()> {
        if self.repeat_threshold == 0 {
            return Err(LoopError::invalid(
                "analyzer.repeat_threshold",
                "must be at least 1",
            ));
        }
        if self.window == 0 {
            return Err(LoopError::invalid("analyzer.window", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.length_tolerance) {
            return Err(LoopError::invalid(
                "analyzer.length_tolerance",
                format!("must be within [0, 1], got {}", self.length_tolerance),
            ));
        }
        Ok(())
    }
}

/// Result of analyzing an iteration history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressMetrics {
    pub stagnation_detected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stagnation_reason: Option<String>,
    /// Error-diversity heuristic in `[0, 1]`; higher means fewer distinct errors.
    pub convergence_rate: f64,
    pub repeated_errors: Vec<String>,
    pub suggested_actions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_iterations_remaining: Option<u32>,
}

impl Default for ProgressMetrics {
    /// Zero-value metrics: no stagnation, zero convergence, empty lists.
    fn default() -> Self {
        Self {
            stagnation_detected: false,
            stagnation_reason: None,
            convergence_rate: 0.0,
            repeated_errors: Vec::new(),
            suggested_actions: Vec::new(),
            estimated_iterations_remaining: None,
        }
    }
}

impl ProgressMetrics {
    /// One-line summary for status output.
    #[must_use]
    pub fn summary(&self) -> String {
        let eta = self
            .estimated_iterations_remaining
            .map(|n| format!("~{} iterations remaining", n))
            .unwrap_or_else(|| "no estimate".to_string());
        let stagnation = match (&self.stagnation_detected, &self.stagnation_reason) {
            (true, Some(reason)) => format!("stagnating ({})", reason),
            (true, None) => "stagnating".to_string(),
            (false, _) => "progressing".to_string(),
        };
        format!(
            "{}, convergence {:.0}%, {}",
            stagnation,
            self.convergence_rate * 100.0,
            eta
        )
    }
}

/// Stateless analyzer parameterized by [`AnalyzerConfig`].
#[derive(Debug, Clone, Default)]
pub struct ProgressAnalyzer {
    config: AnalyzerConfig,
}

impl ProgressAnalyzer {
    #[must_use]
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Analyze `history`, oldest record first.
    #[must_use]
    pub fn analyze(&self, history: &[IterationRecord]) -> ProgressMetrics {
        let mut metrics = ProgressMetrics::default();
        if history.len() < self.config.min_history {
            return metrics;
        }

        // Signature -> (occurrences, first-seen order) so output is stable.
        let mut signatures: HashMap<String, (usize, usize)> = HashMap::new();
        let mut total_errors = 0usize;
        for error in history.iter().flat_map(IterationRecord::errors) {
            let signature = normalize_error(error);
            if signature.is_empty() {
                continue;
            }
            total_errors += 1;
            let next_order = signatures.len();
            signatures.entry(signature).or_insert((0, next_order)).0 += 1;
        }

        let mut repeated: Vec<(&String, usize, usize)> = signatures
            .iter()
            .filter(|(_, (count, _))| *count >= self.config.repeat_threshold)
            .map(|(sig, (count, order))| (sig, *count, *order))
            .collect();
        repeated.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

        if !repeated.is_empty() {
            metrics.stagnation_detected = true;
            metrics.repeated_errors = repeated.iter().map(|(sig, _, _)| (*sig).clone()).collect();
            let quoted: Vec<&str> = metrics
                .repeated_errors
                .iter()
                .take(self.config.max_reason_errors)
                .map(String::as_str)
                .collect();
            metrics.stagnation_reason =
                Some(format!("Repeated errors detected: {}", quoted.join("; ")));
            metrics
                .suggested_actions
                .extend(REPEATED_ERROR_ACTIONS.iter().map(|s| s.to_string()));
        }

        // Output-shape check. The reason set here wins over the repeated-error
        // reason; the suggested actions of both accumulate.
        if self.outputs_look_stuck(history) {
            metrics.stagnation_detected = true;
            metrics.stagnation_reason = Some(SIMILAR_OUTPUT_REASON.to_string());
            metrics
                .suggested_actions
                .extend(SIMILAR_OUTPUT_ACTIONS.iter().map(|s| s.to_string()));
        }

        metrics.convergence_rate = if total_errors > 0 {
            1.0 - signatures.len() as f64 / total_errors as f64
        } else {
            NEUTRAL_CONVERGENCE
        };

        metrics.estimated_iterations_remaining =
            estimate_remaining(metrics.convergence_rate, history.len());

        metrics
    }

    /// Every length in the trailing window is within tolerance of the window's
    /// *first* length, and none of those records completed.
    fn outputs_look_stuck(&self, history: &[IterationRecord]) -> bool {
        if history.len() < self.config.window {
            return false;
        }
        let window = &history[history.len() - self.config.window..];
        if window.iter().any(|record| record.completion_detected) {
            return false;
        }
        let baseline = window[0].output_len() as f64;
        let allowed = baseline * self.config.length_tolerance;
        window
            .iter()
            .all(|record| (record.output_len() as f64 - baseline).abs() <= allowed)
    }
}

/// Advisory estimate of iterations left at the current convergence pace.
fn estimate_remaining(convergence_rate: f64, history_len: usize) -> Option<u32> {
    if convergence_rate <= 0.0 || history_len == 0 {
        return None;
    }
    let per_iteration = convergence_rate / history_len as f64;
    if per_iteration <= 0.0 {
        return None;
    }
    Some(((1.0 - convergence_rate) / per_iteration).ceil() as u32)
}

/// Analyze with default tunables.
#[must_use]
pub fn analyze(history: &[IterationRecord]) -> ProgressMetrics {
    ProgressAnalyzer::default().analyze(history)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::{record_with_errors, record_with_len};

    /// Outputs of clearly different lengths so the shape check stays quiet.
    fn varied(iteration: u32, errors: Option<Vec<&str>>) -> IterationRecord {
        let len = 10 * iteration as usize * iteration as usize;
        match errors {
            Some(errors) => record_with_errors(iteration, &"y".repeat(len), &errors),
            None => record_with_len(iteration, len),
        }
    }

    #[test]
    fn test_short_history_returns_zero_metrics() {
        let history = vec![varied(1, Some(vec!["boom"])), varied(2, Some(vec!["boom"]))];
        assert_eq!(analyze(&history), ProgressMetrics::default());
        assert_eq!(analyze(&[]), ProgressMetrics::default());
    }

    #[test]
    fn test_repeated_signature_across_iterations_stagnates() {
        let history = vec![
            varied(1, Some(vec!["Error at /a/b.js:10:4"])),
            varied(2, Some(vec!["Error at /x/y.js:99:1"])),
            varied(3, Some(vec!["Error at /q/r.js:1:1"])),
        ];
        let metrics = analyze(&history);
        assert!(metrics.stagnation_detected);
        assert_eq!(metrics.repeated_errors, vec!["Error at <path>:<pos>".to_string()]);
        assert!(metrics
            .stagnation_reason
            .as_deref()
            .unwrap()
            .contains("Error at <path>:<pos>"));
        assert_eq!(metrics.suggested_actions.len(), 2);
    }

    #[test]
    fn test_two_occurrences_are_not_repeated() {
        let history = vec![
            varied(1, Some(vec!["E1 at line 4"])),
            varied(2, Some(vec!["E1 at line 5"])),
            varied(3, None),
        ];
        let metrics = analyze(&history);
        assert!(metrics.repeated_errors.is_empty());
        assert!(!metrics.stagnation_detected);
    }

    #[test]
    fn test_reason_names_at_most_two_signatures() {
        let errs = vec!["alpha failed", "beta failed", "gamma failed"];
        let history = vec![
            varied(1, Some(errs.clone())),
            varied(2, Some(errs.clone())),
            varied(3, Some(errs)),
        ];
        let metrics = analyze(&history);
        assert_eq!(metrics.repeated_errors.len(), 3);
        let reason = metrics.stagnation_reason.unwrap();
        assert!(reason.contains("alpha failed"));
        assert!(reason.contains("beta failed"));
        assert!(!reason.contains("gamma failed"));
    }

    #[test]
    fn test_similar_output_lengths_stagnate() {
        let history = vec![
            record_with_len(1, 100),
            record_with_len(2, 105),
            record_with_len(3, 92),
        ];
        let metrics = analyze(&history);
        assert!(metrics.stagnation_detected);
        assert_eq!(metrics.stagnation_reason.as_deref(), Some(SIMILAR_OUTPUT_REASON));
        assert_eq!(metrics.suggested_actions.len(), 2);
    }

    #[test]
    fn test_window_compares_against_first_length_only() {
        // 100 -> 110 -> 119: each step is within 10% of its predecessor, but
        // 119 is 19% above the first length, so this is not stagnation.
        let history = vec![
            record_with_len(1, 100),
            record_with_len(2, 110),
            record_with_len(3, 119),
        ];
        assert!(!analyze(&history).stagnation_detected);

        // 100 -> 90 -> 110: 90 and 110 are 22% apart from each other but both
        // within 10% of the first, so this is stagnation.
        let history = vec![
            record_with_len(1, 100),
            record_with_len(2, 90),
            record_with_len(3, 110),
        ];
        assert!(analyze(&history).stagnation_detected);
    }

    #[test]
    fn test_completed_record_in_window_suppresses_shape_check() {
        let mut last = record_with_len(3, 100);
        last.completion_detected = true;
        let history = vec![
            record_with_len(1, 100),
            record_with_len(2, 100),
            last,
        ];
        assert!(!analyze(&history).stagnation_detected);
    }

    #[test]
    fn test_both_triggers_accumulate_actions_and_last_reason_wins() {
        let history = vec![
            record_with_errors(1, &"a".repeat(50), &["panic at 1"]),
            record_with_errors(2, &"a".repeat(50), &["panic at 2"]),
            record_with_errors(3, &"a".repeat(50), &["panic at 3"]),
        ];
        let metrics = analyze(&history);
        assert!(metrics.stagnation_detected);
        assert_eq!(metrics.repeated_errors, vec!["panic at <n>".to_string()]);
        assert_eq!(metrics.stagnation_reason.as_deref(), Some(SIMILAR_OUTPUT_REASON));
        assert_eq!(metrics.suggested_actions.len(), 4);
    }

    #[test]
    fn test_neutral_convergence_without_errors() {
        let history = vec![varied(1, None), varied(2, Some(vec![])), varied(3, None)];
        let metrics = analyze(&history);
        assert_eq!(metrics.convergence_rate, NEUTRAL_CONVERGENCE);
        // 0.5 > 0, so an estimate exists: ceil(0.5 / (0.5 / 3)) = 3.
        assert_eq!(metrics.estimated_iterations_remaining, Some(3));
    }

    #[test]
    fn test_convergence_rate_from_signature_diversity() {
        // 4 occurrences, 2 distinct signatures -> 1 - 2/4 = 0.5
        let history = vec![
            varied(1, Some(vec!["a at 1", "b"])),
            varied(2, Some(vec!["a at 2"])),
            varied(3, Some(vec!["b"])),
        ];
        let metrics = analyze(&history);
        assert!((metrics.convergence_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_all_distinct_errors_give_zero_rate_and_no_estimate() {
        let history = vec![
            varied(1, Some(vec!["alpha"])),
            varied(2, Some(vec!["beta"])),
            varied(3, Some(vec!["gamma"])),
        ];
        let metrics = analyze(&history);
        assert_eq!(metrics.convergence_rate, 0.0);
        assert_eq!(metrics.estimated_iterations_remaining, None);
    }

    #[test]
    fn test_full_convergence_estimates_zero() {
        let history = vec![
            varied(1, Some(vec!["same"])),
            varied(2, Some(vec!["same"])),
            varied(3, Some(vec!["same"])),
            varied(4, Some(vec!["same"])),
        ];
        let metrics = analyze(&history);
        // 1 - 1/4 = 0.75; per-iteration 0.1875; ceil(0.25 / 0.1875) = 2
        assert!((metrics.convergence_rate - 0.75).abs() < 1e-9);
        assert_eq!(metrics.estimated_iterations_remaining, Some(2));
    }

    #[test]
    fn test_convergence_rate_stays_in_unit_range() {
        let history: Vec<_> = (1..=20)
            .map(|i| varied(i, Some(vec!["x at 1", "x at 2", "x at 3"])))
            .collect();
        let metrics = analyze(&history);
        assert!((0.0..=1.0).contains(&metrics.convergence_rate));
    }

    #[test]
    fn test_custom_config_threshold() {
        let analyzer = ProgressAnalyzer::new(AnalyzerConfig {
            repeat_threshold: 2,
            ..AnalyzerConfig::default()
        });
        let history = vec![
            varied(1, Some(vec!["boom"])),
            varied(2, Some(vec!["boom"])),
            varied(3, None),
        ];
        assert!(analyzer.analyze(&history).stagnation_detected);
    }

    #[test]
    fn test_config_validation() {
        assert!(AnalyzerConfig::default().validate().is_ok());
        let bad = AnalyzerConfig {
            window: 0,
            ..AnalyzerConfig::default()
        };
        assert!(bad.validate().is_err());
        let bad = AnalyzerConfig {
            length_tolerance: 1.5,
            ..AnalyzerConfig::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_summary_mentions_estimate() {
        let metrics = ProgressMetrics {
            convergence_rate: 0.5,
            estimated_iterations_remaining: Some(3),
            ..ProgressMetrics::default()
        };
        assert_eq!(
            metrics.summary(),
            "progressing, convergence 50%, ~3 iterations remaining"
        );
    }
}
