//! Completion promise detection.
//!
//! An iteration's output completes the loop only when it contains a
//! `<promise>...</promise>` span whose trimmed contents equal the configured
//! promise exactly (case and inner whitespace sensitive).

use regex::Regex;
use std::sync::LazyLock;

/// First, non-greedy `<promise>` span. `(?s)` lets the contents span lines.
static PROMISE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<promise>(.*?)</promise>").expect("valid promise regex"));

/// Extract the trimmed contents of the first `<promise>` tag in `text`.
///
/// # Example
///
/// ```
/// use loopwright::completion::extract_promise;
///
/// assert_eq!(extract_promise("ok <promise> DONE </promise>"), Some("DONE".to_string()));
/// assert_eq!(extract_promise("no tag here"), None);
/// ```
#[must_use]
pub fn extract_promise(text: &str) -> Option<String> {
    PROMISE_TAG
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// Whether `output` fulfils `promise`.
///
/// Always false when no promise is configured.
#[must_use]
pub fn is_completion(output: &str, promise: Option<&str>) -> bool {
    match (promise, extract_promise(output)) {
        (Some(expected), Some(found)) => found == expected,
        _ => false,
    }
}
