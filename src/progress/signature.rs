//! Error signature normalization.
//!
//! Two errors that differ only in file paths, positions or counters should
//! count as the same failure. Replacement passes run in a fixed order: paths,
//! then `line:column` pairs, then any remaining standalone integer. Running the
//! integer pass first would break up positions, and running the position pass
//! before paths would eat the `:10:4` suffix that path tokens end at.

use regex::Regex;
use std::sync::LazyLock;

/// Placeholder for a filesystem-path-like token.
pub const PATH_PLACEHOLDER: &str = "<path>";
/// Placeholder for a `line:column` pair.
pub const POSITION_PLACEHOLDER: &str = "<pos>";
/// Placeholder for a standalone integer.
pub const NUMBER_PLACEHOLDER: &str = "<n>";

/// Absolute, relative, home-relative and Windows drive paths with at least one
/// separator, e.g. `/a/b.js`, `src/lib.rs`, `~/x/y`, `C:\dir\file.rs`.
static PATH_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:[A-Za-z]:)?(?:[\w.~\-]*[/\\])+[\w.\-]+").expect("valid path regex")
});

static LINE_COLUMN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d+:\d+\b").expect("valid line:column regex"));

static STANDALONE_INTEGER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d+\b").expect("valid integer regex"));

/// Normalize an error message into a signature.
///
/// # Example
///
/// ```
/// use loopwright::progress::normalize_error;
///
/// assert_eq!(
///     normalize_error("Error at /a/b.js:10:4"),
///     normalize_error("Error at /x/y.js:99:1"),
/// );
/// ```
#[must_use]
pub fn normalize_error(text: &str) -> String {
    let pass = PATH_TOKEN.replace_all(text, PATH_PLACEHOLDER);
    let pass = LINE_COLUMN.replace_all(&pass, POSITION_PLACEHOLDER);
    let pass = STANDALONE_INTEGER.replace_all(&pass, NUMBER_PLACEHOLDER);
    pass.trim().to_string()
}
