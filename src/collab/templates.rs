//! Catalog of built-in loop templates.
//!
//! A template is a reusable prompt for a common kind of task. Rendering one
//! substitutes the user's task description into the prompt body and produces
//! ready-to-start [`LoopOptions`].
//!
//! # Example
//!
//! ```rust
//! use loopwright::collab::templates::TemplateCatalog;
//!
//! let catalog = TemplateCatalog::new();
//! let options = catalog.render("tdd", "add a --json flag").unwrap();
//! assert!(options.prompt.contains("add a --json flag"));
//! assert_eq!(options.completion_promise.as_deref(), Some("TESTS PASSING"));
//! ```

use serde::Serialize;

use crate::error::{LoopError, Result};
use crate::state::LoopOptions;

/// Placeholder replaced by the task description.
pub const TASK_PLACEHOLDER: &str = "{task}";

/// A reusable loop prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopTemplate {
    pub name: &'static str,
    pub description: &'static str,
    /// Prompt body containing [`TASK_PLACEHOLDER`].
    pub prompt: &'static str,
    pub max_iterations: u32,
    pub completion_promise: &'static str,
    /// Tool preset that fits the template, if any.
    pub tool_preset: Option<&'static str>,
}

const TDD: LoopTemplate = LoopTemplate {
    name: "tdd",
    description: "Write a failing test first, then make it pass",
    prompt: "Task: {task}

Work test-first:
1. Write or extend a test that captures the required behavior and watch it fail.
2. Make the smallest change that makes the test pass.
3. Run the full test suite and fix any regressions.

When every test passes, reply with <promise>TESTS PASSING</promise>.",
    max_iterations: 20,
    completion_promise: "TESTS PASSING",
    tool_preset: Some("rust"),
};

const BUGFIX: LoopTemplate = LoopTemplate {
    name: "bugfix",
    description: "Reproduce a bug, fix the root cause and guard it with a test",
    prompt: "Bug: {task}

1. Reproduce the bug with a minimal failing test.
2. Find the root cause. Do not patch symptoms.
3. Fix it and confirm the new test passes along with the existing ones.

When the bug is fixed and covered, reply with <promise>FIXED</promise>.",
    max_iterations: 15,
    completion_promise: "FIXED",
    tool_preset: Some("rust"),
};

const REFACTOR: LoopTemplate = LoopTemplate {
    name: "refactor",
    description: "Restructure code without changing behavior",
    prompt: "Refactor: {task}

Keep behavior identical. Make one small step at a time and run the tests after
each step. Do not add features while refactoring.

When the refactor is complete and all tests pass, reply with <promise>REFACTORED</promise>.",
    max_iterations: 10,
    completion_promise: "REFACTORED",
    tool_preset: Some("rust"),
};

const DOCS: LoopTemplate = LoopTemplate {
    name: "docs",
    description: "Write or update documentation",
    prompt: "Documentation: {task}

Check every statement against the code. Keep examples runnable and remove
anything that no longer applies.

When the documentation is accurate and complete, reply with <promise>DOCUMENTED</promise>.",
    max_iterations: 5,
    completion_promise: "DOCUMENTED",
    tool_preset: None,
};

/// The built-in templates.
#[derive(Debug, Clone)]
pub struct TemplateCatalog {
    templates: Vec<LoopTemplate>,
}

impl Default for TemplateCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self {
            templates: vec![TDD, BUGFIX, REFACTOR, DOCS],
        }
    }

    /// Look up a template by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&LoopTemplate> {
        self.templates.iter().find(|t| t.name == name)
    }

    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.templates.iter().map(|t| t.name).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LoopTemplate> {
        self.templates.iter()
    }

    /// Render a template into loop options for `task`.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError::UnknownTemplate`] for an unknown name and
    /// [`LoopError::InvalidConfig`] for a blank task.
    pub fn render(&self, name: &str, task: &str) -> Result<LoopOptions> {
        let template = self.get(name).ok_or_else(|| LoopError::UnknownTemplate {
            name: name.to_string(),
        })?;
        if task.trim().is_empty() {
            return Err(LoopError::invalid("task", "must not be empty"));
        }

        Ok(
            LoopOptions::new(template.prompt.replace(TASK_PLACEHOLDER, task.trim()))
                .max_iterations(template.max_iterations)
                .completion_promise(template.completion_promise),
        )
    }
}
