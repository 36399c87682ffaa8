//! Test fixtures: temporary projects and iteration records.

use std::path::Path;
use tempfile::TempDir;

use crate::state::{IterationMetadata, IterationRecord};

/// A temporary project directory, removed when dropped.
pub struct TestFixture {
    temp_dir: TempDir,
    is_git_repo: bool,
}

impl TestFixture {
    /// Create an empty project.
    ///
    /// # Panics
    ///
    /// Panics if temporary directory creation fails.
    #[must_use]
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
            is_git_repo: false,
        }
    }

    /// Create a project with a README committed to a fresh git repository.
    ///
    /// # Panics
    ///
    /// Panics if git cannot be run.
    #[must_use]
    pub fn with_git_repo() -> Self {
        let mut fixture = Self::new();
        fixture
            .write_file("README.md", "# Project\n")
            .expect("Failed to write README.md");

        fixture.git(&["init", "--quiet"]);
        fixture.git(&["config", "user.email", "test@example.com"]);
        fixture.git(&["config", "user.name", "Test User"]);
        fixture.git(&["config", "commit.gpgsign", "false"]);
        fixture.is_git_repo = true;
        fixture.make_commit("Initial commit");
        fixture
    }

    fn git(&self, args: &[&str]) {
        let output = std::process::Command::new("git")
            .args(args)
            .current_dir(self.temp_dir.path())
            .output()
            .expect("Failed to run git");
        assert!(
            output.status.success(),
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr)
        );
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Write a file, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_file(&self, relative_path: &str, content: &str) -> std::io::Result<()> {
        let path = self.temp_dir.path().join(relative_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)
    }

    /// Stage everything and commit.
    ///
    /// # Panics
    ///
    /// Panics if not a git repo or commit fails.
    pub fn make_commit(&self, message: &str) {
        assert!(self.is_git_repo, "Not a git repository");
        self.git(&["add", "."]);
        self.git(&["commit", "--quiet", "--allow-empty", "-m", message]);
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// A record whose output has `len` characters.
#[must_use]
pub fn record_with_len(iteration: u32, len: usize) -> IterationRecord {
    IterationRecord::new(
        iteration,
        &"x".repeat(len),
        false,
        Some(1000),
        IterationMetadata::new(),
    )
}

/// A record reporting `errors`.
#[must_use]
pub fn record_with_errors(iteration: u32, output: &str, errors: &[&str]) -> IterationRecord {
    IterationRecord::new(
        iteration,
        output,
        false,
        Some(1000),
        IterationMetadata::new().with_errors(errors.iter().map(|e| (*e).to_string()).collect()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_file_creates_directories() {
        let fixture = TestFixture::new();
        fixture.write_file("a/b/c.txt", "hi").unwrap();
        assert!(fixture.path().join("a/b/c.txt").exists());
    }

    #[test]
    fn test_with_git_repo_initializes_git() {
        if which::which("git").is_err() {
            return;
        }
        let fixture = TestFixture::with_git_repo();
        assert!(fixture.path().join(".git").exists());
    }

    #[test]
    fn test_record_helpers() {
        assert_eq!(record_with_len(1, 40).output_len(), 40);
        assert_eq!(record_with_errors(2, "o", &["E1", "E2"]).errors().len(), 2);
    }
}
