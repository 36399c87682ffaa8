//! Version Control collaborator backed by the `git` command line.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tracing::debug;

use crate::error::{LoopError, Result};

/// Working tree status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitStatus {
    pub branch: String,
    /// Short hash of HEAD, empty in a repository without commits.
    pub commit: String,
    pub modified: Vec<String>,
    pub added: Vec<String>,
    pub deleted: Vec<String>,
    pub untracked: Vec<String>,
}

impl GitStatus {
    /// Fill the file lists from `git status --porcelain` output.
    pub fn parse_porcelain(&mut self, porcelain: &str) {
        for line in porcelain.lines() {
            if line.len() < 4 {
                continue;
            }
            let (code, rest) = line.split_at(2);
            let mut path = rest.trim_start().to_string();
            // Renames are reported as "old -> new".
            if let Some((_, new)) = path.split_once(" -> ") {
                path = new.to_string();
            }
            let mut chars = code.chars();
            let index = chars.next().unwrap_or(' ');
            let worktree = chars.next().unwrap_or(' ');

            match (index, worktree) {
                ('?', '?') => self.untracked.push(path),
                ('D', _) | (_, 'D') => self.deleted.push(path),
                ('A', _) => self.added.push(path),
                _ => self.modified.push(path),
            }
        }
    }

    /// Every changed path, in modified/added/deleted/untracked order.
    #[must_use]
    pub fn changed_files(&self) -> Vec<String> {
        self.modified
            .iter()
            .chain(&self.added)
            .chain(&self.deleted)
            .chain(&self.untracked)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.modified.is_empty()
            && self.added.is_empty()
            && self.deleted.is_empty()
            && self.untracked.is_empty()
    }
}

/// Outcome of a commit attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitResult {
    pub success: bool,
    pub commit: Option<String>,
    pub error: Option<String>,
}

impl CommitResult {
    #[must_use]
    pub fn committed(commit: impl Into<String>) -> Self {
        Self {
            success: true,
            commit: Some(commit.into()),
            error: None,
        }
    }

    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            commit: None,
            error: Some(error.into()),
        }
    }
}

/// Summary of uncommitted changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub files: Vec<String>,
    pub additions: u64,
    pub deletions: u64,
    /// The `--shortstat` line, e.g. `2 files changed, 10 insertions(+)`.
    pub summary: String,
}

impl DiffSummary {
    /// Parse `git diff --numstat` output. Binary files count as zero lines.
    #[must_use]
    pub fn from_numstat(numstat: &str) -> Self {
        let mut diff = Self::default();
        for line in numstat.lines() {
            let mut fields = line.splitn(3, '\t');
            let (Some(added), Some(deleted), Some(path)) =
                (fields.next(), fields.next(), fields.next())
            else {
                continue;
            };
            diff.additions += added.parse::<u64>().unwrap_or(0);
            diff.deletions += deleted.parse::<u64>().unwrap_or(0);
            diff.files.push(path.to_string());
        }
        diff
    }
}

/// Abstraction over version control, so the loop can run against a mock.
pub trait VersionControl: Send + Sync {
    /// Current branch, HEAD and changed files.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError::Git`] when the directory is not a repository or
    /// git cannot be run.
    fn status(&self) -> Result<GitStatus>;

    /// Stage everything and commit it as `[<prefix> <iteration>] <message>`.
    ///
    /// Failures, including "nothing to commit", are reported in the result.
    fn create_commit(&self, message: &str, iteration: u32) -> CommitResult;

    /// Summary of changes against HEAD.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError::Git`] when git fails.
    fn diff(&self) -> Result<DiffSummary>;

    /// The last `count` commits as one-line descriptions.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError::Git`] when git fails.
    fn log(&self, count: usize) -> Result<Vec<String>>;
}

/// [`VersionControl`] implementation that shells out to `git`.
#[derive(Debug, Clone)]
pub struct GitCli {
    repo_dir: PathBuf,
    commit_prefix: String,
}

impl GitCli {
    #[must_use]
    pub fn new(repo_dir: impl AsRef<Path>) -> Self {
        Self {
            repo_dir: repo_dir.as_ref().to_path_buf(),
            commit_prefix: "loop".to_string(),
        }
    }

    #[must_use]
    pub fn with_commit_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.commit_prefix = prefix.into();
        self
    }

    /// Whether a `git` executable is on the PATH.
    #[must_use]
    pub fn is_available() -> bool {
        which::which("git").is_ok()
    }

    /// Whether the directory is inside a git work tree.
    #[must_use]
    pub fn is_repository(&self) -> bool {
        self.run(&["rev-parse", "--is-inside-work-tree"])
            .map(|out| out.trim() == "true")
            .unwrap_or(false)
    }

    /// Commit subject for an iteration.
    #[must_use]
    pub fn commit_subject(&self, message: &str, iteration: u32) -> String {
        format!("[{} {}] {}", self.commit_prefix, iteration, message)
    }

    fn output(&self, args: &[&str]) -> Result<Output> {
        debug!("git {}", args.join(" "));
        Command::new("git")
            .args(args)
            .current_dir(&self.repo_dir)
            .output()
            .map_err(|e| LoopError::git(args.join(" "), e.to_string()))
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        let output = self.output(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LoopError::git(args.join(" "), stderr.trim().to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn try_commit(&self, message: &str, iteration: u32) -> Result<String> {
        self.run(&["add", "-A"])?;

        // Exit status 0 means nothing is staged.
        let staged = self.output(&["diff", "--cached", "--quiet"])?;
        if staged.status.success() {
            return Err(LoopError::git("commit", "nothing to commit"));
        }

        let subject = self.commit_subject(message, iteration);
        self.run(&["commit", "-m", &subject])?;
        Ok(self.run(&["rev-parse", "--short", "HEAD"])?.trim().to_string())
    }
}

impl VersionControl for GitCli {
    fn status(&self) -> Result<GitStatus> {
        let porcelain = self.run(&["status", "--porcelain"])?;
        let branch = self
            .run(&["rev-parse", "--abbrev-ref", "HEAD"])
            .map(|b| b.trim().to_string())
            .unwrap_or_default();
        let commit = self
            .run(&["rev-parse", "--short", "HEAD"])
            .map(|c| c.trim().to_string())
            .unwrap_or_default();

        let mut status = GitStatus {
            branch,
            commit,
            ..GitStatus::default()
        };
        status.parse_porcelain(&porcelain);
        Ok(status)
    }

    fn create_commit(&self, message: &str, iteration: u32) -> CommitResult {
        match self.try_commit(message, iteration) {
            Ok(hash) => {
                debug!("Created commit {} for iteration {}", hash, iteration);
                CommitResult::committed(hash)
            }
            Err(LoopError::Git { message, .. }) => CommitResult::failed(message),
            Err(e) => CommitResult::failed(e.to_string()),
        }
    }

    fn diff(&self) -> Result<DiffSummary> {
        let numstat = self.run(&["diff", "HEAD", "--numstat"])?;
        let mut diff = DiffSummary::from_numstat(&numstat);
        diff.summary = self.run(&["diff", "HEAD", "--shortstat"])?.trim().to_string();
        Ok(diff)
    }

    fn log(&self, count: usize) -> Result<Vec<String>> {
        let limit = format!("-{count}");
        let out = self.run(&[
            "log",
            &limit,
            "--pretty=format:%h - %s (%ad)",
            "--date=short",
        ])?;
        Ok(out.lines().map(str::to_string).collect())
    }
}
