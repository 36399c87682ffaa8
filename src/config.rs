//! Configuration management for loopwright.
//!
//! Configuration is read from `<project>/.loopwright/config.toml`, falling back
//! to the user-level `<config dir>/loopwright/config.toml`, and finally to
//! built-in defaults. Every section is optional.
//!
//! ```toml
//! [storage]
//! state_dir = ".loopwright"
//!
//! [analyzer]
//! repeat_threshold = 3
//!
//! [tools]
//! timeout_secs = 30
//!
//! [[tools.presets.web]]
//! name = "test"
//! command = "npm test"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::collab::tools::ToolSpec;
use crate::error::{LoopError, Result};
use crate::progress::AnalyzerConfig;

/// Directory holding loopwright state and configuration inside a project.
pub const STATE_DIR: &str = ".loopwright";

/// Configuration file name.
pub const CONFIG_FILE: &str = "config.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopwrightConfig {
    pub storage: StorageConfig,
    pub analyzer: AnalyzerConfig,
    pub tools: ToolsConfig,
    pub git: GitConfig,
}

/// Where the snapshot and history log live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// State directory, relative to the project unless absolute.
    pub state_dir: PathBuf,
    pub snapshot_file: String,
    pub history_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(STATE_DIR),
            snapshot_file: "loop-state.json".to_string(),
            history_file: "history.jsonl".to_string(),
        }
    }
}

impl StorageConfig {
    fn resolve_dir(&self, project_dir: &Path) -> PathBuf {
        if self.state_dir.is_absolute() {
            self.state_dir.clone()
        } else {
            project_dir.join(&self.state_dir)
        }
    }

    /// Snapshot path for a project.
    #[must_use]
    pub fn snapshot_path(&self, project_dir: &Path) -> PathBuf {
        self.resolve_dir(project_dir).join(&self.snapshot_file)
    }

    /// History log path for a project.
    #[must_use]
    pub fn history_path(&self, project_dir: &Path) -> PathBuf {
        self.resolve_dir(project_dir).join(&self.history_file)
    }
}

/// Tool runner settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Per-tool timeout in seconds.
    pub timeout_secs: u64,
    /// Extra or overriding presets, keyed by preset name.
    pub presets: BTreeMap<String, Vec<ToolSpec>>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            presets: BTreeMap::new(),
        }
    }
}

/// Version control settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    /// Prefix used in auto-commit subjects: `[<prefix> <iteration>] ...`.
    pub commit_prefix: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            commit_prefix: "loop".to_string(),
        }
    }
}

impl LoopwrightConfig {
    /// Load configuration for a project directory.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a config file exists but cannot be
    /// read, parsed or validated.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let project_path = Self::project_config_path(project_dir);
        if project_path.exists() {
            return Self::from_file(&project_path);
        }

        if let Some(user_path) = Self::user_config_path() {
            if user_path.exists() {
                return Self::from_file(&user_path);
            }
        }

        debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load and validate a specific config file.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the file is unreadable or invalid.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            LoopError::config_with_path(format!("cannot read config: {e}"), path.to_path_buf())
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            LoopError::config_with_path(format!("cannot parse config: {e}"), path.to_path_buf())
        })?;
        config.validate()?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Project-level config path.
    #[must_use]
    pub fn project_config_path(project_dir: &Path) -> PathBuf {
        project_dir.join(STATE_DIR).join(CONFIG_FILE)
    }

    /// User-level config path, if the platform has a config directory.
    #[must_use]
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("loopwright").join(CONFIG_FILE))
    }

    /// Validate all sections.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError::InvalidConfig`] for the first invalid value.
    pub fn validate(&self) -> Result<()> {
        self.analyzer.validate()?;
        if self.tools.timeout_secs == 0 {
            return Err(LoopError::invalid("tools.timeout_secs", "must be at least 1"));
        }
        if self.storage.snapshot_file == self.storage.history_file {
            return Err(LoopError::invalid(
                "storage.history_file",
                "must differ from storage.snapshot_file",
            ));
        }
        for (preset, specs) in &self.tools.presets {
            if specs.is_empty() {
                return Err(LoopError::invalid(
                    format!("tools.presets.{preset}"),
                    "must list at least one tool",
                ));
            }
        }
        Ok(())
    }

    /// Render the effective configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if serialization fails.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| LoopError::config(e.to_string()))
    }
}
