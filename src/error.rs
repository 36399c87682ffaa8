//! Custom error types for loopwright.
//!
//! Only configuration problems are surfaced to callers of the controller.
//! Persistence failures are produced by the storage layer but swallowed (and
//! logged) by [`crate::controller::LoopController`], and "no active loop" is a
//! regular outcome rather than an error.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for loopwright operations
#[derive(Error, Debug)]
pub enum LoopError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid loop options or unreadable configuration
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        path: Option<PathBuf>,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfig { field: String, reason: String },

    // =========================================================================
    // Persistence Errors
    // =========================================================================
    /// Snapshot or history log read/write failure
    #[error("Persistence error during {operation} ({path}): {message}")]
    Persistence {
        operation: String,
        path: PathBuf,
        message: String,
    },

    // =========================================================================
    // Collaborator Errors
    // =========================================================================
    /// Git operation failed
    #[error("Git operation failed: {operation} - {message}")]
    Git { operation: String, message: String },

    /// Tool execution failed
    #[error("Tool '{tool}' failed: {message}")]
    ToolExecution { tool: String, message: String },

    /// Requested template is not in the catalog
    #[error("Unknown template: {name}")]
    UnknownTemplate { name: String },

    /// Requested tool preset is not configured
    #[error("Unknown tool preset: {name}")]
    UnknownPreset { name: String },

    // =========================================================================
    // Wrapped Errors
    // =========================================================================
    /// IO error wrapper
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error wrapper
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// TOML parse error wrapper
    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LoopError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            path: None,
        }
    }

    /// Create a configuration error with path
    pub fn config_with_path(message: impl Into<String>, path: PathBuf) -> Self {
        Self::Config {
            message: message.into(),
            path: Some(path),
        }
    }

    /// Create an invalid configuration value error
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a persistence error
    pub fn persistence(
        operation: impl Into<String>,
        path: impl Into<PathBuf>,
        message: impl ToString,
    ) -> Self {
        Self::Persistence {
            operation: operation.into(),
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Create a git error
    pub fn git(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Git {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a tool execution error
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// True for the configuration family (the one hard-fail path of `start_loop`).
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Config { .. } | Self::InvalidConfig { .. })
    }

    /// Check if the operation can proceed on in-memory state
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Persistence { .. } | Self::Git { .. } | Self::ToolExecution { .. }
        )
    }

    /// Get error code for exit status
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Git { .. } => 4,
            Self::ToolExecution { .. } => 5,
            Self::UnknownTemplate { .. } | Self::UnknownPreset { .. } => 6,
            Self::Config { .. } | Self::InvalidConfig { .. } | Self::TomlDe(_) => 7,
            _ => 1,
        }
    }
}

/// Type alias for loopwright results
pub type Result<T> = std::result::Result<T, LoopError>;
