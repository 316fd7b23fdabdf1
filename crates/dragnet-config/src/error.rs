//! Configuration error types.

use thiserror::Error;

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or checking the tool-definition file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path that failed.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// File is not valid TOML (this includes unknown parameter types,
    /// which fail the tagged-enum parse).
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// Path that failed.
        path: String,
        /// Underlying TOML error.
        source: toml::de::Error,
    },

    /// A tool entry is structurally invalid.
    #[error("invalid tool entry {tool}: {message}")]
    InvalidTool {
        /// Tool name.
        tool: String,
        /// What was wrong.
        message: String,
    },

    /// Two tool entries share a name.
    #[error("duplicate tool name: {0}")]
    DuplicateTool(String),
}
