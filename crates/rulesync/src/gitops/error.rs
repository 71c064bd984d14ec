//! Config-directory error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading or watching the config directory.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove file '{path}': {source}")]
    RemoveFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML in '{path}': {message}")]
    ParseYaml { path: PathBuf, message: String },

    #[error("Invalid resource in '{path}': {message}")]
    InvalidResource { path: PathBuf, message: String },

    #[error("Resource not found: {kind}/{name}")]
    ResourceNotFound { kind: String, name: String },

    #[error("Invalid API version '{version}' for {kind}, expected one of: {expected}")]
    InvalidApiVersion {
        kind: String,
        version: String,
        expected: String,
    },

    #[error("Duplicate resource name '{name}' for kind '{kind}'")]
    DuplicateName { kind: String, name: String },

    #[error("Tenants '{first}' and '{second}' both target tenant '{id}' on {url}")]
    DuplicateTenant {
        id: String,
        url: String,
        first: String,
        second: String,
    },

    #[error("Watch error: {0}")]
    WatchError(String),

    #[error("Config directory not found: {0}")]
    ConfigDirNotFound(PathBuf),

    #[error("Path traversal detected: {0}")]
    PathTraversal(String),
}

/// Result type for config-directory operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
