//! Error types for modbuild
//!
//! Domain-specific error types using thiserror.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
///
/// Always fatal: they abort the run before any phase executes.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Explicit config file does not exist
    #[error("Could not load config file, '{path}' is missing")]
    Missing { path: PathBuf },

    /// Failed to read config file
    #[error("Failed to read config file '{path}': {error}")]
    Read { path: PathBuf, error: String },

    /// Failed to parse config file
    #[error("Failed to parse config file '{path}': {error}")]
    Parse { path: PathBuf, error: String },

    /// A path setting must be absolute
    #[error("'{key}' must be an absolute path (got '{value}')")]
    RelativePath { key: String, value: String },

    /// Unknown build policy string
    #[error("Invalid build policy '{0}': must be one of all, updated, updated-deps, missing")]
    InvalidPolicy(String),

    /// Unknown phase name in build targets
    #[error("Invalid build target '{0}'")]
    InvalidTarget(String),

    /// Directory could not be created
    #[error("Directory '{path}' can not be created: {error}")]
    CreateDir { path: PathBuf, error: String },

    /// Variable substitution failed
    #[error("Failed to substitute variables in '{key}': {error}")]
    Substitution { key: String, error: String },
}

/// Module-set loading errors
#[derive(Error, Debug)]
pub enum ModuleSetError {
    /// Failed to read module-set file
    #[error("Failed to read module set '{path}': {error}")]
    Read { path: PathBuf, error: String },

    /// Failed to parse module-set file
    #[error("Failed to parse module set '{path}': {error}")]
    Parse { path: PathBuf, error: String },

    /// Two modules share a name
    #[error("Module '{name}' is defined more than once")]
    DuplicateModule { name: String },

    /// Module type has no registered adapter
    #[error("Module '{module}' has unknown type '{module_type}'")]
    UnknownType { module: String, module_type: String },

    /// Adapter rejected the module's parameters
    #[error("Module '{module}' is invalid: {reason}")]
    InvalidModule { module: String, reason: String },

    /// Include chain loops back on itself
    #[error("Module set '{path}' includes itself")]
    RecursiveInclude { path: PathBuf },
}

/// Module graph resolution errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Unknown module name
    #[error("Unknown module '{name}'")]
    NotFound { name: String },

    /// Circular hard dependency detected
    #[error("Circular dependency detected: {}", cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },

    /// Hard dependency names a module that does not exist
    #[error("Missing dependency: '{dependency}' required by '{module}'")]
    MissingDependency { module: String, dependency: String },
}

/// A phase body's external command failed
///
/// Recoverable: the orchestrator maps it into a recovery decision.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct CommandError {
    /// Human-readable description
    pub message: String,
    /// Command line that failed, if one was launched
    pub command: Option<String>,
    /// Exit code (None if the process could not be launched or was killed)
    pub exit_code: Option<i32>,
    /// Captured output (empty unless output was captured)
    pub output: String,
}

impl CommandError {
    /// Failure that did not come from a launched process
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            command: None,
            exit_code: None,
            output: String::new(),
        }
    }

    /// Process exited with a non-zero status
    pub fn exited(command: &str, exit_code: Option<i32>, output: String) -> Self {
        let message = match exit_code {
            Some(code) => format!("########## Error running {command} (exit code {code})"),
            None => format!("########## Error running {command} (terminated by signal)"),
        };
        Self {
            message,
            command: Some(command.to_string()),
            exit_code,
            output,
        }
    }

    /// Process could not be launched at all
    pub fn launch(command: &str, error: &std::io::Error) -> Self {
        Self {
            message: format!("Could not run {command}: {error}"),
            command: Some(command.to_string()),
            exit_code: None,
            output: String::new(),
        }
    }
}

/// Package database errors
#[derive(Error, Debug)]
pub enum PackageDbError {
    /// No record for module
    #[error("No install record for '{name}'")]
    NotFound { name: String },

    /// Store could not be read
    #[error("Failed to read package database '{path}': {error}")]
    Read { path: PathBuf, error: String },

    /// Store could not be parsed
    #[error("Failed to parse package database '{path}': {error}")]
    Parse { path: PathBuf, error: String },

    /// Store could not be written
    #[error("Failed to write package database '{path}': {error}")]
    Write { path: PathBuf, error: String },
}

/// Download errors
#[derive(Error, Debug)]
pub enum DownloadError {
    /// Network error
    #[error("Network error downloading '{url}': {error}")]
    NetworkError { url: String, error: String },

    /// Checksum verification failed
    #[error("Checksum verification failed for '{file}'")]
    ChecksumFailed { file: String },

    /// IO error
    #[error("IO error for '{path}': {error}")]
    IoError { path: PathBuf, error: String },

    /// Max retries exceeded
    #[error("Download failed after {retries} retries: {url}")]
    MaxRetriesExceeded { url: String, retries: u32 },
}

/// Filesystem errors
#[derive(Error, Debug)]
pub enum FilesystemError {
    /// Failed to create directory
    #[error("Failed to create directory '{path}': {error}")]
    CreateDir { path: PathBuf, error: String },

    /// Failed to remove directory
    #[error("Failed to remove directory '{path}': {error}")]
    RemoveDir { path: PathBuf, error: String },

    /// Failed to write file
    #[error("Failed to write file '{path}': {error}")]
    WriteFile { path: PathBuf, error: String },

    /// Failed to read file
    #[error("Failed to read file '{path}': {error}")]
    ReadFile { path: PathBuf, error: String },
}

impl From<FilesystemError> for PackageDbError {
    fn from(error: FilesystemError) -> Self {
        match error {
            FilesystemError::ReadFile { path, error } => Self::Read { path, error },
            FilesystemError::CreateDir { path, error }
            | FilesystemError::RemoveDir { path, error }
            | FilesystemError::WriteFile { path, error } => Self::Write { path, error },
        }
    }
}
