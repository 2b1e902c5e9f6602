//! Error types and error code constants for tugbasic.
//!
//! This module provides a unified error type (`TugError`) that bridges
//! domain-specific errors from different subsystems (backup, config, project
//! loading) into a common format suitable for JSON output.
//!
//! ## Error Code Mapping
//!
//! - `2`: Invalid arguments (bad input from caller)
//! - `3`: Input errors (manifest missing or unreadable)
//! - `4`: Apply errors (backup or write failed)
//! - `10`: Internal errors (bugs, unexpected state)
//!
//! Problems scoped to a single file, symbol or edit are not errors: they are
//! recorded as warnings and the run continues.

use std::fmt;

use thiserror::Error;

use crate::backup::BackupError;
use crate::config::ConfigError;

// ============================================================================
// Output Error Codes
// ============================================================================

/// Error codes for JSON output.
///
/// These codes map to CLI exit codes and appear in JSON error responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OutputErrorCode {
    /// Invalid arguments from caller (bad input, malformed request).
    InvalidArguments = 2,
    /// Input errors (manifest not found or unreadable).
    ResolutionError = 3,
    /// Apply errors (backup directory not creatable, write failed).
    ApplyError = 4,
    /// Internal errors (bugs, unexpected state).
    InternalError = 10,
}

impl OutputErrorCode {
    /// Get the numeric code value.
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for OutputErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ============================================================================
// Unified Error Type
// ============================================================================

/// Unified error type for CLI output.
///
/// Every subsystem error is converted to this type before being rendered as
/// a JSON error response.
#[derive(Debug, Error)]
pub enum TugError {
    /// Invalid arguments from caller.
    #[error("invalid arguments: {message}")]
    InvalidArguments {
        message: String,
        details: Option<serde_json::Value>,
    },

    /// Input path does not exist.
    #[error("file not found: {path}")]
    FileNotFound { path: String },

    /// Input exists but cannot be used (unreadable manifest, no modules).
    #[error("input error: {message}")]
    InputError {
        message: String,
        path: Option<String>,
    },

    /// Failed to apply changes.
    #[error("apply error: {message}")]
    ApplyError {
        message: String,
        file: Option<String>,
    },

    /// Failed to write an output artifact.
    #[error("cannot write {path}: {message}")]
    OutputError { path: String, message: String },

    /// Internal error (bug or unexpected state).
    #[error("internal error: {message}")]
    InternalError { message: String },
}

// ============================================================================
// Error Code Mapping
// ============================================================================

impl From<&TugError> for OutputErrorCode {
    fn from(err: &TugError) -> Self {
        match err {
            TugError::InvalidArguments { .. } => OutputErrorCode::InvalidArguments,
            TugError::FileNotFound { .. } => OutputErrorCode::ResolutionError,
            TugError::InputError { .. } => OutputErrorCode::ResolutionError,
            TugError::ApplyError { .. } => OutputErrorCode::ApplyError,
            TugError::OutputError { .. } => OutputErrorCode::ApplyError,
            TugError::InternalError { .. } => OutputErrorCode::InternalError,
        }
    }
}

impl From<TugError> for OutputErrorCode {
    fn from(err: TugError) -> Self {
        OutputErrorCode::from(&err)
    }
}

// ============================================================================
// Bridges
// ============================================================================

impl From<BackupError> for TugError {
    fn from(err: BackupError) -> Self {
        match err {
            BackupError::RootNotCreatable { path, source } => TugError::ApplyError {
                message: format!(
                    "backup directory not creatable: {} ({})",
                    path.display(),
                    source
                ),
                file: None,
            },
            BackupError::CopyFailed { path, source } => TugError::ApplyError {
                message: format!("backup copy failed: {}", source),
                file: Some(path.display().to_string()),
            },
            BackupError::WriteFailed { path, source } => TugError::ApplyError {
                message: format!("write failed: {}", source),
                file: Some(path.display().to_string()),
            },
        }
    }
}

impl From<ConfigError> for TugError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Unreadable { path, source } => TugError::InputError {
                message: format!("cannot read config: {}", source),
                path: Some(path.display().to_string()),
            },
            ConfigError::Invalid { path, source } => TugError::InvalidArguments {
                message: format!("invalid config {}: {}", path.display(), source),
                details: None,
            },
        }
    }
}

// ============================================================================
// Convenience Constructors
// ============================================================================

impl TugError {
    /// Create an invalid arguments error.
    pub fn invalid_args(message: impl Into<String>) -> Self {
        TugError::InvalidArguments {
            message: message.into(),
            details: None,
        }
    }

    /// Create a file not found error.
    pub fn file_not_found(path: impl Into<String>) -> Self {
        TugError::FileNotFound { path: path.into() }
    }

    /// Create an input error for a path.
    pub fn input(message: impl Into<String>, path: impl Into<String>) -> Self {
        TugError::InputError {
            message: message.into(),
            path: Some(path.into()),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        TugError::InternalError {
            message: message.into(),
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> OutputErrorCode {
        OutputErrorCode::from(self)
    }
}

/// Result alias used by the ops layer.
pub type TugResult<T> = Result<T, TugError>;

// ============================================================================
// Tests
// ============================================================================
