//! JSON output types and serialization for CLI responses.
//!
//! ## Design Principles
//!
//! 1. **Status first:** Every response has `status` as first field
//! 2. **Deterministic:** Same input -> same output (field order, array ordering)
//! 3. **Nullable vs absent:** Explicit `null` for "no value"; absent field means "not applicable"
//! 4. **Versioned:** Schema version in response enables forward compatibility

use std::fmt;
use std::io::{self, Write};

use serde::{Deserialize, Serialize};

use crate::error::{OutputErrorCode, TugError};

/// Current schema version for all responses.
pub const SCHEMA_VERSION: &str = "1";

/// Location of a warning inside a project file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Project-relative file path.
    pub file: String,
    /// 1-indexed physical line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

impl Location {
    /// A whole-file location.
    pub fn file(file: impl Into<String>) -> Self {
        Location {
            file: file.into(),
            line: None,
        }
    }

    /// A file and line location.
    pub fn line(file: impl Into<String>, line: u32) -> Self {
        Location {
            file: file.into(),
            line: Some(line),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{}", self.file, line),
            None => f.write_str(&self.file),
        }
    }
}

/// Warning information for JSON output.
///
/// - `code`: Stable warning code (required)
/// - `message`: Human-readable message (required)
/// - `location`: Where the warning applies (optional)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    /// Stable warning code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Where the warning applies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl Warning {
    /// Create a simple warning without location.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Warning {
            code: code.into(),
            message: message.into(),
            location: None,
        }
    }

    /// Create a warning with location.
    pub fn with_location(
        code: impl Into<String>,
        message: impl Into<String>,
        location: Location,
    ) -> Self {
        Warning {
            code: code.into(),
            message: message.into(),
            location: Some(location),
        }
    }
}

/// Stable warning codes.
pub mod warning_codes {
    /// A listed source file is missing or unreadable.
    pub const FILE_UNREADABLE: &str = "file_unreadable";
    /// A manifest line could not be interpreted.
    pub const MANIFEST_ENTRY: &str = "manifest_entry";
    /// A procedure or block header has no matching terminator.
    pub const UNMATCHED_BLOCK: &str = "unmatched_block";
    /// Two edits overlap on the same line.
    pub const OVERLAPPING_EDIT: &str = "overlapping_edit";
    /// Live text no longer matches an edit.
    pub const STALE_EDIT: &str = "stale_edit";
    /// A file could not be written.
    pub const WRITE_FAILED: &str = "write_failed";
}

// ============================================================================
// Error Response
// ============================================================================

/// Error details inside an error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Numeric error code.
    pub code: u8,
    /// Human-readable message.
    pub message: String,
    /// Error-specific structured data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// Where the error occurred.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl ErrorInfo {
    /// Create from a TugError.
    pub fn from_error(err: &TugError) -> Self {
        let code = OutputErrorCode::from(err).code();
        let message = err.to_string();

        let (details, location) = match err {
            TugError::InvalidArguments { details, .. } => (details.clone(), None),
            TugError::FileNotFound { path } => (None, Some(Location::file(path.clone()))),
            TugError::InputError { path, .. } => (None, path.clone().map(Location::file)),
            TugError::ApplyError { file, .. } => (None, file.clone().map(Location::file)),
            TugError::OutputError { path, .. } => (None, Some(Location::file(path.clone()))),
            TugError::InternalError { .. } => (None, None),
        };

        ErrorInfo {
            code,
            message,
            details,
            location,
        }
    }
}

/// Error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Status: "error".
    pub status: String,
    /// Schema version for compatibility.
    pub schema_version: String,
    /// Error information.
    pub error: ErrorInfo,
}

impl ErrorResponse {
    /// Create an error response from a TugError.
    pub fn from_error(err: &TugError) -> Self {
        ErrorResponse {
            status: "error".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            error: ErrorInfo::from_error(err),
        }
    }
}

// ============================================================================
// Emission
// ============================================================================

/// Emit a response as pretty JSON to a writer.
pub fn emit_response<T: Serialize>(response: &T, writer: &mut impl Write) -> io::Result<()> {
    let json = serde_json::to_string_pretty(response)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(writer, "{}", json)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warning_without_location_omits_field() {
        let w = Warning::new(warning_codes::STALE_EDIT, "line 3 changed");
        let json = serde_json::to_string(&w).unwrap();
        assert!(!json.contains("location"));
    }

    #[test]
    fn location_displays_file_and_line() {
        assert_eq!(Location::line("Main.bas", 7).to_string(), "Main.bas:7");
        assert_eq!(Location::file("App.vbp").to_string(), "App.vbp");
    }

    #[test]
    fn error_response_has_status_first() {
        let err = TugError::file_not_found("proj.vbp");
        let resp = ErrorResponse::from_error(&err);
        let mut buf = Vec::new();
        emit_response(&resp, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();

        let status_pos = text.find("\"status\"").unwrap();
        let schema_pos = text.find("\"schema_version\"").unwrap();
        assert!(status_pos < schema_pos);

        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["error"]["code"], 3);
        assert_eq!(value["error"]["location"]["file"], "proj.vbp");
    }
}
