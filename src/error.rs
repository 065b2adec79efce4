//! Custom error types for skillvault
//!
//! This module defines the error hierarchy for the application using thiserror
//! for ergonomic error definitions. The first group of variants is the
//! classification the update orchestrator reasons about; the rest are ambient
//! failures that get folded into that classification at the edges.

use std::io;

use thiserror::Error;

/// The main error type for skillvault operations
#[derive(Error, Debug)]
pub enum SkillvaultError {
    /// Entity not found errors (archives, modules, labels)
    #[error("{entity_type} not found: {identifier}")]
    NotFound {
        entity_type: &'static str,
        identifier: String,
    },

    /// Corrupt archive or invalid structured content
    #[error("Format error: {0}")]
    Format(String),

    /// A required external tool is not installed
    #[error("Required tool is not available: {0}")]
    ToolUnavailable(String),

    /// Disk or write failures
    #[error("Permission or space error: {0}")]
    PermissionOrSpace(String),

    /// Refused to act because the current state would be clobbered
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Some modules failed, the rest of the run completed
    #[error("{failed} of {total} modules failed to update")]
    PartialFailure { failed: usize, total: usize },

    /// The run was aborted
    #[error("Update aborted: {0}")]
    FatalAbort(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// Encryption errors
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// An external command ran but exited unsuccessfully
    #[error("{program} failed: {message}")]
    Command { program: String, message: String },
}

impl SkillvaultError {
    /// Create a "not found" error for backup archives
    pub fn archive_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Backup",
            identifier: identifier.into(),
        }
    }

    /// Create a "not found" error for modules
    pub fn module_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Module",
            identifier: identifier.into(),
        }
    }

    /// Classify an I/O error raised while writing `what`
    pub fn from_write(err: io::Error, what: impl std::fmt::Display) -> Self {
        if is_permission_or_space(&err) {
            Self::PermissionOrSpace(format!("{}: {}", what, err))
        } else {
            Self::Io(format!("{}: {}", what, err))
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this error is a missing external tool
    pub fn is_tool_unavailable(&self) -> bool {
        matches!(self, Self::ToolUnavailable(_))
    }

    /// Process exit status for the binary
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::PartialFailure { .. } => 2,
            Self::Conflict(_) => 3,
            Self::NotFound { .. } => 4,
            Self::ToolUnavailable(_) => 5,
            Self::Config(_) => 6,
            _ => 1,
        }
    }
}

fn is_permission_or_space(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::PermissionDenied
        || err.raw_os_error() == Some(nix::errno::Errno::ENOSPC as i32)
        || err.raw_os_error() == Some(nix::errno::Errno::EDQUOT as i32)
        || err.raw_os_error() == Some(nix::errno::Errno::EROFS as i32)
}

// Implement From traits for common error types

impl From<io::Error> for SkillvaultError {
    fn from(err: io::Error) -> Self {
        if is_permission_or_space(&err) {
            Self::PermissionOrSpace(err.to_string())
        } else {
            Self::Io(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SkillvaultError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<walkdir::Error> for SkillvaultError {
    fn from(err: walkdir::Error) -> Self {
        match err.into_io_error() {
            Some(io_err) => io_err.into(),
            None => Self::Io("filesystem loop detected".into()),
        }
    }
}

/// Result type alias for skillvault operations
pub type SkillvaultResult<T> = Result<T, SkillvaultError>;
