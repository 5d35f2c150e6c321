//! Error types for insidebar-core
//!
//! One error enum covers the whole crate. Raw SQLite failures are translated
//! into it exactly once, in `From<rusqlite::Error>`, so quota exhaustion is
//! already distinguishable from transient store errors by the time the retry
//! executor sees it.

use std::fmt;

use rusqlite::ErrorCode;
use thiserror::Error;

use crate::validation::Violation;

/// Result type alias for insidebar-core operations
pub type Result<T> = std::result::Result<T, SidebarError>;

/// Fixed remediation message surfaced when the store runs out of space
pub const QUOTA_EXCEEDED_MESSAGE: &str =
    "Storage quota exceeded. Delete old records to free space.";

/// Which collection a record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Conversation,
    Prompt,
}

impl RecordKind {
    /// Lowercase key naming the record in import failure rows
    pub fn key(&self) -> &'static str {
        match self {
            RecordKind::Conversation => "conversation",
            RecordKind::Prompt => "prompt",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Conversation => f.write_str("Conversation"),
            RecordKind::Prompt => f.write_str("Prompt"),
        }
    }
}

/// Main error type for insidebar-core
#[derive(Debug, Error)]
pub enum SidebarError {
    /// Command not found in registry
    #[error("Command not found: {0}")]
    CommandNotFound(String),

    /// Invalid command arguments
    #[error("Invalid arguments for command '{command}': {reason}")]
    InvalidArgs { command: String, reason: String },

    /// One or more field constraints violated
    #[error("{}", join_violations(.0))]
    ValidationError(Vec<Violation>),

    /// Update or delete referenced an id that is not in the collection
    #[error("{kind} with id {id} not found")]
    NotFoundError { kind: RecordKind, id: i64 },

    /// The store is full
    #[error("{}", QUOTA_EXCEEDED_MESSAGE)]
    QuotaExceededError,

    /// Any other SQLite failure
    #[error("Database error: {0}")]
    DatabaseError(rusqlite::Error),

    /// The store could not be opened or migrated
    #[error("Failed to open store: {0}")]
    OpenError(String),

    /// Bulk import payload without a `conversations`/`prompts` array
    #[error("Invalid import data format")]
    ImportFormatError,

    /// Default library payload without a `prompts` array
    #[error("Invalid library data format")]
    LibraryFormatError,

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error (catch-all)
    #[error("{0}")]
    Other(String),
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<rusqlite::Error> for SidebarError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, _) if failure.code == ErrorCode::DiskFull => {
                SidebarError::QuotaExceededError
            },
            _ => SidebarError::DatabaseError(err),
        }
    }
}

impl From<anyhow::Error> for SidebarError {
    fn from(err: anyhow::Error) -> Self {
        SidebarError::Other(err.to_string())
    }
}

impl From<String> for SidebarError {
    fn from(err: String) -> Self {
        SidebarError::Other(err)
    }
}

impl From<&str> for SidebarError {
    fn from(err: &str) -> Self {
        SidebarError::Other(err.to_string())
    }
}

impl SidebarError {
    /// Whether this failure came from the store running out of space
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, SidebarError::QuotaExceededError)
    }

    /// Whether retrying the same store operation could succeed
    ///
    /// Only low-level store failures qualify. Validation, not-found and
    /// payload-format errors are deterministic.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SidebarError::DatabaseError(_) | SidebarError::OpenError(_)
        )
    }

    /// Get user-friendly error message for display in the side panel
    pub fn user_message(&self) -> String {
        match self {
            SidebarError::CommandNotFound(cmd) => {
                format!("Command '{}' not found.", cmd)
            },
            SidebarError::InvalidArgs { command, reason } => {
                format!("Invalid arguments for '{}': {}", command, reason)
            },
            SidebarError::DatabaseError(err) => {
                format!("Database error: {}", err)
            },
            _ => self.to_string(),
        }
    }

    /// Get error category for logging and for the bridge's error objects
    pub fn category(&self) -> &'static str {
        match self {
            SidebarError::CommandNotFound(_) => "command",
            SidebarError::InvalidArgs { .. } => "arguments",
            SidebarError::ValidationError(_) => "validation",
            SidebarError::NotFoundError { .. } => "not_found",
            SidebarError::QuotaExceededError => "quota",
            SidebarError::DatabaseError(_) => "database",
            SidebarError::OpenError(_) => "open",
            SidebarError::ImportFormatError | SidebarError::LibraryFormatError => "import",
            SidebarError::SerdeError(_) => "serialization",
            SidebarError::IoError(_) => "io",
            SidebarError::ConfigError(_) => "config",
            SidebarError::Other(_) => "other",
        }
    }
}
