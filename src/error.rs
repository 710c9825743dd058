//! Error types for Lifetrack.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=storage, 3=not_found, 4=validation, etc.)
//! - Retryability flags for scripted callers
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers
//!
//! Remote failures have their own taxonomy ([`RemoteError`]). The sync engine
//! absorbs them into queue entries; they only become an [`Error`] when a user
//! explicitly asked for a sync and the endpoint rejected it.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Lifetrack operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Storage (exit 2)
    NotInitialized,
    AlreadyInitialized,
    StorageFailure,

    // Not Found (exit 3)
    RecordNotFound,

    // Validation (exit 4)
    InvalidArgument,
    InvalidField,

    // Invariant (exit 5)
    RemoteIdReassigned,

    // Sync (exit 6)
    RemoteRejected,
    RemoteUnavailable,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::AlreadyInitialized => "ALREADY_INITIALIZED",
            Self::StorageFailure => "STORAGE_FAILURE",
            Self::RecordNotFound => "RECORD_NOT_FOUND",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::InvalidField => "INVALID_FIELD",
            Self::RemoteIdReassigned => "REMOTE_ID_REASSIGNED",
            Self::RemoteRejected => "REMOTE_REJECTED",
            Self::RemoteUnavailable => "REMOTE_UNAVAILABLE",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-8).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::NotInitialized | Self::AlreadyInitialized | Self::StorageFailure => 2,
            Self::RecordNotFound => 3,
            Self::InvalidArgument | Self::InvalidField => 4,
            Self::RemoteIdReassigned => 5,
            Self::RemoteRejected | Self::RemoteUnavailable => 6,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
        }
    }

    /// Whether retrying the same command later can succeed.
    ///
    /// True for transient remote failures and busy databases. False for
    /// invariant violations: a missing record stays missing.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument
                | Self::InvalidField
                | Self::StorageFailure
                | Self::RemoteUnavailable
        )
    }
}

// ── Remote Error ──────────────────────────────────────────────

/// Failures reported by the remote spreadsheet adapter.
///
/// All three are retried identically by the sync queue. Only
/// [`RemoteError::Rejected`] is worth showing to a user who asked for a sync:
/// the server answered, so retrying without changing something won't help.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Remote unreachable: {0}")]
    Unreachable(String),

    #[error("Remote rejected the request: {0}")]
    Rejected(String),

    #[error("Remote request timed out")]
    Timeout,
}

impl RemoteError {
    /// Whether this failure should be shown on a manually triggered sync.
    #[must_use]
    pub const fn is_user_visible(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Rejected(format!("malformed response: {err}"))
        } else {
            Self::Unreachable(err.to_string())
        }
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in Lifetrack operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not initialized: run `lt init` first")]
    NotInitialized,

    #[error("Already initialized at {path}")]
    AlreadyInitialized { path: PathBuf },

    #[error("Storage failure: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Sync queue storage failure at {path}: {message}")]
    QueueStorage { path: PathBuf, message: String },

    #[error("Record not found: {collection} #{local_id}")]
    NotFound { collection: String, local_id: i64 },

    #[error("Invalid {collection} record: {message}")]
    InvalidField { collection: String, message: String },

    #[error(
        "Remote id for {collection} #{local_id} is already {existing}, refusing to reassign to {attempted}"
    )]
    RemoteIdReassigned {
        collection: String,
        local_id: i64,
        existing: String,
        attempted: String,
    },

    #[error("Sync rejected by remote: {}", messages.join("; "))]
    SyncRejected {
        messages: Vec<String>,
        pending: usize,
    },

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized => ErrorCode::NotInitialized,
            Self::AlreadyInitialized { .. } => ErrorCode::AlreadyInitialized,
            Self::Database(_) | Self::QueueStorage { .. } => ErrorCode::StorageFailure,
            Self::NotFound { .. } => ErrorCode::RecordNotFound,
            Self::InvalidField { .. } => ErrorCode::InvalidField,
            Self::RemoteIdReassigned { .. } => ErrorCode::RemoteIdReassigned,
            Self::SyncRejected { .. } | Self::Remote(RemoteError::Rejected(_)) => {
                ErrorCode::RemoteRejected
            }
            Self::Remote(_) => ErrorCode::RemoteUnavailable,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotInitialized => Some("Run `lt init` to create the local database".to_string()),

            Self::AlreadyInitialized { path } => Some(format!(
                "Database already exists at {}. Use `--force` to reinitialize.",
                path.display()
            )),

            Self::NotFound { collection, .. } => Some(format!(
                "Use `lt records list {collection}` to see available records."
            )),

            Self::SyncRejected { pending, .. } => Some(format!(
                "{pending} operation(s) are still queued locally.\n  \
                 Copy them manually: lt sync export --output pending.json\n  \
                 Check the endpoint: lt config show"
            )),

            Self::Remote(RemoteError::Unreachable(_) | RemoteError::Timeout) => Some(
                "Changes stay queued and will be sent when the endpoint is reachable.".to_string(),
            ),

            Self::Config(_) => {
                Some("Set the endpoint with `lt config set endpoint <url>`".to_string())
            }

            Self::InvalidField { collection, .. } => match collection.as_str() {
                "moodEntries" => Some("Ratings (mood, energy, numb) must be 1-5".to_string()),
                "dopamineEntries" => Some("Valid statuses: passed, failed".to_string()),
                _ => Some("Dates must be ISO formatted: YYYY-MM-DD".to_string()),
            },

            Self::Database(_)
            | Self::QueueStorage { .. }
            | Self::RemoteIdReassigned { .. }
            | Self::Remote(RemoteError::Rejected(_))
            | Self::Io(_)
            | Self::Json(_)
            | Self::InvalidArgument(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}
