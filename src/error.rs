//! Error types for the mbs CLI.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=repo, 3=not_found, 4=validation, etc.)
//! - Retryability flags
//! - Context-aware recovery hints
//! - Structured JSON output for `--json` consumers

use std::path::PathBuf;
use thiserror::Error;

use crate::remote::RemoteError;
use crate::sync::{Operation, SyncError};

/// Result type alias for mbs operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Repository (exit 2)
    NotInitialized,
    AlreadyInitialized,

    // Not Found (exit 3)
    NotFound,

    // Validation (exit 4)
    InvalidArgument,
    ValidationError,

    // Render (exit 5)
    RenderError,

    // Sync (exit 6)
    SyncFailed,

    // Config (exit 7)
    ConfigError,
    NotLoggedIn,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Remote (exit 9)
    RemoteError,
    ConnectionError,

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
            Self::NotFound => "NOT_FOUND",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::RenderError => "RENDER_ERROR",
            Self::SyncFailed => "SYNC_FAILED",
            Self::ConfigError => "CONFIG_ERROR",
            Self::NotLoggedIn => "NOT_LOGGED_IN",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::RemoteError => "REMOTE_ERROR",
            Self::ConnectionError => "CONNECTION_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-9).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::NotInitialized | Self::AlreadyInitialized => 2,
            Self::NotFound => 3,
            Self::InvalidArgument | Self::ValidationError => 4,
            Self::RenderError => 5,
            Self::SyncFailed => 6,
            Self::ConfigError | Self::NotLoggedIn => 7,
            Self::IoError | Self::JsonError => 8,
            Self::RemoteError | Self::ConnectionError => 9,
        }
    }

    /// Whether running the command again (after fixing the input or the
    /// network) can succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument
                | Self::ValidationError
                | Self::RenderError
                | Self::ConnectionError
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in mbs CLI operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not an mbs repository (no .mbs file in {path} or any parent)")]
    NotInitialized { path: PathBuf },

    #[error("Already initialized at {path}")]
    AlreadyInitialized { path: PathBuf },

    #[error("Not logged in to {url}")]
    NotLoggedIn { url: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("{failed} item(s) failed during {operation}")]
    ItemsFailed { operation: Operation, failed: usize },

    #[error("{0}")]
    Other(String),
}

const fn remote_code(err: &RemoteError) -> ErrorCode {
    if err.is_connection_level() {
        ErrorCode::ConnectionError
    } else {
        ErrorCode::RemoteError
    }
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized { .. } => ErrorCode::NotInitialized,
            Self::AlreadyInitialized { .. } => ErrorCode::AlreadyInitialized,
            Self::NotLoggedIn { .. } => ErrorCode::NotLoggedIn,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Sync(e) => match e {
                SyncError::Render(_) => ErrorCode::RenderError,
                SyncError::Validation { .. } => ErrorCode::ValidationError,
                SyncError::Remote(r) => remote_code(r),
                SyncError::NotFound(_) => ErrorCode::NotFound,
                SyncError::Io { .. } => ErrorCode::IoError,
                SyncError::Aborted { source, .. } => remote_code(source),
            },
            Self::Remote(e) => remote_code(e),
            Self::ItemsFailed { .. } => ErrorCode::SyncFailed,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// The remote error behind this error, if any.
    fn remote_source(&self) -> Option<&RemoteError> {
        match self {
            Self::Remote(e)
            | Self::Sync(SyncError::Remote(e) | SyncError::Aborted { source: e, .. }) => Some(e),
            _ => None,
        }
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        if let Some(remote) = self.remote_source() {
            return match remote {
                RemoteError::Unauthenticated { .. } => Some(
                    "The session expired. Run `mbs login <username> <password>` again \
                     (without --dont-save-credentials the session renews automatically)."
                        .to_string(),
                ),
                RemoteError::Connection { url, .. } => Some(format!(
                    "Check that {url} is reachable and the URL in .mbs is correct."
                )),
                RemoteError::Rejected { .. } | RemoteError::Decode(_) => None,
            };
        }

        match self {
            Self::NotInitialized { .. } => {
                Some("Run `mbs init <url>` to create a repository here.".to_string())
            }
            Self::AlreadyInitialized { path } => Some(format!(
                "{} already exists. Edit it or remove it to re-initialize.",
                path.display()
            )),
            Self::NotLoggedIn { .. } => {
                Some("Run `mbs login <username> <password>` first.".to_string())
            }
            Self::Sync(SyncError::Render(_)) => Some(
                "Use `mbs push --render-only <file>` to inspect the rendered output.".to_string(),
            ),
            Self::Sync(SyncError::Validation { .. }) => Some(
                "The rendered file must be a JSON card with a name and the \
                 `## mbs_controlled ##` tag."
                    .to_string(),
            ),
            Self::ItemsFailed { .. } => {
                Some("See the failed items above; the other items were processed.".to_string())
            }
            _ => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    ///
    /// Includes error code, message, retryability, exit code, and
    /// optional recovery hint.
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
