//! Sync types: per-item reports and sync-specific errors.

use serde::Serialize;

use crate::model::CardId;
use crate::remote::RemoteError;
use crate::render::RenderError;

/// Which engine operation produced a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Pull,
    Push,
    Merge,
    Render,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pull => write!(f, "pull"),
            Self::Push => write!(f, "push"),
            Self::Merge => write!(f, "merge"),
            Self::Render => write!(f, "render"),
        }
    }
}

/// Outcome of one card or file within an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Remote snapshot written to disk.
    Pulled,
    /// Remote snapshot identical to the file on disk; nothing written.
    Unchanged,
    /// Rendered and uploaded.
    Pushed,
    /// Rendered and validated without uploading.
    Rendered,
    /// Remote fields merged into the local file.
    Merged,
    /// Deliberately not processed (untagged, already present).
    Skipped,
    /// Processing failed; see `error` and `message`.
    Failed,
}

impl ItemStatus {
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(self, Self::Failed)
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pulled => "pulled",
            Self::Unchanged => "unchanged",
            Self::Pushed => "pushed",
            Self::Rendered => "rendered",
            Self::Merged => "merged",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Error category of a failed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Render,
    Validation,
    Remote,
    NotFound,
    Io,
}

/// One line of a sync report.
#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    /// Remote card id, when known.
    pub id: Option<CardId>,
    /// Card name, when known.
    pub name: Option<String>,
    /// Repo-relative file path, when a local file is involved.
    pub file: Option<String>,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureKind>,
    /// Failure message or skip reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ItemReport {
    #[must_use]
    pub fn new(status: ItemStatus) -> Self {
        Self {
            id: None,
            name: None,
            file: None,
            status,
            error: None,
            message: None,
        }
    }

    /// Report a failed item.
    #[must_use]
    pub fn failed(error: &SyncError) -> Self {
        Self {
            error: error.kind(),
            message: Some(error.to_string()),
            ..Self::new(ItemStatus::Failed)
        }
    }

    #[must_use]
    pub fn id(mut self, id: CardId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Result of a pull, push, merge or render run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub operation: Operation,
    pub items: Vec<ItemReport>,
}

impl SyncReport {
    #[must_use]
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            items: Vec::new(),
        }
    }

    pub fn push(&mut self, item: ItemReport) {
        self.items.push(item);
    }

    /// Number of items that were processed without error (including
    /// unchanged ones).
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.items
            .iter()
            .filter(|i| !i.status.is_failure() && i.status != ItemStatus::Skipped)
            .count()
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(ItemStatus::Skipped)
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(ItemStatus::Failed)
    }

    /// True when no item failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn count(&self, status: ItemStatus) -> usize {
        self.items.iter().filter(|i| i.status == status).count()
    }
}

/// Sync-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Template failed to render.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// Rendered or local document is not a usable card.
    #[error("{file}: {message}")]
    Validation {
        /// Repo-relative file path.
        file: String,
        message: String,
    },

    /// The remote rejected a read or write.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Local file or card identity missing.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Local filesystem failure.
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A connection-level remote failure stopped a batch. `report` holds the
    /// items processed before the failure.
    #[error("Stopped after {processed} item(s): {source}")]
    Aborted {
        processed: usize,
        report: Box<SyncReport>,
        #[source]
        source: RemoteError,
    },
}

impl SyncError {
    pub(crate) fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn validation(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            file: file.into(),
            message: message.into(),
        }
    }

    /// Category used in item reports. `Aborted` is never an item failure.
    #[must_use]
    pub const fn kind(&self) -> Option<FailureKind> {
        match self {
            Self::Render(_) => Some(FailureKind::Render),
            Self::Validation { .. } => Some(FailureKind::Validation),
            Self::Remote(_) => Some(FailureKind::Remote),
            Self::NotFound(_) => Some(FailureKind::NotFound),
            Self::Io { .. } => Some(FailureKind::Io),
            Self::Aborted { .. } => None,
        }
    }

    /// Whether this error must stop the rest of a batch.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        match self {
            Self::Remote(e) => e.is_connection_level(),
            Self::Aborted { .. } => true,
            _ => false,
        }
    }

    /// Stop a batch: attach the items processed so far to a remote failure.
    pub(crate) fn abort(self, report: SyncReport) -> Self {
        match self {
            Self::Remote(source) => Self::Aborted {
                processed: report.items.len(),
                report: Box::new(report),
                source,
            },
            other => other,
        }
    }
}

/// Result type for sync operations.
pub type SyncResult<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_counts() {
        let mut report = SyncReport::new(Operation::Push);
        assert!(report.is_empty());
        report.push(ItemReport::new(ItemStatus::Pushed).id(1));
        report.push(ItemReport::new(ItemStatus::Skipped).id(2));
        report.push(ItemReport::failed(&SyncError::NotFound("x".into())));
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.failed(), 1);
        assert!(!report.is_success());
    }

    #[test]
    fn test_failed_item_carries_kind_and_message() {
        let err = SyncError::validation("a.json", "JSON invalid");
        let item = ItemReport::failed(&err).file("a.json");
        assert_eq!(item.status, ItemStatus::Failed);
        assert_eq!(item.error, Some(FailureKind::Validation));
        assert_eq!(item.message.as_deref(), Some("a.json: JSON invalid"));
    }

    #[test]
    fn test_fatal_classification() {
        let conn = SyncError::Remote(RemoteError::Connection {
            url: "http://mb".into(),
            message: "refused".into(),
        });
        assert!(conn.is_fatal());

        let rejected = SyncError::Remote(RemoteError::Rejected {
            status: 400,
            message: "bad".into(),
        });
        assert!(!rejected.is_fatal());
        assert!(!SyncError::NotFound("x".into()).is_fatal());
    }

    #[test]
    fn test_item_report_json_shape() {
        let item = ItemReport::new(ItemStatus::Pulled).id(3).name("Q");
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["status"], "pulled");
        assert_eq!(value["id"], 3);
        assert!(value.get("error").is_none());
    }
}
