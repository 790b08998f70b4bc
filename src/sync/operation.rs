//! Queued persistence operations.

use crate::types::WorkspaceId;
use chrono::{DateTime, Utc};
use std::fmt;

/// Undo half of an optimistic mutation, run when the remote call fails.
pub type RollbackFn = Box<dyn FnOnce() + Send + Sync>;

/// What a queued operation does, used for priorities and purge rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Create,
    Delete,
    Rename,
    Save,
}

impl OperationKind {
    /// Scheduling class. Lower runs first; FIFO within a class.
    #[must_use]
    pub fn priority(&self) -> u8 {
        match self {
            OperationKind::Create | OperationKind::Delete => 1,
            OperationKind::Rename => 2,
            OperationKind::Save => 3,
        }
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Delete => "delete",
            OperationKind::Rename => "rename",
            OperationKind::Save => "save",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Arguments for the remote call, one variant per [`OperationKind`].
#[derive(Clone, Debug, PartialEq)]
pub enum OperationPayload {
    Create { title: String },
    Delete,
    Rename { title: String },
    Save { content: String, forced: bool },
}

impl OperationPayload {
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        match self {
            OperationPayload::Create { .. } => OperationKind::Create,
            OperationPayload::Delete => OperationKind::Delete,
            OperationPayload::Rename { .. } => OperationKind::Rename,
            OperationPayload::Save { .. } => OperationKind::Save,
        }
    }
}

/// One pending remote mutation plus the local undo it is paired with.
///
/// Callers apply their optimistic local update first, then enqueue the
/// operation carrying the matching rollback. The queue runs the rollback
/// only on terminal remote failure; purged operations drop it unfired.
pub struct Operation {
    pub workspace_id: WorkspaceId,
    pub payload: OperationPayload,
    /// When the payload was captured. Forced saves purge queued saves that
    /// are not strictly older than their own capture instant.
    pub captured_at: DateTime<Utc>,
    pub(crate) rollback: Option<RollbackFn>,
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("workspace_id", &self.workspace_id)
            .field("payload", &self.payload)
            .field("captured_at", &self.captured_at)
            .field("rollback", &self.rollback.is_some())
            .finish()
    }
}

impl Operation {
    fn new(workspace_id: WorkspaceId, payload: OperationPayload) -> Self {
        Self {
            workspace_id,
            payload,
            captured_at: Utc::now(),
            rollback: None,
        }
    }

    #[must_use]
    pub fn create(workspace_id: WorkspaceId, title: impl Into<String>) -> Self {
        Self::new(
            workspace_id,
            OperationPayload::Create {
                title: title.into(),
            },
        )
    }

    #[must_use]
    pub fn delete(workspace_id: WorkspaceId) -> Self {
        Self::new(workspace_id, OperationPayload::Delete)
    }

    #[must_use]
    pub fn rename(workspace_id: WorkspaceId, title: impl Into<String>) -> Self {
        Self::new(
            workspace_id,
            OperationPayload::Rename {
                title: title.into(),
            },
        )
    }

    #[must_use]
    pub fn save(workspace_id: WorkspaceId, content: impl Into<String>) -> Self {
        Self::new(
            workspace_id,
            OperationPayload::Save {
                content: content.into(),
                forced: false,
            },
        )
    }

    /// A save that jumps to priority 1 and supersedes queued saves captured
    /// at or after this one.
    #[must_use]
    pub fn forced_save(workspace_id: WorkspaceId, content: impl Into<String>) -> Self {
        Self::new(
            workspace_id,
            OperationPayload::Save {
                content: content.into(),
                forced: true,
            },
        )
    }

    #[must_use]
    pub fn with_rollback(mut self, rollback: RollbackFn) -> Self {
        self.rollback = Some(rollback);
        self
    }

    #[must_use]
    pub fn kind(&self) -> OperationKind {
        self.payload.kind()
    }

    /// Scheduling class after the forced-save promotion.
    #[must_use]
    pub fn effective_priority(&self) -> u8 {
        match &self.payload {
            OperationPayload::Save { forced: true, .. } => 1,
            _ => self.kind().priority(),
        }
    }
}
