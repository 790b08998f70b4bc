//! Engine-to-UI notification channel.
//!
//! Components report lifecycle milestones (runs starting and settling,
//! reconstructions committing, queued operations resolving) over a single
//! unbounded flume channel. The consumer side is optional: an embedding
//! application that only reads node state can drop the receiver and every
//! emit becomes a no-op.
//!
//! Node-level state changes do NOT travel here; those are visible through
//! [`NodeStore`](crate::canvas::NodeStore) snapshots. Events carry the
//! context a status bar or toast needs, nothing more.

use crate::sync::OperationKind;
use crate::types::{NodeId, ResourceKey, TaskId, WorkspaceId};
use tracing::trace;

/// How a queued operation left the queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OperationOutcome {
    /// Remote call succeeded.
    Completed,
    /// Remote call failed; any registered rollback has already run.
    Failed { error: String },
    /// Dropped by a purge rule before reaching the remote.
    Superseded,
}

/// Milestones the engine reports while it works.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
    /// A dispatch was accepted by the remote engine.
    RunStarted { task_id: TaskId },
    /// The event stream for a run ended, cleanly or not.
    RunFinished { task_id: TaskId, failed: bool },
    /// A dispatch-related failure was recorded on a node.
    NodeFailed { node_id: NodeId, message: String },
    /// A reconstructor committed final content for a node.
    ReconstructionSettled {
        node_id: NodeId,
        resource_key: ResourceKey,
        parse_errors: usize,
    },
    /// A persistence operation left the queue.
    OperationSettled {
        workspace_id: WorkspaceId,
        kind: OperationKind,
        outcome: OperationOutcome,
    },
    /// The interval scan marked a workspace dirty.
    WorkspaceDirty { workspace_id: WorkspaceId },
}

/// Cheap-to-clone sender handle for [`EngineEvent`]s.
#[derive(Clone, Debug)]
pub struct Notifier {
    tx: flume::Sender<EngineEvent>,
}

impl Notifier {
    /// Create a notifier and the receiver the embedding application reads.
    #[must_use]
    pub fn channel() -> (Self, flume::Receiver<EngineEvent>) {
        let (tx, rx) = flume::unbounded();
        (Self { tx }, rx)
    }

    /// A notifier whose events go nowhere. Handy in tests and for embedders
    /// that only poll node state.
    #[must_use]
    pub fn disabled() -> Self {
        let (tx, _rx) = flume::unbounded();
        Self { tx }
    }

    /// Emit an event. Best effort: a dropped receiver is not an error.
    pub fn emit(&self, event: EngineEvent) {
        if let Err(err) = self.tx.send(event) {
            trace!(error = %err, "engine event dropped, no receiver attached");
        }
    }
}
