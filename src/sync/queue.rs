//! Priority queue with single-flight execution against the workspace store.

use super::operation::{Operation, OperationKind, OperationPayload};
use crate::events::{EngineEvent, Notifier, OperationOutcome};
use crate::remote::{TransportError, WorkspaceBackend};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Resolves once the enqueued operation settles.
///
/// Dropped receivers are fine; settlement also reaches the engine
/// notification channel.
pub type SettleTicket = oneshot::Receiver<OperationOutcome>;

struct QueuedOperation {
    seq: u64,
    priority: u8,
    op: Operation,
    ticket: Option<oneshot::Sender<OperationOutcome>>,
    /// Set when a purge established the remote never saw this entity.
    skip_remote: bool,
}

struct WorkerState {
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

struct QueueInner {
    backend: Arc<dyn WorkspaceBackend>,
    notifier: Notifier,
    pending: Mutex<Vec<QueuedOperation>>,
    wake: Notify,
    idle: Notify,
    seq: AtomicU64,
    in_flight: AtomicBool,
}

/// Owns durable synchronization of workspace metadata and content snapshots.
///
/// Operations run strictly one at a time: the worker resorts the queue by
/// (priority, arrival) after every settle and pops the new head. Enqueueing
/// applies the purge rules before the operation joins the queue:
///
/// - a delete drops every queued operation for the same workspace; when one
///   of those was the workspace's create, the delete also skips its remote
///   call, since the entity never existed remotely,
/// - a forced save drops queued saves for the same workspace that are not
///   strictly older than itself, then enters at priority 1.
///
/// Purged operations settle as [`OperationOutcome::Superseded`] and their
/// rollbacks never fire; the local state they describe is still wanted.
pub struct SyncQueue {
    inner: Arc<QueueInner>,
    worker: Mutex<Option<WorkerState>>,
}

impl SyncQueue {
    #[must_use]
    pub fn new(backend: Arc<dyn WorkspaceBackend>, notifier: Notifier) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                backend,
                notifier,
                pending: Mutex::new(Vec::new()),
                wake: Notify::new(),
                idle: Notify::new(),
                seq: AtomicU64::new(0),
                in_flight: AtomicBool::new(false),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Spawn the worker task. Idempotent; operations enqueued beforehand
    /// are picked up on the first wake.
    pub fn start(&self) {
        let mut worker = self.worker.lock().expect("sync queue poisoned");
        if worker.is_some() {
            debug!("sync queue worker already running");
            return;
        }
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = inner.wake.notified() => {}
                }
                while let Some(item) = inner.pop_next() {
                    inner.settle(item).await;
                    inner.in_flight.store(false, Ordering::SeqCst);
                }
                inner.idle.notify_waiters();
            }
            debug!("sync queue worker stopped");
        });
        *worker = Some(WorkerState {
            shutdown_tx,
            handle,
        });
    }

    /// Queue an operation, applying the purge rules first.
    pub fn enqueue(&self, op: Operation) -> SettleTicket {
        let (tx, rx) = oneshot::channel();
        let mut purged = Vec::new();
        let mut skip_remote = false;

        {
            let mut pending = self.inner.pending.lock().expect("sync queue poisoned");
            match &op.payload {
                OperationPayload::Delete => {
                    let drained: Vec<QueuedOperation> = std::mem::take(&mut *pending);
                    let (hit, kept): (Vec<_>, Vec<_>) = drained
                        .into_iter()
                        .partition(|item| item.op.workspace_id == op.workspace_id);
                    *pending = kept;
                    skip_remote = hit
                        .iter()
                        .any(|item| item.op.kind() == OperationKind::Create);
                    purged = hit;
                }
                OperationPayload::Save { forced: true, .. } => {
                    let cutoff = op.captured_at;
                    let drained: Vec<QueuedOperation> = std::mem::take(&mut *pending);
                    let (hit, kept): (Vec<_>, Vec<_>) = drained.into_iter().partition(|item| {
                        item.op.workspace_id == op.workspace_id
                            && item.op.kind() == OperationKind::Save
                            && item.op.captured_at >= cutoff
                    });
                    *pending = kept;
                    purged = hit;
                }
                _ => {}
            }

            let seq = self.inner.seq.fetch_add(1, Ordering::SeqCst);
            pending.push(QueuedOperation {
                seq,
                priority: op.effective_priority(),
                op,
                ticket: Some(tx),
                skip_remote,
            });
        }

        for item in purged {
            self.inner.supersede(item);
        }
        self.inner.wake.notify_one();
        rx
    }

    /// Operations waiting to run (the in-flight one excluded).
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.inner.pending.lock().expect("sync queue poisoned").len()
    }

    /// Wait until the queue is empty and nothing is in flight.
    ///
    /// Quiesces only a started worker; with no worker running this waits
    /// for one to be started.
    pub async fn drain(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.inner.is_idle() {
                return;
            }
            notified.as_mut().await;
        }
    }

    /// Stop the worker. The in-flight operation finishes; queued ones stay
    /// pending until a future `start`.
    pub async fn stop(&self) {
        let state = {
            let mut worker = self.worker.lock().expect("sync queue poisoned");
            worker.take()
        };
        if let Some(state) = state {
            let _ = state.shutdown_tx.send(());
            let _ = state.handle.await;
        }
    }
}

impl Drop for SyncQueue {
    fn drop(&mut self) {
        if let Ok(mut worker) = self.worker.lock() {
            if let Some(state) = worker.take() {
                let _ = state.shutdown_tx.send(());
                state.handle.abort();
            }
        }
    }
}

impl QueueInner {
    fn pop_next(&self) -> Option<QueuedOperation> {
        let mut pending = self.pending.lock().expect("sync queue poisoned");
        if pending.is_empty() {
            return None;
        }
        pending.sort_by_key(|item| (item.priority, item.seq));
        let item = pending.remove(0);
        self.in_flight.store(true, Ordering::SeqCst);
        Some(item)
    }

    fn is_idle(&self) -> bool {
        let pending = self.pending.lock().expect("sync queue poisoned");
        pending.is_empty() && !self.in_flight.load(Ordering::SeqCst)
    }

    async fn settle(&self, mut item: QueuedOperation) {
        let kind = item.op.kind();
        let workspace_id = item.op.workspace_id.clone();
        debug!(workspace = %workspace_id, op = %kind, "operation started");

        let outcome = match self.execute(&item).await {
            Ok(()) => {
                info!(workspace = %workspace_id, op = %kind, "operation completed");
                OperationOutcome::Completed
            }
            Err(err) => {
                warn!(
                    workspace = %workspace_id,
                    op = %kind,
                    error = %err,
                    "operation failed, rolling back"
                );
                if let Some(rollback) = item.op.rollback.take() {
                    rollback();
                }
                OperationOutcome::Failed {
                    error: err.to_string(),
                }
            }
        };

        #[cfg(feature = "metrics")]
        metrics::counter!(
            "weftrun_operations_settled_total",
            "outcome" => match &outcome {
                OperationOutcome::Completed => "completed",
                OperationOutcome::Failed { .. } => "failed",
                OperationOutcome::Superseded => "superseded",
            }
        )
        .increment(1);

        if let Some(ticket) = item.ticket.take() {
            let _ = ticket.send(outcome.clone());
        }
        self.notifier.emit(EngineEvent::OperationSettled {
            workspace_id,
            kind,
            outcome,
        });
    }

    async fn execute(&self, item: &QueuedOperation) -> Result<(), TransportError> {
        let id = &item.op.workspace_id;
        match &item.op.payload {
            OperationPayload::Create { title } => {
                self.backend.create_workspace(id, title).await
            }
            OperationPayload::Delete => {
                if item.skip_remote {
                    debug!(workspace = %id, "create never reached the remote, skipping remote delete");
                    Ok(())
                } else {
                    self.backend.delete_workspace(id).await
                }
            }
            OperationPayload::Rename { title } => {
                self.backend.rename_workspace(id, title).await
            }
            OperationPayload::Save { content, .. } => {
                self.backend
                    .save_history(id, content, item.op.captured_at)
                    .await
            }
        }
    }

    /// Settle a purged operation without running it or its rollback.
    fn supersede(&self, mut item: QueuedOperation) {
        let kind = item.op.kind();
        let workspace_id = item.op.workspace_id.clone();
        debug!(workspace = %workspace_id, op = %kind, "queued operation superseded");
        #[cfg(feature = "metrics")]
        metrics::counter!("weftrun_operations_purged_total").increment(1);

        if let Some(ticket) = item.ticket.take() {
            let _ = ticket.send(OperationOutcome::Superseded);
        }
        self.notifier.emit(EngineEvent::OperationSettled {
            workspace_id,
            kind,
            outcome: OperationOutcome::Superseded,
        });
    }
}
