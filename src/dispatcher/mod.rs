//! Execution dispatch: serialize, submit, and drive the event stream.
//!
//! [`Dispatcher::dispatch`] is the run entry point. It prepares the canvas
//! (synthesizing output blocks for operators without one, flushing dirty
//! external content), serializes the requested [`Scope`], submits the
//! request, then consumes the run's event stream line by line, translating
//! each protocol event into node-state updates and reconstructor calls.
//!
//! The stream is processed strictly in arrival order. Whatever way the
//! stream ends (terminal event, transport failure, plain EOF), every
//! target node's transient loading/waiting flags are settled exactly once
//! and all open reconstructors are stopped; no path leaves a node stuck
//! "loading".
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use weftrun::canvas::{Canvas, NodeStore};
//! use weftrun::dispatcher::Dispatcher;
//! use weftrun::events::Notifier;
//! use weftrun::remote::{HttpRemote, RemoteConfig};
//! use weftrun::serializer::Scope;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let remote = Arc::new(HttpRemote::new(RemoteConfig::from_env())?);
//! let store = NodeStore::new(Canvas::default());
//! let (notifier, _events) = Notifier::channel();
//!
//! let dispatcher = Dispatcher::new(remote.clone(), remote, store, notifier);
//! let report = dispatcher.dispatch(Scope::AllNodes).await?;
//! println!("run {} settled as {:?}", report.task_id, report.outcome);
//! # Ok(())
//! # }
//! ```

mod protocol;
mod stream;

pub use protocol::{decode_line, ExternalRef, LineOutcome, RunEvent};
pub use stream::LineReader;

use crate::canvas::{
    Adjacency, BlockKind, Canvas, ExternalContentPointer, Link, Node, NodeStore,
};
use crate::events::{EngineEvent, Notifier};
use crate::reconstructor::ReconstructorRegistry;
use crate::remote::{ExecutionBackend, StorageBackend, TransportError};
use crate::serializer::{resolve_scope, serialize_scope, Scope, SerializeError};
use crate::types::{NodeId, TaskId};
use crate::utils::content::canonical_content;
use miette::Diagnostic;
use rustc_hash::FxHashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Failure before the event stream was established.
///
/// Once streaming has begun, failures are reported through node state and
/// the [`RunReport`] instead; `dispatch` only returns `Err` for problems
/// that prevented the run from starting.
#[derive(Debug, Error, Diagnostic)]
pub enum DispatchError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Serialize(#[from] SerializeError),

    #[error("could not flush edited content for node {node_id} before dispatch")]
    #[diagnostic(
        code(weftrun::dispatcher::flush_failed),
        help("the remote engine reads external content from storage; running without the flush would execute stale text")
    )]
    FlushFailed {
        node_id: NodeId,
        #[source]
        source: TransportError,
    },

    #[error("could not submit execution request")]
    #[diagnostic(code(weftrun::dispatcher::submit_failed))]
    Submit(#[source] TransportError),

    #[error("could not open event stream for task {task_id}")]
    #[diagnostic(code(weftrun::dispatcher::stream_open_failed))]
    StreamOpen {
        task_id: TaskId,
        #[source]
        source: TransportError,
    },
}

/// How a run's stream ended.
#[derive(Clone, Debug, PartialEq)]
pub enum RunOutcome {
    /// `TASK_COMPLETED` arrived.
    Completed,
    /// `TASK_FAILED` arrived with this message.
    Failed { message: String },
    /// The stream stopped without a terminal event.
    Interrupted,
}

/// Summary of one dispatched run.
#[derive(Clone, Debug)]
pub struct RunReport {
    pub task_id: TaskId,
    pub outcome: RunOutcome,
    /// Events decoded and applied.
    pub events_handled: u64,
    /// Lines that failed to decode and were skipped.
    pub protocol_errors: u64,
}

/// Drives runs against an execution backend.
pub struct Dispatcher {
    execution: Arc<dyn ExecutionBackend>,
    storage: Arc<dyn StorageBackend>,
    store: NodeStore,
    notifier: Notifier,
    reconstructors: Arc<ReconstructorRegistry>,
}

impl Dispatcher {
    pub fn new(
        execution: Arc<dyn ExecutionBackend>,
        storage: Arc<dyn StorageBackend>,
        store: NodeStore,
        notifier: Notifier,
    ) -> Self {
        let reconstructors = Arc::new(Self::build_registry(
            &storage,
            &store,
            &notifier,
            ReconstructorRegistry::DEFAULT_POLL_INTERVAL,
        ));
        Self {
            execution,
            storage,
            store,
            notifier,
            reconstructors,
        }
    }

    /// Rebuild the reconstructor registry with a different poll cadence.
    #[must_use]
    pub fn with_reconstructor_poll_interval(mut self, interval: Duration) -> Self {
        self.reconstructors = Arc::new(Self::build_registry(
            &self.storage,
            &self.store,
            &self.notifier,
            interval,
        ));
        self
    }

    fn build_registry(
        storage: &Arc<dyn StorageBackend>,
        store: &NodeStore,
        notifier: &Notifier,
        interval: Duration,
    ) -> ReconstructorRegistry {
        let reset_store = store.clone();
        ReconstructorRegistry::new(Arc::clone(storage), store.clone(), notifier.clone())
            .with_poll_interval(interval)
            .with_loading_reset(Arc::new(move |node_id: &NodeId| {
                reset_store.patch_nodes(
                    |n| &n.id == node_id,
                    |mut n| {
                        n.status.waiting_for_flow = false;
                        n
                    },
                );
            }))
    }

    /// Live reconstruction registry, mostly useful for introspection.
    #[must_use]
    pub fn reconstructors(&self) -> &ReconstructorRegistry {
        &self.reconstructors
    }

    /// Run the given scope end to end and return its report.
    ///
    /// Returns `Err` only when the run never started (serialization, the
    /// flush precondition, submit, or opening the stream failed); affected
    /// nodes carry the failure either way.
    pub async fn dispatch(&self, scope: Scope) -> Result<RunReport, DispatchError> {
        self.synthesize_outputs(&scope)?;

        let snapshot = self.store.snapshot();
        self.flush_dirty_external(&snapshot, &scope).await?;

        let request = serialize_scope(&snapshot, &scope)?;
        let mut targets: FxHashSet<NodeId> = request
            .target_ids()
            .map(|id| NodeId::from(id.as_str()))
            .collect();

        let task_id = match self.execution.submit(&request).await {
            Ok(id) => id,
            Err(err) => {
                self.report_failure(&targets, &err.to_string());
                return Err(DispatchError::Submit(err));
            }
        };
        info!(
            %task_id,
            blocks = request.blocks.len(),
            edges = request.edges.len(),
            "execution request accepted"
        );
        self.notifier.emit(EngineEvent::RunStarted {
            task_id: task_id.clone(),
        });

        let stream = match self.execution.open_stream(&task_id).await {
            Ok(stream) => stream,
            Err(err) => {
                self.report_failure(&targets, &err.to_string());
                return Err(DispatchError::StreamOpen {
                    task_id,
                    source: err,
                });
            }
        };

        let mut reader = LineReader::new(stream);
        let mut report = RunReport {
            task_id: task_id.clone(),
            outcome: RunOutcome::Interrupted,
            events_handled: 0,
            protocol_errors: 0,
        };
        let mut finalized = false;

        loop {
            match reader.next_line().await {
                Ok(Some(line)) => match decode_line(&line) {
                    LineOutcome::Event(event) => {
                        report.events_handled += 1;
                        #[cfg(feature = "metrics")]
                        metrics::counter!("weftrun_run_events_total").increment(1);
                        let terminal = self
                            .apply_event(&mut targets, event, &mut report, &mut finalized)
                            .await;
                        if terminal {
                            break;
                        }
                    }
                    LineOutcome::Malformed => report.protocol_errors += 1,
                    LineOutcome::Ignored => {}
                },
                Ok(None) => {
                    warn!(%task_id, "event stream ended without a terminal event");
                    break;
                }
                Err(err) => {
                    warn!(%task_id, error = %err, "event stream interrupted");
                    self.reconstructors.stop_all().await;
                    self.report_failure(&targets, &err.to_string());
                    finalized = true;
                    break;
                }
            }
        }

        // End-of-stream settle for every path a terminal handler did not
        // cover. Runs at most once.
        if !finalized {
            self.reconstructors.stop_all().await;
            self.store.clear_run_flags(&targets);
        }

        let failed = !matches!(report.outcome, RunOutcome::Completed);
        #[cfg(feature = "metrics")]
        metrics::counter!("weftrun_runs_total", "outcome" => outcome_label(&report.outcome))
            .increment(1);
        self.notifier.emit(EngineEvent::RunFinished { task_id, failed });
        Ok(report)
    }

    /// Apply one event; returns true when the event is terminal.
    async fn apply_event(
        &self,
        targets: &mut FxHashSet<NodeId>,
        event: RunEvent,
        report: &mut RunReport,
        finalized: &mut bool,
    ) -> bool {
        match event {
            RunEvent::TaskStarted => {
                self.store.set_run_flags(targets, true, true);
                false
            }
            RunEvent::EdgeStarted { edge_id } => {
                debug!(%edge_id, "edge started");
                false
            }
            RunEvent::StreamStarted {
                node_id,
                resource_key,
                content_type,
            } => {
                let pointer = ExternalContentPointer {
                    resource_key: resource_key.into(),
                    content_type: content_type.unwrap_or_default(),
                };
                self.reconstructors.start(&pointer, &NodeId::from(node_id));
                false
            }
            RunEvent::ProgressUpdate { completed, total } => {
                debug!(?completed, ?total, "progress update");
                false
            }
            RunEvent::EdgeCompleted { edge_id, outputs } => {
                debug!(%edge_id, produced = outputs.len(), "edge completed");
                let produced: FxHashSet<NodeId> =
                    outputs.into_iter().map(NodeId::from).collect();
                self.store.set_run_flags(&produced, true, true);
                // Anything newly flagged here must be covered by the
                // end-of-stream settle too.
                targets.extend(produced);
                false
            }
            RunEvent::BlockUpdated {
                node_id,
                content,
                kind,
                external,
            } => {
                let id = NodeId::from(node_id);
                if self.store.node(&id).is_none() {
                    warn!(node = %id, "update for unknown node skipped");
                    report.protocol_errors += 1;
                    return false;
                }
                if let Some(external) = external {
                    let pointer = ExternalContentPointer {
                        resource_key: external.resource_key.into(),
                        content_type: external.content_type,
                    };
                    self.reconstructors.start(&pointer, &id);
                } else {
                    let text = content
                        .as_ref()
                        .map(canonical_content)
                        .unwrap_or_default();
                    let kind = kind.as_deref().and_then(BlockKind::from_wire);
                    self.store.write_block_content(&id, &text, kind);
                }
                false
            }
            RunEvent::StreamEnded {
                node_id,
                resource_key,
            } => {
                self.reconstructors
                    .stop(&resource_key.into(), &NodeId::from(node_id))
                    .await;
                false
            }
            RunEvent::BatchCompleted => {
                debug!("batch completed");
                false
            }
            RunEvent::TaskFailed { error_message } => {
                self.reconstructors.stop_all().await;
                self.report_failure(targets, &error_message);
                report.outcome = RunOutcome::Failed {
                    message: error_message,
                };
                *finalized = true;
                true
            }
            RunEvent::TaskCompleted => {
                self.reconstructors.stop_all().await;
                self.store.clear_run_flags(targets);
                report.outcome = RunOutcome::Completed;
                *finalized = true;
                true
            }
        }
    }

    /// Create output blocks for in-scope operators that have none, wiring
    /// each as the operator's result before anything is serialized.
    fn synthesize_outputs(&self, scope: &Scope) -> Result<(), SerializeError> {
        let snapshot = self.store.snapshot();
        let adjacency = Adjacency::build(&snapshot);
        let plan = resolve_scope(&snapshot, &adjacency, scope)?;

        for op_id in &plan.operator_ids {
            if !adjacency.outputs_of(op_id).is_empty() {
                continue;
            }
            let Some(op) = snapshot.node(op_id) else {
                continue;
            };
            let label = unique_label(&self.store.snapshot(), &format!("{} result", op.label));
            let block = Node::text_block(NodeId::generate(), label, "");
            let block_id = block.id.clone();
            debug!(operator = %op_id, block = %block_id, "synthesizing output block");
            self.store.insert_node(block);
            self.store.insert_link(Link::new(op_id.clone(), block_id));
        }
        Ok(())
    }

    /// Flush locally edited external content before the run reads it.
    async fn flush_dirty_external(
        &self,
        snapshot: &Canvas,
        scope: &Scope,
    ) -> Result<(), DispatchError> {
        let adjacency = Adjacency::build(snapshot);
        let plan = resolve_scope(snapshot, &adjacency, scope)?;

        for id in &plan.block_ids {
            let Some(node) = snapshot.node(id) else {
                continue;
            };
            let Some(block) = node.as_block() else {
                continue;
            };
            if !block.dirty {
                continue;
            }
            let Some(pointer) = block.storage.pointer() else {
                continue;
            };
            if let Err(source) = self
                .storage
                .flush_content(&pointer.resource_key, &block.content)
                .await
            {
                let message = source.to_string();
                self.report_failure(&[id.clone()].into_iter().collect(), &message);
                return Err(DispatchError::FlushFailed {
                    node_id: id.clone(),
                    source,
                });
            }
            self.store.clear_dirty(id);
        }
        Ok(())
    }

    fn report_failure(&self, targets: &FxHashSet<NodeId>, message: &str) {
        self.store.fail_nodes(targets, message);
        for node_id in targets {
            self.notifier.emit(EngineEvent::NodeFailed {
                node_id: node_id.clone(),
                message: message.to_string(),
            });
        }
    }
}

#[cfg(feature = "metrics")]
fn outcome_label(outcome: &RunOutcome) -> &'static str {
    match outcome {
        RunOutcome::Completed => "completed",
        RunOutcome::Failed { .. } => "failed",
        RunOutcome::Interrupted => "interrupted",
    }
}

fn unique_label(canvas: &Canvas, base: &str) -> String {
    if !canvas.nodes.iter().any(|n| n.label == base) {
        return base.to_string();
    }
    let mut suffix = 2;
    loop {
        let candidate = format!("{base} {suffix}");
        if !canvas.nodes.iter().any(|n| n.label == candidate) {
            return candidate;
        }
        suffix += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_label_appends_counter() {
        let canvas = Canvas::new(
            vec![
                Node::text_block("a", "Tidy result", ""),
                Node::text_block("b", "Tidy result 2", ""),
            ],
            vec![],
        );
        assert_eq!(unique_label(&canvas, "Tidy result"), "Tidy result 3");
        assert_eq!(unique_label(&canvas, "Fresh"), "Fresh");
    }
}
