//! Change detection between the live canvas and a saved baseline.

use super::workspaces::Workspaces;
use crate::canvas::{normalized_doc, Canvas};
use crate::types::NodeId;
use rustc_hash::FxHashSet;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

/// Whether `live` meaningfully diverges from `saved`.
///
/// Cheap structural checks (collection lengths, node id sets) run first;
/// only when those all match does the normalized document comparison run.
/// Normalization sorts by id and drops transient run state, so flag churn
/// during a dispatch does not count as divergence.
#[must_use]
pub fn canvas_differs(live: &Canvas, saved: &Canvas) -> bool {
    if live.nodes.len() != saved.nodes.len() || live.links.len() != saved.links.len() {
        return true;
    }
    let live_ids: FxHashSet<&NodeId> = live.nodes.iter().map(|n| &n.id).collect();
    let saved_ids: FxHashSet<&NodeId> = saved.nodes.iter().map(|n| &n.id).collect();
    if live_ids != saved_ids {
        return true;
    }
    normalized_doc(live) != normalized_doc(saved)
}

/// Periodic dirtiness scan over the selected workspace.
///
/// Runs [`Workspaces::scan_selected`] on a fixed cadence until stopped.
/// The scan only raises the dirty flag; saving is left to the embedder.
pub struct DirtyScanner {
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl DirtyScanner {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);

    #[must_use]
    pub fn start(workspaces: Workspaces, interval: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = tokio::time::sleep(interval) => {
                        workspaces.scan_selected();
                    }
                }
            }
            debug!("dirty scanner stopped");
        });
        Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for DirtyScanner {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
