//! Incremental reconstruction of externally stored node output.
//!
//! When a run flags a node's output as external, the content is not in the
//! event stream: it accumulates out-of-band as named chunks behind a
//! resource key. A reconstructor polls that resource's manifest on a fixed
//! interval, fetches chunks as they finish, and feeds a [`ChunkAssembly`]
//! whose rendered form is written into the node after every batch, so the
//! editor shows output growing while the remote still computes.
//!
//! [`ReconstructorRegistry`] owns the live pollers, one per
//! `(resource_key, node_id)` pair. Starting an already-active pair is a
//! no-op; stopping signals the poller's shutdown channel and waits for it
//! to run one last manifest pass, finalize the assembly, and commit. A
//! stop for a pair that never started still performs that
//! fetch-once-and-finalize pass, because stream events may outrun the
//! events that would have started polling.

mod assembly;

pub use assembly::ChunkAssembly;

use crate::canvas::{ExternalContentPointer, NodeStore};
use crate::events::{EngineEvent, Notifier};
use crate::remote::{StorageBackend, TransportError};
use crate::types::{NodeId, ResourceKey};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Callback invoked after a reconstruction commits or abandons a node, so
/// the caller can settle any flags it raised beyond `loading`.
pub type LoadingReset = Arc<dyn Fn(&NodeId) + Send + Sync>;

type PollKey = (ResourceKey, NodeId);

struct PollerState {
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Owner of all live reconstructions for one editing session.
pub struct ReconstructorRegistry {
    storage: Arc<dyn StorageBackend>,
    store: NodeStore,
    notifier: Notifier,
    poll_interval: Duration,
    loading_reset: LoadingReset,
    active: Mutex<FxHashMap<PollKey, PollerState>>,
    settled: Mutex<FxHashSet<PollKey>>,
}

impl ReconstructorRegistry {
    /// Manifest poll cadence while a reconstruction is live.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

    #[must_use]
    pub fn new(storage: Arc<dyn StorageBackend>, store: NodeStore, notifier: Notifier) -> Self {
        Self {
            storage,
            store,
            notifier,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            loading_reset: Arc::new(|_| {}),
            active: Mutex::new(FxHashMap::default()),
            settled: Mutex::new(FxHashSet::default()),
        }
    }

    /// Override the poll cadence. Tests drive this down to keep runs fast.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_loading_reset(mut self, reset: LoadingReset) -> Self {
        self.loading_reset = reset;
        self
    }

    /// Number of live pollers.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.lock().expect("reconstructor registry poisoned").len()
    }

    /// Begin reconstructing `pointer`'s resource into `node_id`.
    ///
    /// Clears the node's inline content and raises its loading flag, then
    /// spawns the poll task. A second start for the same pair is a no-op
    /// while the first is alive.
    pub fn start(&self, pointer: &ExternalContentPointer, node_id: &NodeId) {
        let key: PollKey = (pointer.resource_key.clone(), node_id.clone());
        {
            let mut active = self.active.lock().expect("reconstructor registry poisoned");
            if active.contains_key(&key) {
                debug!(resource = %key.0, node = %key.1, "reconstructor already active");
                return;
            }
            self.settled
                .lock()
                .expect("reconstructor registry poisoned")
                .remove(&key);

            self.store.set_external(node_id, pointer.clone());

            let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
            let storage = Arc::clone(&self.storage);
            let store = self.store.clone();
            let notifier = self.notifier.clone();
            let loading_reset = Arc::clone(&self.loading_reset);
            let poll_interval = self.poll_interval;
            let task_key = key.clone();
            let content_type = pointer.content_type;

            let handle = tokio::spawn(async move {
                let (resource_key, node_id) = task_key;
                let mut assembly = ChunkAssembly::new(content_type);
                let mut seen: FxHashSet<String> = FxHashSet::default();
                loop {
                    tokio::select! {
                        _ = &mut shutdown_rx => break,
                        _ = tokio::time::sleep(poll_interval) => {
                            if let Err(err) =
                                poll_tick(&storage, &store, &resource_key, &node_id, &mut seen, &mut assembly).await
                            {
                                warn!(resource = %resource_key, error = %err, "manifest poll failed, will retry");
                            }
                        }
                    }
                }
                // One last pass catches chunks that finished after the
                // final timed poll.
                if let Err(err) =
                    poll_tick(&storage, &store, &resource_key, &node_id, &mut seen, &mut assembly).await
                {
                    warn!(resource = %resource_key, error = %err, "final manifest pass failed");
                }
                commit(
                    &store,
                    &notifier,
                    &loading_reset,
                    &resource_key,
                    &node_id,
                    &mut assembly,
                );
            });

            active.insert(
                key,
                PollerState {
                    shutdown_tx,
                    handle,
                },
            );
        }
    }

    /// Stop the reconstruction for one pair and wait for its commit.
    ///
    /// Idempotent for pairs already stopped. A pair that never started
    /// gets a one-shot fetch-and-finalize so late stops still land the
    /// content.
    pub async fn stop(&self, resource_key: &ResourceKey, node_id: &NodeId) {
        let key: PollKey = (resource_key.clone(), node_id.clone());
        let state = self
            .active
            .lock()
            .expect("reconstructor registry poisoned")
            .remove(&key);

        if let Some(state) = state {
            let _ = state.shutdown_tx.send(());
            let _ = state.handle.await;
            self.mark_settled(key);
            return;
        }

        let already_settled = self
            .settled
            .lock()
            .expect("reconstructor registry poisoned")
            .contains(&key);
        if already_settled {
            debug!(resource = %resource_key, node = %node_id, "stop for settled reconstructor ignored");
            return;
        }

        self.finalize_once(resource_key, node_id).await;
        self.mark_settled(key);
    }

    /// Stop every live reconstruction, committing each.
    pub async fn stop_all(&self) {
        let drained: Vec<(PollKey, PollerState)> = {
            let mut active = self.active.lock().expect("reconstructor registry poisoned");
            active.drain().collect()
        };
        for (key, state) in drained {
            let _ = state.shutdown_tx.send(());
            let _ = state.handle.await;
            self.mark_settled(key);
        }
    }

    fn mark_settled(&self, key: PollKey) {
        self.settled
            .lock()
            .expect("reconstructor registry poisoned")
            .insert(key);
    }

    /// Fetch-once-and-finalize for a pair with no live poller.
    async fn finalize_once(&self, resource_key: &ResourceKey, node_id: &NodeId) {
        match self.storage.fetch_manifest(resource_key).await {
            Ok(manifest) => {
                let mut assembly = ChunkAssembly::new(manifest.content_type);
                let mut seen: FxHashSet<String> = FxHashSet::default();
                if let Err(err) = fetch_chunks(
                    &self.storage,
                    &self.store,
                    resource_key,
                    node_id,
                    &manifest,
                    &mut seen,
                    &mut assembly,
                )
                .await
                {
                    warn!(resource = %resource_key, error = %err, "one-shot chunk fetch incomplete");
                }
                commit(
                    &self.store,
                    &self.notifier,
                    &self.loading_reset,
                    resource_key,
                    node_id,
                    &mut assembly,
                );
            }
            Err(err) => {
                // Nothing fetched; do not wipe the node's current content.
                warn!(resource = %resource_key, error = %err, "one-shot finalize could not read manifest");
                self.store.patch_nodes(
                    |n| &n.id == node_id,
                    |mut n| {
                        n.status.loading = false;
                        n
                    },
                );
                (self.loading_reset)(node_id);
            }
        }
    }
}

impl Drop for ReconstructorRegistry {
    fn drop(&mut self) {
        if let Ok(mut active) = self.active.lock() {
            for (_, state) in active.drain() {
                let _ = state.shutdown_tx.send(());
                state.handle.abort();
            }
        }
    }
}

/// One manifest fetch plus the chunk fetches it unlocks.
async fn poll_tick(
    storage: &Arc<dyn StorageBackend>,
    store: &NodeStore,
    resource_key: &ResourceKey,
    node_id: &NodeId,
    seen: &mut FxHashSet<String>,
    assembly: &mut ChunkAssembly,
) -> Result<(), TransportError> {
    let manifest = storage.fetch_manifest(resource_key).await?;
    fetch_chunks(storage, store, resource_key, node_id, &manifest, seen, assembly).await
}

async fn fetch_chunks(
    storage: &Arc<dyn StorageBackend>,
    store: &NodeStore,
    resource_key: &ResourceKey,
    node_id: &NodeId,
    manifest: &crate::remote::Manifest,
    seen: &mut FxHashSet<String>,
    assembly: &mut ChunkAssembly,
) -> Result<(), TransportError> {
    let mut fresh: Vec<_> = manifest
        .done_chunks()
        .filter(|c| !seen.contains(&c.name))
        .collect();
    if fresh.is_empty() {
        return Ok(());
    }
    fresh.sort_by_key(|c| c.index);

    for chunk in fresh {
        let body = storage.fetch_chunk(resource_key, &chunk.name).await?;
        seen.insert(chunk.name.clone());
        assembly.accept(chunk.index, body);
    }
    store.write_streaming_content(node_id, &assembly.render());
    Ok(())
}

fn commit(
    store: &NodeStore,
    notifier: &Notifier,
    loading_reset: &LoadingReset,
    resource_key: &ResourceKey,
    node_id: &NodeId,
    assembly: &mut ChunkAssembly,
) {
    assembly.finalize();
    store.commit_reconstructed(node_id, &assembly.render());
    loading_reset(node_id);
    #[cfg(feature = "metrics")]
    metrics::counter!("weftrun_reconstructions_committed_total").increment(1);
    notifier.emit(EngineEvent::ReconstructionSettled {
        node_id: node_id.clone(),
        resource_key: resource_key.clone(),
        parse_errors: assembly.parse_errors(),
    });
    debug!(resource = %resource_key, node = %node_id, "reconstruction committed");
}
