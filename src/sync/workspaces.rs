//! Workspace collection with optimistic mutations.

use super::dirty::canvas_differs;
use super::operation::Operation;
use super::queue::{SettleTicket, SyncQueue};
use crate::canvas::{encode_canvas, Canvas, NodeStore, Workspace};
use crate::events::{EngineEvent, Notifier};
use crate::types::WorkspaceId;
use miette::Diagnostic;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::debug;

/// Mutation refers to a workspace this service does not hold.
#[derive(Debug, Error, Diagnostic)]
pub enum WorkspaceError {
    #[error("workspace {id} is not loaded")]
    #[diagnostic(
        code(weftrun::sync::unknown_workspace),
        help("attach or create the workspace before mutating it")
    )]
    Unknown { id: WorkspaceId },

    #[error("no workspace is selected")]
    #[diagnostic(code(weftrun::sync::no_selection))]
    NoSelection,
}

#[derive(Default)]
struct WorkspacesState {
    entries: Vec<Workspace>,
    selected: Option<WorkspaceId>,
}

impl WorkspacesState {
    fn entry_mut(&mut self, id: &WorkspaceId) -> Option<&mut Workspace> {
        self.entries.iter_mut().find(|w| &w.id == id)
    }
}

/// Owned collection of workspaces plus the selection the live canvas
/// belongs to.
///
/// Every mutating action applies its local update first and enqueues the
/// matching [`Operation`] second, carrying the undo closure that reverses
/// the local update. The queue fires that rollback only if the remote call
/// terminally fails, so callers see their change immediately and lose it
/// only when the remote rejects it.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use weftrun::canvas::{Canvas, NodeStore};
/// use weftrun::events::Notifier;
/// use weftrun::remote::{HttpRemote, RemoteConfig};
/// use weftrun::sync::{SyncQueue, Workspaces};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let remote = Arc::new(HttpRemote::new(RemoteConfig::from_env())?);
/// let store = NodeStore::new(Canvas::default());
/// let queue = Arc::new(SyncQueue::new(remote, Notifier::disabled()));
/// let workspaces = Workspaces::new(Arc::clone(&queue), store, Notifier::disabled());
///
/// let (id, _ticket) = workspaces.create("Research notes");
/// workspaces.select(&id)?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Workspaces {
    queue: Arc<SyncQueue>,
    store: NodeStore,
    notifier: Notifier,
    inner: Arc<Mutex<WorkspacesState>>,
}

impl Workspaces {
    #[must_use]
    pub fn new(queue: Arc<SyncQueue>, store: NodeStore, notifier: Notifier) -> Self {
        Self {
            queue,
            store,
            notifier,
            inner: Arc::new(Mutex::new(WorkspacesState::default())),
        }
    }

    /// Register an already-persisted workspace without queueing anything.
    /// An entry with the same id is replaced.
    pub fn attach(&self, workspace: Workspace) {
        let mut state = self.inner.lock().expect("workspaces poisoned");
        if let Some(entry) = state.entry_mut(&workspace.id) {
            *entry = workspace;
        } else {
            state.entries.push(workspace);
        }
    }

    #[must_use]
    pub fn entries(&self) -> Vec<Workspace> {
        self.inner.lock().expect("workspaces poisoned").entries.clone()
    }

    #[must_use]
    pub fn entry(&self, id: &WorkspaceId) -> Option<Workspace> {
        self.inner
            .lock()
            .expect("workspaces poisoned")
            .entries
            .iter()
            .find(|w| &w.id == id)
            .cloned()
    }

    #[must_use]
    pub fn selected(&self) -> Option<WorkspaceId> {
        self.inner.lock().expect("workspaces poisoned").selected.clone()
    }

    /// Make `id` the selected workspace and load its last-persisted canvas
    /// into the node store.
    pub fn select(&self, id: &WorkspaceId) -> Result<(), WorkspaceError> {
        let content = {
            let mut state = self.inner.lock().expect("workspaces poisoned");
            let content = state
                .entries
                .iter()
                .find(|w| &w.id == id)
                .map(|w| w.latest_content.clone())
                .ok_or_else(|| WorkspaceError::Unknown { id: id.clone() })?;
            state.selected = Some(id.clone());
            content
        };
        self.store.update(move |_| content);
        debug!(workspace = %id, "workspace selected");
        Ok(())
    }

    /// Add a workspace locally and queue its remote creation.
    pub fn create(&self, title: impl Into<String>) -> (WorkspaceId, SettleTicket) {
        let title = title.into();
        let id = WorkspaceId::generate();
        {
            let mut state = self.inner.lock().expect("workspaces poisoned");
            state.entries.push(Workspace::new(id.clone(), title.clone()));
        }
        debug!(workspace = %id, "workspace created locally");

        let inner = Arc::clone(&self.inner);
        let ws = id.clone();
        let rollback = Box::new(move || {
            let mut state = inner.lock().expect("workspaces poisoned");
            state.entries.retain(|w| w.id != ws);
            if state.selected.as_ref() == Some(&ws) {
                state.selected = None;
            }
        });
        let ticket = self
            .queue
            .enqueue(Operation::create(id.clone(), title).with_rollback(rollback));
        (id, ticket)
    }

    /// Retitle a workspace locally and queue the remote rename.
    pub fn rename(
        &self,
        id: &WorkspaceId,
        title: impl Into<String>,
    ) -> Result<SettleTicket, WorkspaceError> {
        let title = title.into();
        let prior = {
            let mut state = self.inner.lock().expect("workspaces poisoned");
            let entry = state
                .entry_mut(id)
                .ok_or_else(|| WorkspaceError::Unknown { id: id.clone() })?;
            std::mem::replace(&mut entry.title, title.clone())
        };
        debug!(workspace = %id, "workspace renamed locally");

        let inner = Arc::clone(&self.inner);
        let ws = id.clone();
        let rollback = Box::new(move || {
            let mut state = inner.lock().expect("workspaces poisoned");
            if let Some(entry) = state.entry_mut(&ws) {
                entry.title = prior;
            }
        });
        Ok(self
            .queue
            .enqueue(Operation::rename(id.clone(), title).with_rollback(rollback)))
    }

    /// Remove a workspace locally and queue the remote delete. Deleting the
    /// selected workspace clears the selection and the live canvas; the
    /// rollback restores both.
    pub fn delete(&self, id: &WorkspaceId) -> Result<SettleTicket, WorkspaceError> {
        let (index, entry, displaced_live) = {
            let mut state = self.inner.lock().expect("workspaces poisoned");
            let index = state
                .entries
                .iter()
                .position(|w| &w.id == id)
                .ok_or_else(|| WorkspaceError::Unknown { id: id.clone() })?;
            let entry = state.entries.remove(index);
            let displaced_live = if state.selected.as_ref() == Some(id) {
                state.selected = None;
                Some(self.store.snapshot())
            } else {
                None
            };
            (index, entry, displaced_live)
        };
        if displaced_live.is_some() {
            self.store.update(|_| Canvas::default());
        }
        debug!(workspace = %id, "workspace removed locally");

        let inner = Arc::clone(&self.inner);
        let store = self.store.clone();
        let rollback = Box::new(move || {
            let mut state = inner.lock().expect("workspaces poisoned");
            let ws = entry.id.clone();
            let at = index.min(state.entries.len());
            state.entries.insert(at, entry);
            if let Some(live) = displaced_live {
                state.selected = Some(ws);
                store.update(move |_| live);
            }
        });
        Ok(self
            .queue
            .enqueue(Operation::delete(id.clone()).with_rollback(rollback)))
    }

    /// Snapshot the live canvas as the selected workspace's new baseline
    /// and queue a save of it.
    pub fn save(&self) -> Result<SettleTicket, WorkspaceError> {
        self.save_inner(false)
    }

    /// Like [`save`](Self::save) but at priority 1, superseding queued
    /// saves that are not strictly older.
    pub fn save_now(&self) -> Result<SettleTicket, WorkspaceError> {
        self.save_inner(true)
    }

    fn save_inner(&self, forced: bool) -> Result<SettleTicket, WorkspaceError> {
        let live = self.store.snapshot();
        let (id, prior_content, prior_dirty) = {
            let mut state = self.inner.lock().expect("workspaces poisoned");
            let id = state.selected.clone().ok_or(WorkspaceError::NoSelection)?;
            let entry = state
                .entry_mut(&id)
                .ok_or_else(|| WorkspaceError::Unknown { id: id.clone() })?;
            let prior_content = std::mem::replace(&mut entry.latest_content, live.clone());
            let prior_dirty = std::mem::replace(&mut entry.dirty, false);
            (id, prior_content, prior_dirty)
        };
        let content = encode_canvas(&live).to_string();

        let inner = Arc::clone(&self.inner);
        let ws = id.clone();
        let rollback = Box::new(move || {
            let mut state = inner.lock().expect("workspaces poisoned");
            if let Some(entry) = state.entry_mut(&ws) {
                entry.latest_content = prior_content;
                entry.dirty = prior_dirty;
            }
        });
        let op = if forced {
            Operation::forced_save(id, content)
        } else {
            Operation::save(id, content)
        };
        Ok(self.queue.enqueue(op.with_rollback(rollback)))
    }

    /// Compare the live canvas against the selected workspace's baseline,
    /// raising the dirty flag on first divergence. Returns the flag.
    pub fn scan_selected(&self) -> bool {
        let live = self.store.snapshot();
        let id = {
            let mut state = self.inner.lock().expect("workspaces poisoned");
            let Some(id) = state.selected.clone() else {
                return false;
            };
            let Some(entry) = state.entry_mut(&id) else {
                return false;
            };
            if entry.dirty {
                return true;
            }
            if !canvas_differs(&live, &entry.latest_content) {
                return false;
            }
            entry.dirty = true;
            id
        };
        debug!(workspace = %id, "canvas diverged from last saved snapshot");
        self.notifier.emit(EngineEvent::WorkspaceDirty { workspace_id: id });
        true
    }
}
