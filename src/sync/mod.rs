//! Durable synchronization of workspaces against the remote store.
//!
//! Three cooperating pieces:
//!
//! - [`SyncQueue`]: priority-ordered, single-flight execution of
//!   [`Operation`]s, with the purge rules that keep conflicting queued
//!   work from racing (delete supersedes, forced save supersedes).
//! - [`Workspaces`]: the owned workspace collection. Mutations apply
//!   locally first and enqueue the matching operation with a rollback.
//! - [`DirtyScanner`]: interval comparison of the live canvas against the
//!   selected workspace's last-saved baseline.
//!
//! Nothing here touches the network directly; the queue drives a
//! [`WorkspaceBackend`](crate::remote::WorkspaceBackend).

mod dirty;
mod operation;
mod queue;
mod workspaces;

pub use dirty::{canvas_differs, DirtyScanner};
pub use operation::{Operation, OperationKind, OperationPayload, RollbackFn};
pub use queue::{SettleTicket, SyncQueue};
pub use workspaces::{WorkspaceError, Workspaces};
