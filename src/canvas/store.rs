//! Shared, replace-on-write store for the live canvas.
//!
//! The node collection is the one piece of state every component mutates:
//! the dispatcher flips run flags, the reconstructor commits content, the
//! sync layer reads snapshots for diffing, and the editor inserts nodes.
//! All of that goes through [`NodeStore`], which serializes writers behind
//! one mutex and applies each mutation as a whole-collection replacement
//! built from the previous value. Readers clone a snapshot and never
//! observe a half-applied update.
//!
//! Updates are synchronous and never held across an await point, so the
//! store is safe to share between tokio tasks.
//!
//! # Examples
//!
//! ```rust
//! use weftrun::canvas::{Canvas, Node, NodeStore};
//!
//! let store = NodeStore::new(Canvas::default());
//! store.insert_node(Node::text_block("b1", "Notes", "draft"));
//!
//! let snapshot = store.snapshot();
//! assert_eq!(snapshot.nodes.len(), 1);
//! ```

use super::node::{BlockKind, BlockStorage, ExternalContentPointer, Node};
use super::{Canvas, Link};
use crate::types::NodeId;
use rustc_hash::FxHashSet;
use std::sync::{Arc, Mutex};

/// Thread-safe owner of the live canvas.
///
/// Cloning the store is cheap and shares the same underlying canvas.
#[derive(Clone, Debug)]
pub struct NodeStore {
    inner: Arc<Mutex<Canvas>>,
}

impl NodeStore {
    #[must_use]
    pub fn new(canvas: Canvas) -> Self {
        Self {
            inner: Arc::new(Mutex::new(canvas)),
        }
    }

    /// Clone the current canvas.
    #[must_use]
    pub fn snapshot(&self) -> Canvas {
        self.inner.lock().expect("canvas store poisoned").clone()
    }

    /// Look up a single node by id, cloned out of the current canvas.
    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<Node> {
        self.inner
            .lock()
            .expect("canvas store poisoned")
            .node(id)
            .cloned()
    }

    /// Replace the canvas with a value derived from the current one.
    ///
    /// This is the single mutation primitive; every other writer below is
    /// sugar over it. The closure runs under the store lock and must not
    /// block.
    pub fn update<F>(&self, derive: F)
    where
        F: FnOnce(&Canvas) -> Canvas,
    {
        let mut guard = self.inner.lock().expect("canvas store poisoned");
        let next = derive(&guard);
        *guard = next;
    }

    /// Rewrite every node matching `pred` through `patch`, leaving the rest
    /// untouched.
    pub fn patch_nodes<P, M>(&self, pred: P, patch: M)
    where
        P: Fn(&Node) -> bool,
        M: Fn(Node) -> Node,
    {
        self.update(|canvas| {
            let nodes = canvas
                .nodes
                .iter()
                .map(|node| {
                    if pred(node) {
                        patch(node.clone())
                    } else {
                        node.clone()
                    }
                })
                .collect();
            Canvas::new(nodes, canvas.links.clone())
        });
    }

    /// Append a node to the collection.
    pub fn insert_node(&self, node: Node) {
        self.update(|canvas| {
            let mut nodes = canvas.nodes.clone();
            nodes.push(node.clone());
            Canvas::new(nodes, canvas.links.clone())
        });
    }

    /// Append a link to the collection.
    pub fn insert_link(&self, link: Link) {
        self.update(|canvas| {
            let mut links = canvas.links.clone();
            links.push(link.clone());
            Canvas::new(canvas.nodes.clone(), links)
        });
    }

    /// Set loading / waiting flags on every node in `ids`.
    pub fn set_run_flags(&self, ids: &FxHashSet<NodeId>, loading: bool, waiting: bool) {
        self.patch_nodes(
            |node| ids.contains(&node.id),
            |mut node| {
                node.status.loading = loading;
                node.status.waiting_for_flow = waiting;
                node
            },
        );
    }

    /// Drop loading / waiting flags, leaving any recorded error in place.
    pub fn clear_run_flags(&self, ids: &FxHashSet<NodeId>) {
        self.set_run_flags(ids, false, false);
    }

    /// Record a failure on every node in `ids` and settle their flags.
    pub fn fail_nodes(&self, ids: &FxHashSet<NodeId>, message: &str) {
        self.patch_nodes(
            |node| ids.contains(&node.id),
            |mut node| {
                node.status.loading = false;
                node.status.waiting_for_flow = false;
                node.status.error = Some(message.to_string());
                node
            },
        );
    }

    /// Write final inline content into a block and settle its loading flag.
    ///
    /// Any external pointer is dropped: inline content and a pointer are
    /// mutually exclusive. An optional kind accompanies re-typed results.
    pub fn write_block_content(&self, id: &NodeId, content: &str, kind: Option<BlockKind>) {
        self.patch_nodes(
            |node| &node.id == id,
            |mut node| {
                if let Some(block) = node.as_block_mut() {
                    block.content = content.to_string();
                    block.storage = BlockStorage::Inline;
                    if let Some(kind) = kind {
                        block.kind = kind;
                    }
                }
                node.status.loading = false;
                node.status.error = None;
                node
            },
        );
    }

    /// Write partial content while a reconstruction is still in flight.
    ///
    /// Keeps the loading flag up so the editor renders progress, not a
    /// finished block.
    pub fn write_streaming_content(&self, id: &NodeId, content: &str) {
        self.patch_nodes(
            |node| &node.id == id,
            |mut node| {
                if let Some(block) = node.as_block_mut() {
                    block.content = content.to_string();
                }
                node
            },
        );
    }

    /// Point a block at external storage.
    ///
    /// Inline content is cleared immediately; until the reconstructor
    /// commits, readers of this block see empty content and a raised
    /// loading flag.
    pub fn set_external(&self, id: &NodeId, pointer: ExternalContentPointer) {
        self.patch_nodes(
            |node| &node.id == id,
            |mut node| {
                if let Some(block) = node.as_block_mut() {
                    block.content = String::new();
                    block.kind = pointer.content_type;
                    block.storage = BlockStorage::External(pointer.clone());
                }
                node.status.loading = true;
                node
            },
        );
    }

    /// Commit a finished reconstruction: final content in, pointer out,
    /// loading settled.
    pub fn commit_reconstructed(&self, id: &NodeId, content: &str) {
        self.patch_nodes(
            |node| &node.id == id,
            |mut node| {
                if let Some(block) = node.as_block_mut() {
                    block.content = content.to_string();
                    block.storage = BlockStorage::Inline;
                }
                node.status.loading = false;
                node
            },
        );
    }

    /// Clear the unflushed-edit marker after a successful flush.
    pub fn clear_dirty(&self, id: &NodeId) {
        self.patch_nodes(
            |node| &node.id == id,
            |mut node| {
                if let Some(block) = node.as_block_mut() {
                    block.dirty = false;
                }
                node
            },
        );
    }
}
