//! In-memory model of the node canvas.
//!
//! The canvas is the document the editor renders: a flat collection of
//! [`Node`]s (content blocks and operators) plus directed [`Link`]s between
//! them. Every engine component works from this model:
//!
//! - the serializer walks a [`Canvas`] snapshot into an execution request,
//! - the dispatcher patches node run status as stream events arrive,
//! - the reconstructor commits reassembled content back into blocks,
//! - the sync layer diffs live canvases against their persisted form.
//!
//! Shared mutable state lives in [`NodeStore`], which hands out cloned
//! snapshots and applies whole-collection replacements. Nothing in this
//! module performs I/O.

mod adjacency;
mod doc;
mod node;
mod operator;
mod store;
mod workspace;

pub use adjacency::Adjacency;
pub use doc::{decode_canvas, encode_canvas, normalized_doc, DocError};
pub use node::{
    BlockData, BlockKind, BlockStorage, ExternalContentPointer, Node, NodePayload, RunStatus,
};
pub use operator::{defaults, OperatorConfig, OperatorData, OperatorKind};
pub use store::NodeStore;
pub use workspace::{Viewport, Workspace};

use crate::types::NodeId;
use serde::{Deserialize, Serialize};

/// Directed connection between two nodes.
///
/// Well-formed links join a block to an operator (an input) or an operator
/// to a block (an output). Links between two blocks or two operators carry
/// no meaning for execution and are ignored during traversal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub from: NodeId,
    pub to: NodeId,
}

impl Link {
    pub fn new(from: impl Into<NodeId>, to: impl Into<NodeId>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// One canvas document: the full node and link collections.
///
/// `Canvas` is a plain value. Components that need a consistent view take a
/// snapshot from [`NodeStore`] and work on the clone; order of `nodes` and
/// `links` is editor order and is preserved through persistence.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Canvas {
    pub nodes: Vec<Node>,
    pub links: Vec<Link>,
}

impl Canvas {
    #[must_use]
    pub fn new(nodes: Vec<Node>, links: Vec<Link>) -> Self {
        Self { nodes, links }
    }

    /// Look up a node by id.
    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    #[must_use]
    pub fn contains(&self, id: &NodeId) -> bool {
        self.node(id).is_some()
    }

    /// Iterate the block nodes in editor order.
    pub fn blocks(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.is_block())
    }

    /// Iterate the operator nodes in editor order.
    pub fn operators(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.is_operator())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
