//! Link index built once per traversal pass.
//!
//! Raw links are an unordered edge list; every serializer question is of the
//! form "which blocks feed this operator" or "which operators produce this
//! block". [`Adjacency`] answers those in O(1) after a single pass over the
//! canvas. It is rebuilt from each snapshot rather than maintained
//! incrementally, so it can never drift from the node collection.

use super::{Canvas, Node};
use crate::types::NodeId;
use rustc_hash::FxHashMap;
use tracing::debug;

/// Directional link index over one canvas snapshot.
#[derive(Debug, Default)]
pub struct Adjacency {
    operator_inputs: FxHashMap<NodeId, Vec<NodeId>>,
    operator_outputs: FxHashMap<NodeId, Vec<NodeId>>,
    block_producers: FxHashMap<NodeId, Vec<NodeId>>,
    block_consumers: FxHashMap<NodeId, Vec<NodeId>>,
}

impl Adjacency {
    /// Index every well-formed link in the canvas.
    ///
    /// Links whose endpoints are missing, or that join two blocks or two
    /// operators, carry no execution meaning and are skipped.
    #[must_use]
    pub fn build(canvas: &Canvas) -> Self {
        let mut index = Adjacency::default();
        for link in &canvas.links {
            let (Some(from), Some(to)) = (canvas.node(&link.from), canvas.node(&link.to)) else {
                debug!(from = %link.from, to = %link.to, "skipping link with missing endpoint");
                continue;
            };
            match (classify(from), classify(to)) {
                (Endpoint::Block, Endpoint::Operator) => {
                    index
                        .operator_inputs
                        .entry(link.to.clone())
                        .or_default()
                        .push(link.from.clone());
                    index
                        .block_consumers
                        .entry(link.from.clone())
                        .or_default()
                        .push(link.to.clone());
                }
                (Endpoint::Operator, Endpoint::Block) => {
                    index
                        .operator_outputs
                        .entry(link.from.clone())
                        .or_default()
                        .push(link.to.clone());
                    index
                        .block_producers
                        .entry(link.to.clone())
                        .or_default()
                        .push(link.from.clone());
                }
                _ => {
                    debug!(from = %link.from, to = %link.to, "skipping link between same-kind endpoints");
                }
            }
        }
        index
    }

    /// Blocks feeding the given operator, in link order.
    #[must_use]
    pub fn inputs_of(&self, operator: &NodeId) -> &[NodeId] {
        self.operator_inputs
            .get(operator)
            .map_or(&[], Vec::as_slice)
    }

    /// Blocks the given operator writes into, in link order.
    #[must_use]
    pub fn outputs_of(&self, operator: &NodeId) -> &[NodeId] {
        self.operator_outputs
            .get(operator)
            .map_or(&[], Vec::as_slice)
    }

    /// Operators that produce into the given block.
    #[must_use]
    pub fn producers_of(&self, block: &NodeId) -> &[NodeId] {
        self.block_producers.get(block).map_or(&[], Vec::as_slice)
    }

    /// Operators that consume the given block.
    #[must_use]
    pub fn consumers_of(&self, block: &NodeId) -> &[NodeId] {
        self.block_consumers.get(block).map_or(&[], Vec::as_slice)
    }
}

enum Endpoint {
    Block,
    Operator,
    Other,
}

fn classify(node: &Node) -> Endpoint {
    if node.is_block() {
        Endpoint::Block
    } else if node.is_operator() {
        Endpoint::Operator
    } else {
        Endpoint::Other
    }
}
