//! Graph serialization: canvas snapshot in, execution request out.
//!
//! Serialization is pure and synchronous. It reads one [`Canvas`] value,
//! resolves the requested [`Scope`], and builds the wire payload the
//! remote engine executes. It performs no I/O and never mutates the
//! canvas; the dispatcher owns everything stateful.
//!
//! Determinism is a contract: the same canvas and scope always produce
//! byte-identical request text, so retries and payload de-duplication can
//! compare serialized forms directly.
//!
//! # Examples
//!
//! ```rust
//! use weftrun::canvas::{Canvas, Link, Node, OperatorConfig};
//! use weftrun::serializer::{serialize_graph, Scope};
//!
//! let canvas = Canvas::new(
//!     vec![
//!         Node::text_block("b1", "Notes", "raw material"),
//!         Node::operator("e1", "Tidy", OperatorConfig::Edit {
//!             prompt: "tidy up {{Notes}}".into(),
//!             model: None,
//!         }),
//!         Node::text_block("b2", "Result", ""),
//!     ],
//!     vec![Link::new("b1", "e1"), Link::new("e1", "b2")],
//! );
//!
//! let request = serialize_graph(&canvas).unwrap();
//! assert_eq!(request.blocks.len(), 2);
//! assert_eq!(request.edges.len(), 1);
//! ```

mod payload;
mod scope;

pub use payload::{BlockPayload, ExecutionRequest, OperatorPayload, OperatorWire};
pub use scope::Scope;

pub(crate) use scope::resolve_scope;

use crate::canvas::{Adjacency, Canvas, Node, NodePayload};
use crate::types::NodeId;
use miette::Diagnostic;
use rustc_hash::FxHashSet;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

/// Failure while building an execution request.
///
/// These are hard failures: a partially serialized request would execute
/// with missing edges, so nothing is silently skipped.
#[derive(Debug, Error, Diagnostic)]
pub enum SerializeError {
    #[error("node {id} has unsupported kind '{kind}'")]
    #[diagnostic(
        code(weftrun::serializer::unsupported_node_type),
        help(
            "this build understands the closed block and operator kind set; \
             the canvas was probably written by a newer editor"
        )
    )]
    UnsupportedNodeType { id: NodeId, kind: String },

    #[error("scope references unknown node {id}")]
    #[diagnostic(code(weftrun::serializer::unknown_node))]
    UnknownNode { id: NodeId },

    #[error("node {id} is not an operator")]
    #[diagnostic(
        code(weftrun::serializer::not_an_operator),
        help("single-node runs start from an operator; pick the operator that should produce output")
    )]
    NotAnOperator { id: NodeId },

    #[error("could not encode payload")]
    #[diagnostic(code(weftrun::serializer::encode))]
    Encode(#[from] serde_json::Error),
}

/// Serialize the whole canvas. Empty canvases produce an empty request.
pub fn serialize_graph(canvas: &Canvas) -> Result<ExecutionRequest, SerializeError> {
    serialize_scope(canvas, &Scope::AllNodes)
}

/// Serialize the nodes covered by `scope`.
pub fn serialize_scope(canvas: &Canvas, scope: &Scope) -> Result<ExecutionRequest, SerializeError> {
    let adjacency = Adjacency::build(canvas);
    let plan = resolve_scope(canvas, &adjacency, scope)?;

    let mut request = ExecutionRequest::default();

    for id in &plan.block_ids {
        let node = expect_node(canvas, id)?;
        match &node.payload {
            NodePayload::Block(block) => {
                request
                    .blocks
                    .insert(id.to_string(), BlockPayload::from_node(node, block));
            }
            _ => {
                return Err(SerializeError::UnsupportedNodeType {
                    id: id.clone(),
                    kind: kind_label(node),
                });
            }
        }
    }

    let mut seen_payloads: FxHashSet<String> = FxHashSet::default();
    for id in &plan.operator_ids {
        let node = expect_node(canvas, id)?;
        let Some(op) = node.as_operator() else {
            return Err(SerializeError::UnsupportedNodeType {
                id: id.clone(),
                kind: kind_label(node),
            });
        };

        let payload = OperatorPayload {
            inputs: label_map(canvas, adjacency.inputs_of(id))?,
            outputs: label_map(canvas, adjacency.outputs_of(id))?,
            op: OperatorWire::from_config(&op.config),
        };

        if plan.dedup_operators {
            let fingerprint = serde_json::to_string(&payload)?;
            if !seen_payloads.insert(fingerprint) {
                debug!(operator = %id, "dropping duplicate operator payload from group run");
                continue;
            }
        }

        request.edges.insert(id.to_string(), payload);
    }

    Ok(request)
}

fn expect_node<'c>(canvas: &'c Canvas, id: &NodeId) -> Result<&'c Node, SerializeError> {
    canvas
        .node(id)
        .ok_or_else(|| SerializeError::UnknownNode { id: id.clone() })
}

fn label_map(canvas: &Canvas, ids: &[NodeId]) -> Result<BTreeMap<String, String>, SerializeError> {
    let mut map = BTreeMap::new();
    for id in ids {
        let node = expect_node(canvas, id)?;
        map.insert(id.to_string(), node.label.clone());
    }
    Ok(map)
}

fn kind_label(node: &Node) -> String {
    match &node.payload {
        NodePayload::Block(b) => b.kind.wire_tag().to_string(),
        NodePayload::Operator(o) => o.kind().wire_tag().to_string(),
        NodePayload::Unrecognized { kind, .. } => kind.clone(),
    }
}
