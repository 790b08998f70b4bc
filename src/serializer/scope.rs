//! Traversal scopes: which nodes a dispatch covers.
//!
//! Three scopes exist. [`Scope::AllNodes`] is "run everything".
//! [`Scope::Operator`] walks the upstream closure of one operator: its
//! inputs, whatever produces those inputs, and so on, plus the output
//! blocks of every operator the walk visits. [`Scope::Group`] starts from
//! the blocks carrying a group label and keeps the operators anchored in
//! that group on both sides, re-expanded to their full block sets.
//!
//! Resolution works on an [`Adjacency`] index built once per pass and
//! returns sorted id lists so downstream work is deterministic.

use super::SerializeError;
use crate::canvas::{Adjacency, Canvas};
use crate::types::NodeId;
use rustc_hash::FxHashSet;

/// What part of the canvas a serialization covers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Scope {
    /// Every node on the canvas.
    AllNodes,
    /// One operator plus everything transitively required to run it.
    Operator(NodeId),
    /// The blocks labelled with this group and the operators anchored in it.
    Group(String),
}

/// Resolved membership of a scope.
#[derive(Debug)]
pub(crate) struct ScopePlan {
    /// Nodes to serialize as blocks. Under [`Scope::AllNodes`] this also
    /// carries unrecognized-kind nodes so payload construction can fail
    /// loudly instead of dropping them.
    pub block_ids: Vec<NodeId>,
    pub operator_ids: Vec<NodeId>,
    /// Group runs drop operators whose serialized payload duplicates one
    /// already kept.
    pub dedup_operators: bool,
}

pub(crate) fn resolve_scope(
    canvas: &Canvas,
    adjacency: &Adjacency,
    scope: &Scope,
) -> Result<ScopePlan, SerializeError> {
    match scope {
        Scope::AllNodes => Ok(all_nodes(canvas)),
        Scope::Operator(id) => operator_closure(canvas, adjacency, id),
        Scope::Group(label) => Ok(group_members(canvas, adjacency, label)),
    }
}

fn all_nodes(canvas: &Canvas) -> ScopePlan {
    let mut block_ids = Vec::new();
    let mut operator_ids = Vec::new();
    for node in &canvas.nodes {
        if node.is_operator() {
            operator_ids.push(node.id.clone());
        } else {
            block_ids.push(node.id.clone());
        }
    }
    block_ids.sort();
    operator_ids.sort();
    ScopePlan {
        block_ids,
        operator_ids,
        dedup_operators: false,
    }
}

fn operator_closure(
    canvas: &Canvas,
    adjacency: &Adjacency,
    root: &NodeId,
) -> Result<ScopePlan, SerializeError> {
    let node = canvas
        .node(root)
        .ok_or_else(|| SerializeError::UnknownNode { id: root.clone() })?;
    if !node.is_operator() {
        return Err(SerializeError::NotAnOperator { id: root.clone() });
    }

    let mut operators: FxHashSet<NodeId> = FxHashSet::default();
    let mut blocks: FxHashSet<NodeId> = FxHashSet::default();
    let mut stack = vec![root.clone()];
    operators.insert(root.clone());

    while let Some(op) = stack.pop() {
        for input in adjacency.inputs_of(&op) {
            blocks.insert(input.clone());
            // Whatever produces an input must run before this operator.
            for producer in adjacency.producers_of(input) {
                if operators.insert(producer.clone()) {
                    stack.push(producer.clone());
                }
            }
        }
        for output in adjacency.outputs_of(&op) {
            blocks.insert(output.clone());
        }
    }

    Ok(ScopePlan {
        block_ids: sorted(blocks),
        operator_ids: sorted(operators),
        dedup_operators: false,
    })
}

fn group_members(canvas: &Canvas, adjacency: &Adjacency, label: &str) -> ScopePlan {
    let group_blocks: FxHashSet<NodeId> = canvas
        .blocks()
        .filter(|n| n.group() == Some(label))
        .map(|n| n.id.clone())
        .collect();

    // Every operator touching a group block as source or target.
    let mut touching: FxHashSet<NodeId> = FxHashSet::default();
    for block in &group_blocks {
        touching.extend(adjacency.consumers_of(block).iter().cloned());
        touching.extend(adjacency.producers_of(block).iter().cloned());
    }

    // Keep only operators anchored in the group on both sides.
    let anchored: FxHashSet<NodeId> = touching
        .into_iter()
        .filter(|op| {
            let input_in_group = adjacency
                .inputs_of(op)
                .iter()
                .any(|b| group_blocks.contains(b));
            let output_in_group = adjacency
                .outputs_of(op)
                .iter()
                .any(|b| group_blocks.contains(b));
            input_in_group && output_in_group
        })
        .collect();

    // Re-expand to the kept operators' full block sets, out-of-group
    // endpoints included; the remote still needs every referenced block.
    let mut blocks = group_blocks;
    for op in &anchored {
        blocks.extend(adjacency.inputs_of(op).iter().cloned());
        blocks.extend(adjacency.outputs_of(op).iter().cloned());
    }

    ScopePlan {
        block_ids: sorted(blocks),
        operator_ids: sorted(anchored),
        dedup_operators: true,
    }
}

fn sorted(ids: FxHashSet<NodeId>) -> Vec<NodeId> {
    let mut ids: Vec<NodeId> = ids.into_iter().collect();
    ids.sort();
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{Link, Node, OperatorConfig};

    /// b1 -> e1 -> b2 -> e2 -> b3, with b4 detached.
    fn chain() -> Canvas {
        Canvas::new(
            vec![
                Node::text_block("b1", "One", ""),
                Node::operator("e1", "First", OperatorConfig::Copy),
                Node::text_block("b2", "Two", ""),
                Node::operator("e2", "Second", OperatorConfig::Copy),
                Node::text_block("b3", "Three", ""),
                Node::text_block("b4", "Detached", ""),
            ],
            vec![
                Link::new("b1", "e1"),
                Link::new("e1", "b2"),
                Link::new("b2", "e2"),
                Link::new("e2", "b3"),
            ],
        )
    }

    #[test]
    fn operator_scope_walks_upstream_closure() {
        let canvas = chain();
        let adjacency = Adjacency::build(&canvas);
        let plan = resolve_scope(&canvas, &adjacency, &Scope::Operator("e2".into())).unwrap();
        assert_eq!(plan.operator_ids, vec!["e1".into(), "e2".into()]);
        assert_eq!(
            plan.block_ids,
            vec!["b1".into(), "b2".into(), "b3".into()],
            "detached blocks stay out of operator scope"
        );
    }

    #[test]
    fn operator_scope_rejects_blocks_and_missing_ids() {
        let canvas = chain();
        let adjacency = Adjacency::build(&canvas);
        assert!(matches!(
            resolve_scope(&canvas, &adjacency, &Scope::Operator("b1".into())),
            Err(SerializeError::NotAnOperator { .. })
        ));
        assert!(matches!(
            resolve_scope(&canvas, &adjacency, &Scope::Operator("ghost".into())),
            Err(SerializeError::UnknownNode { .. })
        ));
    }

    #[test]
    fn group_scope_keeps_operators_anchored_on_both_sides() {
        // in-group: b1, b2. e1 spans b1 -> b2 (kept).
        // e2 reads b2 but writes only out-of-group b3 (dropped).
        let canvas = Canvas::new(
            vec![
                Node::text_block("b1", "One", "").with_group("g"),
                Node::operator("e1", "Inside", OperatorConfig::Copy),
                Node::text_block("b2", "Two", "").with_group("g"),
                Node::operator("e2", "Leaving", OperatorConfig::Copy),
                Node::text_block("b3", "Out", ""),
            ],
            vec![
                Link::new("b1", "e1"),
                Link::new("e1", "b2"),
                Link::new("b2", "e2"),
                Link::new("e2", "b3"),
            ],
        );
        let adjacency = Adjacency::build(&canvas);
        let plan = resolve_scope(&canvas, &adjacency, &Scope::Group("g".into())).unwrap();
        assert_eq!(plan.operator_ids, vec!["e1".into()]);
        assert_eq!(plan.block_ids, vec!["b1".into(), "b2".into()]);
        assert!(plan.dedup_operators);
    }

    #[test]
    fn group_scope_reexpands_to_out_of_group_inputs() {
        // e1 reads in-group b1 and out-of-group b0, writes in-group b2.
        let canvas = Canvas::new(
            vec![
                Node::text_block("b0", "Context", ""),
                Node::text_block("b1", "One", "").with_group("g"),
                Node::operator("e1", "Op", OperatorConfig::Copy),
                Node::text_block("b2", "Two", "").with_group("g"),
            ],
            vec![
                Link::new("b0", "e1"),
                Link::new("b1", "e1"),
                Link::new("e1", "b2"),
            ],
        );
        let adjacency = Adjacency::build(&canvas);
        let plan = resolve_scope(&canvas, &adjacency, &Scope::Group("g".into())).unwrap();
        assert_eq!(
            plan.block_ids,
            vec!["b0".into(), "b1".into(), "b2".into()],
            "kept operators pull their full input set back in"
        );
    }

    #[test]
    fn unknown_group_resolves_empty() {
        let canvas = chain();
        let adjacency = Adjacency::build(&canvas);
        let plan = resolve_scope(&canvas, &adjacency, &Scope::Group("nope".into())).unwrap();
        assert!(plan.block_ids.is_empty());
        assert!(plan.operator_ids.is_empty());
    }
}
