#[macro_use]
extern crate proptest;

use proptest::prelude::{Strategy, any, prop};
use weftrun::canvas::{Canvas, Link, Node, OperatorConfig};
use weftrun::serializer::{Scope, serialize_graph, serialize_scope};

// Generators shared by the serializer property tests.

/// One pipeline stage: operator label, output block label, output block
/// content, and how many of the preceding blocks the operator reads.
type Stage = (String, String, String, usize);

/// Generate node labels the way the editor writes them.
///
/// Constraints:
/// - Starts with an uppercase letter
/// - Followed by 0..12 lowercase letters
fn label_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Z][a-z]{0,11}").unwrap()
}

/// Generate short block content, empty string included.
fn content_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z0-9 ,.]{0,32}").unwrap()
}

fn stage_strategy() -> impl Strategy<Value = Stage> {
    (
        label_strategy(),
        label_strategy(),
        content_strategy(),
        1usize..4,
    )
}

/// Assemble a pipeline canvas from generated stages.
///
/// Block `b0` seeds the chain; stage `i` adds operator `e{i+1}` writing
/// block `b{i+1}` and reading a window of the blocks before it (always
/// including the immediately preceding one). `grouped`, when non-empty,
/// marks block `j` as a member of group "g" via modular lookup. With
/// `reversed` the same document is assembled back to front.
fn pipeline(seed: &str, stages: &[Stage], grouped: &[bool], reversed: bool) -> Canvas {
    let in_group =
        |j: usize| -> bool { !grouped.is_empty() && grouped[j % grouped.len()] };

    let mut seed_block = Node::text_block("b0", "Seed", seed);
    if in_group(0) {
        seed_block = seed_block.with_group("g");
    }
    let mut nodes = vec![seed_block];
    let mut links = Vec::new();

    for (i, (op_label, block_label, content, fan_in)) in stages.iter().enumerate() {
        let op_id = format!("e{}", i + 1);
        let block_id = format!("b{}", i + 1);
        let upstream_label = if i == 0 {
            "Seed".to_string()
        } else {
            stages[i - 1].1.clone()
        };

        for back in 0..(*fan_in).min(i + 1) {
            links.push(Link::new(format!("b{}", i - back), op_id.clone()));
        }
        nodes.push(Node::operator(
            op_id.clone(),
            op_label.clone(),
            OperatorConfig::Edit {
                prompt: format!("rework {{{{{upstream_label}}}}}"),
                model: None,
            },
        ));
        let mut block = Node::text_block(block_id.clone(), block_label.clone(), content.clone());
        if in_group(i + 1) {
            block = block.with_group("g");
        }
        nodes.push(block);
        links.push(Link::new(op_id, block_id));
    }

    if reversed {
        nodes.reverse();
        links.reverse();
    }
    Canvas::new(nodes, links)
}

proptest! {
    /// Property: the same document serializes to byte-identical request
    /// text no matter how often it is serialized or in which order the
    /// editor happened to store nodes and links.
    #[test]
    fn prop_serialization_ignores_document_order(
        seed in content_strategy(),
        stages in prop::collection::vec(stage_strategy(), 1..6),
    ) {
        let forward = pipeline(&seed, &stages, &[], false);
        let backward = pipeline(&seed, &stages, &[], true);

        let first = serde_json::to_string(&serialize_graph(&forward).unwrap()).unwrap();
        let again = serde_json::to_string(&serialize_graph(&forward).unwrap()).unwrap();
        let reordered = serde_json::to_string(&serialize_graph(&backward).unwrap()).unwrap();

        prop_assert_eq!(&first, &again);
        prop_assert_eq!(&first, &reordered);
    }
}

proptest! {
    /// Property: a whole-canvas run carries every block and every
    /// operator, nothing dropped and nothing invented.
    #[test]
    fn prop_full_runs_cover_every_node(
        seed in content_strategy(),
        stages in prop::collection::vec(stage_strategy(), 1..6),
    ) {
        let canvas = pipeline(&seed, &stages, &[], false);
        let request = serialize_graph(&canvas).unwrap();

        prop_assert_eq!(request.blocks.len(), stages.len() + 1);
        prop_assert_eq!(request.edges.len(), stages.len());
        for j in 0..=stages.len() {
            let id = format!("b{j}");
            prop_assert!(request.blocks.contains_key(&id));
        }
        for j in 1..=stages.len() {
            let id = format!("e{j}");
            prop_assert!(request.edges.contains_key(&id));
        }
    }
}

proptest! {
    /// Property: running one operator pulls in exactly the pipeline
    /// prefix that feeds it. Every stage reads its predecessor, so the
    /// closure of `e{k}` is `e1..=e{k}` plus `b0..=b{k}` and nothing
    /// downstream.
    #[test]
    fn prop_operator_runs_cover_exactly_the_upstream_prefix(
        seed in content_strategy(),
        stages in prop::collection::vec(stage_strategy(), 1..6),
        pick in 0usize..32,
    ) {
        let canvas = pipeline(&seed, &stages, &[], false);
        let k = pick % stages.len() + 1;

        let request =
            serialize_scope(&canvas, &Scope::Operator(format!("e{k}").into())).unwrap();

        prop_assert_eq!(request.edges.len(), k);
        prop_assert_eq!(request.blocks.len(), k + 1);
        for j in 1..=k {
            let id = format!("e{j}");
            prop_assert!(request.edges.contains_key(&id));
        }
        for j in 0..=k {
            let id = format!("b{j}");
            prop_assert!(request.blocks.contains_key(&id));
        }
    }
}

proptest! {
    /// Property: group runs stay self-contained. Every group-labelled
    /// block is carried, every kept operator touches the group on both
    /// its input and output side, and no operator references a block the
    /// request does not also carry.
    #[test]
    fn prop_group_runs_are_anchored_and_self_contained(
        seed in content_strategy(),
        stages in prop::collection::vec(stage_strategy(), 1..6),
        grouped in prop::collection::vec(any::<bool>(), 1..8),
    ) {
        let canvas = pipeline(&seed, &stages, &grouped, false);
        let request = serialize_scope(&canvas, &Scope::Group("g".into())).unwrap();

        let group_ids: Vec<String> = (0..=stages.len())
            .filter(|j| grouped[j % grouped.len()])
            .map(|j| format!("b{j}"))
            .collect();

        for id in &group_ids {
            prop_assert!(
                request.blocks.contains_key(id),
                "group block {} missing from request", id
            );
        }
        for (op, payload) in &request.edges {
            prop_assert!(
                payload.inputs.keys().any(|id| group_ids.contains(id)),
                "operator {} kept without a group input", op
            );
            prop_assert!(
                payload.outputs.keys().any(|id| group_ids.contains(id)),
                "operator {} kept without a group output", op
            );
            for id in payload.inputs.keys().chain(payload.outputs.keys()) {
                prop_assert!(
                    request.blocks.contains_key(id),
                    "operator {} references block {} the request does not carry", op, id
                );
            }
        }
    }
}
