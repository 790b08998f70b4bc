#![allow(dead_code)]

//! Canvas builders shared across the integration tests.

use weftrun::canvas::{
    BlockKind, BlockStorage, Canvas, ExternalContentPointer, Link, Node, OperatorConfig,
};

/// `draft -> Tidy (edit) -> result`, the smallest runnable pipeline.
pub fn edit_pipeline() -> Canvas {
    Canvas::new(
        vec![
            Node::text_block("draft", "Draft", "rough notes"),
            Node::operator(
                "tidy",
                "Tidy",
                OperatorConfig::Edit {
                    prompt: "tidy up {{Draft}}".into(),
                    model: None,
                },
            ),
            Node::text_block("result", "Result", ""),
        ],
        vec![Link::new("draft", "tidy"), Link::new("tidy", "result")],
    )
}

/// A completion operator with no output block wired up.
pub fn dangling_completion() -> Canvas {
    Canvas::new(
        vec![
            Node::text_block("prompt", "Prompt", "write a haiku"),
            Node::operator(
                "gen",
                "Generate",
                OperatorConfig::Completion {
                    prompt: "{{Prompt}}".into(),
                    model: None,
                    temperature: None,
                },
            ),
        ],
        vec![Link::new("prompt", "gen")],
    )
}

/// Text block whose content lives in external storage, carrying unflushed
/// local edits.
pub fn dirty_external_block(id: &str, label: &str, resource: &str) -> Node {
    let mut node = Node::text_block(id, label, "locally edited");
    let block = node.as_block_mut().expect("text block");
    block.storage = BlockStorage::External(ExternalContentPointer {
        resource_key: resource.into(),
        content_type: BlockKind::Text,
    });
    block.dirty = true;
    node
}

/// Two grouped blocks feeding a grouped copy operator, plus an ungrouped
/// bystander pair that must stay out of group-scoped requests.
pub fn grouped_canvas(group: &str) -> Canvas {
    Canvas::new(
        vec![
            Node::text_block("in", "Grouped In", "grouped").with_group(group),
            Node::operator("copy", "Grouped Copy", OperatorConfig::Copy).with_group(group),
            Node::text_block("out", "Grouped Out", "").with_group(group),
            Node::text_block("stray", "Stray", "outside"),
            Node::operator("stray-op", "Stray Copy", OperatorConfig::Copy),
        ],
        vec![
            Link::new("in", "copy"),
            Link::new("copy", "out"),
            Link::new("stray", "stray-op"),
        ],
    )
}
