//! Document form of a canvas: the JSON written to workspace history.
//!
//! In-memory nodes carry transient run status that must never reach the
//! remote store, and the stored shape has to stay stable across editor
//! versions. So persistence goes through explicit conversion rather than
//! deriving serde on the live types: [`encode_canvas`] flattens each node
//! into a tagged JSON object, [`decode_canvas`] rebuilds the typed model
//! and keeps unknown kinds intact as [`NodePayload::Unrecognized`].
//!
//! [`normalized_doc`] produces the order-insensitive form used for change
//! detection: nodes sorted by id, links sorted by endpoints, transient
//! fields absent by construction.

use super::node::{BlockData, BlockKind, BlockStorage, ExternalContentPointer, Node, NodePayload};
use super::operator::{OperatorConfig, OperatorData, OperatorKind};
use super::{Canvas, Link};
use miette::Diagnostic;
use serde_json::{json, Map, Value};
use thiserror::Error;

/// Failure while decoding a canvas document.
#[derive(Debug, Error, Diagnostic)]
pub enum DocError {
    #[error("canvas document is malformed: {0}")]
    #[diagnostic(code(weftrun::doc::malformed))]
    Malformed(String),

    #[error("node document {index} is not a JSON object")]
    #[diagnostic(code(weftrun::doc::not_an_object))]
    NotAnObject { index: usize },

    #[error("node {id} has no usable '{field}' field")]
    #[diagnostic(
        code(weftrun::doc::missing_field),
        help("documents written by this engine always carry 'id', 'label', and 'type'")
    )]
    MissingField { id: String, field: &'static str },

    #[error("node {id}: malformed '{kind}' settings")]
    #[diagnostic(code(weftrun::doc::bad_settings))]
    BadSettings {
        id: String,
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Encode a canvas into its stored JSON form.
///
/// Node order and link order are preserved. Run status is omitted.
#[must_use]
pub fn encode_canvas(canvas: &Canvas) -> Value {
    json!({
        "nodes": canvas.nodes.iter().map(encode_node).collect::<Vec<_>>(),
        "links": canvas
            .links
            .iter()
            .map(|l| json!({ "from": l.from, "to": l.to }))
            .collect::<Vec<_>>(),
    })
}

/// Decode a stored canvas document back into the typed model.
///
/// Unknown node kinds are preserved verbatim; malformed required fields are
/// errors.
pub fn decode_canvas(doc: &Value) -> Result<Canvas, DocError> {
    let nodes = doc
        .get("nodes")
        .and_then(Value::as_array)
        .ok_or_else(|| DocError::Malformed("missing 'nodes' array".into()))?;
    let links = doc
        .get("links")
        .and_then(Value::as_array)
        .ok_or_else(|| DocError::Malformed("missing 'links' array".into()))?;

    let nodes = nodes
        .iter()
        .enumerate()
        .map(|(index, value)| decode_node(index, value))
        .collect::<Result<Vec<_>, _>>()?;

    let links = links
        .iter()
        .map(|value| {
            let from = str_field(value, "from")
                .ok_or_else(|| DocError::Malformed("link missing 'from'".into()))?;
            let to = str_field(value, "to")
                .ok_or_else(|| DocError::Malformed("link missing 'to'".into()))?;
            Ok(Link::new(from, to))
        })
        .collect::<Result<Vec<_>, DocError>>()?;

    Ok(Canvas::new(nodes, links))
}

/// Encode with deterministic ordering for content comparison.
///
/// Two canvases that differ only in node order, link order, or transient
/// run status produce equal normalized documents.
#[must_use]
pub fn normalized_doc(canvas: &Canvas) -> Value {
    let mut doc = encode_canvas(canvas);
    if let Some(nodes) = doc.get_mut("nodes").and_then(Value::as_array_mut) {
        nodes.sort_by(|a, b| {
            let a = a.get("id").and_then(Value::as_str).unwrap_or_default();
            let b = b.get("id").and_then(Value::as_str).unwrap_or_default();
            a.cmp(b)
        });
    }
    if let Some(links) = doc.get_mut("links").and_then(Value::as_array_mut) {
        links.sort_by_key(|l| {
            let from = l.get("from").and_then(Value::as_str).unwrap_or_default();
            let to = l.get("to").and_then(Value::as_str).unwrap_or_default();
            (from.to_string(), to.to_string())
        });
    }
    doc
}

fn encode_node(node: &Node) -> Value {
    let mut map = Map::new();
    map.insert("id".into(), json!(node.id));
    map.insert("label".into(), json!(node.label));

    match &node.payload {
        NodePayload::Block(block) => {
            map.insert("type".into(), json!(block.kind.wire_tag()));
            map.insert("content".into(), json!(block.content));
            if block.dirty {
                map.insert("dirty".into(), json!(true));
            }
            if block.looped {
                map.insert("looped".into(), json!(true));
            }
            if let Some(index) = block.index {
                map.insert("index".into(), json!(index));
            }
            if let Some(collection) = &block.collection {
                map.insert("collection".into(), json!(collection));
            }
            if let Some(group) = &block.group {
                map.insert("group".into(), json!(group));
            }
            if let BlockStorage::External(ptr) = &block.storage {
                map.insert("storage".into(), json!("external"));
                map.insert("resource_key".into(), json!(ptr.resource_key));
                map.insert("content_type".into(), json!(ptr.content_type.wire_tag()));
            }
        }
        NodePayload::Operator(op) => {
            // OperatorConfig's serde form already carries the "type" tag.
            if let Ok(Value::Object(settings)) = serde_json::to_value(&op.config) {
                map.extend(settings);
            }
            if let Some(group) = &op.group {
                map.insert("group".into(), json!(group));
            }
            // Re-assert identity after the settings splat.
            map.insert("id".into(), json!(node.id));
            map.insert("label".into(), json!(node.label));
        }
        NodePayload::Unrecognized { kind, data } => {
            if let Value::Object(original) = data {
                map.extend(original.clone());
            }
            map.insert("id".into(), json!(node.id));
            map.insert("label".into(), json!(node.label));
            map.insert("type".into(), json!(kind));
        }
    }

    Value::Object(map)
}

fn decode_node(index: usize, value: &Value) -> Result<Node, DocError> {
    if !value.is_object() {
        return Err(DocError::NotAnObject { index });
    }
    let id = str_field(value, "id").ok_or_else(|| DocError::MissingField {
        id: format!("#{index}"),
        field: "id",
    })?;
    let label = str_field(value, "label").ok_or_else(|| DocError::MissingField {
        id: id.clone(),
        field: "label",
    })?;
    let kind = str_field(value, "type").ok_or_else(|| DocError::MissingField {
        id: id.clone(),
        field: "type",
    })?;

    let payload = if let Some(block_kind) = BlockKind::from_wire(&kind) {
        NodePayload::Block(decode_block(block_kind, value))
    } else if OperatorKind::from_wire(&kind).is_some() {
        let config: OperatorConfig =
            serde_json::from_value(value.clone()).map_err(|source| DocError::BadSettings {
                id: id.clone(),
                kind: kind.clone(),
                source,
            })?;
        NodePayload::Operator(OperatorData {
            config,
            group: str_field(value, "group"),
        })
    } else {
        NodePayload::Unrecognized {
            kind,
            data: value.clone(),
        }
    };

    Ok(Node::new(id, label, payload))
}

fn decode_block(kind: BlockKind, value: &Value) -> BlockData {
    let storage = match str_field(value, "storage").as_deref() {
        Some("external") => {
            let resource_key = str_field(value, "resource_key").unwrap_or_default();
            let content_type = str_field(value, "content_type")
                .and_then(|t| BlockKind::from_wire(&t))
                .unwrap_or(kind);
            BlockStorage::External(ExternalContentPointer {
                resource_key: resource_key.into(),
                content_type,
            })
        }
        _ => BlockStorage::Inline,
    };

    BlockData {
        kind,
        content: str_field(value, "content").unwrap_or_default(),
        storage,
        dirty: bool_field(value, "dirty"),
        looped: bool_field(value, "looped"),
        index: value
            .get("index")
            .and_then(Value::as_u64)
            .map(|i| i as u32),
        collection: str_field(value, "collection"),
        group: str_field(value, "group"),
    }
}

fn str_field(value: &Value, field: &str) -> Option<String> {
    value.get(field).and_then(Value::as_str).map(str::to_string)
}

fn bool_field(value: &Value, field: &str) -> bool {
    value.get(field).and_then(Value::as_bool).unwrap_or(false)
}
