//! Node model: content blocks, operators, and their run status.
//!
//! A node is either a **block** (holds content) or an **operator** (declares
//! a transformation over connected blocks). The payload split is a closed
//! union: every recognized kind has a variant with exactly the fields that
//! kind guarantees, so downstream code never probes loosely typed bags.
//!
//! Documents written by newer editors may carry kinds this build does not
//! know. Decoding preserves them as [`NodePayload::Unrecognized`] so the
//! document survives a round trip, but serializing such a node for
//! execution is a hard error rather than a silent skip.
//!
//! # Examples
//!
//! ```rust
//! use weftrun::canvas::{Node, BlockKind, OperatorConfig};
//!
//! let source = Node::text_block("b1", "Notes", "raw text");
//! assert!(source.is_block());
//!
//! let op = Node::operator("e1", "Summarize", OperatorConfig::Edit {
//!     prompt: "summarize {{Notes}}".into(),
//!     model: None,
//! });
//! assert!(op.is_operator());
//! ```

use super::operator::{OperatorConfig, OperatorData};
use crate::types::{NodeId, ResourceKey};
use serde::{Deserialize, Serialize};

/// Content shape of a block: plain text or structured records.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    #[default]
    Text,
    Structured,
}

impl BlockKind {
    /// Wire tag used in payloads, manifests, and documents.
    #[must_use]
    pub fn wire_tag(&self) -> &'static str {
        match self {
            BlockKind::Text => "text",
            BlockKind::Structured => "structured",
        }
    }

    /// Parse a wire tag back into a kind.
    #[must_use]
    pub fn from_wire(tag: &str) -> Option<Self> {
        match tag {
            "text" => Some(BlockKind::Text),
            "structured" => Some(BlockKind::Structured),
            _ => None,
        }
    }
}

/// Pointer to content held by the remote storage collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalContentPointer {
    pub resource_key: ResourceKey,
    pub content_type: BlockKind,
}

/// Where a block's content currently lives.
///
/// Inline content and an external pointer are mutually exclusive. While a
/// pointer is set the inline `content` field reads empty; committing a
/// reconstruction writes the final text and drops the pointer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum BlockStorage {
    #[default]
    Inline,
    External(ExternalContentPointer),
}

impl BlockStorage {
    #[must_use]
    pub fn pointer(&self) -> Option<&ExternalContentPointer> {
        match self {
            BlockStorage::Inline => None,
            BlockStorage::External(ptr) => Some(ptr),
        }
    }
}

/// Payload of a content block.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BlockData {
    pub kind: BlockKind,
    /// Inline content. Empty while `storage` points at an external resource.
    pub content: String,
    pub storage: BlockStorage,
    /// Set when inline edits have not been flushed to external storage yet.
    pub dirty: bool,
    /// Marks the block as an element of a fan-out collection.
    pub looped: bool,
    pub index: Option<u32>,
    pub collection: Option<String>,
    pub group: Option<String>,
}

/// Transient per-node run state. Never persisted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunStatus {
    /// Content for this node is being produced or fetched right now.
    pub loading: bool,
    /// The node is a declared target of an in-flight run.
    pub waiting_for_flow: bool,
    /// Last dispatch-related failure reported for this node.
    pub error: Option<String>,
}

impl RunStatus {
    #[must_use]
    pub fn is_idle(&self) -> bool {
        !self.loading && !self.waiting_for_flow
    }
}

/// What a node is: a block, an operator, or a kind this build cannot name.
#[derive(Clone, Debug, PartialEq)]
pub enum NodePayload {
    Block(BlockData),
    Operator(OperatorData),
    /// Kind tag from a newer document, kept verbatim for round-tripping.
    Unrecognized {
        kind: String,
        data: serde_json::Value,
    },
}

/// One canvas node.
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub id: NodeId,
    /// Human-readable name, unique per canvas. Prompt interpolation binds
    /// `{{label}}` references against it.
    pub label: String,
    pub payload: NodePayload,
    pub status: RunStatus,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, label: impl Into<String>, payload: NodePayload) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            payload,
            status: RunStatus::default(),
        }
    }

    /// Build a text block with inline content.
    pub fn text_block(
        id: impl Into<NodeId>,
        label: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::new(
            id,
            label,
            NodePayload::Block(BlockData {
                kind: BlockKind::Text,
                content: content.into(),
                ..BlockData::default()
            }),
        )
    }

    /// Build a structured block whose content is a JSON record array.
    pub fn structured_block(
        id: impl Into<NodeId>,
        label: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::new(
            id,
            label,
            NodePayload::Block(BlockData {
                kind: BlockKind::Structured,
                content: content.into(),
                ..BlockData::default()
            }),
        )
    }

    /// Build an operator node from its configuration.
    pub fn operator(
        id: impl Into<NodeId>,
        label: impl Into<String>,
        config: OperatorConfig,
    ) -> Self {
        Self::new(
            id,
            label,
            NodePayload::Operator(OperatorData {
                config,
                group: None,
            }),
        )
    }

    #[must_use]
    pub fn is_block(&self) -> bool {
        matches!(self.payload, NodePayload::Block(_))
    }

    #[must_use]
    pub fn is_operator(&self) -> bool {
        matches!(self.payload, NodePayload::Operator(_))
    }

    #[must_use]
    pub fn as_block(&self) -> Option<&BlockData> {
        match &self.payload {
            NodePayload::Block(b) => Some(b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_block_mut(&mut self) -> Option<&mut BlockData> {
        match &mut self.payload {
            NodePayload::Block(b) => Some(b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_operator(&self) -> Option<&OperatorData> {
        match &self.payload {
            NodePayload::Operator(o) => Some(o),
            _ => None,
        }
    }

    /// Group label this node belongs to, if any.
    #[must_use]
    pub fn group(&self) -> Option<&str> {
        match &self.payload {
            NodePayload::Block(b) => b.group.as_deref(),
            NodePayload::Operator(o) => o.group.as_deref(),
            NodePayload::Unrecognized { .. } => None,
        }
    }

    /// Attach a group label, consuming and returning the node.
    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        let group = group.into();
        match &mut self.payload {
            NodePayload::Block(b) => b.group = Some(group),
            NodePayload::Operator(o) => o.group = Some(group),
            NodePayload::Unrecognized { .. } => {}
        }
        self
    }
}
