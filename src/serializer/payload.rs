//! Wire shapes of an execution request.
//!
//! A request is two ordered maps: block payloads and operator payloads,
//! both keyed by node id. `BTreeMap` keeps key order stable and struct
//! fields serialize in declaration order, so the same canvas always
//! produces byte-identical request text. Optional operator settings are
//! resolved to their documented defaults here; the remote engine performs
//! no defaulting of its own, so an absent field would change execution.

use crate::canvas::{defaults, BlockData, BlockKind, Node, OperatorConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The payload sent to `POST /execute`. Immutable once built.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub blocks: BTreeMap<String, BlockPayload>,
    pub edges: BTreeMap<String, OperatorPayload>,
}

impl ExecutionRequest {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty() && self.edges.is_empty()
    }

    /// Node ids the run will write into: every output of every operator.
    pub fn target_ids(&self) -> impl Iterator<Item = &String> {
        self.edges.values().flat_map(|op| op.outputs.keys())
    }
}

/// One block as the remote engine sees it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockPayload {
    pub label: String,
    #[serde(rename = "type")]
    pub kind: BlockKind,
    pub content: String,
    pub looped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
}

impl BlockPayload {
    /// Build from a block node. External content is not inlined; the flush
    /// precondition guarantees the remote store already holds it.
    #[must_use]
    pub fn from_node(node: &Node, block: &BlockData) -> Self {
        Self {
            label: node.label.clone(),
            kind: block.kind,
            content: block.content.clone(),
            looped: block.looped,
            index: block.index,
            collection: block.collection.clone(),
        }
    }
}

/// One operator as the remote engine sees it: resolved settings plus its
/// input and output id→label maps.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperatorPayload {
    pub inputs: BTreeMap<String, String>,
    pub outputs: BTreeMap<String, String>,
    #[serde(flatten)]
    pub op: OperatorWire,
}

/// Fully resolved operator settings, tagged by kind.
///
/// Every field is concrete: building a wire value substitutes the
/// [`defaults`] constants for anything the editor left unset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OperatorWire {
    Copy,
    Chunk {
        chunk_size: u32,
        overlap: u32,
    },
    Convert {
        format: String,
    },
    Edit {
        prompt: String,
        model: String,
    },
    WebSearch {
        query: String,
        max_results: u32,
    },
    QaSearch {
        query: String,
        model: String,
    },
    VectorSearch {
        query: String,
        top_k: u32,
    },
    #[serde(rename = "llmnew")]
    Completion {
        prompt: String,
        model: String,
        temperature: f64,
    },
    Branch {
        condition: String,
    },
    Generator {
        prompt: String,
        model: String,
        count: u32,
    },
    Load {
        source: String,
    },
    DeepResearch {
        query: String,
        model: String,
        depth: u32,
    },
}

impl OperatorWire {
    /// Resolve editor configuration into concrete wire settings.
    #[must_use]
    pub fn from_config(config: &OperatorConfig) -> Self {
        let model = |m: &Option<String>| {
            m.clone()
                .unwrap_or_else(|| defaults::MODEL_ID.to_string())
        };
        match config {
            OperatorConfig::Copy => OperatorWire::Copy,
            OperatorConfig::Chunk {
                chunk_size,
                overlap,
            } => OperatorWire::Chunk {
                chunk_size: chunk_size.unwrap_or(defaults::CHUNK_SIZE),
                overlap: overlap.unwrap_or(defaults::CHUNK_OVERLAP),
            },
            OperatorConfig::Convert { format } => OperatorWire::Convert {
                format: format
                    .clone()
                    .unwrap_or_else(|| defaults::CONVERT_FORMAT.to_string()),
            },
            OperatorConfig::Edit {
                prompt,
                model: configured,
            } => OperatorWire::Edit {
                prompt: prompt.clone(),
                model: model(configured),
            },
            OperatorConfig::WebSearch { query, max_results } => OperatorWire::WebSearch {
                query: query.clone(),
                max_results: max_results.unwrap_or(defaults::SEARCH_MAX_RESULTS),
            },
            OperatorConfig::QaSearch {
                query,
                model: configured,
            } => OperatorWire::QaSearch {
                query: query.clone(),
                model: model(configured),
            },
            OperatorConfig::VectorSearch { query, top_k } => OperatorWire::VectorSearch {
                query: query.clone(),
                top_k: top_k.unwrap_or(defaults::VECTOR_TOP_K),
            },
            OperatorConfig::Completion {
                prompt,
                model: configured,
                temperature,
            } => OperatorWire::Completion {
                prompt: prompt.clone(),
                model: model(configured),
                temperature: temperature.unwrap_or(defaults::TEMPERATURE),
            },
            OperatorConfig::Branch { condition } => OperatorWire::Branch {
                condition: condition.clone(),
            },
            OperatorConfig::Generator {
                prompt,
                model: configured,
                count,
            } => OperatorWire::Generator {
                prompt: prompt.clone(),
                model: model(configured),
                count: count.unwrap_or(defaults::GENERATOR_COUNT),
            },
            OperatorConfig::Load { source } => OperatorWire::Load {
                source: source.clone(),
            },
            OperatorConfig::DeepResearch {
                query,
                model: configured,
                depth,
            } => OperatorWire::DeepResearch {
                query: query.clone(),
                model: model(configured),
                depth: depth.unwrap_or(defaults::RESEARCH_DEPTH),
            },
        }
    }
}
