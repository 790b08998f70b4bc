//! Operator kinds and their per-kind configuration.
//!
//! Operators are the executable nodes of a canvas. Each kind carries exactly
//! the settings that kind needs; optional settings are resolved against the
//! constants in [`defaults`] when a payload is built, so the remote engine
//! never sees an absent field and never applies defaulting of its own.
//!
//! The serde form of [`OperatorConfig`] is the document representation:
//! internally tagged by the kind's wire tag, optional settings omitted when
//! unset.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default settings applied when an operator leaves one unset.
///
/// These values are part of the dispatch contract: payload construction
/// resolves every optional setting to one of these before submission.
pub mod defaults {
    /// Model identifier for all language-model backed operators.
    pub const MODEL_ID: &str = "gpt-4o-mini";
    /// Characters per chunk for the `chunk` operator.
    pub const CHUNK_SIZE: u32 = 1000;
    /// Overlap between adjacent chunks, in characters.
    pub const CHUNK_OVERLAP: u32 = 0;
    /// Target format for the `convert` operator.
    pub const CONVERT_FORMAT: &str = "text";
    /// Result cap for the `websearch` operator.
    pub const SEARCH_MAX_RESULTS: u32 = 5;
    /// Neighbor count for the `vectorsearch` operator.
    pub const VECTOR_TOP_K: u32 = 5;
    /// Sampling temperature for the completion operator.
    pub const TEMPERATURE: f64 = 0.7;
    /// Variants produced by the `generator` operator.
    pub const GENERATOR_COUNT: u32 = 1;
    /// Recursion depth for the `deepresearch` operator.
    pub const RESEARCH_DEPTH: u32 = 2;
}

/// The closed set of operator kinds this build can execute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatorKind {
    Copy,
    Chunk,
    Convert,
    Edit,
    WebSearch,
    QaSearch,
    VectorSearch,
    /// Freeform completion. Wire tag `llmnew` for document and payload
    /// compatibility with canvases produced before the kind was renamed.
    #[serde(rename = "llmnew")]
    Completion,
    Branch,
    Generator,
    Load,
    DeepResearch,
}

impl OperatorKind {
    /// Tag used in documents and execution payloads.
    #[must_use]
    pub fn wire_tag(&self) -> &'static str {
        match self {
            OperatorKind::Copy => "copy",
            OperatorKind::Chunk => "chunk",
            OperatorKind::Convert => "convert",
            OperatorKind::Edit => "edit",
            OperatorKind::WebSearch => "websearch",
            OperatorKind::QaSearch => "qasearch",
            OperatorKind::VectorSearch => "vectorsearch",
            OperatorKind::Completion => "llmnew",
            OperatorKind::Branch => "branch",
            OperatorKind::Generator => "generator",
            OperatorKind::Load => "load",
            OperatorKind::DeepResearch => "deepresearch",
        }
    }

    /// Parse a wire tag. Returns `None` for tags outside the closed set.
    #[must_use]
    pub fn from_wire(tag: &str) -> Option<Self> {
        Some(match tag {
            "copy" => OperatorKind::Copy,
            "chunk" => OperatorKind::Chunk,
            "convert" => OperatorKind::Convert,
            "edit" => OperatorKind::Edit,
            "websearch" => OperatorKind::WebSearch,
            "qasearch" => OperatorKind::QaSearch,
            "vectorsearch" => OperatorKind::VectorSearch,
            "llmnew" => OperatorKind::Completion,
            "branch" => OperatorKind::Branch,
            "generator" => OperatorKind::Generator,
            "load" => OperatorKind::Load,
            "deepresearch" => OperatorKind::DeepResearch,
            _ => return None,
        })
    }
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_tag())
    }
}

/// Per-kind operator settings as the editor stores them.
///
/// Optional fields stay `None` until the user sets them; resolution to
/// concrete values happens only when an execution payload is built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OperatorConfig {
    /// Copy input content to the output block unchanged.
    Copy,
    /// Split input into fixed-size chunks.
    Chunk {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        chunk_size: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        overlap: Option<u32>,
    },
    /// Convert structured input into another format.
    Convert {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        format: Option<String>,
    },
    /// Rewrite input under a prompt.
    Edit {
        prompt: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },
    WebSearch {
        query: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_results: Option<u32>,
    },
    /// Question answering over the connected inputs.
    QaSearch {
        query: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },
    VectorSearch {
        query: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        top_k: Option<u32>,
    },
    /// Freeform completion from a prompt, inputs interpolated by label.
    #[serde(rename = "llmnew")]
    Completion {
        prompt: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        temperature: Option<f64>,
    },
    /// Route inputs to one of several outputs by condition.
    Branch { condition: String },
    /// Produce `count` alternative outputs from one prompt.
    Generator {
        prompt: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        count: Option<u32>,
    },
    /// Pull content from an external source into the canvas.
    Load { source: String },
    DeepResearch {
        query: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        depth: Option<u32>,
    },
}

impl OperatorConfig {
    /// Kind discriminant of this configuration.
    #[must_use]
    pub fn kind(&self) -> OperatorKind {
        match self {
            OperatorConfig::Copy => OperatorKind::Copy,
            OperatorConfig::Chunk { .. } => OperatorKind::Chunk,
            OperatorConfig::Convert { .. } => OperatorKind::Convert,
            OperatorConfig::Edit { .. } => OperatorKind::Edit,
            OperatorConfig::WebSearch { .. } => OperatorKind::WebSearch,
            OperatorConfig::QaSearch { .. } => OperatorKind::QaSearch,
            OperatorConfig::VectorSearch { .. } => OperatorKind::VectorSearch,
            OperatorConfig::Completion { .. } => OperatorKind::Completion,
            OperatorConfig::Branch { .. } => OperatorKind::Branch,
            OperatorConfig::Generator { .. } => OperatorKind::Generator,
            OperatorConfig::Load { .. } => OperatorKind::Load,
            OperatorConfig::DeepResearch { .. } => OperatorKind::DeepResearch,
        }
    }
}

/// Payload of an operator node.
#[derive(Clone, Debug, PartialEq)]
pub struct OperatorData {
    pub config: OperatorConfig,
    pub group: Option<String>,
}

impl OperatorData {
    #[must_use]
    pub fn kind(&self) -> OperatorKind {
        self.config.kind()
    }
}
