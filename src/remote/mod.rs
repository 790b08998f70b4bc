//! Boundary to the remote collaborators.
//!
//! Three narrow traits cover everything the engine asks of the outside
//! world: [`ExecutionBackend`] submits runs and opens their event streams,
//! [`StorageBackend`] serves chunked content and accepts flushes, and
//! [`WorkspaceBackend`] persists workspace lifecycle operations. Engine
//! components hold `Arc<dyn Trait>` handles, so tests swap in scripted
//! in-memory fakes and production wires up [`HttpRemote`] for all three.
//!
//! Transport failures are one error type across the boundary. Components
//! decide per call site whether a failure is fatal (a submit) or transient
//! (one poll tick).

mod config;
mod http;

pub use config::RemoteConfig;
pub use http::HttpRemote;

use crate::canvas::BlockKind;
use crate::serializer::ExecutionRequest;
use crate::types::{ResourceKey, TaskId, WorkspaceId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raw bytes of a run's event stream, chunked however the transport
/// delivers them. Line framing happens above this boundary.
pub type EventByteStream = BoxStream<'static, Result<Vec<u8>, TransportError>>;

/// Failure talking to a remote collaborator.
#[derive(Debug, Error, Diagnostic)]
pub enum TransportError {
    #[error("invalid base url '{url}': {reason}")]
    #[diagnostic(
        code(weftrun::remote::invalid_base_url),
        help("base urls must start with http:// or https:// and carry no trailing slash")
    )]
    InvalidBaseUrl { url: String, reason: String },

    #[error("request to {url} failed")]
    #[diagnostic(code(weftrun::remote::request_failed))]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("remote returned {status} for {url}: {body}")]
    #[diagnostic(
        code(weftrun::remote::status),
        help("the body is the remote's own description of what went wrong")
    )]
    Status {
        status: u16,
        url: String,
        body: String,
    },

    #[error("could not decode response from {url}")]
    #[diagnostic(code(weftrun::remote::decode))]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("event stream interrupted: {reason}")]
    #[diagnostic(code(weftrun::remote::stream_interrupted))]
    StreamInterrupted { reason: String },
}

/// Completion state of one stored chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkState {
    Done,
    Processing,
}

/// One entry of a storage manifest.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChunkEntry {
    /// Chunk name, unique within its resource. Fetch handle and dedup key.
    pub name: String,
    /// Position of this chunk in the overall content.
    pub index: u32,
    #[serde(default)]
    pub size: u64,
    pub state: ChunkState,
}

/// Listing of the chunks currently available for a resource key.
///
/// Grows while the remote is still producing; polling the manifest and
/// diffing against already-fetched names is how the reconstructor makes
/// progress.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub content_type: BlockKind,
    #[serde(default)]
    pub total_size: u64,
    pub chunks: Vec<ChunkEntry>,
}

impl Manifest {
    /// Chunks safe to fetch, in manifest order.
    pub fn done_chunks(&self) -> impl Iterator<Item = &ChunkEntry> {
        self.chunks.iter().filter(|c| c.state == ChunkState::Done)
    }
}

/// Submits execution requests and exposes their event streams.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Submit a serialized request; returns the task id to stream against.
    async fn submit(&self, request: &ExecutionRequest) -> Result<TaskId, TransportError>;

    /// Open the line-delimited event stream for a submitted task.
    async fn open_stream(&self, task_id: &TaskId) -> Result<EventByteStream, TransportError>;
}

/// Serves externally stored block content.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn fetch_manifest(&self, key: &ResourceKey) -> Result<Manifest, TransportError>;

    /// Fetch one chunk's body by name.
    async fn fetch_chunk(&self, key: &ResourceKey, name: &str) -> Result<String, TransportError>;

    /// Overwrite the stored content for a key with locally edited text.
    async fn flush_content(&self, key: &ResourceKey, content: &str)
        -> Result<(), TransportError>;
}

/// Persists workspace lifecycle operations.
#[async_trait]
pub trait WorkspaceBackend: Send + Sync {
    async fn create_workspace(&self, id: &WorkspaceId, title: &str) -> Result<(), TransportError>;

    async fn delete_workspace(&self, id: &WorkspaceId) -> Result<(), TransportError>;

    async fn rename_workspace(&self, id: &WorkspaceId, title: &str) -> Result<(), TransportError>;

    /// Append a canvas snapshot to the workspace's save history.
    async fn save_history(
        &self,
        id: &WorkspaceId,
        content: &str,
        captured_at: DateTime<Utc>,
    ) -> Result<(), TransportError>;
}
