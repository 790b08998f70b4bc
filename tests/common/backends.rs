#![allow(dead_code)]

//! Scripted in-memory backends for driving the engine without a network.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use weftrun::canvas::BlockKind;
use weftrun::remote::{
    ChunkEntry, ChunkState, EventByteStream, ExecutionBackend, Manifest, StorageBackend,
    TransportError, WorkspaceBackend,
};
use weftrun::serializer::ExecutionRequest;
use weftrun::types::{ResourceKey, TaskId, WorkspaceId};

/// Format one raw stream line from an event body.
pub fn event_line(body: serde_json::Value) -> String {
    format!("data: {body}")
}

/// Manifest over the given chunks, everything else defaulted.
pub fn manifest_of(kind: BlockKind, chunks: Vec<ChunkEntry>) -> Manifest {
    Manifest {
        content_type: kind,
        total_size: 0,
        chunks,
    }
}

pub fn done_chunk(name: &str, index: u32) -> ChunkEntry {
    ChunkEntry {
        name: name.to_string(),
        index,
        size: 0,
        state: ChunkState::Done,
    }
}

pub fn processing_chunk(name: &str, index: u32) -> ChunkEntry {
    ChunkEntry {
        name: name.to_string(),
        index,
        size: 0,
        state: ChunkState::Processing,
    }
}

fn injected_status(url: &str) -> TransportError {
    TransportError::Status {
        status: 500,
        url: url.to_string(),
        body: "injected failure".to_string(),
    }
}

/// Execution backend that records submissions and replays scripted stream
/// lines, one framed line per byte chunk.
pub struct ScriptedExecution {
    lines: Vec<String>,
    submitted: Mutex<Vec<ExecutionRequest>>,
    fail_submit: bool,
    fail_stream: bool,
    /// Yield this many lines, then break the stream mid-run.
    interrupt_after: Option<usize>,
}

impl ScriptedExecution {
    fn base(lines: Vec<String>) -> Self {
        Self {
            lines,
            submitted: Mutex::new(Vec::new()),
            fail_submit: false,
            fail_stream: false,
            interrupt_after: None,
        }
    }

    pub fn replaying(lines: Vec<String>) -> Arc<Self> {
        Arc::new(Self::base(lines))
    }

    pub fn failing_submit() -> Arc<Self> {
        Arc::new(Self {
            fail_submit: true,
            ..Self::base(Vec::new())
        })
    }

    pub fn failing_stream_open() -> Arc<Self> {
        Arc::new(Self {
            fail_stream: true,
            ..Self::base(Vec::new())
        })
    }

    pub fn interrupted_after(lines: Vec<String>, count: usize) -> Arc<Self> {
        Arc::new(Self {
            interrupt_after: Some(count),
            ..Self::base(lines)
        })
    }

    /// Requests seen by `submit`, in order.
    pub fn submitted(&self) -> Vec<ExecutionRequest> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExecutionBackend for ScriptedExecution {
    async fn submit(&self, request: &ExecutionRequest) -> Result<TaskId, TransportError> {
        self.submitted.lock().unwrap().push(request.clone());
        if self.fail_submit {
            return Err(injected_status("/execute"));
        }
        Ok(TaskId::from("task-1"))
    }

    async fn open_stream(&self, _task_id: &TaskId) -> Result<EventByteStream, TransportError> {
        if self.fail_stream {
            return Err(TransportError::StreamInterrupted {
                reason: "refused to open".to_string(),
            });
        }
        let cut = self.interrupt_after.unwrap_or(self.lines.len());
        let mut items: Vec<Result<Vec<u8>, TransportError>> = self
            .lines
            .iter()
            .take(cut)
            .map(|line| Ok(format!("{line}\n").into_bytes()))
            .collect();
        if self.interrupt_after.is_some() {
            items.push(Err(TransportError::StreamInterrupted {
                reason: "connection reset".to_string(),
            }));
        }
        Ok(stream::iter(items).boxed())
    }
}

/// Storage backend with scripted manifest sequences and a chunk map.
///
/// Each `fetch_manifest` pops the next scripted manifest for the key; the
/// last one repeats, so a poller that keeps polling sees a stable final
/// listing.
pub struct ScriptedStorage {
    manifests: Mutex<HashMap<String, VecDeque<Manifest>>>,
    chunks: Mutex<HashMap<(String, String), String>>,
    flushed: Mutex<Vec<(String, String)>>,
    fail_flush: bool,
}

impl ScriptedStorage {
    pub fn empty() -> Arc<Self> {
        Arc::new(Self {
            manifests: Mutex::new(HashMap::new()),
            chunks: Mutex::new(HashMap::new()),
            flushed: Mutex::new(Vec::new()),
            fail_flush: false,
        })
    }

    pub fn failing_flush() -> Arc<Self> {
        Arc::new(Self {
            manifests: Mutex::new(HashMap::new()),
            chunks: Mutex::new(HashMap::new()),
            flushed: Mutex::new(Vec::new()),
            fail_flush: true,
        })
    }

    /// Append one manifest to the key's scripted sequence.
    pub fn script_manifest(&self, key: &str, manifest: Manifest) {
        self.manifests
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push_back(manifest);
    }

    pub fn put_chunk(&self, key: &str, name: &str, body: &str) {
        self.chunks
            .lock()
            .unwrap()
            .insert((key.to_string(), name.to_string()), body.to_string());
    }

    /// `(key, content)` pairs seen by `flush_content`, in order.
    pub fn flushed(&self) -> Vec<(String, String)> {
        self.flushed.lock().unwrap().clone()
    }
}

#[async_trait]
impl StorageBackend for ScriptedStorage {
    async fn fetch_manifest(&self, key: &ResourceKey) -> Result<Manifest, TransportError> {
        let mut manifests = self.manifests.lock().unwrap();
        let queue = manifests
            .get_mut(key.as_str())
            .filter(|q| !q.is_empty())
            .ok_or_else(|| TransportError::Status {
                status: 404,
                url: format!("/storage/manifest?key={key}"),
                body: "no manifest scripted".to_string(),
            })?;
        if queue.len() > 1 {
            Ok(queue.pop_front().unwrap())
        } else {
            Ok(queue.front().unwrap().clone())
        }
    }

    async fn fetch_chunk(&self, key: &ResourceKey, name: &str) -> Result<String, TransportError> {
        self.chunks
            .lock()
            .unwrap()
            .get(&(key.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| TransportError::Status {
                status: 404,
                url: format!("/storage/chunk?key={key}/{name}"),
                body: "no chunk scripted".to_string(),
            })
    }

    async fn flush_content(
        &self,
        key: &ResourceKey,
        content: &str,
    ) -> Result<(), TransportError> {
        if self.fail_flush {
            return Err(injected_status("/storage/flush"));
        }
        self.flushed
            .lock()
            .unwrap()
            .push((key.to_string(), content.to_string()));
        Ok(())
    }
}

/// Workspace backend that logs every call as `"<kind> <id>"` and can be
/// told to reject whole method families.
pub struct RecordingWorkspaceBackend {
    calls: Mutex<Vec<String>>,
    failing: HashSet<&'static str>,
}

impl RecordingWorkspaceBackend {
    pub fn accepting() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            failing: HashSet::new(),
        })
    }

    /// Reject calls whose kind label (`"create"`, `"delete"`, `"rename"`,
    /// `"save"`) appears in `kinds`.
    pub fn failing(kinds: &[&'static str]) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            failing: kinds.iter().copied().collect(),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, kind: &'static str, detail: String) -> Result<(), TransportError> {
        self.calls.lock().unwrap().push(detail);
        if self.failing.contains(kind) {
            return Err(injected_status("/workspaces"));
        }
        Ok(())
    }
}

#[async_trait]
impl WorkspaceBackend for RecordingWorkspaceBackend {
    async fn create_workspace(&self, id: &WorkspaceId, title: &str) -> Result<(), TransportError> {
        self.record("create", format!("create {id} {title}"))
    }

    async fn delete_workspace(&self, id: &WorkspaceId) -> Result<(), TransportError> {
        self.record("delete", format!("delete {id}"))
    }

    async fn rename_workspace(&self, id: &WorkspaceId, title: &str) -> Result<(), TransportError> {
        self.record("rename", format!("rename {id} {title}"))
    }

    async fn save_history(
        &self,
        id: &WorkspaceId,
        content: &str,
        _captured_at: DateTime<Utc>,
    ) -> Result<(), TransportError> {
        self.record("save", format!("save {id} bytes={}", content.len()))
    }
}
