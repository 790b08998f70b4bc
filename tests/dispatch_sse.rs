//! Full dispatch runs over a live HTTP engine fixture.
//!
//! These tests stand up a real axum server speaking the engine protocol
//! and drive [`Dispatcher`] through [`HttpRemote`], so the SSE framing,
//! line decoding, and storage reassembly paths are exercised end to end
//! on actual sockets.

mod common;

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_stream::stream;
use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::sse::{Event as SseEvent, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use common::edit_pipeline;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use weftrun::canvas::{BlockStorage, NodeStore};
use weftrun::dispatcher::{Dispatcher, RunOutcome};
use weftrun::events::{EngineEvent, Notifier};
use weftrun::remote::{HttpRemote, RemoteConfig};
use weftrun::serializer::Scope;

/// Scripted engine behind real routes. `lines` are the JSON event bodies
/// the stream endpoint emits, in order; storage routes serve the fixed
/// manifest and chunk map.
struct EngineState {
    lines: Vec<String>,
    manifest: Option<Value>,
    chunks: HashMap<String, String>,
    submissions: Mutex<Vec<Value>>,
}

impl EngineState {
    fn replaying(lines: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            lines,
            manifest: None,
            chunks: HashMap::new(),
            submissions: Mutex::new(Vec::new()),
        })
    }
}

async fn submit(State(state): State<Arc<EngineState>>, Json(body): Json<Value>) -> Json<Value> {
    state.submissions.lock().unwrap().push(body);
    Json(json!({ "task_id": "task-e2e" }))
}

async fn stream_events(
    State(state): State<Arc<EngineState>>,
) -> Sse<impl futures_util::Stream<Item = Result<SseEvent, Infallible>>> {
    let lines = state.lines.clone();
    let sse_stream = stream! {
        for line in lines {
            yield Ok(SseEvent::default().data(line));
        }
    };
    Sse::new(sse_stream)
}

async fn manifest(State(state): State<Arc<EngineState>>) -> Response {
    match &state.manifest {
        Some(manifest) => Json(manifest.clone()).into_response(),
        None => (StatusCode::NOT_FOUND, "no manifest for key").into_response(),
    }
}

async fn chunk(
    State(state): State<Arc<EngineState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let key = params.get("key").cloned().unwrap_or_default();
    match state.chunks.get(&key) {
        Some(body) => body.clone().into_response(),
        None => (StatusCode::NOT_FOUND, "no such chunk").into_response(),
    }
}

async fn serve_engine(state: Arc<EngineState>) -> (SocketAddr, JoinHandle<()>) {
    let router = Router::new()
        .route("/execute", post(submit))
        .route("/execute/:task/stream", get(stream_events))
        .route("/storage/manifest", get(manifest))
        .route("/storage/chunk", get(chunk))
        .with_state(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, router.into_make_service()).await {
            tracing::error!("engine fixture error: {err:?}");
        }
    });
    (addr, server)
}

fn dispatcher_against(
    addr: SocketAddr,
) -> (Dispatcher, NodeStore, flume::Receiver<EngineEvent>) {
    let remote = HttpRemote::new(RemoteConfig::new(format!("http://{addr}"))).unwrap();
    let store = NodeStore::new(edit_pipeline());
    let (notifier, events) = Notifier::channel();
    let dispatcher = Dispatcher::new(
        Arc::new(remote.clone()),
        Arc::new(remote),
        store.clone(),
        notifier,
    )
    .with_reconstructor_poll_interval(Duration::from_millis(5));
    (dispatcher, store, events)
}

#[tokio::test(flavor = "multi_thread")]
async fn full_run_over_http_applies_streamed_events() {
    let state = EngineState::replaying(vec![
        json!({"event_type": "TASK_STARTED"}).to_string(),
        json!({"event_type": "EDGE_STARTED", "edge_id": "tidy"}).to_string(),
        json!({
            "event_type": "BLOCK_UPDATED",
            "node_id": "result",
            "content": "woven text",
        })
        .to_string(),
        json!({"event_type": "TASK_COMPLETED"}).to_string(),
    ]);
    let (addr, server) = serve_engine(Arc::clone(&state)).await;
    let (dispatcher, store, events) = dispatcher_against(addr);

    let report = dispatcher.dispatch(Scope::AllNodes).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.events_handled, 4);
    assert_eq!(report.protocol_errors, 0);

    let result = store.node(&"result".into()).unwrap();
    assert_eq!(result.as_block().unwrap().content, "woven text");
    assert!(result.status.is_idle());

    let submissions = state.submissions.lock().unwrap();
    assert_eq!(submissions.len(), 1);
    assert!(submissions[0]["blocks"].get("draft").is_some());
    assert!(submissions[0]["edges"].get("tidy").is_some());
    drop(submissions);

    let events: Vec<EngineEvent> = events.try_iter().collect();
    assert!(matches!(events.first(), Some(EngineEvent::RunStarted { .. })));
    assert!(matches!(
        events.last(),
        Some(EngineEvent::RunFinished { failed: false, .. })
    ));

    server.abort();
}

#[tokio::test(flavor = "multi_thread")]
async fn streamed_output_reassembles_over_http() {
    let mut state = EngineState::replaying(vec![
        json!({"event_type": "TASK_STARTED"}).to_string(),
        json!({
            "event_type": "STREAM_STARTED",
            "node_id": "result",
            "resource_key": "rk-e2e",
            "content_type": "text",
        })
        .to_string(),
        json!({
            "event_type": "STREAM_ENDED",
            "node_id": "result",
            "resource_key": "rk-e2e",
        })
        .to_string(),
        json!({"event_type": "TASK_COMPLETED"}).to_string(),
    ]);
    {
        let engine = Arc::get_mut(&mut state).unwrap();
        engine.manifest = Some(json!({
            "content_type": "text",
            "chunks": [{ "name": "c0", "index": 0, "state": "done" }]
        }));
        engine
            .chunks
            .insert("rk-e2e/c0".into(), "woven from chunks".into());
    }
    let (addr, server) = serve_engine(Arc::clone(&state)).await;
    let (dispatcher, store, events) = dispatcher_against(addr);

    let report = dispatcher.dispatch(Scope::AllNodes).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Completed);

    let result = store.node(&"result".into()).unwrap();
    let block = result.as_block().unwrap();
    assert_eq!(block.content, "woven from chunks");
    assert_eq!(block.storage, BlockStorage::Inline);
    assert!(!result.status.loading);

    let events: Vec<EngineEvent> = events.try_iter().collect();
    assert!(
        events
            .iter()
            .any(|e| matches!(e, EngineEvent::ReconstructionSettled { parse_errors: 0, .. })),
        "reassembly should settle through the events channel"
    );

    server.abort();
}
