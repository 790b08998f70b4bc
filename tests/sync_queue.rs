//! Persistence queue and workspace service, end to end.

mod common;

use common::*;
use std::sync::Arc;
use std::time::Duration;
use weftrun::canvas::{Canvas, Node, NodeStore};
use weftrun::events::{EngineEvent, Notifier, OperationOutcome};
use weftrun::sync::{DirtyScanner, Operation, OperationKind, SyncQueue, Workspaces};
use weftrun::types::WorkspaceId;

fn service(
    backend: Arc<RecordingWorkspaceBackend>,
) -> (Workspaces, Arc<SyncQueue>, NodeStore) {
    let queue = Arc::new(SyncQueue::new(backend, Notifier::disabled()));
    let store = NodeStore::new(Canvas::default());
    let workspaces = Workspaces::new(Arc::clone(&queue), store.clone(), Notifier::disabled());
    (workspaces, queue, store)
}

#[tokio::test]
async fn deletes_run_before_queued_saves() {
    let backend = RecordingWorkspaceBackend::accepting();
    let queue = SyncQueue::new(backend.clone(), Notifier::disabled());

    let _save = queue.enqueue(Operation::save(WorkspaceId::from("w1"), "{}"));
    let _delete = queue.enqueue(Operation::delete(WorkspaceId::from("w2")));
    queue.start();
    queue.drain().await;

    assert_eq!(
        backend.calls(),
        vec!["delete w2".to_string(), "save w1 bytes=2".to_string()]
    );
    queue.stop().await;
}

#[tokio::test]
async fn delete_of_an_unpersisted_create_never_calls_the_remote() {
    let backend = RecordingWorkspaceBackend::accepting();
    let queue = SyncQueue::new(backend.clone(), Notifier::disabled());

    let create = queue.enqueue(Operation::create(WorkspaceId::from("w1"), "Scratch"));
    let save = queue.enqueue(Operation::save(WorkspaceId::from("w1"), "{}"));
    let delete = queue.enqueue(Operation::delete(WorkspaceId::from("w1")));
    queue.start();
    queue.drain().await;

    assert!(backend.calls().is_empty(), "entity never existed remotely");
    assert!(matches!(create.await, Ok(OperationOutcome::Superseded)));
    assert!(matches!(save.await, Ok(OperationOutcome::Superseded)));
    assert!(matches!(delete.await, Ok(OperationOutcome::Completed)));
    queue.stop().await;
}

#[tokio::test]
async fn failed_rename_rolls_the_title_back_and_the_queue_continues() {
    let backend = RecordingWorkspaceBackend::failing(&["rename"]);
    let (workspaces, queue, store) = service(backend.clone());
    queue.start();

    let (id, create) = workspaces.create("Notebook");
    workspaces.select(&id).unwrap();
    let rename = workspaces.rename(&id, "Renamed").unwrap();
    assert_eq!(
        workspaces.entry(&id).map(|w| w.title),
        Some("Renamed".into()),
        "local update applies before the remote call"
    );
    store.insert_node(Node::text_block("b1", "B", "text"));
    let save = workspaces.save().unwrap();
    queue.drain().await;

    assert!(matches!(create.await, Ok(OperationOutcome::Completed)));
    assert!(matches!(rename.await, Ok(OperationOutcome::Failed { .. })));
    assert!(matches!(save.await, Ok(OperationOutcome::Completed)));

    assert_eq!(
        workspaces.entry(&id).map(|w| w.title),
        Some("Notebook".into()),
        "rollback restored the prior title"
    );
    let calls = backend.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0], format!("create {id} Notebook"));
    assert_eq!(calls[1], format!("rename {id} Renamed"));
    assert!(calls[2].starts_with(&format!("save {id}")));
    queue.stop().await;
}

#[tokio::test]
async fn failed_delete_restores_the_entry_selection_and_canvas() {
    let backend = RecordingWorkspaceBackend::failing(&["delete"]);
    let (workspaces, queue, store) = service(backend);
    queue.start();

    // Let the create settle first, so the later delete is not treated as
    // cancelling an unpersisted workspace.
    let (id, create) = workspaces.create("Notebook");
    assert!(matches!(create.await, Ok(OperationOutcome::Completed)));
    workspaces.select(&id).unwrap();
    store.insert_node(Node::text_block("b1", "B", "keep me"));

    let delete = workspaces.delete(&id).unwrap();
    assert!(workspaces.selected().is_none());
    assert!(store.snapshot().is_empty());

    queue.drain().await;

    assert!(matches!(delete.await, Ok(OperationOutcome::Failed { .. })));
    assert_eq!(workspaces.selected(), Some(id.clone()));
    assert!(workspaces.entry(&id).is_some());
    let canvas = store.snapshot();
    assert_eq!(canvas.nodes.len(), 1);
    assert_eq!(canvas.nodes[0].as_block().unwrap().content, "keep me");
    queue.stop().await;
}

#[tokio::test]
async fn save_now_runs_ahead_of_an_older_queued_save() {
    let backend = RecordingWorkspaceBackend::accepting();
    let (workspaces, queue, store) = service(backend.clone());

    let (id, _create) = workspaces.create("Notebook");
    workspaces.select(&id).unwrap();

    store.insert_node(Node::text_block("b1", "B1", "one"));
    let ordinary = workspaces.save().unwrap();
    store.insert_node(Node::text_block("b2", "B2", "two"));
    let forced = workspaces.save_now().unwrap();

    queue.start();
    queue.drain().await;

    assert!(matches!(forced.await, Ok(OperationOutcome::Completed)));
    assert!(matches!(ordinary.await, Ok(OperationOutcome::Completed)));

    let saves: Vec<String> = backend
        .calls()
        .into_iter()
        .filter(|call| call.starts_with("save"))
        .collect();
    assert_eq!(saves.len(), 2);
    let bytes = |call: &str| -> usize {
        call.rsplit("bytes=").next().unwrap().parse().unwrap()
    };
    assert!(
        bytes(&saves[0]) > bytes(&saves[1]),
        "the forced save carries the larger, newer document and runs first"
    );
    queue.stop().await;
}

#[tokio::test]
async fn settlements_reach_the_event_channel() {
    let backend = RecordingWorkspaceBackend::accepting();
    let (notifier, events) = Notifier::channel();
    let queue = SyncQueue::new(backend, notifier);
    queue.start();

    queue
        .enqueue(Operation::create(WorkspaceId::from("w1"), "A"))
        .await
        .unwrap();
    queue.drain().await;

    let settled: Vec<EngineEvent> = events.try_iter().collect();
    assert!(settled.iter().any(|e| matches!(
        e,
        EngineEvent::OperationSettled {
            kind: OperationKind::Create,
            outcome: OperationOutcome::Completed,
            ..
        }
    )));
    queue.stop().await;
}

#[tokio::test]
async fn scanner_raises_the_dirty_flag_on_its_interval() {
    let backend = RecordingWorkspaceBackend::accepting();
    let queue = Arc::new(SyncQueue::new(backend, Notifier::disabled()));
    let store = NodeStore::new(Canvas::default());
    let (notifier, events) = Notifier::channel();
    let workspaces = Workspaces::new(queue, store.clone(), notifier);

    let (id, _create) = workspaces.create("Notebook");
    workspaces.select(&id).unwrap();

    let scanner = DirtyScanner::start(workspaces.clone(), Duration::from_millis(10));
    store.insert_node(Node::text_block("b1", "B", "edited"));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !workspaces.entry(&id).unwrap().dirty {
        assert!(
            tokio::time::Instant::now() < deadline,
            "scanner never flagged the divergence"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    scanner.stop().await;

    assert!(events
        .try_iter()
        .any(|e| matches!(e, EngineEvent::WorkspaceDirty { .. })));
}
