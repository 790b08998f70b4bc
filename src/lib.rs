//! # Weftrun: Client Engine for Node-and-Edge Workflow Canvases
//!
//! Weftrun executes and synchronizes visual workflow canvases: blocks of
//! content wired through operators, dispatched to a remote execution engine,
//! with streamed results merged back into local node state and workspaces
//! persisted through a priority queue.
//!
//! ## Core Concepts
//!
//! - **Canvas**: Blocks (content) and operators (transformations) joined by
//!   directed links
//! - **Serializer**: Deterministic translation of a canvas scope into the
//!   engine's execution request
//! - **Dispatcher**: Run submission plus the event-stream state machine that
//!   folds progress back into node state
//! - **Reconstructor**: Incremental reassembly of chunked external content
//! - **Sync**: Workspace collection, optimistic mutations, and the
//!   single-flight persistence queue
//!
//! ## Quick Start
//!
//! ### Building and Serializing a Canvas
//!
//! ```
//! use weftrun::canvas::{Canvas, Link, Node, OperatorConfig};
//! use weftrun::serializer::serialize_graph;
//!
//! fn main() -> miette::Result<()> {
//!     let canvas = Canvas::new(
//!         vec![
//!             Node::text_block("draft", "Draft", "An unpolished paragraph."),
//!             Node::operator(
//!                 "tidy",
//!                 "Tidy",
//!                 OperatorConfig::Edit {
//!                     prompt: "Fix grammar in {{Draft}}".into(),
//!                     model: None,
//!                 },
//!             ),
//!             Node::text_block("result", "Result", ""),
//!         ],
//!         vec![Link::new("draft", "tidy"), Link::new("tidy", "result")],
//!     );
//!
//!     let request = serialize_graph(&canvas)?;
//!     assert_eq!(request.blocks.len(), 2);
//!     assert_eq!(request.edges.len(), 1);
//!     Ok(())
//! }
//! ```
//!
//! ### Sharing Node State
//!
//! All engine components read and mutate the canvas through a [`canvas::NodeStore`],
//! which replaces the whole collection per update so concurrent writers
//! compose instead of corrupting each other:
//!
//! ```
//! use weftrun::canvas::{Canvas, Node, NodeStore};
//!
//! let store = NodeStore::new(Canvas::default());
//! store.insert_node(Node::text_block("note", "Note", "hello"));
//!
//! let snapshot = store.snapshot();
//! assert_eq!(snapshot.nodes.len(), 1);
//! ```
//!
//! ### Dispatching a Run
//!
//! ```no_run
//! use std::sync::Arc;
//! use weftrun::canvas::{Canvas, NodeStore};
//! use weftrun::dispatcher::Dispatcher;
//! use weftrun::events::Notifier;
//! use weftrun::remote::{HttpRemote, RemoteConfig};
//! use weftrun::serializer::Scope;
//!
//! #[tokio::main]
//! async fn main() -> miette::Result<()> {
//!     weftrun::telemetry::init();
//!
//!     let remote = Arc::new(HttpRemote::new(RemoteConfig::from_env())?);
//!     let store = NodeStore::new(Canvas::default());
//!     let (notifier, _events) = Notifier::channel();
//!
//!     let dispatcher = Dispatcher::new(remote.clone(), remote, store, notifier);
//!     let report = dispatcher.dispatch(Scope::AllNodes).await?;
//!     println!("run {} settled as {:?}", report.task_id, report.outcome);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Guide
//!
//! - [`canvas`] - Node and link model, document codec, shared node store
//! - [`serializer`] - Scope resolution and execution-request payloads
//! - [`dispatcher`] - Run lifecycle and stream event handling
//! - [`reconstructor`] - Manifest polling and chunk reassembly
//! - [`sync`] - Workspaces, persistence queue, dirtiness scanning
//! - [`remote`] - Backend traits and the reqwest implementation
//! - [`events`] - Engine notification channel
//! - [`telemetry`] - Tracing subscriber setup
//! - [`types`] - Identifier newtypes shared across modules
//! - [`utils`] - Small shared helpers

pub mod canvas;
pub mod dispatcher;
pub mod events;
pub mod reconstructor;
pub mod remote;
pub mod serializer;
pub mod sync;
pub mod telemetry;
pub mod types;
pub mod utils;
