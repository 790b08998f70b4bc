//! Run-stream protocol: tagged events on `data:` lines.
//!
//! Every line of a run's event stream is `data: <json>`, where the JSON
//! body carries an `event_type` tag plus event-specific fields. The enum
//! below is the closed set of tags this client understands; decoding is
//! deliberately tolerant everywhere else, because a malformed line must
//! never abort a stream that later carries the terminal event.

use crate::canvas::BlockKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// External-storage metadata attached to a `BLOCK_UPDATED` event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExternalRef {
    pub resource_key: String,
    #[serde(default)]
    pub content_type: BlockKind,
}

/// One protocol event, tagged by `event_type`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunEvent {
    /// The remote accepted the task and execution began.
    TaskStarted,
    /// An operator began executing.
    EdgeStarted { edge_id: String },
    /// A node's output will arrive out-of-band as chunked storage.
    StreamStarted {
        node_id: String,
        resource_key: String,
        #[serde(default)]
        content_type: Option<BlockKind>,
    },
    /// Progress counters. Informational only.
    ProgressUpdate {
        #[serde(default)]
        completed: Option<u64>,
        #[serde(default)]
        total: Option<u64>,
    },
    /// An operator finished; its outputs are now being produced.
    EdgeCompleted {
        edge_id: String,
        #[serde(default)]
        outputs: Vec<String>,
    },
    /// Final or refreshed content for one block.
    BlockUpdated {
        node_id: String,
        #[serde(default)]
        content: Option<Value>,
        #[serde(default, rename = "type")]
        kind: Option<String>,
        #[serde(default)]
        external: Option<ExternalRef>,
    },
    /// The chunked output for a node is complete.
    StreamEnded {
        node_id: String,
        resource_key: String,
    },
    /// One fan-out batch finished. Informational only.
    BatchCompleted,
    /// Terminal: the run failed.
    TaskFailed { error_message: String },
    /// Terminal: the run finished cleanly.
    TaskCompleted,
}

impl RunEvent {
    /// Whether this event ends the stream.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunEvent::TaskFailed { .. } | RunEvent::TaskCompleted)
    }
}

/// Result of decoding one raw stream line.
#[derive(Debug, PartialEq)]
pub enum LineOutcome {
    Event(RunEvent),
    /// Blank line or transport keep-alive comment. Not an error.
    Ignored,
    /// Line claimed to be an event but did not parse. Logged and counted,
    /// never fatal.
    Malformed,
}

/// Decode one line of the event stream.
#[must_use]
pub fn decode_line(raw: &str) -> LineOutcome {
    let line = raw.trim();
    if line.is_empty() {
        return LineOutcome::Ignored;
    }
    if line.starts_with(':') {
        debug!("ignoring stream comment line");
        return LineOutcome::Ignored;
    }
    let Some(body) = line.strip_prefix("data:") else {
        warn!("skipping stream line without data prefix");
        return LineOutcome::Malformed;
    };
    match serde_json::from_str::<RunEvent>(body.trim_start()) {
        Ok(event) => LineOutcome::Event(event),
        Err(err) => {
            warn!(error = %err, "skipping malformed event line");
            LineOutcome::Malformed
        }
    }
}
