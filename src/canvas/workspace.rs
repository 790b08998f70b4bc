//! Workspace metadata tracked by the sync layer.

use super::Canvas;
use crate::types::WorkspaceId;

/// Camera position over the canvas. Persisted so reopening a workspace
/// restores the last view.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub x: f64,
    pub y: f64,
    pub zoom: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            zoom: 1.0,
        }
    }
}

/// One workspace as the client tracks it.
///
/// `latest_content` is the canvas as last persisted (or as loaded), the
/// baseline that change detection diffs the live canvas against. The dirty
/// flag is raised by the interval scan when the live canvas diverges and
/// cleared when a save operation settles.
#[derive(Clone, Debug, PartialEq)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub title: String,
    pub latest_content: Canvas,
    pub dirty: bool,
    pub viewport: Viewport,
}

impl Workspace {
    #[must_use]
    pub fn new(id: WorkspaceId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            latest_content: Canvas::default(),
            dirty: false,
            viewport: Viewport::default(),
        }
    }

    /// Replace the persisted-content baseline, settling the dirty flag.
    pub fn record_saved_content(&mut self, content: Canvas) {
        self.latest_content = content;
        self.dirty = false;
    }
}
