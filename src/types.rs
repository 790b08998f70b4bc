//! Core identifier types for the weftrun engine.
//!
//! This module defines the newtype identifiers shared by every component of
//! the engine: canvas nodes, dispatched tasks, external storage resources,
//! and workspaces. These are the stable handles that cross component
//! boundaries; everything else (payloads, statuses, operations) travels by
//! value.
//!
//! All identifiers are opaque strings. The editor owns node and workspace id
//! assignment; the engine only generates ids when it synthesizes an output
//! block ahead of a dispatch (see [`generate`](NodeId::generate)).
//!
//! # Examples
//!
//! ```rust
//! use weftrun::types::{NodeId, ResourceKey};
//!
//! let id = NodeId::from("block-7");
//! assert_eq!(id.as_str(), "block-7");
//!
//! // Reconstructor instances are keyed by (resource, node) pairs.
//! let key = ResourceKey::from("run-42/output-3");
//! assert_eq!(format!("{key}"), "run-42/output-3");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the raw string form.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }
    };
}

id_type! {
    /// Stable identifier of a canvas node (block or operator).
    ///
    /// Assigned by the editor when the node is created and never reused.
    /// The engine treats it as opaque; ordering is lexicographic and only
    /// used to keep serialized payloads deterministic.
    NodeId
}

id_type! {
    /// Identifier of one dispatched execution, returned by the run endpoint.
    TaskId
}

id_type! {
    /// Remote storage namespace for one externally stored content stream.
    ///
    /// A resource key addresses a manifest plus its chunk set; it is only
    /// meaningful to the storage collaborator.
    ResourceKey
}

id_type! {
    /// Identifier of a workspace in the remote store.
    WorkspaceId
}

impl NodeId {
    /// Generate a fresh id for an engine-synthesized node.
    ///
    /// Used when a dispatch has to create an output block for an operator
    /// with no declared result destination.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl WorkspaceId {
    /// Generate a fresh workspace id for an optimistic create.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}
