//! Formguard DOM - Document node model
//!
//! Host-agnostic view of a document tree: typed nodes with declarative
//! attribute maps, a read-only snapshot index, and the adapter trait every
//! host implements once.

mod node;
mod tree;
mod provider;
mod document;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use node::{Node, NodeType};
pub use tree::NodeIndex;
pub use provider::DocumentProvider;
pub use document::MemoryDocument;

/// Node identifier (opaque, stable within one snapshot)
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Create an identifier from any host id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Raw identifier text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Document access error
#[derive(Debug, thiserror::Error)]
pub enum DomError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Duplicate node id in snapshot: {0}")]
    DuplicateId(NodeId),

    #[error("Document unavailable: {0}")]
    Unavailable(String),

    #[error("Read failed on {node}: {reason}")]
    ReadFailed { node: NodeId, reason: String },

    #[error("Write failed on {node}: {reason}")]
    WriteFailed { node: NodeId, reason: String },

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),
}
