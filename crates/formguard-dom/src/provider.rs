//! Document Provider
//!
//! The single adapter interface a host implements. Every call may suspend
//! and may fail independently; callers decide how a failure is recovered.

use async_trait::async_trait;

use crate::{DomError, Node, NodeId, NodeIndex};

/// Host document access
#[async_trait]
pub trait DocumentProvider: Send + Sync {
    /// Full node listing in flattened document order
    async fn list_all_nodes(&self) -> Result<Vec<Node>, DomError>;

    /// Read one attribute
    async fn get_attribute(&self, node: &NodeId, key: &str) -> Result<Option<String>, DomError>;

    /// Write one attribute
    async fn set_attribute(&self, node: &NodeId, key: &str, value: &str) -> Result<(), DomError>;

    /// Delete one attribute (absent keys are not an error)
    async fn remove_attribute(&self, node: &NodeId, key: &str) -> Result<(), DomError>;

    /// Current child ids of a node
    async fn get_children(&self, node: &NodeId) -> Result<Vec<NodeId>, DomError>;

    /// Fresh snapshot of the whole document
    async fn snapshot(&self) -> Result<NodeIndex, DomError> {
        NodeIndex::from_nodes(self.list_all_nodes().await?)
    }
}
