//! Memory Document - in-process host
//!
//! Owns a flat node list kept in pre-order, plus the per-node interaction
//! state (input values, text content) the client runtime needs. Used by the
//! CLI as a JSON-backed host and by tests as the provider double, with
//! switchable faults for the failure paths.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{DocumentProvider, DomError, Node, NodeId, NodeType};

/// Injected failures
#[derive(Debug, Default)]
struct Faults {
    unavailable: bool,
    unreadable: HashSet<NodeId>,
    unwritable: HashSet<NodeId>,
}

#[derive(Debug, Default)]
struct DocumentState {
    nodes: Vec<Node>,
    values: HashMap<NodeId, String>,
    texts: HashMap<NodeId, String>,
    faults: Faults,
    submissions: usize,
    next_id: u64,
}

impl DocumentState {
    fn position(&self, id: &NodeId) -> Option<usize> {
        self.nodes.iter().position(|n| &n.id == id)
    }

    fn node_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| &n.id == id)
    }

    fn fresh_id(&mut self) -> NodeId {
        loop {
            self.next_id += 1;
            let id = NodeId::new(format!("n{}", self.next_id));
            if self.position(&id).is_none() {
                return id;
            }
        }
    }

    /// Last flattened position occupied by the subtree at `id`
    fn subtree_end(&self, id: &NodeId, seen: &mut HashSet<NodeId>) -> Option<usize> {
        if !seen.insert(id.clone()) {
            return None;
        }
        let mut end = self.position(id)?;
        let children = self.nodes[end].children.clone();
        for child in &children {
            if let Some(child_end) = self.subtree_end(child, seen) {
                end = end.max(child_end);
            }
        }
        Some(end)
    }

    fn parent_of(&self, id: &NodeId) -> Option<NodeId> {
        self.nodes
            .iter()
            .find(|n| n.children.contains(id))
            .map(|n| n.id.clone())
    }

    fn insert(&mut self, parent: Option<&NodeId>, node: Node) -> Result<NodeId, DomError> {
        if self.position(&node.id).is_some() {
            return Err(DomError::DuplicateId(node.id));
        }
        let id = node.id.clone();
        match parent {
            Some(parent_id) => {
                let end = self
                    .subtree_end(parent_id, &mut HashSet::new())
                    .ok_or_else(|| DomError::NodeNotFound(parent_id.clone()))?;
                self.nodes.insert(end + 1, node);
                if let Some(parent_node) = self.node_mut(parent_id) {
                    parent_node.children.push(id.clone());
                }
            }
            None => self.nodes.push(node),
        }
        Ok(id)
    }
}

/// In-memory document host
#[derive(Debug, Default)]
pub struct MemoryDocument {
    state: RwLock<DocumentState>,
}

impl MemoryDocument {
    /// Create an empty document
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a document from a flattened node list
    pub fn from_nodes(nodes: Vec<Node>) -> Result<Self, DomError> {
        let mut seen = HashSet::new();
        for node in &nodes {
            if !seen.insert(node.id.clone()) {
                return Err(DomError::DuplicateId(node.id.clone()));
            }
        }
        let doc = Self::new();
        doc.state.write().nodes = nodes;
        Ok(doc)
    }

    /// Load a JSON node list
    pub fn from_json(json: &str) -> Result<Self, DomError> {
        let nodes: Vec<Node> = serde_json::from_str(json)?;
        Self::from_nodes(nodes)
    }

    /// Save the node list as JSON
    pub fn to_json(&self) -> Result<String, DomError> {
        Ok(serde_json::to_string_pretty(&self.state.read().nodes)?)
    }

    /// Append a node with a generated id under `parent` (or at top level)
    pub fn append(
        &self,
        parent: Option<&NodeId>,
        node_type: NodeType,
        attrs: &[(&str, &str)],
    ) -> Result<NodeId, DomError> {
        let mut state = self.state.write();
        let id = state.fresh_id();
        let mut node = Node::new(id, node_type);
        for (key, value) in attrs {
            node.attributes.insert(key.to_string(), value.to_string());
        }
        state.insert(parent, node)
    }

    /// Append a caller-built node under `parent` (or at top level)
    pub fn append_node(&self, parent: Option<&NodeId>, node: Node) -> Result<NodeId, DomError> {
        self.state.write().insert(parent, node)
    }

    /// Insert a new node right after `anchor`, as its sibling
    pub fn insert_after(
        &self,
        anchor: &NodeId,
        node_type: NodeType,
        attrs: &[(&str, &str)],
    ) -> Result<NodeId, DomError> {
        let mut state = self.state.write();
        let end = state
            .subtree_end(anchor, &mut HashSet::new())
            .ok_or_else(|| DomError::NodeNotFound(anchor.clone()))?;
        let id = state.fresh_id();
        let mut node = Node::new(id.clone(), node_type);
        for (key, value) in attrs {
            node.attributes.insert(key.to_string(), value.to_string());
        }
        state.nodes.insert(end + 1, node);

        if let Some(parent_id) = state.parent_of(anchor) {
            if let Some(parent) = state.node_mut(&parent_id) {
                let slot = parent
                    .children
                    .iter()
                    .position(|c| c == anchor)
                    .map(|i| i + 1)
                    .unwrap_or(parent.children.len());
                parent.children.insert(slot, id.clone());
            }
        }
        Ok(id)
    }

    /// Copy of a node
    pub fn node(&self, id: &NodeId) -> Option<Node> {
        let state = self.state.read();
        state.position(id).map(|pos| state.nodes[pos].clone())
    }

    /// Copy of a node's attributes
    pub fn attributes(&self, id: &NodeId) -> Option<BTreeMap<String, String>> {
        self.node(id).map(|n| n.attributes)
    }

    /// Node ids and types in document order
    pub fn outline(&self) -> Vec<(NodeId, NodeType)> {
        self.state
            .read()
            .nodes
            .iter()
            .map(|n| (n.id.clone(), n.node_type.clone()))
            .collect()
    }

    /// Read an attribute (no fault injection)
    pub fn attr(&self, id: &NodeId, key: &str) -> Option<String> {
        let state = self.state.read();
        let pos = state.position(id)?;
        state.nodes[pos].attributes.get(key).cloned()
    }

    /// Write an attribute (no fault injection)
    pub fn set_attr(&self, id: &NodeId, key: &str, value: &str) -> Result<(), DomError> {
        let mut state = self.state.write();
        let node = state.node_mut(id).ok_or_else(|| DomError::NodeNotFound(id.clone()))?;
        node.attributes.insert(key.to_string(), value.to_string());
        Ok(())
    }

    /// Delete an attribute (no fault injection)
    pub fn remove_attr(&self, id: &NodeId, key: &str) -> Result<(), DomError> {
        let mut state = self.state.write();
        let node = state.node_mut(id).ok_or_else(|| DomError::NodeNotFound(id.clone()))?;
        node.attributes.remove(key);
        Ok(())
    }

    /// First node whose attribute `key` equals `value`
    pub fn find_by_attr(&self, key: &str, value: &str) -> Option<NodeId> {
        self.state
            .read()
            .nodes
            .iter()
            .find(|n| n.attr(key) == Some(value))
            .map(|n| n.id.clone())
    }

    /// Current input value of a field
    pub fn value(&self, id: &NodeId) -> String {
        self.state.read().values.get(id).cloned().unwrap_or_default()
    }

    /// Simulate user input
    pub fn set_value(&self, id: &NodeId, value: &str) {
        self.state.write().values.insert(id.clone(), value.to_string());
    }

    /// Text content of a node
    pub fn text(&self, id: &NodeId) -> Option<String> {
        self.state.read().texts.get(id).cloned()
    }

    /// Replace text content of a node
    pub fn set_text(&self, id: &NodeId, text: &str) {
        self.state.write().texts.insert(id.clone(), text.to_string());
    }

    /// Record a programmatic form submission
    pub fn record_submission(&self, form: &NodeId) {
        tracing::debug!("Form {} submitted", form);
        self.state.write().submissions += 1;
    }

    /// Number of submissions that reached the host
    pub fn submissions(&self) -> usize {
        self.state.read().submissions
    }

    // === Fault injection ===

    /// Make the whole-document listing fail
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.write().faults.unavailable = unavailable;
    }

    /// Make reads (attributes and children) of a node fail
    pub fn fail_reads(&self, id: &NodeId) {
        self.state.write().faults.unreadable.insert(id.clone());
    }

    /// Make writes to a node fail
    pub fn fail_writes(&self, id: &NodeId) {
        self.state.write().faults.unwritable.insert(id.clone());
    }

    /// Clear every injected fault
    pub fn clear_faults(&self) {
        self.state.write().faults = Faults::default();
    }

    fn check_read(&self, id: &NodeId) -> Result<(), DomError> {
        if self.state.read().faults.unreadable.contains(id) {
            return Err(DomError::ReadFailed {
                node: id.clone(),
                reason: "injected read fault".to_string(),
            });
        }
        Ok(())
    }

    fn check_write(&self, id: &NodeId) -> Result<(), DomError> {
        if self.state.read().faults.unwritable.contains(id) {
            return Err(DomError::WriteFailed {
                node: id.clone(),
                reason: "injected write fault".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentProvider for MemoryDocument {
    async fn list_all_nodes(&self) -> Result<Vec<Node>, DomError> {
        let state = self.state.read();
        if state.faults.unavailable {
            return Err(DomError::Unavailable("document listing disabled".to_string()));
        }
        Ok(state.nodes.clone())
    }

    async fn get_attribute(&self, node: &NodeId, key: &str) -> Result<Option<String>, DomError> {
        self.check_read(node)?;
        let state = self.state.read();
        let pos = state.position(node).ok_or_else(|| DomError::NodeNotFound(node.clone()))?;
        Ok(state.nodes[pos].attributes.get(key).cloned())
    }

    async fn set_attribute(&self, node: &NodeId, key: &str, value: &str) -> Result<(), DomError> {
        self.check_write(node)?;
        self.set_attr(node, key, value)
    }

    async fn remove_attribute(&self, node: &NodeId, key: &str) -> Result<(), DomError> {
        self.check_write(node)?;
        self.remove_attr(node, key)
    }

    async fn get_children(&self, node: &NodeId) -> Result<Vec<NodeId>, DomError> {
        self.check_read(node)?;
        let state = self.state.read();
        let pos = state.position(node).ok_or_else(|| DomError::NodeNotFound(node.clone()))?;
        Ok(state.nodes[pos].children.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_keeps_preorder() {
        let doc = MemoryDocument::new();
        let form = doc.append(None, NodeType::Form, &[]).unwrap();
        let other = doc.append(None, NodeType::Form, &[]).unwrap();
        let late = doc.append(Some(&form), NodeType::TextInput, &[("label", "Email")]).unwrap();

        let order: Vec<NodeId> = doc.outline().into_iter().map(|(id, _)| id).collect();
        assert_eq!(order, vec![form.clone(), late.clone(), other]);
        assert_eq!(doc.node(&form).unwrap().children, vec![late]);
    }

    #[test]
    fn test_insert_after_sibling() {
        let doc = MemoryDocument::new();
        let form = doc.append(None, NodeType::Form, &[]).unwrap();
        let a = doc.append(Some(&form), NodeType::TextInput, &[]).unwrap();
        let b = doc.append(Some(&form), NodeType::TextInput, &[]).unwrap();
        let err = doc.insert_after(&a, NodeType::ErrorText, &[("id", "a-error")]).unwrap();

        assert_eq!(doc.node(&form).unwrap().children, vec![a, err.clone(), b]);
        assert_eq!(doc.find_by_attr("id", "a-error"), Some(err));
    }

    #[test]
    fn test_json_roundtrip() {
        let doc = MemoryDocument::new();
        let form = doc.append(None, NodeType::Form, &[("name", "contact")]).unwrap();
        doc.append(Some(&form), NodeType::TextArea, &[]).unwrap();

        let json = doc.to_json().unwrap();
        let loaded = MemoryDocument::from_json(&json).unwrap();
        assert_eq!(loaded.outline(), doc.outline());
        assert!(MemoryDocument::from_json("[{\"id\":\"a\",\"type\":\"Form\"},{\"id\":\"a\",\"type\":\"Form\"}]").is_err());
    }

    #[test]
    fn test_faults() {
        let doc = MemoryDocument::new();
        let form = doc.append(None, NodeType::Form, &[]).unwrap();
        doc.fail_reads(&form);
        doc.fail_writes(&form);

        smol::block_on(async {
            assert!(doc.get_children(&form).await.is_err());
            assert!(doc.set_attribute(&form, "k", "v").await.is_err());
            doc.set_unavailable(true);
            assert!(doc.list_all_nodes().await.is_err());
            doc.clear_faults();
            assert!(doc.snapshot().await.is_ok());
            assert!(doc.set_attribute(&form, "k", "v").await.is_ok());
        });
        assert_eq!(doc.attr(&form, "k").as_deref(), Some("v"));
    }
}
