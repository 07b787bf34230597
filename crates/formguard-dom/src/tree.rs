//! Node Index (read-only snapshot)
//!
//! Built once per scan from the host's full node listing. The listing order
//! is the flattened document order used by positional resolution.

use std::collections::{HashMap, HashSet};

use crate::{DomError, Node, NodeId};

/// Snapshot of every node the host reported
#[derive(Debug, Clone, Default)]
pub struct NodeIndex {
    nodes: Vec<Node>,
    positions: HashMap<NodeId, usize>,
    /// First declaring parent of each child
    parents: HashMap<NodeId, NodeId>,
}

impl NodeIndex {
    /// Build an index, rejecting duplicate ids
    pub fn from_nodes(nodes: Vec<Node>) -> Result<Self, DomError> {
        let mut positions = HashMap::with_capacity(nodes.len());
        for (pos, node) in nodes.iter().enumerate() {
            if positions.insert(node.id.clone(), pos).is_some() {
                return Err(DomError::DuplicateId(node.id.clone()));
            }
        }

        let mut parents = HashMap::new();
        for node in &nodes {
            for child in &node.children {
                parents.entry(child.clone()).or_insert_with(|| node.id.clone());
            }
        }

        tracing::debug!("Indexed {} nodes", nodes.len());
        Ok(Self { nodes, positions, parents })
    }

    /// Get a node by ID
    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.positions.get(id).map(|&pos| &self.nodes[pos])
    }

    /// Position in flattened order
    pub fn position(&self, id: &NodeId) -> Option<usize> {
        self.positions.get(id).copied()
    }

    /// All nodes in flattened order
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the snapshot is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Child ids as recorded in the snapshot
    pub fn children(&self, id: &NodeId) -> &[NodeId] {
        self.get(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Declaring parent, if any
    pub fn parent(&self, id: &NodeId) -> Option<&NodeId> {
        self.parents.get(id)
    }

    /// Form nodes in flattened order
    pub fn forms(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.is_form())
    }

    /// Ancestors from nearest to farthest (stops on cycles)
    pub fn ancestors(&self, id: &NodeId) -> Vec<&NodeId> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        seen.insert(id);
        let mut current = id;
        while let Some(parent) = self.parents.get(current) {
            if !seen.insert(parent) {
                tracing::warn!("Parent cycle detected at {}", parent);
                break;
            }
            out.push(parent);
            current = parent;
        }
        out
    }

    /// Nearest ancestor that is a form
    pub fn form_ancestor(&self, id: &NodeId) -> Option<&NodeId> {
        self.ancestors(id)
            .into_iter()
            .find(|a| self.get(a).is_some_and(Node::is_form))
    }

    /// Check whether `id` lies in the subtree rooted at `root` (inclusive)
    pub fn is_within(&self, id: &NodeId, root: &NodeId) -> bool {
        id == root || self.ancestors(id).into_iter().any(|a| a == root)
    }

    /// Position of the first form strictly after `pos`
    pub fn next_form_after(&self, pos: usize) -> Option<usize> {
        self.nodes
            .iter()
            .enumerate()
            .skip(pos + 1)
            .find(|(_, n)| n.is_form())
            .map(|(i, _)| i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NodeType;

    fn sample() -> NodeIndex {
        NodeIndex::from_nodes(vec![
            Node::new("form", NodeType::Form).with_children(vec!["box".into()]),
            Node::new("box", NodeType::Block).with_children(vec!["name".into()]),
            Node::new("name", NodeType::TextInput),
            Node::new("stray", NodeType::TextInput),
            Node::new("form2", NodeType::Form),
        ])
        .unwrap()
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let result = NodeIndex::from_nodes(vec![
            Node::new("a", NodeType::Form),
            Node::new("a", NodeType::TextInput),
        ]);
        assert!(matches!(result, Err(DomError::DuplicateId(id)) if id.as_str() == "a"));
    }

    #[test]
    fn test_ancestry() {
        let index = sample();
        let name = NodeId::from("name");
        assert_eq!(index.parent(&name), Some(&NodeId::from("box")));
        assert_eq!(index.form_ancestor(&name), Some(&NodeId::from("form")));
        assert_eq!(index.form_ancestor(&NodeId::from("stray")), None);
        assert!(index.is_within(&name, &NodeId::from("form")));
    }

    #[test]
    fn test_next_form() {
        let index = sample();
        assert_eq!(index.next_form_after(0), Some(4));
        assert_eq!(index.next_form_after(4), None);
        assert_eq!(index.forms().count(), 2);
    }

    #[test]
    fn test_cycle_terminates() {
        let index = NodeIndex::from_nodes(vec![
            Node::new("a", NodeType::Block).with_children(vec!["b".into()]),
            Node::new("b", NodeType::Block).with_children(vec!["a".into()]),
        ])
        .unwrap();
        assert_eq!(index.ancestors(&NodeId::from("a")).len(), 1);
    }
}
