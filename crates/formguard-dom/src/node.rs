//! Document Node
//!
//! A node is a type tag, a stable id, a flat attribute map and an ordered
//! list of child ids. Children are resolved through the index, never owned.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::NodeId;

/// Node type tag
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeType {
    /// Groups fields; the unit of validation
    Form,
    /// Layout containers
    Block,
    VFlex,
    HFlex,
    Container,
    GenericWrapper,
    /// Single-line input field
    TextInput,
    /// Multi-line input field
    TextArea,
    /// Error message display created by the client runtime
    ErrorText,
    /// Anything the host reports that we do not model
    Other(String),
}

impl NodeType {
    /// Parse a host type tag (case-insensitive, accepts a few HTML aliases)
    pub fn from_tag(tag: &str) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "form" => Self::Form,
            "block" => Self::Block,
            "vflex" => Self::VFlex,
            "hflex" => Self::HFlex,
            "container" | "div" => Self::Container,
            "genericwrapper" | "generic-wrapper" => Self::GenericWrapper,
            "textinput" | "input" => Self::TextInput,
            "textarea" => Self::TextArea,
            "errortext" => Self::ErrorText,
            _ => Self::Other(tag.to_string()),
        }
    }

    /// Canonical tag
    pub fn as_str(&self) -> &str {
        match self {
            Self::Form => "Form",
            Self::Block => "Block",
            Self::VFlex => "VFlex",
            Self::HFlex => "HFlex",
            Self::Container => "Container",
            Self::GenericWrapper => "GenericWrapper",
            Self::TextInput => "TextInput",
            Self::TextArea => "TextArea",
            Self::ErrorText => "ErrorText",
            Self::Other(tag) => tag,
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for NodeType {
    fn from(tag: String) -> Self {
        Self::from_tag(&tag)
    }
}

impl From<NodeType> for String {
    fn from(node_type: NodeType) -> Self {
        node_type.as_str().to_string()
    }
}

/// Document node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Stable identifier
    pub id: NodeId,
    /// Type tag
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Declarative attributes (sorted, so serialization is deterministic)
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Ordered child ids
    #[serde(default)]
    pub children: Vec<NodeId>,
}

impl Node {
    /// Create a node with no attributes or children
    pub fn new(id: impl Into<NodeId>, node_type: NodeType) -> Self {
        Self {
            id: id.into(),
            node_type,
            attributes: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    /// Builder: add an attribute
    pub fn with_attr(mut self, key: &str, value: &str) -> Self {
        self.attributes.insert(key.to_string(), value.to_string());
        self
    }

    /// Builder: set the child list
    pub fn with_children(mut self, children: Vec<NodeId>) -> Self {
        self.children = children;
        self
    }

    /// Get an attribute value
    #[inline]
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Check if an attribute is present
    #[inline]
    pub fn has_attr(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    /// Check if this is a form
    #[inline]
    pub fn is_form(&self) -> bool {
        self.node_type == NodeType::Form
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_tag_roundtrip() {
        assert_eq!(NodeType::from_tag("VFlex"), NodeType::VFlex);
        assert_eq!(NodeType::from_tag("input"), NodeType::TextInput);
        assert_eq!(NodeType::from_tag("Slider"), NodeType::Other("Slider".to_string()));
        assert_eq!(NodeType::from_tag(NodeType::GenericWrapper.as_str()), NodeType::GenericWrapper);
    }

    #[test]
    fn test_node_json_shape() {
        let node = Node::new("f1", NodeType::TextInput).with_attr("label", "Email");
        let json = serde_json::to_string(&node).unwrap();
        assert_eq!(json, r#"{"id":"f1","type":"TextInput","attributes":{"label":"Email"},"children":[]}"#);

        let parsed: Node = serde_json::from_str(r#"{"id":"x","type":"Block"}"#).unwrap();
        assert_eq!(parsed.node_type, NodeType::Block);
        assert!(parsed.attributes.is_empty());
    }
}
