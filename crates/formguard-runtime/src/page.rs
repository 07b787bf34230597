//! Page access for the runtime

use formguard_dom::{DomError, MemoryDocument, NodeId, NodeType};

/// Live page as seen from event handlers. Synchronous: every handler runs to
/// completion within one event.
pub trait Page {
    /// Node ids and types in document order
    fn outline(&self) -> Vec<(NodeId, NodeType)>;

    fn attribute(&self, node: &NodeId, key: &str) -> Option<String>;

    fn set_attribute(&self, node: &NodeId, key: &str, value: &str) -> Result<(), DomError>;

    fn remove_attribute(&self, node: &NodeId, key: &str) -> Result<(), DomError>;

    /// Current input value
    fn value(&self, node: &NodeId) -> String;

    /// Node whose `id` attribute equals `id`
    fn find_by_id(&self, id: &str) -> Option<NodeId>;

    /// Create a sibling right after `anchor`
    fn insert_after(&self, anchor: &NodeId, node_type: NodeType, attrs: &[(&str, &str)]) -> Result<NodeId, DomError>;

    fn set_text(&self, node: &NodeId, text: &str);

    /// Ask the host to submit `form`. The host dispatches exactly one submit
    /// event for the request.
    fn request_submit(&self, form: &NodeId);
}

impl Page for MemoryDocument {
    fn outline(&self) -> Vec<(NodeId, NodeType)> {
        MemoryDocument::outline(self)
    }

    fn attribute(&self, node: &NodeId, key: &str) -> Option<String> {
        self.attr(node, key)
    }

    fn set_attribute(&self, node: &NodeId, key: &str, value: &str) -> Result<(), DomError> {
        self.set_attr(node, key, value)
    }

    fn remove_attribute(&self, node: &NodeId, key: &str) -> Result<(), DomError> {
        self.remove_attr(node, key)
    }

    fn value(&self, node: &NodeId) -> String {
        MemoryDocument::value(self, node)
    }

    fn find_by_id(&self, id: &str) -> Option<NodeId> {
        self.find_by_attr("id", id)
    }

    fn insert_after(&self, anchor: &NodeId, node_type: NodeType, attrs: &[(&str, &str)]) -> Result<NodeId, DomError> {
        MemoryDocument::insert_after(self, anchor, node_type, attrs)
    }

    fn set_text(&self, node: &NodeId, text: &str) {
        MemoryDocument::set_text(self, node, text)
    }

    fn request_submit(&self, form: &NodeId) {
        self.record_submission(form)
    }
}
