//! Resolved Fields and Forms
//!
//! Derived, never stored: rebuilt from the snapshot on every scan.

use formguard_dom::{Node, NodeId, NodeIndex};
use serde::Serialize;

use crate::{FieldClassifier, FieldType, normalize_label};

/// Required marker written by the rule engine alongside `required` /
/// `aria-required`
pub const TOOL_REQUIRED_MARKER: &str = "data-a11y-required";

/// Attributes consulted for a field's label, most specific first
const LABEL_SOURCES: &[&str] = &["label", "aria-label", "placeholder", "name"];

/// A field that takes part in validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedField {
    pub node_id: NodeId,
    pub label: String,
    pub name: String,
    pub required: bool,
    pub field_type: FieldType,
}

impl ResolvedField {
    /// Derive the field view of a node
    pub fn from_node(node: &Node, classifier: &dyn FieldClassifier) -> Self {
        let label = field_label(node);
        let name = node
            .attr("name")
            .filter(|n| !n.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| normalize_label(&label));
        Self {
            node_id: node.id.clone(),
            field_type: classifier.classify(&label),
            required: is_marked_required(node),
            label,
            name,
        }
    }

    /// Canonical identifier used to correlate passes
    pub fn normalized_label(&self) -> String {
        normalize_label(&self.label)
    }
}

/// A form with at least one required, supported field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedForm {
    pub node_id: NodeId,
    pub name: String,
    pub fields: Vec<ResolvedField>,
}

impl ResolvedForm {
    /// Classify and filter resolved field ids. Returns `None` when nothing
    /// survives, in which case the form is not a valid form.
    pub fn build(
        index: &NodeIndex,
        form: &Node,
        field_ids: &[NodeId],
        classifier: &dyn FieldClassifier,
    ) -> Option<Self> {
        let mut fields = Vec::new();
        for id in field_ids {
            let Some(node) = index.get(id) else {
                tracing::debug!("Field {} vanished from snapshot", id);
                continue;
            };
            let field = ResolvedField::from_node(node, classifier);
            if field.field_type == FieldType::Unsupported {
                tracing::debug!("Excluding {} ({:?}): unsupported type", id, field.label);
                continue;
            }
            if !field.required {
                tracing::debug!("Excluding {} ({:?}): not required", id, field.label);
                continue;
            }
            fields.push(field);
        }

        if fields.is_empty() {
            tracing::debug!("Discarding form {}: no required supported fields", form.id);
            return None;
        }

        Some(Self {
            node_id: form.id.clone(),
            name: form_name(form),
            fields,
        })
    }

    /// Look up a field by node id
    pub fn field(&self, id: &NodeId) -> Option<&ResolvedField> {
        self.fields.iter().find(|f| &f.node_id == id)
    }
}

/// Label text of a field node (empty when none is declared)
pub fn field_label(node: &Node) -> String {
    LABEL_SOURCES
        .iter()
        .filter_map(|key| node.attr(key))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .unwrap_or_default()
        .to_string()
}

/// Display name of a form node
pub fn form_name(form: &Node) -> String {
    ["name", "aria-label", "label"]
        .iter()
        .filter_map(|key| form.attr(key))
        .find(|v| !v.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| form.id.to_string())
}

/// Native `required`, `aria-required="true"`, or the tool marker
pub fn is_marked_required(node: &Node) -> bool {
    let native = node
        .attr("required")
        .is_some_and(|v| !v.eq_ignore_ascii_case("false"));
    let aria = node.attr("aria-required") == Some("true");
    let marker = node.attr(TOOL_REQUIRED_MARKER) == Some("true");
    native || aria || marker
}
