//! Rule Engine
//!
//! Computes the attribute mutations that bring a field (or form) node into
//! its annotated state, or back out of it. Computation is pure; writing is a
//! separate [`AttributeMutationSet::commit`], so every plan can be inspected
//! as a dry run first.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use formguard_dom::{Node, NodeType};
use formguard_forms::{FieldType, ResolvedField};
use serde::Deserialize;

use crate::annotation::{
    APPLIED_AT, ARIA_REQUIRED, AUTO_ERROR_MESSAGING, EMAIL_PATTERN, ENGINE_PRIVATE_KEYS, ERROR_ID,
    FIELD_KEYS, FIELD_LABEL, FORM_KEYS, HOST_VISIBLE_KEYS, PATTERN, PHONE_PATTERN, REQUIRED,
    REQUIRED_MARKER, RESTORE, SENTINEL, SENTINEL_ENABLED, TYPE, error_id_for,
};
use crate::AttributeMutationSet;

/// Rule configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    /// Write `type` for email / phone / url fields
    pub apply_type_attributes: bool,
    /// Write `pattern` for email / phone fields
    pub apply_patterns: bool,
    /// Host ids starting with this prefix are custom widgets
    pub custom_widget_id_prefix: String,
    /// Node types that honour the native `required` attribute
    pub native_field_types: Vec<NodeType>,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            apply_type_attributes: true,
            apply_patterns: true,
            custom_widget_id_prefix: "custom-".to_string(),
            native_field_types: vec![NodeType::TextInput, NodeType::TextArea],
        }
    }
}

/// Annotated attribute map under construction. Records the base value of
/// every host-visible key it overwrites or clears.
struct Draft<'a> {
    base: &'a BTreeMap<String, String>,
    attrs: BTreeMap<String, String>,
    restore: BTreeMap<String, String>,
}

impl<'a> Draft<'a> {
    fn new(base: &'a BTreeMap<String, String>) -> Self {
        Self {
            base,
            attrs: base.clone(),
            restore: BTreeMap::new(),
        }
    }

    fn remember(&mut self, key: &str) {
        if let Some(prev) = self.base.get(key) {
            self.restore.insert(key.to_string(), prev.clone());
        }
    }

    fn set(&mut self, key: &str, value: &str) {
        self.remember(key);
        self.attrs.insert(key.to_string(), value.to_string());
    }

    fn clear(&mut self, key: &str) {
        self.remember(key);
        self.attrs.remove(key);
    }

    fn mark(&mut self, key: &str, value: &str) {
        self.attrs.insert(key.to_string(), value.to_string());
    }

    fn finish(mut self) -> BTreeMap<String, String> {
        if !self.restore.is_empty() {
            match serde_json::to_string(&self.restore) {
                Ok(json) => {
                    self.attrs.insert(RESTORE.to_string(), json);
                }
                Err(err) => tracing::warn!("Dropping restore record: {}", err),
            }
        }
        self.attrs
    }
}

/// Validation annotation engine
#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    config: RuleConfig,
}

impl RuleEngine {
    pub fn new(config: RuleConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RuleConfig {
        &self.config
    }

    /// Non-native widget: unsupported node type or custom-widget id
    pub fn is_custom_widget(&self, node: &Node) -> bool {
        let non_native = !self.config.native_field_types.contains(&node.node_type);
        let prefix = self.config.custom_widget_id_prefix.as_str();
        let marked = !prefix.is_empty() && node.attr("id").is_some_and(|id| id.starts_with(prefix));
        non_native || marked
    }

    /// Check if a field node carries a previous annotation
    pub fn is_annotated(node: &Node) -> bool {
        ENGINE_PRIVATE_KEYS.iter().any(|k| node.has_attr(k))
    }

    /// Check if a form node carries the sentinel
    pub fn has_sentinel(node: &Node) -> bool {
        node.attr(SENTINEL) == Some(SENTINEL_ENABLED)
    }

    /// Field attributes with every previous annotation removed and overwritten
    /// host values restored
    pub fn stripped_attributes(&self, node: &Node) -> BTreeMap<String, String> {
        let mut attrs = node.attributes.clone();
        let restore: BTreeMap<String, String> = match node.attr(RESTORE) {
            Some(json) => serde_json::from_str(json).unwrap_or_else(|err| {
                tracing::warn!("Ignoring malformed restore record on {}: {}", node.id, err);
                BTreeMap::new()
            }),
            None => BTreeMap::new(),
        };

        for key in FIELD_KEYS {
            attrs.remove(key);
        }
        for (key, value) in restore {
            if HOST_VISIBLE_KEYS.contains(&key.as_str()) {
                attrs.insert(key, value);
            }
        }
        attrs
    }

    /// Attribute map of `node` once `field` is annotated
    pub fn annotated_attributes(&self, field: &ResolvedField, node: &Node) -> BTreeMap<String, String> {
        let base = if Self::is_annotated(node) {
            tracing::debug!("Superseding previous annotation on {}", node.id);
            self.stripped_attributes(node)
        } else {
            node.attributes.clone()
        };
        let mut draft = Draft::new(&base);

        if field.required {
            if self.is_custom_widget(node) {
                draft.set(ARIA_REQUIRED, "true");
                draft.clear(REQUIRED);
            } else {
                draft.set(REQUIRED, "required");
                draft.clear(ARIA_REQUIRED);
            }
            draft.mark(REQUIRED_MARKER, "true");
        }

        if self.config.apply_type_attributes {
            let (input_type, pattern) = match field.field_type {
                FieldType::Email => (Some("email"), Some(EMAIL_PATTERN)),
                FieldType::Phone => (Some("tel"), Some(PHONE_PATTERN)),
                FieldType::Url => (Some("url"), None),
                FieldType::Plain | FieldType::Message | FieldType::Unsupported => (None, None),
            };
            if let Some(input_type) = input_type {
                draft.set(TYPE, input_type);
            }
            if let Some(pattern) = pattern.filter(|_| self.config.apply_patterns) {
                draft.set(PATTERN, pattern);
            }
        }

        let normalized = field.normalized_label();
        draft.mark(ERROR_ID, &error_id_for(&normalized));
        draft.mark(FIELD_LABEL, &normalized);
        draft.mark(AUTO_ERROR_MESSAGING, "true");

        draft.finish()
    }

    /// Mutations annotating one field node
    pub fn apply(&self, field: &ResolvedField, node: &Node) -> AttributeMutationSet {
        let after = self.annotated_attributes(field, node);
        AttributeMutationSet::diff(&node.id, &node.attributes, &after)
    }

    /// Mutations removing every annotation from one field node. Empty for a
    /// node that was never annotated.
    pub fn remove(&self, node: &Node) -> AttributeMutationSet {
        if !Self::is_annotated(node) {
            return AttributeMutationSet::new();
        }
        let after = self.stripped_attributes(node);
        AttributeMutationSet::diff(&node.id, &node.attributes, &after)
    }

    /// Sentinel mutations for a form node
    pub fn apply_form(&self, form: &Node, applied_at: DateTime<Utc>) -> AttributeMutationSet {
        let mut after = form.attributes.clone();
        after.insert(SENTINEL.to_string(), SENTINEL_ENABLED.to_string());
        after.insert(
            APPLIED_AT.to_string(),
            applied_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
        AttributeMutationSet::diff(&form.id, &form.attributes, &after)
    }

    /// Sentinel removal for a form node
    pub fn remove_form(&self, form: &Node) -> AttributeMutationSet {
        let mut after = form.attributes.clone();
        for key in FORM_KEYS {
            after.remove(key);
        }
        AttributeMutationSet::diff(&form.id, &form.attributes, &after)
    }
}
