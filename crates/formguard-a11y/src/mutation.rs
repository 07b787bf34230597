//! Attribute Mutations
//!
//! Each mutation keeps the value it replaces, so any set can be reversed to
//! undo a partial or complete commit.

use std::collections::BTreeMap;

use formguard_dom::{DocumentProvider, NodeId};
use serde::Serialize;

use crate::RuleError;

/// One attribute change. `new_value: None` deletes the attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeMutation {
    pub node_id: NodeId,
    pub name: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

impl AttributeMutation {
    /// Reverse operation (for rollback)
    pub fn reverse(&self) -> AttributeMutation {
        AttributeMutation {
            node_id: self.node_id.clone(),
            name: self.name.clone(),
            old_value: self.new_value.clone(),
            new_value: self.old_value.clone(),
        }
    }

    /// Check if this deletes the attribute
    pub fn is_removal(&self) -> bool {
        self.new_value.is_none()
    }
}

/// Ordered group of mutations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AttributeMutationSet {
    pub mutations: Vec<AttributeMutation>,
}

impl AttributeMutationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Minimal mutations turning `before` into `after` on one node.
    /// Removals come first, then sets, each in key order.
    pub fn diff(node_id: &NodeId, before: &BTreeMap<String, String>, after: &BTreeMap<String, String>) -> Self {
        let mut set = Self::new();
        for (name, old) in before {
            if !after.contains_key(name) {
                set.push(AttributeMutation {
                    node_id: node_id.clone(),
                    name: name.clone(),
                    old_value: Some(old.clone()),
                    new_value: None,
                });
            }
        }
        for (name, new) in after {
            let old = before.get(name);
            if old != Some(new) {
                set.push(AttributeMutation {
                    node_id: node_id.clone(),
                    name: name.clone(),
                    old_value: old.cloned(),
                    new_value: Some(new.clone()),
                });
            }
        }
        set
    }

    pub fn push(&mut self, mutation: AttributeMutation) {
        self.mutations.push(mutation);
    }

    pub fn extend(&mut self, other: AttributeMutationSet) {
        self.mutations.extend(other.mutations);
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AttributeMutation> {
        self.mutations.iter()
    }

    /// Undo set, in reverse order
    pub fn reverse(&self) -> AttributeMutationSet {
        AttributeMutationSet {
            mutations: self.mutations.iter().rev().map(AttributeMutation::reverse).collect(),
        }
    }

    /// Apply the mutations for `node_id` to an attribute map (dry run)
    pub fn project(&self, node_id: &NodeId, attrs: &mut BTreeMap<String, String>) {
        for m in self.mutations.iter().filter(|m| &m.node_id == node_id) {
            match &m.new_value {
                Some(value) => {
                    attrs.insert(m.name.clone(), value.clone());
                }
                None => {
                    attrs.remove(&m.name);
                }
            }
        }
    }

    /// Write every mutation in order. Stops at the first failure and
    /// returns the prefix that was written so the caller can reverse it.
    pub async fn commit<P>(&self, provider: &P) -> Result<(), RuleError>
    where
        P: DocumentProvider + ?Sized,
    {
        for (done, m) in self.mutations.iter().enumerate() {
            let result = match &m.new_value {
                Some(value) => provider.set_attribute(&m.node_id, &m.name, value).await,
                None => provider.remove_attribute(&m.node_id, &m.name).await,
            };
            if let Err(source) = result {
                return Err(RuleError::Commit {
                    node: m.node_id.clone(),
                    applied: AttributeMutationSet {
                        mutations: self.mutations[..done].to_vec(),
                    },
                    total: self.mutations.len(),
                    source,
                });
            }
            tracing::debug!("{} {}={:?}", m.node_id, m.name, m.new_value);
        }
        Ok(())
    }
}
