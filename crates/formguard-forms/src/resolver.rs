//! Form Field Resolution
//!
//! Maps a form node back to the fields that belong to it. Two strategies run
//! in order and are merged by node id:
//!
//! 1. Structural: breadth-first containment search through whitelisted
//!    container types, with child lookups for one level issued concurrently.
//! 2. Positional: fields with no form ancestor that sit between the form and
//!    the next form in flattened order. Covers hosts whose declared
//!    containment is incomplete.

use std::collections::{HashMap, HashSet};

use formguard_dom::{DocumentProvider, NodeId, NodeIndex, NodeType};
use futures::future::join_all;
use serde::Deserialize;

/// Resolver tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Node types that hold user input
    pub field_types: Vec<NodeType>,
    /// Node types searched through for fields
    pub container_types: Vec<NodeType>,
    /// Deepest container level expanded below the form
    pub max_depth: usize,
    /// Run the positional strategy after the structural one
    pub positional_fallback: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            field_types: vec![NodeType::TextInput, NodeType::TextArea],
            container_types: vec![
                NodeType::Block,
                NodeType::VFlex,
                NodeType::HFlex,
                NodeType::Container,
                NodeType::GenericWrapper,
            ],
            max_depth: 64,
            positional_fallback: true,
        }
    }
}

/// A subtree the structural search could not read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedSubtree {
    pub node: NodeId,
    pub reason: String,
}

/// Result of resolving one form
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Field ids, structural matches first, then positional additions
    pub fields: Vec<NodeId>,
    /// How many of `fields` came from the structural search
    pub structural: usize,
    /// Subtrees skipped because a lookup failed
    pub skipped: Vec<SkippedSubtree>,
}

impl Resolution {
    /// Fields found only by the positional strategy
    pub fn positional(&self) -> &[NodeId] {
        &self.fields[self.structural..]
    }
}

/// Field resolver
#[derive(Debug, Clone, Default)]
pub struct FieldResolver {
    config: ResolverConfig,
}

impl FieldResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Check if a node type holds user input
    pub fn is_field(&self, node_type: &NodeType) -> bool {
        self.config.field_types.contains(node_type)
    }

    /// Check if a node type is searched through
    pub fn is_container(&self, node_type: &NodeType) -> bool {
        self.config.container_types.contains(node_type)
    }

    /// Resolve the ordered, de-duplicated field set of `form`
    pub async fn resolve_fields<P>(&self, provider: &P, index: &NodeIndex, form: &NodeId) -> Resolution
    where
        P: DocumentProvider + ?Sized,
    {
        let (mut fields, skipped) = containment_search(
            provider,
            index,
            form,
            |t| self.is_container(t),
            |t| self.is_field(t),
            self.config.max_depth,
        )
        .await;
        let structural = fields.len();

        if self.config.positional_fallback {
            let mut seen: HashSet<NodeId> = fields.iter().cloned().collect();
            for id in self.positional_fields(index, form) {
                if seen.insert(id.clone()) {
                    tracing::debug!("Field {} assigned to form {} by position", id, form);
                    fields.push(id);
                }
            }
        }

        tracing::debug!(
            "Form {}: {} structural, {} positional, {} skipped subtrees",
            form,
            structural,
            fields.len() - structural,
            skipped.len()
        );
        Resolution { fields, structural, skipped }
    }

    /// Orphan fields between `form` and the next form in flattened order
    pub fn positional_fields(&self, index: &NodeIndex, form: &NodeId) -> Vec<NodeId> {
        let Some(start) = index.position(form) else {
            return Vec::new();
        };
        let end = index.next_form_after(start).unwrap_or(index.len());

        index.nodes()[start + 1..end]
            .iter()
            .filter(|n| self.is_field(&n.node_type))
            .filter(|n| index.form_ancestor(&n.id).is_none())
            .map(|n| n.id.clone())
            .collect()
    }
}

/// Generic containment search below `root`.
///
/// Expands containers level by level (lookups within a level run
/// concurrently), then emits fields in pre-order over the fetched child
/// lists so the result follows document order. Cycles are cut by a visited
/// set; expansion stops after `max_depth` container levels. A failed child
/// lookup skips that subtree only.
pub async fn containment_search<P, C, F>(
    provider: &P,
    index: &NodeIndex,
    root: &NodeId,
    is_container: C,
    is_field: F,
    max_depth: usize,
) -> (Vec<NodeId>, Vec<SkippedSubtree>)
where
    P: DocumentProvider + ?Sized,
    C: Fn(&NodeType) -> bool,
    F: Fn(&NodeType) -> bool,
{
    let mut fetched: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    let mut skipped = Vec::new();
    let mut visited: HashSet<NodeId> = HashSet::new();
    visited.insert(root.clone());

    let mut frontier = vec![root.clone()];
    let mut depth = 0;
    while !frontier.is_empty() {
        if depth > max_depth {
            tracing::warn!(
                "Containment search below {} stopped at depth {} ({} containers unexpanded)",
                root,
                max_depth,
                frontier.len()
            );
            break;
        }

        let results = join_all(frontier.iter().map(|id| provider.get_children(id))).await;

        let mut next = Vec::new();
        for (id, result) in frontier.iter().zip(results) {
            match result {
                Ok(children) => {
                    for child in &children {
                        let Some(node) = index.get(child) else {
                            tracing::debug!("Child {} of {} is not in the snapshot", child, id);
                            continue;
                        };
                        if is_container(&node.node_type) && visited.insert(child.clone()) {
                            next.push(child.clone());
                        }
                    }
                    fetched.insert(id.clone(), children);
                }
                Err(err) => {
                    tracing::warn!("Skipping subtree {}: {}", id, err);
                    skipped.push(SkippedSubtree {
                        node: id.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        frontier = next;
        depth += 1;
    }

    let mut fields = Vec::new();
    let mut emitted = HashSet::new();
    let mut walked = HashSet::new();
    emit_preorder(root, &fetched, index, &is_field, &mut walked, &mut emitted, &mut fields);
    (fields, skipped)
}

fn emit_preorder<F>(
    id: &NodeId,
    fetched: &HashMap<NodeId, Vec<NodeId>>,
    index: &NodeIndex,
    is_field: &F,
    walked: &mut HashSet<NodeId>,
    emitted: &mut HashSet<NodeId>,
    out: &mut Vec<NodeId>,
) where
    F: Fn(&NodeType) -> bool,
{
    if !walked.insert(id.clone()) {
        return;
    }
    let Some(children) = fetched.get(id) else {
        return;
    };
    for child in children {
        let Some(node) = index.get(child) else {
            continue;
        };
        if is_field(&node.node_type) {
            if emitted.insert(child.clone()) {
                out.push(child.clone());
            }
        } else if fetched.contains_key(child) {
            emit_preorder(child, fetched, index, is_field, walked, emitted, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formguard_dom::{MemoryDocument, Node};

    fn resolve(doc: &MemoryDocument, form: &NodeId) -> Resolution {
        smol::block_on(async {
            let index = doc.snapshot().await.unwrap();
            FieldResolver::default().resolve_fields(doc, &index, form).await
        })
    }

    #[test]
    fn test_direct_and_nested_fields() {
        let doc = MemoryDocument::new();
        let form = doc.append(None, NodeType::Form, &[]).unwrap();
        let a = doc.append(Some(&form), NodeType::TextInput, &[]).unwrap();
        let row = doc.append(Some(&form), NodeType::HFlex, &[]).unwrap();
        let col = doc.append(Some(&row), NodeType::VFlex, &[]).unwrap();
        let b = doc.append(Some(&col), NodeType::TextArea, &[]).unwrap();
        let c = doc.append(Some(&form), NodeType::TextInput, &[]).unwrap();

        let res = resolve(&doc, &form);
        assert_eq!(res.fields, vec![a, b, c]);
        assert_eq!(res.structural, 3);
        assert!(res.skipped.is_empty());
    }

    #[test]
    fn test_structural_equivalence_across_container_types() {
        let kinds = [
            NodeType::Block,
            NodeType::VFlex,
            NodeType::HFlex,
            NodeType::Container,
            NodeType::GenericWrapper,
        ];

        let mut results = Vec::new();
        for rotation in 0..kinds.len() {
            let doc = MemoryDocument::new();
            let form = doc.append_node(None, Node::new("form", NodeType::Form)).unwrap();
            doc.append_node(Some(&form), Node::new("f0", NodeType::TextInput)).unwrap();
            let mut parent = form.clone();
            for depth in 1..=5 {
                let kind = kinds[(rotation + depth) % kinds.len()].clone();
                parent = doc
                    .append_node(Some(&parent), Node::new(format!("c{}", depth), kind))
                    .unwrap();
                doc.append_node(Some(&parent), Node::new(format!("f{}", depth), NodeType::TextInput))
                    .unwrap();
            }
            let mut ids: Vec<String> = resolve(&doc, &form)
                .fields
                .iter()
                .map(|id| id.as_str().to_string())
                .collect();
            ids.sort();
            results.push(ids);
        }

        assert_eq!(results[0].len(), 6);
        assert!(results.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_non_container_not_searched() {
        let doc = MemoryDocument::new();
        let form = doc.append(None, NodeType::Form, &[]).unwrap();
        let widget = doc.append(Some(&form), NodeType::Other("Slider".into()), &[]).unwrap();
        doc.append(Some(&widget), NodeType::TextInput, &[]).unwrap();

        let res = resolve(&doc, &form);
        assert!(res.fields.is_empty());
    }

    #[test]
    fn test_cycle_terminates() {
        let nodes = vec![
            Node::new("form", NodeType::Form).with_children(vec!["a".into()]),
            Node::new("a", NodeType::Block).with_children(vec!["b".into(), "x".into()]),
            Node::new("b", NodeType::Block).with_children(vec!["a".into()]),
            Node::new("x", NodeType::TextInput),
        ];
        let doc = MemoryDocument::from_nodes(nodes).unwrap();
        let res = resolve(&doc, &NodeId::from("form"));
        assert_eq!(res.fields, vec![NodeId::from("x")]);
    }

    #[test]
    fn test_depth_bound() {
        let doc = MemoryDocument::new();
        let form = doc.append(None, NodeType::Form, &[]).unwrap();
        let outer = doc.append(Some(&form), NodeType::Block, &[]).unwrap();
        let inner = doc.append(Some(&outer), NodeType::Block, &[]).unwrap();
        let shallow = doc.append(Some(&outer), NodeType::TextInput, &[]).unwrap();
        doc.append(Some(&inner), NodeType::TextInput, &[]).unwrap();

        let resolver = FieldResolver::new(ResolverConfig {
            max_depth: 1,
            positional_fallback: false,
            ..Default::default()
        });
        let res = smol::block_on(async {
            let index = doc.snapshot().await.unwrap();
            resolver.resolve_fields(&doc, &index, &form).await
        });
        assert_eq!(res.fields, vec![shallow]);
    }

    #[test]
    fn test_failed_lookup_skips_subtree_only() {
        let doc = MemoryDocument::new();
        let form = doc.append(None, NodeType::Form, &[]).unwrap();
        let broken = doc.append(Some(&form), NodeType::Container, &[]).unwrap();
        doc.append(Some(&broken), NodeType::TextInput, &[]).unwrap();
        let ok = doc.append(Some(&form), NodeType::TextInput, &[]).unwrap();
        doc.fail_reads(&broken);

        let res = resolve(&doc, &form);
        assert_eq!(res.fields, vec![ok]);
        assert_eq!(res.skipped.len(), 1);
        assert_eq!(res.skipped[0].node, broken);
    }

    #[test]
    fn test_positional_assigns_to_preceding_form_only() {
        let doc = MemoryDocument::new();
        let first = doc.append(None, NodeType::Form, &[]).unwrap();
        let orphan = doc.append(None, NodeType::TextInput, &[]).unwrap();
        let second = doc.append(None, NodeType::Form, &[]).unwrap();
        let owned = doc.append(Some(&second), NodeType::TextInput, &[]).unwrap();

        let first_res = resolve(&doc, &first);
        assert_eq!(first_res.fields, vec![orphan.clone()]);
        assert_eq!(first_res.structural, 0);
        assert_eq!(first_res.positional(), &[orphan.clone()]);

        let second_res = resolve(&doc, &second);
        assert_eq!(second_res.fields, vec![owned]);
        assert!(!second_res.fields.contains(&orphan));
    }

    #[test]
    fn test_merge_deduplicates() {
        // "x" is listed under the form, but its first declared parent is a
        // wrapper outside every form, so it is also a positional candidate.
        let nodes = vec![
            Node::new("wrap", NodeType::Container).with_children(vec!["x".into()]),
            Node::new("form", NodeType::Form).with_children(vec!["x".into()]),
            Node::new("x", NodeType::TextInput),
        ];
        let doc = MemoryDocument::from_nodes(nodes).unwrap();
        let res = resolve(&doc, &NodeId::from("form"));
        assert_eq!(res.fields, vec![NodeId::from("x")]);
        assert_eq!(res.structural, 1);
    }

    #[test]
    fn test_duplicate_child_reference_emitted_once() {
        let nodes = vec![
            Node::new("form", NodeType::Form).with_children(vec!["a".into(), "b".into()]),
            Node::new("a", NodeType::Block).with_children(vec!["x".into()]),
            Node::new("b", NodeType::Block).with_children(vec!["x".into()]),
            Node::new("x", NodeType::TextInput),
        ];
        let doc = MemoryDocument::from_nodes(nodes).unwrap();
        let res = resolve(&doc, &NodeId::from("form"));
        assert_eq!(res.fields, vec![NodeId::from("x")]);
    }
}
