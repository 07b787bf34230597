//! Form Validator
//!
//! Caller-facing operations. Each one starts from a fresh snapshot so no
//! topology is trusted across a user-visible gap, and recovers single-item
//! failures into its report. Only an unreadable document is an error.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use formguard_a11y::{AttributeMutationSet, RuleConfig, RuleEngine, RuleError};
use formguard_dom::{DocumentProvider, DomError, NodeId, NodeIndex};
use formguard_forms::{FieldClassifier, FieldResolver, FieldType, KeywordClassifier, ResolvedField, ResolvedForm};

use crate::{
    ApplyReport, Config, FieldPlan, FormScan, Issue, LimitKind, LimitsCache, LimitsService, PruneReport,
    RemoveReport, ScanReport, StateStore, ValidationPlan, ValidationStateRecord,
};

/// Fatal validator error
#[derive(Debug, thiserror::Error)]
pub enum ValidatorError {
    #[error("Document unavailable: {0}")]
    DocumentUnavailable(#[source] DomError),
}

/// The part of a document an operation works on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentScope {
    /// Key of the persisted records (a page or site)
    pub scope_key: String,
    /// Only forms inside this subtree, when set
    pub root: Option<NodeId>,
}

impl DocumentScope {
    pub fn new(scope_key: impl Into<String>) -> Self {
        Self {
            scope_key: scope_key.into(),
            root: None,
        }
    }

    /// Restrict to the subtree under `root`
    pub fn within(mut self, root: impl Into<NodeId>) -> Self {
        self.root = Some(root.into());
        self
    }

    fn contains(&self, index: &NodeIndex, node: &NodeId) -> bool {
        self.root.as_ref().is_none_or(|root| index.is_within(node, root))
    }
}

/// Scans forms and applies or removes their validation
pub struct FormValidator {
    document: Arc<dyn DocumentProvider>,
    limits: Arc<dyn LimitsService>,
    store: Arc<dyn StateStore>,
    classifier: Arc<dyn FieldClassifier>,
    resolver: FieldResolver,
    config: Config,
}

impl FormValidator {
    pub fn new(
        document: Arc<dyn DocumentProvider>,
        limits: Arc<dyn LimitsService>,
        store: Arc<dyn StateStore>,
        config: Config,
    ) -> Self {
        Self {
            document,
            limits,
            store,
            classifier: Arc::new(KeywordClassifier::new()),
            resolver: FieldResolver::new(config.resolver.clone()),
            config,
        }
    }

    /// Replace the label classifier
    pub fn with_classifier(mut self, classifier: Arc<dyn FieldClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Empty limits cache using the configured window and defaults
    pub fn limits_cache(&self) -> LimitsCache {
        LimitsCache::new(self.config.limits_ttl(), self.config.default_limits.clone())
    }

    async fn snapshot(&self) -> Result<NodeIndex, ValidatorError> {
        self.document.snapshot().await.map_err(|e| {
            tracing::error!("Cannot read document: {}", e);
            ValidatorError::DocumentUnavailable(e)
        })
    }

    async fn load_states(&self, scope_key: &str, issues: &mut Vec<Issue>) -> Option<Vec<ValidationStateRecord>> {
        match self.store.get_validation_states(scope_key).await {
            Ok(records) => Some(records),
            Err(e) => {
                tracing::warn!("Cannot read validation states of {}: {}", scope_key, e);
                issues.push(Issue::PersistenceFailure {
                    form: None,
                    reason: e.to_string(),
                });
                None
            }
        }
    }

    /// Write the reverse of `set`. Failures are logged, reported and not
    /// retried.
    async fn rollback(&self, set: &AttributeMutationSet, issues: &mut Vec<Issue>) -> bool {
        if set.is_empty() {
            return true;
        }
        match set.reverse().commit(self.document.as_ref()).await {
            Ok(()) => {
                tracing::debug!("Rolled back {} mutations", set.len());
                true
            }
            Err(RuleError::Commit { node, source, .. }) => {
                tracing::error!("Rollback failed on {}: {}", node, source);
                issues.push(Issue::RollbackFailure {
                    node,
                    reason: source.to_string(),
                });
                false
            }
        }
    }

    /// Report a failed commit and undo its written prefix
    async fn recover_commit(&self, err: RuleError, issues: &mut Vec<Issue>) {
        let RuleError::Commit { node, applied, source, .. } = err;
        tracing::warn!("Write failed on {}: {}", node, source);
        issues.push(Issue::LookupFailure {
            node,
            reason: source.to_string(),
        });
        self.rollback(&applied, issues).await;
    }

    /// Every field node `form` reaches, before classification. Unreadable
    /// subtrees are reported.
    async fn resolve_members(&self, index: &NodeIndex, form: &NodeId, issues: &mut Vec<Issue>) -> Vec<NodeId> {
        let resolution = self.resolver.resolve_fields(self.document.as_ref(), index, form).await;
        for skipped in resolution.skipped {
            tracing::warn!("Skipped subtree {} of form {}: {}", skipped.node, form, skipped.reason);
            issues.push(Issue::LookupFailure {
                node: skipped.node,
                reason: skipped.reason,
            });
        }
        resolution.fields
    }

    /// The caller's fields of `form`, then every other field node the form
    /// currently reaches and no other form encloses. Covers fields dropped
    /// from the scan since they were annotated.
    async fn field_nodes(&self, index: &NodeIndex, form: &ResolvedForm, issues: &mut Vec<Issue>) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        let mut ids: Vec<NodeId> = form
            .fields
            .iter()
            .map(|f| f.node_id.clone())
            .filter(|id| seen.insert(id.clone()))
            .collect();
        if index.get(&form.node_id).is_none() {
            return ids;
        }
        for id in self.resolve_members(index, &form.node_id, issues).await {
            let enclosed_elsewhere = index.form_ancestor(&id).is_some_and(|owner| owner != &form.node_id);
            if !enclosed_elsewhere && seen.insert(id.clone()) {
                ids.push(id);
            }
        }
        ids
    }

    /// Discover the valid forms of a scope. Reads only.
    pub async fn scan(&self, scope: &DocumentScope) -> Result<ScanReport, ValidatorError> {
        let index = self.snapshot().await?;
        let mut report = ScanReport::default();
        let states = self
            .load_states(&scope.scope_key, &mut report.issues)
            .await
            .unwrap_or_default();

        // Field -> first form that resolved it
        let mut owners: HashMap<NodeId, NodeId> = HashMap::new();

        for form_node in index.forms().filter(|f| scope.contains(&index, &f.id)) {
            let form_id = &form_node.id;
            let members = self.resolve_members(&index, form_id, &mut report.issues).await;

            let mut field_ids = Vec::new();
            for id in members {
                match owners.get(&id) {
                    Some(owner) => {
                        tracing::warn!("Field {} also resolved into {}; kept by {}", id, form_id, owner);
                        report.issues.push(Issue::ResolutionAmbiguity {
                            field: id,
                            kept: owner.clone(),
                            rejected: form_id.clone(),
                        });
                    }
                    None => {
                        owners.insert(id.clone(), form_id.clone());
                        field_ids.push(id);
                    }
                }
            }

            let Some(form) = ResolvedForm::build(&index, form_node, &field_ids, self.classifier.as_ref()) else {
                continue;
            };
            let record = states.iter().find(|r| &r.form_id == form_id).cloned();
            let has_existing_validations =
                RuleEngine::has_sentinel(form_node) || record.as_ref().is_some_and(ValidationStateRecord::is_applied);

            report.forms.push(FormScan {
                form,
                has_existing_validations,
                record,
            });
        }

        tracing::info!(
            "Scan of {} found {} forms ({} issues)",
            scope.scope_key,
            report.forms.len(),
            report.issues.len()
        );
        Ok(report)
    }

    /// Annotate a form's fields, mark the form and persist its state
    pub async fn apply_validation(
        &self,
        scope: &DocumentScope,
        form: &ResolvedForm,
        rules: &RuleConfig,
        limits: &mut LimitsCache,
    ) -> Result<ApplyReport, ValidatorError> {
        self.apply_validation_at(scope, form, rules, limits, Utc::now()).await
    }

    /// [`apply_validation`](Self::apply_validation) with an explicit
    /// application instant
    pub async fn apply_validation_at(
        &self,
        scope: &DocumentScope,
        form: &ResolvedForm,
        rules: &RuleConfig,
        limits: &mut LimitsCache,
        applied_at: DateTime<Utc>,
    ) -> Result<ApplyReport, ValidatorError> {
        let index = self.snapshot().await?;
        let mut report = ApplyReport {
            form: form.node_id.clone(),
            ..Default::default()
        };

        let Some(form_node) = index.get(&form.node_id) else {
            tracing::warn!("Form {} is no longer in the document", form.node_id);
            report.failed = form.fields.len();
            report.issues.push(Issue::LookupFailure {
                node: form.node_id.clone(),
                reason: "form not in document".to_string(),
            });
            return Ok(report);
        };

        let plan = limits.get(self.limits.as_ref(), &self.config.plan_tier).await;
        // With unreadable states the form count is unknown; only a form
        // already carrying the sentinel may proceed.
        let states = self.load_states(&scope.scope_key, &mut report.issues).await;
        let has_sentinel = RuleEngine::has_sentinel(form_node);
        let (already_applied, applied_forms) = match &states {
            Some(states) => (
                has_sentinel || states.iter().any(|r| r.form_id == form.node_id && r.is_applied()),
                Some(states.iter().filter(|r| r.is_applied()).count()),
            ),
            None => (has_sentinel, None),
        };
        if !already_applied && applied_forms.is_none_or(|n| n >= plan.max_forms) {
            match applied_forms {
                Some(n) => tracing::warn!("Form quota reached ({} of {})", n, plan.max_forms),
                None => tracing::warn!("Form quota unknown, refusing new form {}", form.node_id),
            }
            report.limit_exceeded = form.fields.len();
            report.issues.push(Issue::LimitExceeded {
                form: form.node_id.clone(),
                limit: LimitKind::MaxForms,
                allowed: plan.max_forms,
                requested: applied_forms.map(|n| n + 1),
            });
            return Ok(report);
        }

        let engine = RuleEngine::new(rules.clone());
        let mut written = AttributeMutationSet::new();
        let mut applied: HashSet<NodeId> = HashSet::new();
        let mut eligible = 0;

        for requested in &form.fields {
            let Some(node) = index.get(&requested.node_id) else {
                tracing::warn!("Field {} is no longer in the document", requested.node_id);
                report.failed += 1;
                report.issues.push(Issue::LookupFailure {
                    node: requested.node_id.clone(),
                    reason: "field not in document".to_string(),
                });
                continue;
            };

            let field = ResolvedField::from_node(node, self.classifier.as_ref());
            if !field.required || field.field_type == FieldType::Unsupported {
                tracing::debug!("Skipping {}: no longer a required supported field", field.node_id);
                report.skipped += 1;
                continue;
            }
            if !plan.supports(field.field_type) {
                tracing::debug!("Skipping {}: {} not in plan", field.node_id, field.field_type);
                report.skipped += 1;
                continue;
            }
            if eligible >= plan.max_required_fields_per_form {
                report.limit_exceeded += 1;
                continue;
            }
            eligible += 1;
            applied.insert(field.node_id.clone());

            let set = engine.apply(&field, node);
            match set.commit(self.document.as_ref()).await {
                Ok(()) => {
                    report.succeeded += 1;
                    written.extend(set);
                }
                Err(err) => {
                    report.failed += 1;
                    self.recover_commit(err, &mut report.issues).await;
                }
            }
        }

        for id in self.field_nodes(&index, form, &mut report.issues).await {
            if applied.contains(&id) {
                continue;
            }
            let Some(node) = index.get(&id) else {
                continue;
            };
            let set = engine.remove(node);
            if set.is_empty() {
                continue;
            }
            match set.commit(self.document.as_ref()).await {
                Ok(()) => {
                    tracing::debug!("Stripped stale annotation from {}", id);
                    report.stripped += 1;
                    written.extend(set);
                }
                Err(err) => self.recover_commit(err, &mut report.issues).await,
            }
        }

        if report.limit_exceeded > 0 {
            tracing::warn!(
                "Form {}: {} fields over the per-form quota of {}",
                form.node_id,
                report.limit_exceeded,
                plan.max_required_fields_per_form
            );
            report.issues.push(Issue::LimitExceeded {
                form: form.node_id.clone(),
                limit: LimitKind::MaxRequiredFieldsPerForm,
                allowed: plan.max_required_fields_per_form,
                requested: Some(eligible + report.limit_exceeded),
            });
        }

        if report.succeeded == 0 {
            tracing::info!("Nothing applied to form {}", form.node_id);
            return Ok(report);
        }

        let form_set = engine.apply_form(form_node, applied_at);
        if let Err(err) = form_set.commit(self.document.as_ref()).await {
            self.recover_commit(err, &mut report.issues).await;
            self.rollback(&written, &mut report.issues).await;
            report.roll_back();
            return Ok(report);
        }
        written.extend(form_set);

        let record = ValidationStateRecord::applied(&scope.scope_key, &form.node_id, applied_at);
        if let Err(e) = self.store.put_validation_state(record).await {
            tracing::warn!("Cannot persist state of {}, rolling back: {}", form.node_id, e);
            report.issues.push(Issue::PersistenceFailure {
                form: Some(form.node_id.clone()),
                reason: e.to_string(),
            });
            self.rollback(&written, &mut report.issues).await;
            report.roll_back();
            return Ok(report);
        }

        tracing::info!(
            "Applied validation to form {}: {} succeeded, {} failed",
            form.node_id,
            report.succeeded,
            report.failed
        );
        Ok(report)
    }

    /// Strip every annotation from a form. Best-effort and idempotent.
    pub async fn remove_validation(
        &self,
        scope: &DocumentScope,
        form: &ResolvedForm,
    ) -> Result<RemoveReport, ValidatorError> {
        let index = self.snapshot().await?;
        let engine = RuleEngine::new(self.config.rules.clone());
        let mut report = RemoveReport {
            form: form.node_id.clone(),
            ..Default::default()
        };

        for id in self.field_nodes(&index, form, &mut report.issues).await {
            let Some(node) = index.get(&id) else {
                report.failed += 1;
                report.issues.push(Issue::LookupFailure {
                    node: id,
                    reason: "field not in document".to_string(),
                });
                continue;
            };
            let set = engine.remove(node);
            if set.is_empty() {
                if form.field(&id).is_some() {
                    report.unchanged += 1;
                }
                continue;
            }
            match set.commit(self.document.as_ref()).await {
                Ok(()) => report.removed += 1,
                Err(RuleError::Commit { node, source, .. }) => {
                    tracing::warn!("Cannot remove annotation from {}: {}", node, source);
                    report.failed += 1;
                    report.issues.push(Issue::LookupFailure {
                        node,
                        reason: source.to_string(),
                    });
                }
            }
        }

        match index.get(&form.node_id) {
            Some(form_node) => {
                if let Err(RuleError::Commit { node, source, .. }) =
                    engine.remove_form(form_node).commit(self.document.as_ref()).await
                {
                    tracing::warn!("Cannot clear sentinel of {}: {}", node, source);
                    report.issues.push(Issue::LookupFailure {
                        node,
                        reason: source.to_string(),
                    });
                }
            }
            None => report.issues.push(Issue::LookupFailure {
                node: form.node_id.clone(),
                reason: "form not in document".to_string(),
            }),
        }

        let record = ValidationStateRecord::removed(&scope.scope_key, &form.node_id);
        if let Err(e) = self.store.put_validation_state(record).await {
            tracing::warn!("Cannot persist removal of {}: {}", form.node_id, e);
            report.issues.push(Issue::PersistenceFailure {
                form: Some(form.node_id.clone()),
                reason: e.to_string(),
            });
        }

        tracing::info!(
            "Removed validation from form {}: {} removed, {} unchanged, {} failed",
            form.node_id,
            report.removed,
            report.unchanged,
            report.failed
        );
        Ok(report)
    }

    /// Mutations an apply would write, without writing them
    pub async fn plan_validation(
        &self,
        form: &ResolvedForm,
        rules: &RuleConfig,
        applied_at: DateTime<Utc>,
    ) -> Result<ValidationPlan, ValidatorError> {
        let index = self.snapshot().await?;
        let engine = RuleEngine::new(rules.clone());
        let mut plan = ValidationPlan {
            form: form.node_id.clone(),
            ..Default::default()
        };

        for field in &form.fields {
            match index.get(&field.node_id) {
                Some(node) => plan.fields.push(FieldPlan {
                    field: field.node_id.clone(),
                    mutations: engine.apply(&ResolvedField::from_node(node, self.classifier.as_ref()), node),
                }),
                None => plan.issues.push(Issue::LookupFailure {
                    node: field.node_id.clone(),
                    reason: "field not in document".to_string(),
                }),
            }
        }
        match index.get(&form.node_id) {
            Some(form_node) => plan.form_mutations = engine.apply_form(form_node, applied_at),
            None => plan.issues.push(Issue::LookupFailure {
                node: form.node_id.clone(),
                reason: "form not in document".to_string(),
            }),
        }
        Ok(plan)
    }

    /// Delete persisted records whose form is gone from the document
    pub async fn prune_states(&self, scope: &DocumentScope) -> Result<PruneReport, ValidatorError> {
        let index = self.snapshot().await?;
        let mut report = PruneReport::default();
        let Some(states) = self.load_states(&scope.scope_key, &mut report.issues).await else {
            return Ok(report);
        };

        for record in states {
            if index.get(&record.form_id).is_some() {
                report.kept += 1;
                continue;
            }
            match self.store.delete_validation_state(&record.form_id).await {
                Ok(()) => {
                    tracing::debug!("Pruned state of missing form {}", record.form_id);
                    report.pruned.push(record.form_id);
                }
                Err(e) => {
                    tracing::warn!("Cannot prune state of {}: {}", record.form_id, e);
                    report.issues.push(Issue::PersistenceFailure {
                        form: Some(record.form_id),
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::info!("Pruned {} states of {}", report.pruned.len(), scope.scope_key);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryStateStore, StaticLimits};
    use formguard_dom::{MemoryDocument, NodeType};

    fn validator(doc: Arc<MemoryDocument>) -> FormValidator {
        FormValidator::new(doc, Arc::new(StaticLimits::new()), Arc::new(MemoryStateStore::new()), Config::default())
    }

    #[test]
    fn test_scope_restricts_forms() {
        let doc = Arc::new(MemoryDocument::new());
        let left = doc.append(None, NodeType::Container, &[]).unwrap();
        let right = doc.append(None, NodeType::Container, &[]).unwrap();
        for parent in [&left, &right] {
            let form = doc.append(Some(parent), NodeType::Form, &[]).unwrap();
            doc.append(Some(&form), NodeType::TextInput, &[("label", "Email"), ("required", "")])
                .unwrap();
        }

        let v = validator(doc);
        let all = smol::block_on(v.scan(&DocumentScope::new("p"))).unwrap();
        assert_eq!(all.forms.len(), 2);
        let some = smol::block_on(v.scan(&DocumentScope::new("p").within(right))).unwrap();
        assert_eq!(some.forms.len(), 1);
    }

    #[test]
    fn test_first_form_wins() {
        // A field declared under both forms
        let doc = Arc::new(MemoryDocument::new());
        let first = doc.append(None, NodeType::Form, &[("name", "first")]).unwrap();
        let shared = doc
            .append(Some(&first), NodeType::TextInput, &[("label", "Email"), ("required", "")])
            .unwrap();
        let second = doc.append(None, NodeType::Form, &[("name", "second")]).unwrap();
        doc.append(Some(&second), NodeType::TextInput, &[("label", "Phone"), ("required", "")])
            .unwrap();
        let mut second_node = doc.node(&second).unwrap();
        second_node.children.insert(0, shared.clone());
        let mut nodes: Vec<_> = doc.outline().into_iter().map(|(id, _)| doc.node(&id).unwrap()).collect();
        for n in nodes.iter_mut() {
            if n.id == second {
                *n = second_node.clone();
            }
        }
        let doc = Arc::new(MemoryDocument::from_nodes(nodes).unwrap());

        let report = smol::block_on(validator(doc).scan(&DocumentScope::new("p"))).unwrap();
        assert_eq!(report.form(&first).unwrap().form.fields.len(), 1);
        assert_eq!(report.form(&second).unwrap().form.fields.len(), 1);
        assert!(report.issues.contains(&Issue::ResolutionAmbiguity {
            field: shared,
            kept: first,
            rejected: second,
        }));
    }

    #[test]
    fn test_plan_writes_nothing() {
        let doc = Arc::new(MemoryDocument::new());
        let form = doc.append(None, NodeType::Form, &[]).unwrap();
        let input = doc
            .append(Some(&form), NodeType::TextInput, &[("label", "Email"), ("required", "")])
            .unwrap();
        let before = doc.to_json().unwrap();

        let v = validator(doc.clone());
        let scan = smol::block_on(v.scan(&DocumentScope::new("p"))).unwrap();
        let plan = smol::block_on(v.plan_validation(&scan.forms[0].form, &RuleConfig::default(), Utc::now())).unwrap();

        assert_eq!(plan.fields.len(), 1);
        assert_eq!(plan.fields[0].field, input);
        assert!(plan.fields[0].mutations.iter().any(|m| m.name == "type"));
        assert_eq!(plan.form_mutations.len(), 2);
        assert_eq!(doc.to_json().unwrap(), before);
    }
}
