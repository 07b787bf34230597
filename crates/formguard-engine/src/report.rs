//! Operation Reports
//!
//! Recovered failures never abort an operation; they are collected here.

use formguard_a11y::AttributeMutationSet;
use formguard_dom::NodeId;
use formguard_forms::ResolvedForm;
use serde::Serialize;

use crate::ValidationStateRecord;

/// Which quota was hit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitKind {
    MaxForms,
    MaxRequiredFieldsPerForm,
}

/// A recovered, single-item failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Issue {
    /// A node read or write failed; the node was skipped
    #[error("Lookup failed on {node}: {reason}")]
    LookupFailure { node: NodeId, reason: String },

    /// A field resolved into more than one form; the first form keeps it
    #[error("Field {field} resolved into {rejected} but belongs to {kept}")]
    ResolutionAmbiguity { field: NodeId, kept: NodeId, rejected: NodeId },

    /// A plan quota stopped part of the operation. `requested` is `None`
    /// when the current usage could not be read.
    #[error("Form {form} exceeds {limit:?} ({allowed} allowed)")]
    LimitExceeded {
        form: NodeId,
        limit: LimitKind,
        allowed: usize,
        requested: Option<usize>,
    },

    /// Reading or writing validation state failed
    #[error("Persistence failed for {form:?}: {reason}")]
    PersistenceFailure { form: Option<NodeId>, reason: String },

    /// A compensating rollback did not complete
    #[error("Rollback failed on {node}: {reason}")]
    RollbackFailure { node: NodeId, reason: String },
}

/// One scanned form
#[derive(Debug, Clone, Serialize)]
pub struct FormScan {
    pub form: ResolvedForm,
    /// Sentinel on the form node or a persisted `applied` record
    pub has_existing_validations: bool,
    pub record: Option<ValidationStateRecord>,
}

/// Result of a scan
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    pub forms: Vec<FormScan>,
    pub issues: Vec<Issue>,
}

impl ScanReport {
    pub fn form(&self, id: &NodeId) -> Option<&FormScan> {
        self.forms.iter().find(|f| &f.form.node_id == id)
    }

    /// Resolved forms only
    pub fn resolved_forms(&self) -> Vec<ResolvedForm> {
        self.forms.iter().map(|f| f.form.clone()).collect()
    }
}

/// Result of applying validation to one form
#[derive(Debug, Clone, Default, Serialize)]
pub struct ApplyReport {
    pub form: NodeId,
    pub succeeded: usize,
    pub failed: usize,
    /// Fields no longer required, of an unsupported type, or of a type the
    /// plan does not support
    pub skipped: usize,
    /// Fields (or the whole form) held back by a quota
    pub limit_exceeded: usize,
    /// Previously annotated fields outside the applied set, annotation removed
    pub stripped: usize,
    /// Every mutation was reversed after a form-level failure
    pub rolled_back: bool,
    pub issues: Vec<Issue>,
}

impl ApplyReport {
    /// Mark every applied field as undone
    pub(crate) fn roll_back(&mut self) {
        self.rolled_back = true;
        self.failed += self.succeeded;
        self.succeeded = 0;
        self.stripped = 0;
    }
}

/// Result of removing validation from one form
#[derive(Debug, Clone, Default, Serialize)]
pub struct RemoveReport {
    pub form: NodeId,
    /// Fields whose annotation was removed
    pub removed: usize,
    /// Fields that carried no annotation
    pub unchanged: usize,
    pub failed: usize,
    pub issues: Vec<Issue>,
}

/// Planned mutations of one field
#[derive(Debug, Clone, Serialize)]
pub struct FieldPlan {
    pub field: NodeId,
    pub mutations: AttributeMutationSet,
}

/// Dry run of an apply
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationPlan {
    pub form: NodeId,
    pub fields: Vec<FieldPlan>,
    pub form_mutations: AttributeMutationSet,
    pub issues: Vec<Issue>,
}

impl ValidationPlan {
    /// Total number of attribute writes
    pub fn len(&self) -> usize {
        self.fields.iter().map(|f| f.mutations.len()).sum::<usize>() + self.form_mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of pruning persisted state
#[derive(Debug, Clone, Default, Serialize)]
pub struct PruneReport {
    pub pruned: Vec<NodeId>,
    pub kept: usize,
    pub issues: Vec<Issue>,
}
