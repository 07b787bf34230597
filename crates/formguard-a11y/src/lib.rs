//! Formguard Accessibility
//!
//! Declarative validation annotations for form fields.
//!
//! Features:
//! - Annotation contract shared with the client runtime
//! - Reversible attribute mutation sets with dry-run projection
//! - Idempotent, update-safe rule engine (apply / remove)

pub mod annotation;
mod mutation;
mod engine;

use formguard_dom::{DomError, NodeId};

pub use annotation::AnnotationState;
pub use mutation::{AttributeMutation, AttributeMutationSet};
pub use engine::{RuleConfig, RuleEngine};

/// Rule application error
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("Commit failed on {node} after {} of {total} mutations: {source}", .applied.len())]
    Commit {
        node: NodeId,
        /// Mutations written before the failure
        applied: AttributeMutationSet,
        total: usize,
        source: DomError,
    },
}
