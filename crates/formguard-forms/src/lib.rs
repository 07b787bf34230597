//! Formguard Forms
//!
//! Finds the required input fields of each form in a document snapshot and
//! classifies them from their labels.
//!
//! - [`FieldClassifier`]: pluggable label → [`FieldType`] strategy
//! - [`normalize_label`]: canonical field identifier
//! - [`FieldResolver`]: structural containment search plus positional fallback
//! - [`ResolvedForm`] / [`ResolvedField`]: filtered, classified result

mod classifier;
mod resolver;
mod field;

pub use classifier::{FieldClassifier, FieldType, KeywordClassifier, classify_by_label, normalize_label};
pub use resolver::{FieldResolver, Resolution, ResolverConfig, SkippedSubtree, containment_search};
pub use field::{ResolvedField, ResolvedForm, TOOL_REQUIRED_MARKER, field_label, form_name, is_marked_required};
