//! Formguard Runtime
//!
//! Interactive validation for annotated forms. Reads nothing but the
//! declarative attributes left by the rule engine, so it can run long after
//! (and far away from) the scan that produced them.

mod page;
mod validity;
mod runtime;

pub use page::Page;
pub use validity::{ValidityState, is_valid_email, is_valid_phone, is_valid_url, matches_pattern, validate};
pub use runtime::{FieldEvent, FieldState, SubmitOutcome, ValidationRuntime, display_label};
