//! Formguard Engine
//!
//! Ties resolution, classification and the rule engine to the host's
//! document, plan limits and persisted validation state.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use formguard_engine::{Config, DocumentScope, FormValidator, LimitsCache, MemoryStateStore, StaticLimits};
//!
//! let validator = FormValidator::new(document, Arc::new(StaticLimits::default()), Arc::new(MemoryStateStore::new()), Config::default());
//! let scope = DocumentScope::new("page-1");
//! let report = smol::block_on(validator.scan(&scope))?;
//! ```

mod config;
mod limits;
mod persistence;
mod report;
mod validator;

pub use config::Config;
pub use limits::{LimitsCache, LimitsError, LimitsService, PlanLimits, StaticLimits};
pub use persistence::{JsonFileStateStore, MemoryStateStore, StateStore, StoreError, ValidationStateRecord, ValidationStatus};
pub use report::{ApplyReport, FieldPlan, FormScan, Issue, LimitKind, PruneReport, RemoveReport, ScanReport, ValidationPlan};
pub use validator::{DocumentScope, FormValidator, ValidatorError};

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
