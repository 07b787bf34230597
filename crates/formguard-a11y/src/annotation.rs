//! Annotation Contract
//!
//! Attribute names and values written by the rule engine and read back by the
//! client runtime, possibly in another process much later. Treat every name
//! and value here as a stable public interface.

use std::collections::BTreeMap;

/// Native required flag
pub const REQUIRED: &str = "required";
/// Required flag for custom widgets
pub const ARIA_REQUIRED: &str = "aria-required";
/// Input type (`email`, `tel`, `url`)
pub const TYPE: &str = "type";
/// Input pattern (implicitly anchored)
pub const PATTERN: &str = "pattern";
/// Id of the error display node for this field
pub const ERROR_ID: &str = "data-error-id";
/// Normalized field label
pub const FIELD_LABEL: &str = "data-field-label";
/// Opt-in for client-side error messaging
pub const AUTO_ERROR_MESSAGING: &str = "data-auto-error-messaging";
/// Tool-authored required marker
pub use formguard_forms::TOOL_REQUIRED_MARKER as REQUIRED_MARKER;
/// Host values overwritten by the engine, as a JSON object
pub const RESTORE: &str = "data-a11y-restore";

/// Form-level sentinel
pub const SENTINEL: &str = "data-a11y-validator";
/// Sentinel value
pub const SENTINEL_ENABLED: &str = "enabled";
/// RFC 3339 time of the last form-level apply
pub const APPLIED_AT: &str = "data-a11y-validator-applied-at";

/// Keys a host may also author; overwritten values are restored on removal
pub const HOST_VISIBLE_KEYS: [&str; 4] = [REQUIRED, ARIA_REQUIRED, TYPE, PATTERN];

/// Keys only the engine writes; any of them marks a node as annotated
pub const ENGINE_PRIVATE_KEYS: [&str; 5] =
    [ERROR_ID, FIELD_LABEL, AUTO_ERROR_MESSAGING, REQUIRED_MARKER, RESTORE];

/// Every key the engine can write on a field
pub const FIELD_KEYS: [&str; 9] = [
    REQUIRED,
    ARIA_REQUIRED,
    TYPE,
    PATTERN,
    ERROR_ID,
    FIELD_LABEL,
    AUTO_ERROR_MESSAGING,
    REQUIRED_MARKER,
    RESTORE,
];

/// Every key the engine can write on a form
pub const FORM_KEYS: [&str; 2] = [SENTINEL, APPLIED_AT];

/// Email pattern written on email fields
pub const EMAIL_PATTERN: &str = r"[^\s@]+@[^\s@]+\.[^\s@]+";

/// Phone pattern written on phone fields. The client runtime additionally
/// requires 10 to 15 digits once separators are stripped.
pub const PHONE_PATTERN: &str = r"[+]?[0-9\s().\-]{10,}";

/// Error display id for a normalized label
pub fn error_id_for(normalized_label: &str) -> String {
    if normalized_label.is_empty() {
        "field-error".to_string()
    } else {
        format!("{}-error", normalized_label)
    }
}

/// Declared validation rules of one field, read back from its attributes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationState {
    /// `required` present (not `"false"`) or `aria-required="true"`
    pub required: bool,
    pub input_type: Option<String>,
    pub pattern: Option<String>,
    pub error_id: Option<String>,
    pub field_label: Option<String>,
    pub auto_error_messaging: bool,
}

impl AnnotationState {
    /// Read the declared rules from an attribute lookup
    pub fn read<'a, F>(get: F) -> Self
    where
        F: Fn(&str) -> Option<&'a str>,
    {
        let native = get(REQUIRED).is_some_and(|v| !v.eq_ignore_ascii_case("false"));
        let aria = get(ARIA_REQUIRED) == Some("true");
        Self {
            required: native || aria,
            input_type: get(TYPE).map(|t| t.to_ascii_lowercase()),
            pattern: get(PATTERN).filter(|p| !p.is_empty()).map(str::to_string),
            error_id: get(ERROR_ID).map(str::to_string),
            field_label: get(FIELD_LABEL).map(str::to_string),
            auto_error_messaging: get(AUTO_ERROR_MESSAGING) == Some("true"),
        }
    }

    /// Read the declared rules from an attribute map
    pub fn from_attributes(attrs: &BTreeMap<String, String>) -> Self {
        Self::read(|key| attrs.get(key).map(String::as_str))
    }
}
