//! Field Validity
//!
//! Constraint checks for the declared rules of one field.

use std::sync::LazyLock;

use formguard_a11y::AnnotationState;
use formguard_a11y::annotation::{EMAIL_PATTERN, PHONE_PATTERN};
use regex::Regex;

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid regex"));

static PHONE_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9]{10,15}$").expect("valid regex"));

/// Patterns the rule engine writes, compiled once
static EMAIL_FIELD: LazyLock<Regex> = LazyLock::new(|| anchored(EMAIL_PATTERN).expect("valid regex"));

static PHONE_FIELD: LazyLock<Regex> = LazyLock::new(|| anchored(PHONE_PATTERN).expect("valid regex"));

const PHONE_SEPARATORS: [char; 5] = [' ', '(', ')', '-', '.'];

/// Validity state for a field
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidityState {
    /// Required but empty
    pub value_missing: bool,
    /// Value does not fit the declared type
    pub type_mismatch: bool,
    /// Value does not match the declared pattern
    pub pattern_mismatch: bool,
    input_type: Option<String>,
}

impl ValidityState {
    /// Check if all constraints are satisfied
    pub fn is_valid(&self) -> bool {
        !self.value_missing && !self.type_mismatch && !self.pattern_mismatch
    }

    /// Message for the first failing constraint, `None` when valid
    pub fn validation_message(&self, label: &str) -> Option<String> {
        if self.value_missing {
            return Some(format!("{} is required", label));
        }
        if self.type_mismatch {
            return Some(type_message(self.input_type.as_deref(), label));
        }
        if self.pattern_mismatch {
            return Some(match self.input_type.as_deref() {
                Some("email") | Some("tel") | Some("url") => type_message(self.input_type.as_deref(), label),
                _ => format!("{} is not in the expected format", label),
            });
        }
        None
    }
}

fn type_message(input_type: Option<&str>, label: &str) -> String {
    match input_type {
        Some("email") => "Please enter a valid email address".to_string(),
        Some("tel") => "Please enter a valid phone number".to_string(),
        Some("url") => "Please enter a valid URL".to_string(),
        _ => format!("{} is not valid", label),
    }
}

/// Evaluate a value against the declared rules.
///
/// An empty optional field is always valid. Type checks only run for the
/// types the rule engine emits; any other `type` is left to the host.
pub fn validate(state: &AnnotationState, value: &str) -> ValidityState {
    let value = value.trim();
    let mut validity = ValidityState {
        input_type: state.input_type.clone(),
        ..Default::default()
    };

    if value.is_empty() {
        validity.value_missing = state.required;
        return validity;
    }

    validity.type_mismatch = match state.input_type.as_deref() {
        Some("email") => !is_valid_email(value),
        Some("tel") => !is_valid_phone(value),
        Some("url") => !is_valid_url(value),
        _ => false,
    };

    if let Some(pattern) = &state.pattern {
        validity.pattern_mismatch = matches_pattern(pattern, value) == Some(false);
    }

    validity
}

pub fn is_valid_email(value: &str) -> bool {
    EMAIL.is_match(value)
}

/// Digits with optional separators and a leading `+`; 10 to 15 digits once
/// separators are stripped.
pub fn is_valid_phone(value: &str) -> bool {
    let allowed = value
        .char_indices()
        .all(|(i, c)| c.is_ascii_digit() || PHONE_SEPARATORS.contains(&c) || (c == '+' && i == 0));
    if !allowed {
        return false;
    }
    let stripped: String = value.chars().filter(|c| !PHONE_SEPARATORS.contains(c)).collect();
    PHONE_DIGITS.is_match(&stripped)
}

/// Absolute URL with a scheme
pub fn is_valid_url(value: &str) -> bool {
    url::Url::parse(value).is_ok()
}

/// Whole-value match against an HTML-style pattern.
/// `None` when the pattern does not compile; such patterns are ignored.
pub fn matches_pattern(pattern: &str, value: &str) -> Option<bool> {
    match pattern {
        EMAIL_PATTERN => return Some(EMAIL_FIELD.is_match(value)),
        PHONE_PATTERN => return Some(PHONE_FIELD.is_match(value)),
        _ => {}
    }
    match anchored(pattern) {
        Ok(re) => Some(re.is_match(value)),
        Err(e) => {
            tracing::warn!("Ignoring invalid pattern {:?}: {}", pattern, e);
            None
        }
    }
}

fn anchored(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{})$", pattern))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(required: bool, input_type: Option<&str>, pattern: Option<&str>) -> AnnotationState {
        AnnotationState {
            required,
            input_type: input_type.map(str::to_string),
            pattern: pattern.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_email() {
        assert!(is_valid_email("ann@example.com"));
        assert!(!is_valid_email("ann@example"));
        assert!(!is_valid_email("ann example@x.io"));
        assert!(!is_valid_email("@example.com"));
    }

    #[test]
    fn test_phone() {
        assert!(is_valid_phone("+1 (555) 123-4567"));
        assert!(is_valid_phone("555.123.4567"));
        assert!(is_valid_phone("5551234567"));
        assert!(!is_valid_phone("555-1234"));
        assert!(!is_valid_phone("555-123-4567 ext 2"));
        assert!(!is_valid_phone("1+5551234567"));
        assert!(!is_valid_phone("1234567890123456"));
    }

    #[test]
    fn test_phone_accepted_values_match_declared_pattern() {
        for value in ["+1 (555) 123-4567", "555.123.4567", "+44 20 7946 0958"] {
            assert!(is_valid_phone(value));
            assert_eq!(matches_pattern(PHONE_PATTERN, value), Some(true), "{}", value);
        }
    }

    #[test]
    fn test_url() {
        assert!(is_valid_url("https://example.com/about"));
        assert!(!is_valid_url("example.com"));
    }

    #[test]
    fn test_required_empty() {
        let v = validate(&state(true, None, None), "   ");
        assert!(v.value_missing);
        assert_eq!(v.validation_message("Full name").as_deref(), Some("Full name is required"));

        let v = validate(&state(false, Some("email"), Some(EMAIL_PATTERN)), "");
        assert!(v.is_valid());
    }

    #[test]
    fn test_type_mismatch_message() {
        let v = validate(&state(true, Some("email"), Some(EMAIL_PATTERN)), "nope");
        assert!(v.type_mismatch);
        assert!(v.pattern_mismatch);
        assert_eq!(v.validation_message("Work email").as_deref(), Some("Please enter a valid email address"));

        let v = validate(&state(true, Some("tel"), Some(PHONE_PATTERN)), "12");
        assert_eq!(v.validation_message("Phone").as_deref(), Some("Please enter a valid phone number"));

        let v = validate(&state(true, Some("url"), None), "not a url");
        assert_eq!(v.validation_message("Website").as_deref(), Some("Please enter a valid URL"));
    }

    #[test]
    fn test_custom_pattern() {
        let s = state(true, Some("text"), Some("[A-Z]{3}"));
        assert!(validate(&s, "ABC").is_valid());
        let v = validate(&s, "ABCD");
        assert!(v.pattern_mismatch);
        assert_eq!(v.validation_message("Code").as_deref(), Some("Code is not in the expected format"));
    }

    #[test]
    fn test_engine_patterns_use_precompiled() {
        assert_eq!(EMAIL_FIELD.as_str(), anchored(EMAIL_PATTERN).unwrap().as_str());
        assert_eq!(matches_pattern(EMAIL_PATTERN, "ann@example.com"), Some(true));
        assert_eq!(matches_pattern(EMAIL_PATTERN, "x ann@example.com"), Some(false));
        assert_eq!(matches_pattern(PHONE_PATTERN, "555-123-4567"), Some(true));
        assert_eq!(matches_pattern(PHONE_PATTERN, "555"), Some(false));
    }

    #[test]
    fn test_invalid_pattern_ignored() {
        let s = state(true, None, Some("[unclosed"));
        assert!(validate(&s, "anything").is_valid());
    }
}
