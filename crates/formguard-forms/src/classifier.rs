//! Field Classification
//!
//! Keyword matching on label text. Fuzzy by nature: a checkbox labelled
//! "Email Newsletter Opt-in" classifies as email.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Validation type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Email,
    Phone,
    Url,
    Plain,
    Message,
    Unsupported,
}

impl FieldType {
    /// Every type, in classification priority order
    pub const ALL: [FieldType; 6] = [
        FieldType::Email,
        FieldType::Phone,
        FieldType::Url,
        FieldType::Plain,
        FieldType::Message,
        FieldType::Unsupported,
    ];

    /// Lowercase name (matches plan `supported_field_types` entries)
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Url => "url",
            Self::Plain => "plain",
            Self::Message => "message",
            Self::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Label classification strategy
pub trait FieldClassifier: Send + Sync {
    /// Map label text to a field type. Must be total and free of I/O.
    fn classify(&self, label: &str) -> FieldType;
}

const EMAIL_KEYWORDS: &[&str] = &["email", "e-mail", "mail"];
const PHONE_KEYWORDS: &[&str] = &["phone", "tel", "mobile", "fax"];
const URL_KEYWORDS: &[&str] = &["url", "website", "link", "profile"];
const NAME_KEYWORDS: &[&str] = &["name"];
const MESSAGE_KEYWORDS: &[&str] = &["message", "comment", "feedback", "inquiry", "enquiry"];

/// Default substring classifier. First family that matches wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl FieldClassifier for KeywordClassifier {
    fn classify(&self, label: &str) -> FieldType {
        let label = label.trim().to_lowercase();
        if label.is_empty() {
            return FieldType::Unsupported;
        }

        let families: [(&[&str], FieldType); 5] = [
            (EMAIL_KEYWORDS, FieldType::Email),
            (PHONE_KEYWORDS, FieldType::Phone),
            (URL_KEYWORDS, FieldType::Url),
            (NAME_KEYWORDS, FieldType::Plain),
            (MESSAGE_KEYWORDS, FieldType::Message),
        ];

        families
            .iter()
            .find(|(keywords, _)| keywords.iter().any(|k| label.contains(k)))
            .map(|(_, field_type)| *field_type)
            .unwrap_or(FieldType::Unsupported)
    }
}

/// Classify with the default keyword lists
pub fn classify_by_label(label: &str) -> FieldType {
    KeywordClassifier.classify(label)
}

/// Canonical lowercase-hyphenated identifier for a label.
///
/// Runs of whitespace, `-` and `_` become one hyphen, anything outside
/// `[a-z0-9-]` is dropped, and no leading, trailing or doubled hyphen
/// survives, which makes the function idempotent.
///
/// Two labels that normalize to the same identifier cannot be told apart by
/// anything keyed on it (error ids included).
pub fn normalize_label(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    let mut pending_hyphen = false;

    for c in label.chars().flat_map(char::to_lowercase) {
        if c.is_whitespace() || c == '-' || c == '_' {
            pending_hyphen = true;
        } else if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_hyphen && !out.is_empty() {
                out.push('-');
            }
            pending_hyphen = false;
            out.push(c);
        }
    }

    out
}
