//! Validation Runtime
//!
//! Per-field state machine and error display for one annotated form.
//!
//! ```text
//! pristine --focus/input--> touched --blur/submit--> invalid | valid
//! invalid --input--> touched (error cleared)
//! valid   --input--> touched
//! ```

use std::collections::HashMap;

use formguard_a11y::AnnotationState;
use formguard_a11y::annotation::{
    ARIA_REQUIRED, AUTO_ERROR_MESSAGING, ERROR_ID, FIELD_LABEL, PATTERN, REQUIRED, TYPE, error_id_for,
};
use formguard_dom::{NodeId, NodeType};

use crate::page::Page;
use crate::validity::{ValidityState, validate};

const ARIA_INVALID: &str = "aria-invalid";
const ARIA_DESCRIBEDBY: &str = "aria-describedby";
const HIDDEN: &str = "hidden";

/// Field interaction state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldState {
    Pristine,
    Touched,
    Invalid,
    Valid,
}

/// Field-level UI event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldEvent {
    Focus,
    Input,
    Blur,
}

/// Result of handling a submit event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Submission cancelled; these fields are invalid
    Blocked { invalid: Vec<NodeId> },
    /// All fields valid; one programmatic submission was requested
    Submitted,
    /// The echo of our own request; let it through untouched
    PassThrough,
}

/// Runtime bound to one form on a page
pub struct ValidationRuntime<'p, P: Page + ?Sized> {
    page: &'p P,
    form: NodeId,
    fields: Vec<NodeId>,
    states: HashMap<NodeId, FieldState>,
    resubmit_pending: bool,
}

impl<'p, P: Page + ?Sized> ValidationRuntime<'p, P> {
    /// Bind to `form`. Managed fields are the nodes opting into error
    /// messaging between the form and the next form in document order.
    pub fn attach(page: &'p P, form: &NodeId) -> Self {
        let outline = page.outline();
        let start = outline.iter().position(|(id, _)| id == form).map(|pos| pos + 1);

        let fields: Vec<NodeId> = match start {
            Some(start) => outline[start..]
                .iter()
                .take_while(|(_, t)| *t != NodeType::Form)
                .filter(|(id, _)| page.attribute(id, AUTO_ERROR_MESSAGING).as_deref() == Some("true"))
                .map(|(id, _)| id.clone())
                .collect(),
            None => {
                tracing::warn!("Form {} not found on page", form);
                Vec::new()
            }
        };

        tracing::debug!("Runtime attached to {} with {} fields", form, fields.len());
        let states = fields.iter().map(|id| (id.clone(), FieldState::Pristine)).collect();
        Self {
            page,
            form: form.clone(),
            fields,
            states,
            resubmit_pending: false,
        }
    }

    pub fn form(&self) -> &NodeId {
        &self.form
    }

    /// Managed fields in document order
    pub fn fields(&self) -> &[NodeId] {
        &self.fields
    }

    pub fn state(&self, field: &NodeId) -> Option<FieldState> {
        self.states.get(field).copied()
    }

    /// Handle a field event. Returns the new state, or `None` for
    /// fields this runtime does not manage.
    pub fn handle(&mut self, field: &NodeId, event: FieldEvent) -> Option<FieldState> {
        let current = self.state(field)?;
        let next = match (current, event) {
            (FieldState::Pristine, FieldEvent::Focus | FieldEvent::Input) => FieldState::Touched,
            (FieldState::Invalid, FieldEvent::Input) => {
                self.clear_error(field);
                FieldState::Touched
            }
            (FieldState::Valid, FieldEvent::Input) => FieldState::Touched,
            (FieldState::Pristine, FieldEvent::Blur) => FieldState::Pristine,
            (_, FieldEvent::Blur) => self.validate_field(field),
            (state, _) => state,
        };
        self.states.insert(field.clone(), next);
        Some(next)
    }

    /// Handle a submit event on the form
    pub fn submit(&mut self) -> SubmitOutcome {
        if self.resubmit_pending {
            self.resubmit_pending = false;
            return SubmitOutcome::PassThrough;
        }

        let mut invalid = Vec::new();
        for field in self.fields.clone() {
            let state = self.validate_field(&field);
            self.states.insert(field.clone(), state);
            if state == FieldState::Invalid {
                invalid.push(field);
            }
        }

        if !invalid.is_empty() {
            tracing::debug!("Submit of {} blocked by {} fields", self.form, invalid.len());
            return SubmitOutcome::Blocked { invalid };
        }

        self.resubmit_pending = true;
        self.page.request_submit(&self.form);
        SubmitOutcome::Submitted
    }

    /// Current validity of a field from its declared rules and value
    pub fn check(&self, field: &NodeId) -> ValidityState {
        validate(&self.annotation(field), &self.page.value(field))
    }

    fn validate_field(&self, field: &NodeId) -> FieldState {
        let annotation = self.annotation(field);
        let validity = validate(&annotation, &self.page.value(field));
        match validity.validation_message(&display_label(&annotation)) {
            Some(message) => {
                self.show_error(field, &annotation, &message);
                FieldState::Invalid
            }
            None => {
                self.clear_error(field);
                FieldState::Valid
            }
        }
    }

    fn annotation(&self, field: &NodeId) -> AnnotationState {
        let keys = [REQUIRED, ARIA_REQUIRED, TYPE, PATTERN, ERROR_ID, FIELD_LABEL, AUTO_ERROR_MESSAGING];
        let values: HashMap<&str, String> = keys
            .iter()
            .filter_map(|key| self.page.attribute(field, key).map(|v| (*key, v)))
            .collect();
        AnnotationState::read(|key| values.get(key).map(String::as_str))
    }

    fn error_id(&self, field: &NodeId, annotation: &AnnotationState) -> String {
        annotation
            .error_id
            .clone()
            .unwrap_or_else(|| error_id_for(annotation.field_label.as_deref().unwrap_or(field.as_str())))
    }

    fn show_error(&self, field: &NodeId, annotation: &AnnotationState, message: &str) {
        let error_id = self.error_id(field, annotation);
        let node = match self.page.find_by_id(&error_id) {
            Some(node) => node,
            None => {
                let attrs = [("id", error_id.as_str()), ("role", "alert"), ("aria-live", "polite")];
                match self.page.insert_after(field, NodeType::ErrorText, &attrs) {
                    Ok(node) => node,
                    Err(e) => {
                        tracing::warn!("Cannot create error display for {}: {}", field, e);
                        return;
                    }
                }
            }
        };

        self.page.set_text(&node, message);
        let writes = [
            self.page.remove_attribute(&node, HIDDEN),
            self.page.set_attribute(field, ARIA_INVALID, "true"),
            self.page.set_attribute(field, ARIA_DESCRIBEDBY, &error_id),
        ];
        for result in writes {
            if let Err(e) = result {
                tracing::warn!("Error display for {} incomplete: {}", field, e);
            }
        }
    }

    fn clear_error(&self, field: &NodeId) {
        let annotation = self.annotation(field);
        let error_id = self.error_id(field, &annotation);
        let mut writes = vec![self.page.remove_attribute(field, ARIA_INVALID)];
        if self.page.attribute(field, ARIA_DESCRIBEDBY).as_deref() == Some(error_id.as_str()) {
            writes.push(self.page.remove_attribute(field, ARIA_DESCRIBEDBY));
        }
        if let Some(node) = self.page.find_by_id(&error_id) {
            self.page.set_text(&node, "");
            writes.push(self.page.set_attribute(&node, HIDDEN, "true"));
        }
        for result in writes {
            if let Err(e) = result {
                tracing::warn!("Error display for {} not cleared: {}", field, e);
            }
        }
    }
}

/// Human-readable label: `work-email` becomes `Work email`
pub fn display_label(annotation: &AnnotationState) -> String {
    let raw = annotation.field_label.as_deref().unwrap_or("").replace('-', " ");
    let mut chars = raw.trim().chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => "This field".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formguard_a11y::{RuleConfig, RuleEngine};
    use formguard_dom::MemoryDocument;
    use formguard_forms::{FieldType, ResolvedField};

    fn annotated_form() -> (MemoryDocument, NodeId, NodeId, NodeId) {
        let doc = MemoryDocument::new();
        let form = doc.append(None, NodeType::Form, &[("name", "contact")]).unwrap();
        let name = doc
            .append(
                Some(&form),
                NodeType::TextInput,
                &[
                    ("required", ""),
                    ("data-field-label", "full-name"),
                    ("data-error-id", "full-name-error"),
                    ("data-auto-error-messaging", "true"),
                ],
            )
            .unwrap();
        let email = doc
            .append(
                Some(&form),
                NodeType::TextInput,
                &[
                    ("required", ""),
                    ("type", "email"),
                    ("pattern", formguard_a11y::annotation::EMAIL_PATTERN),
                    ("data-field-label", "work-email"),
                    ("data-error-id", "work-email-error"),
                    ("data-auto-error-messaging", "true"),
                ],
            )
            .unwrap();
        (doc, form, name, email)
    }

    #[test]
    fn test_attach_collects_fields_until_next_form() {
        let (doc, form, name, email) = annotated_form();
        let other = doc.append(None, NodeType::Form, &[]).unwrap();
        doc.append(Some(&other), NodeType::TextInput, &[("data-auto-error-messaging", "true")])
            .unwrap();
        doc.append(Some(&form), NodeType::TextInput, &[("data-auto-error-messaging", "false")])
            .unwrap();

        let runtime = ValidationRuntime::attach(&doc, &form);
        assert_eq!(runtime.fields(), &[name.clone(), email]);
        assert_eq!(runtime.state(&name), Some(FieldState::Pristine));
    }

    #[test]
    fn test_blur_on_pristine_does_nothing() {
        let (doc, form, name, _) = annotated_form();
        let mut runtime = ValidationRuntime::attach(&doc, &form);
        assert_eq!(runtime.handle(&name, FieldEvent::Blur), Some(FieldState::Pristine));
        assert_eq!(doc.find_by_attr("id", "full-name-error"), None);
    }

    #[test]
    fn test_invalid_then_corrected() {
        let (doc, form, _, email) = annotated_form();
        let mut runtime = ValidationRuntime::attach(&doc, &form);

        runtime.handle(&email, FieldEvent::Focus);
        doc.set_value(&email, "not-an-email");
        runtime.handle(&email, FieldEvent::Input);
        assert_eq!(runtime.handle(&email, FieldEvent::Blur), Some(FieldState::Invalid));

        let error = doc.find_by_attr("id", "work-email-error").unwrap();
        assert_eq!(doc.node(&error).unwrap().node_type, NodeType::ErrorText);
        assert_eq!(doc.attr(&error, "role").as_deref(), Some("alert"));
        assert_eq!(doc.attr(&error, "aria-live").as_deref(), Some("polite"));
        assert_eq!(doc.text(&error).as_deref(), Some("Please enter a valid email address"));
        assert_eq!(doc.attr(&email, "aria-invalid").as_deref(), Some("true"));
        assert_eq!(doc.attr(&email, "aria-describedby").as_deref(), Some("work-email-error"));

        // Error placed right after its field
        let outline = doc.outline();
        let field_pos = outline.iter().position(|(id, _)| *id == email).unwrap();
        assert_eq!(outline[field_pos + 1].0, error);

        doc.set_value(&email, "ann@example.com");
        assert_eq!(runtime.handle(&email, FieldEvent::Input), Some(FieldState::Touched));
        assert_eq!(doc.attr(&email, "aria-invalid"), None);
        assert_eq!(doc.attr(&error, "hidden").as_deref(), Some("true"));

        assert_eq!(runtime.handle(&email, FieldEvent::Blur), Some(FieldState::Valid));
        assert_eq!(doc.text(&error).as_deref(), Some(""));
        assert_eq!(doc.attr(&email, "aria-describedby"), None);
    }

    #[test]
    fn test_error_node_reused() {
        let (doc, form, name, _) = annotated_form();
        let mut runtime = ValidationRuntime::attach(&doc, &form);
        runtime.handle(&name, FieldEvent::Focus);
        runtime.handle(&name, FieldEvent::Blur);
        runtime.handle(&name, FieldEvent::Input);
        runtime.handle(&name, FieldEvent::Blur);

        let count = doc
            .outline()
            .iter()
            .filter(|(_, t)| *t == NodeType::ErrorText)
            .count();
        assert_eq!(count, 1);
        let error = doc.find_by_attr("id", "full-name-error").unwrap();
        assert_eq!(doc.text(&error).as_deref(), Some("Full name is required"));
        assert_eq!(doc.attr(&error, "hidden"), None);
    }

    #[test]
    fn test_submit_blocked_then_submitted_once() {
        let (doc, form, name, email) = annotated_form();
        let mut runtime = ValidationRuntime::attach(&doc, &form);

        // Submit validates pristine fields too
        match runtime.submit() {
            SubmitOutcome::Blocked { invalid } => assert_eq!(invalid, vec![name.clone(), email.clone()]),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(doc.submissions(), 0);

        doc.set_value(&name, "Ann Lee");
        doc.set_value(&email, "ann@example.com");
        assert_eq!(runtime.submit(), SubmitOutcome::Submitted);
        assert_eq!(doc.submissions(), 1);

        // Echo of our own request
        assert_eq!(runtime.submit(), SubmitOutcome::PassThrough);
        assert_eq!(doc.submissions(), 1);

        // A later user submit is validated again
        assert_eq!(runtime.submit(), SubmitOutcome::Submitted);
        assert_eq!(doc.submissions(), 2);
    }

    #[test]
    fn test_engine_annotations_drive_runtime() {
        let doc = MemoryDocument::new();
        let form = doc.append(None, NodeType::Form, &[]).unwrap();
        let input = doc
            .append(Some(&form), NodeType::TextInput, &[("required", ""), ("label", "Work Email")])
            .unwrap();

        let field = ResolvedField {
            node_id: input.clone(),
            label: "Work Email".to_string(),
            name: String::new(),
            required: true,
            field_type: FieldType::Email,
        };
        let engine = RuleEngine::new(RuleConfig::default());
        let set = engine.apply(&field, &doc.node(&input).unwrap());
        smol::block_on(set.commit(&doc)).unwrap();

        let mut runtime = ValidationRuntime::attach(&doc, &form);
        assert_eq!(runtime.fields(), &[input.clone()]);

        doc.set_value(&input, "ann@");
        runtime.handle(&input, FieldEvent::Focus);
        assert_eq!(runtime.handle(&input, FieldEvent::Blur), Some(FieldState::Invalid));
        let error = doc.find_by_attr("id", "work-email-error").unwrap();
        assert_eq!(doc.text(&error).as_deref(), Some("Please enter a valid email address"));
    }

    #[test]
    fn test_display_label() {
        let mut a = AnnotationState::default();
        assert_eq!(display_label(&a), "This field");
        a.field_label = Some("work-email".to_string());
        assert_eq!(display_label(&a), "Work email");
    }
}
