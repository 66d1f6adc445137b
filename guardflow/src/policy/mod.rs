//! Content extraction policy.
//!
//! Each stage declares which part of the session is user originated and must
//! pass the input classifier. Only free text typed or spoken by the patient
//! is returned; structured history, vitals, and earlier audited reports never
//! leave the engine.

use crate::context::SessionContext;
use std::sync::Arc;

/// Selects the untrusted text of a session for one stage.
pub type InputExtractor = Arc<dyn Fn(&SessionContext) -> Option<String> + Send + Sync>;

fn non_empty(text: String) -> Option<String> {
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Overnight stage: free-text answers the patient gave to voice checks.
#[must_use]
pub fn night_input(ctx: &SessionContext) -> Option<String> {
    non_empty(ctx.inputs.patient_responses.join("\n"))
}

/// Overnight report: built only from the audited night artifact.
#[must_use]
pub fn rap1_input(_ctx: &SessionContext) -> Option<String> {
    None
}

/// Day consultation: presenting complaint followed by the symptom list.
#[must_use]
pub fn day_input(ctx: &SessionContext) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(complaint) = ctx.inputs.presenting_complaint.as_deref() {
        if !complaint.trim().is_empty() {
            parts.push(complaint.to_string());
        }
    }
    if !ctx.inputs.symptoms.is_empty() {
        parts.push(ctx.inputs.symptoms.join(", "));
    }
    non_empty(parts.join("\n"))
}

/// Day report: built only from audited day and overnight artifacts.
#[must_use]
pub fn rap2_input(_ctx: &SessionContext) -> Option<String> {
    None
}

/// Extractor for stages with no untrusted input.
#[must_use]
pub fn no_input() -> InputExtractor {
    Arc::new(|_| None)
}

/// Wraps a plain function as an [`InputExtractor`].
#[must_use]
pub fn extractor(f: fn(&SessionContext) -> Option<String>) -> InputExtractor {
    Arc::new(f)
}
