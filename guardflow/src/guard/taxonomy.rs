//! Harm categories and refusal messages.
//!
//! O1-O8 follow the classifier's safety policy; `PII` and `INJECTION` come
//! from the pattern layer. Anything else (notably [`GENERIC_CATEGORY`]) is
//! treated as ambiguous.

use crate::core::CheckKind;
use std::collections::BTreeSet;

/// Category reported when the classifier flags content without naming one.
pub const GENERIC_CATEGORY: &str = "POLICY_VIOLATION";

const CONCRETE: &[(&str, &str)] = &[
    ("O1", "Violence and Hate"),
    ("O2", "Sexual Content"),
    ("O3", "Criminal Planning"),
    ("O4", "Guns and Illegal Weapons"),
    ("O5", "Regulated or Controlled Substances"),
    ("O6", "Self-Harm"),
    ("O7", "Offensive Language and Insults"),
    ("O8", "Medical Ethics and Unethical Procedures"),
    ("PII", "Private Patient Information"),
    ("INJECTION", "Prompt Injection"),
];

/// Refusal for generic unsafe input.
pub const REFUSAL_INPUT: &str = "I'm sorry, I cannot fulfill this request. \
     It violates medical safety and ethical guidelines.";

/// Refusal for unethical or illegal medical requests.
pub const REFUSAL_MEDICAL: &str = "As a medical AI assistant, I am prohibited from providing \
     information regarding unethical or illegal medical procedures. Patient safety and \
     medical ethics are my highest priorities.";

/// Refusal for attempts to extract patient information.
pub const REFUSAL_PII: &str = "I cannot share specific patient information outside of \
     authorized clinical reports. Patient privacy is strictly protected under medical \
     ethics guidelines and HIPAA regulations.";

/// Refusal for flagged generated output.
pub const REFUSAL_OUTPUT: &str = "I apologize, but my response was flagged by the safety \
     system. I cannot provide this information as it may contain harmful or inappropriate \
     medical content. Please rephrase your question or consult a healthcare professional.";

/// Returns true for categories in the concrete harm taxonomy.
#[must_use]
pub fn is_concrete(category: &str) -> bool {
    CONCRETE.iter().any(|(code, _)| *code == category)
}

/// Returns the human-readable name of a concrete category.
#[must_use]
pub fn describe(category: &str) -> Option<&'static str> {
    CONCRETE
        .iter()
        .find(|(code, _)| *code == category)
        .map(|(_, name)| *name)
}

/// Picks the refusal message for a set of violations.
#[must_use]
pub fn refusal_for(violations: &BTreeSet<String>, check: CheckKind) -> &'static str {
    if violations.contains("PII") {
        REFUSAL_PII
    } else if violations.contains("O8") {
        REFUSAL_MEDICAL
    } else if violations.contains("O5") || violations.contains("INJECTION") {
        REFUSAL_INPUT
    } else {
        match check {
            CheckKind::Input => REFUSAL_INPUT,
            CheckKind::Output => REFUSAL_OUTPUT,
        }
    }
}

/// Formats categories as `O5 (Regulated or Controlled Substances), PII (...)`.
#[must_use]
pub fn label(violations: &BTreeSet<String>) -> String {
    violations
        .iter()
        .map(|v| match describe(v) {
            Some(name) => format!("{v} ({name})"),
            None => v.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_concrete_categories() {
        assert!(is_concrete("O1"));
        assert!(is_concrete("O8"));
        assert!(is_concrete("INJECTION"));
        assert!(!is_concrete(GENERIC_CATEGORY));
        assert!(!is_concrete("O9"));
    }

    #[test]
    fn test_refusal_selection() {
        assert_eq!(refusal_for(&set(&["PII", "O8"]), CheckKind::Input), REFUSAL_PII);
        assert_eq!(refusal_for(&set(&["O8"]), CheckKind::Output), REFUSAL_MEDICAL);
        assert_eq!(refusal_for(&set(&["INJECTION"]), CheckKind::Input), REFUSAL_INPUT);
        assert_eq!(refusal_for(&set(&["O1"]), CheckKind::Output), REFUSAL_OUTPUT);
        assert_eq!(refusal_for(&set(&["O1"]), CheckKind::Input), REFUSAL_INPUT);
    }

    #[test]
    fn test_label() {
        assert_eq!(
            label(&set(&["O5", "UNKNOWN"])),
            "O5 (Regulated or Controlled Substances), UNKNOWN"
        );
    }
}
