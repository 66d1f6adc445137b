//! Two-pass output auditor.
//!
//! Pass 1 classifies the whole artifact in one call. Only when that call
//! names a concrete harm category does pass 2 classify each section on its
//! own and redact the sections that fail. Sections are never removed, only
//! replaced by a visible notice, so section indexes stay stable.

use crate::context::{ArtifactError, StageArtifact};
use crate::core::CheckStatus;
use crate::guard::{taxonomy, CheckOutcome, SafetyGuard, DEFAULT_EXCERPT_CHARS};
use serde_json::json;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Result of auditing one artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditReport {
    /// `passed` or `filtered`.
    pub status: CheckStatus,
    /// Diagnostic payload for the audit entry.
    pub detail: serde_json::Value,
    /// Number of classifier calls made, bulk pass included.
    pub classifier_calls: usize,
}

impl AuditReport {
    fn passed(detail: serde_json::Value, classifier_calls: usize) -> Self {
        Self {
            status: CheckStatus::Passed,
            detail,
            classifier_calls,
        }
    }
}

/// Builds the notice that replaces a redacted section.
///
/// A bracketed label such as `[REDACTED BY SAFETY AUDIT]` becomes
/// `[REDACTED BY SAFETY AUDIT: O5 (Regulated or Controlled Substances)]`.
#[must_use]
pub fn redaction_notice(label: &str, violations: &BTreeSet<String>) -> String {
    let categories = taxonomy::label(violations);
    match label.strip_suffix(']') {
        Some(open) => format!("{open}: {categories}]"),
        None => format!("{label} ({categories})"),
    }
}

/// Runs the bulk and drill-down passes over stage output.
#[derive(Debug, Clone)]
pub struct OutputAuditor {
    guard: SafetyGuard,
    redaction_label: String,
    max_detail_chars: usize,
}

impl OutputAuditor {
    /// Creates an auditor.
    #[must_use]
    pub fn new(guard: SafetyGuard, redaction_label: impl Into<String>) -> Self {
        Self {
            guard,
            redaction_label: redaction_label.into(),
            max_detail_chars: DEFAULT_EXCERPT_CHARS,
        }
    }

    /// Caps the length of classifier error text kept in audit details.
    #[must_use]
    pub fn with_max_detail_chars(mut self, max_chars: usize) -> Self {
        self.max_detail_chars = max_chars;
        self
    }

    /// Audits `artifact` in place.
    ///
    /// `context_text` is the user text that led to the output; it is passed
    /// to the classifier as context only.
    ///
    /// # Errors
    ///
    /// Returns an [`ArtifactError`] if the artifact cannot be split into
    /// sections or a redaction index is out of range.
    pub async fn audit(
        &self,
        stage: &str,
        artifact: &mut StageArtifact,
        context_text: &str,
    ) -> Result<AuditReport, ArtifactError> {
        let sections = artifact.sections()?;
        if sections.is_empty() {
            return Ok(AuditReport::passed(json!({"reason": "no output to audit"}), 0));
        }

        let bulk_text = sections.join("\n\n");
        let bulk = self.guard.check_output(stage, &bulk_text, context_text).await;
        let flagged = match bulk {
            CheckOutcome::Allowed(_) => {
                return Ok(AuditReport::passed(json!({"sections": sections.len()}), 1));
            }
            CheckOutcome::Indeterminate { reason } => {
                let error: String = reason.chars().take(self.max_detail_chars).collect();
                return Ok(AuditReport::passed(
                    json!({"reason": "indeterminate", "error": error, "pass": "bulk"}),
                    1,
                ));
            }
            CheckOutcome::Blocked(verdict) => verdict,
        };

        if flagged.is_ambiguous() {
            debug!(
                stage = %stage,
                categories = ?flagged.violations,
                "Bulk output flag has no concrete category, ignoring"
            );
            return Ok(AuditReport::passed(
                json!({
                    "reason": "ambiguous flag ignored",
                    "categories": flagged.violations,
                }),
                1,
            ));
        }

        let mut calls = 1;
        let mut failing: Vec<(usize, BTreeSet<String>)> = Vec::new();
        let mut indeterminate = 0usize;
        for (index, section) in sections.iter().enumerate() {
            calls += 1;
            match self.guard.check_output(stage, section, context_text).await {
                CheckOutcome::Blocked(verdict) => {
                    let concrete = verdict.concrete_violations();
                    if !concrete.is_empty() {
                        failing.push((index, concrete));
                    }
                }
                CheckOutcome::Indeterminate { .. } => indeterminate += 1,
                CheckOutcome::Allowed(_) => {}
            }
        }

        if failing.is_empty() {
            debug!(stage = %stage, "Bulk flag not confirmed by any section");
            return Ok(AuditReport::passed(
                json!({
                    "reason": "bulk flag not confirmed",
                    "bulk_categories": flagged.concrete_violations(),
                    "indeterminate_sections": indeterminate,
                }),
                calls,
            ));
        }

        let mut categories = BTreeSet::new();
        let mut redacted = Vec::with_capacity(failing.len());
        for (index, violations) in &failing {
            artifact.redact(*index, &redaction_notice(&self.redaction_label, violations))?;
            categories.extend(violations.iter().cloned());
            redacted.push(*index);
        }

        let removed = failing.len();
        let kept = sections.len() - removed;
        info!(
            stage = %stage,
            kept = kept,
            removed = removed,
            categories = ?categories,
            "Output sections redacted"
        );

        Ok(AuditReport {
            status: CheckStatus::Filtered,
            detail: json!({
                "kept": kept,
                "removed": removed,
                "categories": categories,
                "redacted_sections": redacted,
                "indeterminate_sections": indeterminate,
            }),
            classifier_calls: calls,
        })
    }
}
