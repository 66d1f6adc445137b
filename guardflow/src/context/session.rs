//! The session context threaded through a pipeline run.

use super::StageArtifact;
use crate::audit::{AuditEntry, AuditTrail};
use crate::core::{RunStatus, WorkflowPhase};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Caller-supplied inputs for one session.
///
/// Only the free-text fields (`presenting_complaint`, `symptoms`,
/// `patient_responses`) are user originated. Everything else is assembled by
/// the system and treated as trusted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionInputs {
    /// Free-text presenting complaint for the day consultation.
    #[serde(default)]
    pub presenting_complaint: Option<String>,
    /// Patient-reported symptoms.
    #[serde(default)]
    pub symptoms: Vec<String>,
    /// Free-text answers given by the patient to overnight voice checks.
    #[serde(default)]
    pub patient_responses: Vec<String>,
    /// Consultation specialty.
    #[serde(default = "default_consultation_mode")]
    pub consultation_mode: String,
    /// Overnight vital sign readings.
    #[serde(default)]
    pub vitals: Vec<serde_json::Value>,
    /// Physical examination findings.
    #[serde(default)]
    pub exam: BTreeMap<String, String>,
    /// Structured patient history assembled internally.
    #[serde(default)]
    pub patient_context: serde_json::Value,
}

fn default_consultation_mode() -> String {
    "general".to_string()
}

impl SessionInputs {
    /// Creates empty inputs with the general consultation mode.
    #[must_use]
    pub fn new() -> Self {
        Self {
            consultation_mode: default_consultation_mode(),
            ..Default::default()
        }
    }

    /// Sets the presenting complaint.
    #[must_use]
    pub fn with_complaint(mut self, complaint: impl Into<String>) -> Self {
        self.presenting_complaint = Some(complaint.into());
        self
    }

    /// Sets the symptom list.
    #[must_use]
    pub fn with_symptoms<I, S>(mut self, symptoms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.symptoms = symptoms.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a free-text patient response.
    #[must_use]
    pub fn with_patient_response(mut self, response: impl Into<String>) -> Self {
        self.patient_responses.push(response.into());
        self
    }

    /// Sets the overnight vitals.
    #[must_use]
    pub fn with_vitals(mut self, vitals: Vec<serde_json::Value>) -> Self {
        self.vitals = vitals;
        self
    }

    /// Sets the consultation mode.
    #[must_use]
    pub fn with_consultation_mode(mut self, mode: impl Into<String>) -> Self {
        self.consultation_mode = mode.into();
        self
    }

    /// Sets the trusted patient context.
    #[must_use]
    pub fn with_patient_context(mut self, context: serde_json::Value) -> Self {
        self.patient_context = context;
        self
    }
}

/// Metadata recorded when an input gate blocks a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    /// Stage whose input was refused.
    pub stage: String,
    /// Violated categories.
    pub violations: BTreeSet<String>,
    /// Safe refusal message to show instead of any content.
    pub sanitized_message: String,
}

/// Mutable record owned by exactly one pipeline run.
///
/// Stage logic may read inputs and write artifacts. The block flag, run
/// status, and audit trail are only writable by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionContext {
    session_id: Uuid,
    subject_id: String,
    phase: WorkflowPhase,
    status: RunStatus,
    blocked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    block: Option<BlockInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    abort_reason: Option<String>,
    /// Caller-supplied inputs.
    pub inputs: SessionInputs,
    artifacts: BTreeMap<String, StageArtifact>,
    trail: AuditTrail,
    started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    finished_at: Option<DateTime<Utc>>,
}

impl SessionContext {
    /// Creates a new session for a subject with a generated session id.
    #[must_use]
    pub fn new(subject_id: impl Into<String>, inputs: SessionInputs) -> Self {
        Self::with_session_id(Uuid::new_v4(), subject_id, inputs)
    }

    /// Creates a new session with a specific session id.
    #[must_use]
    pub fn with_session_id(
        session_id: Uuid,
        subject_id: impl Into<String>,
        inputs: SessionInputs,
    ) -> Self {
        Self {
            session_id,
            subject_id: subject_id.into(),
            phase: WorkflowPhase::Idle,
            status: RunStatus::Running,
            blocked: false,
            block: None,
            abort_reason: None,
            inputs,
            artifacts: BTreeMap::new(),
            trail: AuditTrail::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Returns the session id.
    #[must_use]
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Returns the subject (patient) id.
    #[must_use]
    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    /// Returns the current phase.
    #[must_use]
    pub fn phase(&self) -> WorkflowPhase {
        self.phase
    }

    /// Returns the run status.
    #[must_use]
    pub fn status(&self) -> RunStatus {
        self.status
    }

    /// Returns true once an input gate has refused the session.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.blocked
    }

    /// Returns true if the caller cancelled the run.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.status == RunStatus::Aborted
    }

    /// Returns the block metadata, if blocked.
    #[must_use]
    pub fn block_info(&self) -> Option<&BlockInfo> {
        self.block.as_ref()
    }

    /// Returns the abort reason, if aborted.
    #[must_use]
    pub fn abort_reason(&self) -> Option<&str> {
        self.abort_reason.as_deref()
    }

    /// Returns the artifact produced by a stage.
    #[must_use]
    pub fn artifact(&self, stage: &str) -> Option<&StageArtifact> {
        self.artifacts.get(stage)
    }

    /// Returns all artifacts keyed by stage name.
    #[must_use]
    pub fn artifacts(&self) -> &BTreeMap<String, StageArtifact> {
        &self.artifacts
    }

    /// Stores the artifact produced by a stage, replacing any previous one.
    pub fn put_artifact(&mut self, stage: impl Into<String>, artifact: StageArtifact) {
        self.artifacts.insert(stage.into(), artifact);
    }

    /// Returns the audit trail.
    #[must_use]
    pub fn trail(&self) -> &AuditTrail {
        &self.trail
    }

    /// Returns the audit log in append order.
    #[must_use]
    pub fn audit_log(&self) -> &[AuditEntry] {
        self.trail.entries()
    }

    /// Returns when the session started.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns when the run reached a terminal status.
    #[must_use]
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Short multi-line summary for operational logs.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut out = format!(
            "session={} subject={} phase={} status={} checks={}",
            self.session_id,
            self.subject_id,
            self.phase,
            self.status,
            self.trail.len()
        );
        if let Some(ref block) = self.block {
            out.push_str(&format!(
                "\nblocked at {}: {}",
                block.stage,
                block.violations.iter().cloned().collect::<Vec<_>>().join(",")
            ));
        }
        for line in self.trail.summary() {
            out.push('\n');
            out.push_str(&line);
        }
        out
    }

    pub(crate) fn trail_mut(&mut self) -> &mut AuditTrail {
        &mut self.trail
    }

    pub(crate) fn artifact_mut(&mut self, stage: &str) -> Option<&mut StageArtifact> {
        self.artifacts.get_mut(stage)
    }

    pub(crate) fn transition_to(&mut self, phase: WorkflowPhase) {
        self.phase = phase;
    }

    pub(crate) fn mark_blocked(&mut self, info: BlockInfo) {
        self.blocked = true;
        self.block = Some(info);
        self.status = RunStatus::Blocked;
        self.finished_at = Some(Utc::now());
    }

    pub(crate) fn mark_aborted(&mut self, reason: impl Into<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = RunStatus::Aborted;
        self.abort_reason = Some(reason.into());
        self.finished_at = Some(Utc::now());
    }

    pub(crate) fn mark_completed(&mut self, full_run: bool) {
        if self.status.is_terminal() {
            return;
        }
        if full_run {
            self.phase = WorkflowPhase::Completed;
        }
        self.status = RunStatus::Completed;
        self.finished_at = Some(Utc::now());
    }
}
