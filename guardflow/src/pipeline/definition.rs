//! Stage definitions.

use crate::context::SessionContext;
use crate::core::WorkflowPhase;
use crate::errors::{PipelineValidationError, ValidationCode};
use crate::policy::{self, InputExtractor};
use crate::stages::Stage;
use std::sync::Arc;

/// One guarded stage: its logic plus the policy the engine applies around it.
#[derive(Clone)]
pub struct StageDefinition {
    /// Unique stage name. Also the audit-trail stage label.
    pub name: String,
    /// Phase the session enters while the stage runs.
    pub phase: WorkflowPhase,
    /// The business logic.
    pub runner: Arc<dyn Stage>,
    /// Selects the untrusted text checked before the stage runs.
    pub input: InputExtractor,
    /// Artifact key whose sections the output gate audits.
    pub output_artifact: String,
    /// The input is derived only from trusted or already audited data.
    pub trusted_input: bool,
    /// The output is deterministic and is not audited.
    pub skip_output_check: bool,
}

impl std::fmt::Debug for StageDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageDefinition")
            .field("name", &self.name)
            .field("phase", &self.phase)
            .field("runner", &self.runner)
            .field("output_artifact", &self.output_artifact)
            .field("trusted_input", &self.trusted_input)
            .field("skip_output_check", &self.skip_output_check)
            .finish_non_exhaustive()
    }
}

impl StageDefinition {
    /// Creates a definition with no untrusted input, auditing the artifact
    /// stored under the stage's own name.
    #[must_use]
    pub fn new(name: impl Into<String>, phase: WorkflowPhase, runner: Arc<dyn Stage>) -> Self {
        let name = name.into();
        Self {
            output_artifact: name.clone(),
            name,
            phase,
            runner,
            input: policy::no_input(),
            trusted_input: false,
            skip_output_check: false,
        }
    }

    /// Sets the input extractor.
    #[must_use]
    pub fn with_input(mut self, input: InputExtractor) -> Self {
        self.input = input;
        self
    }

    /// Sets the input extractor from a plain function.
    #[must_use]
    pub fn with_input_fn(self, f: fn(&SessionContext) -> Option<String>) -> Self {
        self.with_input(policy::extractor(f))
    }

    /// Audits a different artifact key.
    #[must_use]
    pub fn with_output_artifact(mut self, key: impl Into<String>) -> Self {
        self.output_artifact = key.into();
        self
    }

    /// Marks the input as trusted.
    #[must_use]
    pub fn trusted(mut self) -> Self {
        self.trusted_input = true;
        self
    }

    /// Skips the output audit for this stage.
    #[must_use]
    pub fn skip_output_check(mut self) -> Self {
        self.skip_output_check = true;
        self
    }

    /// Validates the definition.
    ///
    /// # Errors
    ///
    /// Returns an error if the name or artifact key is blank.
    pub fn validate(&self) -> Result<(), PipelineValidationError> {
        if self.name.trim().is_empty() {
            return Err(PipelineValidationError::new("Stage name cannot be empty")
                .with_code(
                    ValidationCode::new("PIPELINE-EMPTY-STAGE-NAME", "Stage has a blank name")
                        .with_fix_hint("Give every stage a unique, non-empty name."),
                ));
        }
        if self.output_artifact.trim().is_empty() {
            return Err(PipelineValidationError::new(format!(
                "Stage '{}' has an empty output artifact key",
                self.name
            ))
            .with_stages(vec![self.name.clone()]));
        }
        Ok(())
    }
}
