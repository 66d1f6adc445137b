//! Error types for the guardflow engine.
//!
//! Guard outcomes (blocked, filtered, fail-open) are never errors: they are
//! encoded in the returned [`SessionContext`](crate::context::SessionContext)
//! and its audit trail. The types here cover programming-level faults only.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The main error type for guardflow operations.
#[derive(Debug, Error)]
pub enum GuardflowError {
    /// A pipeline validation error occurred.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// Stage business logic failed. This is a defect, not a safety event.
    #[error("Stage '{stage}' execution fault: {source}")]
    StageExecution {
        /// The stage that failed.
        stage: String,
        /// The underlying stage error.
        #[source]
        source: crate::stages::StageError,
    },

    /// A stage produced output the extractor cannot decompose.
    #[error("Malformed output from stage '{stage}': {reason}")]
    MalformedStageOutput {
        /// The stage whose output is malformed.
        stage: String,
        /// Why the output could not be parsed.
        reason: String,
    },

    /// A partial run referenced a stage the pipeline does not define.
    #[error("Unknown stage '{name}' (known stages: {})", known.join(", "))]
    UnknownStage {
        /// The requested name.
        name: String,
        /// Stage names defined by the pipeline.
        known: Vec<String>,
    },

    /// Configuration could not be loaded or is invalid.
    #[error("{0}")]
    Config(#[from] crate::config::ConfigError),

    /// A built-in pattern failed to compile.
    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),
}

impl GuardflowError {
    /// Creates a malformed stage output error.
    #[must_use]
    pub fn malformed(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedStageOutput {
            stage: stage.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if the error is a stage execution fault.
    #[must_use]
    pub fn is_stage_fault(&self) -> bool {
        matches!(self, Self::StageExecution { .. })
    }
}

/// Machine-readable code attached to a validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationCode {
    /// Stable code, e.g. `PIPELINE-DUPLICATE-STAGE`.
    pub code: String,
    /// One-line summary.
    pub summary: String,
    /// How to fix the pipeline definition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_hint: Option<String>,
}

impl ValidationCode {
    /// Creates a code without a fix hint.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
        }
    }

    /// Adds a fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }
}

/// A pipeline definition was rejected at build time.
#[derive(Debug, Clone, Error, Serialize)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// Human-readable reason.
    pub message: String,
    /// Stage names involved, if any.
    pub stages: Vec<String>,
    /// Stable code for programmatic handling.
    pub code: Option<ValidationCode>,
}

impl PipelineValidationError {
    /// Creates an error with no stages or code attached.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            code: None,
        }
    }

    /// Names the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Attaches a stable code.
    #[must_use]
    pub fn with_code(mut self, code: ValidationCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Returns the stable code, if one was attached.
    #[must_use]
    pub fn code_str(&self) -> Option<&str> {
        self.code.as_ref().map(|c| c.code.as_str())
    }
}
