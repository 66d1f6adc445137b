//! Mock stages for testing.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::context::{SessionContext, StageArtifact};
use crate::core::WorkflowPhase;
use crate::stages::{Stage, StageError};

/// A recorded execution.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedExecution {
    /// Subject of the session.
    pub subject_id: String,
    /// Phase the session was in when the stage ran.
    pub phase: WorkflowPhase,
    /// Artifact keys present before the stage ran.
    pub artifacts_before: Vec<String>,
}

/// A stage that stores a fixed artifact and records every call.
#[derive(Debug)]
pub struct RecordingStage {
    name: String,
    artifact: StageArtifact,
    executions: Mutex<Vec<RecordedExecution>>,
}

impl RecordingStage {
    /// Creates a recording stage producing `artifact`.
    #[must_use]
    pub fn new(name: impl Into<String>, artifact: StageArtifact) -> Self {
        Self {
            name: name.into(),
            artifact,
            executions: Mutex::new(Vec::new()),
        }
    }

    /// Creates a recording stage producing a one-paragraph text artifact.
    #[must_use]
    pub fn text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(name, StageArtifact::Text(text.into()))
    }

    /// Returns all recorded executions.
    #[must_use]
    pub fn executions(&self) -> Vec<RecordedExecution> {
        self.executions.lock().clone()
    }

    /// Returns the number of executions.
    #[must_use]
    pub fn execution_count(&self) -> usize {
        self.executions.lock().len()
    }
}

#[async_trait]
impl Stage for RecordingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &mut SessionContext) -> Result<(), StageError> {
        self.executions.lock().push(RecordedExecution {
            subject_id: ctx.subject_id().to_string(),
            phase: ctx.phase(),
            artifacts_before: ctx.artifacts().keys().cloned().collect(),
        });
        ctx.put_artifact(self.name.clone(), self.artifact.clone());
        Ok(())
    }
}

/// A stage that always fails.
#[derive(Debug)]
pub struct FailingStage {
    name: String,
    error: String,
}

impl FailingStage {
    /// Creates a new failing stage.
    #[must_use]
    pub fn new(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            error: error.into(),
        }
    }
}

#[async_trait]
impl Stage for FailingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &mut SessionContext) -> Result<(), StageError> {
        Err(StageError::new(self.error.clone()))
    }
}
