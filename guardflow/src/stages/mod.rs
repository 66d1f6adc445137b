//! Stage trait and implementations.
//!
//! A stage is the external business logic the engine wraps with guard
//! checks. It reads session inputs and earlier artifacts and stores its own
//! artifact on the context.

use crate::context::{SessionContext, StageArtifact};
use async_trait::async_trait;
use std::fmt::Debug;
use thiserror::Error;

/// A fault raised by stage business logic.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct StageError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl StageError {
    /// Creates a stage error with a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Wraps an underlying error.
    #[must_use]
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Returns the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Trait for pipeline stage logic.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Executes the stage against the session.
    ///
    /// # Errors
    ///
    /// Returns a [`StageError`] when the business logic itself fails. The
    /// engine propagates it as fatal; it is never treated as a guard block.
    async fn execute(&self, ctx: &mut SessionContext) -> Result<(), StageError>;
}

/// A stage backed by a synchronous closure producing an artifact.
///
/// The returned artifact is stored under the stage's name.
pub struct FnStage<F>
where
    F: Fn(&SessionContext) -> Result<StageArtifact, StageError> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(&SessionContext) -> Result<StageArtifact, StageError> + Send + Sync,
{
    /// Creates a new function-based stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(&SessionContext) -> Result<StageArtifact, StageError> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage")
            .field("name", &self.name)
            .finish()
    }
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(&SessionContext) -> Result<StageArtifact, StageError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &mut SessionContext) -> Result<(), StageError> {
        let artifact = (self.func)(ctx)?;
        ctx.put_artifact(self.name.clone(), artifact);
        Ok(())
    }
}

/// A stage that stores a fixed artifact.
#[derive(Debug, Clone)]
pub struct StaticStage {
    name: String,
    artifact: StageArtifact,
}

impl StaticStage {
    /// Creates a stage that always produces `artifact`.
    #[must_use]
    pub fn new(name: impl Into<String>, artifact: StageArtifact) -> Self {
        Self {
            name: name.into(),
            artifact,
        }
    }
}

#[async_trait]
impl Stage for StaticStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &mut SessionContext) -> Result<(), StageError> {
        ctx.put_artifact(self.name.clone(), self.artifact.clone());
        Ok(())
    }
}
