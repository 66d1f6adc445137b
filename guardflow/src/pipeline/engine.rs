//! The guarded pipeline engine.

use super::{StageDefinition, StageExecutor, StageOutcome};
use crate::cancellation::CancellationToken;
use crate::config::GuardConfig;
use crate::context::SessionContext;
use crate::errors::GuardflowError;
use crate::events::{EventSink, PipelineEvent};
use crate::guard::{Classifier, SafetyGuard};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

/// Stages run by [`GuardedPipeline::run_night_only`].
pub const NIGHT_STAGES: [&str; 2] = ["night", "rap1"];
/// Stages run by [`GuardedPipeline::run_day_only`].
pub const DAY_STAGES: [&str; 2] = ["day", "rap2"];

/// Snapshot of the guard configuration for health endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardStatus {
    /// Whether checks run at all.
    pub guard_enabled: bool,
    /// Whether trusted stages skip the input check.
    pub trusted_bypass_enabled: bool,
    /// `strict`, `trusted-bypass`, or `disabled`.
    pub mode: String,
    /// Active defense layers, classifier layers first.
    pub defense_layers: Vec<String>,
}

/// Runs sessions through an ordered sequence of guarded stages.
///
/// The engine holds no per-run state. It is `Send + Sync` and can be shared
/// behind an `Arc` by any number of concurrent runs.
pub struct GuardedPipeline {
    name: String,
    stages: Vec<StageDefinition>,
    classifier: Arc<dyn Classifier>,
    config: Arc<GuardConfig>,
    executor: StageExecutor,
    sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for GuardedPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedPipeline")
            .field("name", &self.name)
            .field("stages", &self.stage_names())
            .field("classifier", &self.classifier.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl GuardedPipeline {
    pub(crate) fn new(
        name: String,
        stages: Vec<StageDefinition>,
        classifier: Arc<dyn Classifier>,
        config: GuardConfig,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let config = Arc::new(config);
        let guard = SafetyGuard::new(classifier.clone(), config.classifier_timeout());
        let executor = StageExecutor::new(guard, config.clone(), sink.clone());
        Self {
            name,
            stages,
            classifier,
            config,
            executor,
            sink,
        }
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    /// Returns the guard configuration.
    #[must_use]
    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Runs every stage in order, stopping at the first block.
    ///
    /// # Errors
    ///
    /// Returns an error if stage logic fails or produces malformed output.
    pub async fn run(&self, ctx: SessionContext) -> Result<SessionContext, GuardflowError> {
        self.drive(ctx, self.all_stages(), None).await
    }

    /// Runs every stage, honouring a cancellation token.
    ///
    /// A cancelled run returns the context with status `Aborted`; it is
    /// never reported as blocked.
    ///
    /// # Errors
    ///
    /// Returns an error if stage logic fails or produces malformed output.
    pub async fn run_with_cancellation(
        &self,
        ctx: SessionContext,
        token: &CancellationToken,
    ) -> Result<SessionContext, GuardflowError> {
        self.drive(ctx, self.all_stages(), Some(token)).await
    }

    /// Runs the named stages in pipeline order with the same guarded steps.
    ///
    /// # Errors
    ///
    /// Returns [`GuardflowError::UnknownStage`] before running anything if a
    /// name is not defined, and otherwise the same errors as [`Self::run`].
    pub async fn run_partial(
        &self,
        ctx: SessionContext,
        stage_names: &[&str],
    ) -> Result<SessionContext, GuardflowError> {
        let selection = self.select(stage_names)?;
        self.drive(ctx, selection, None).await
    }

    /// Runs the overnight stages (`night`, `rap1`).
    ///
    /// # Errors
    ///
    /// Same as [`Self::run_partial`].
    pub async fn run_night_only(
        &self,
        ctx: SessionContext,
    ) -> Result<SessionContext, GuardflowError> {
        self.run_partial(ctx, &NIGHT_STAGES).await
    }

    /// Runs the daytime stages (`day`, `rap2`).
    ///
    /// # Errors
    ///
    /// Same as [`Self::run_partial`].
    pub async fn run_day_only(
        &self,
        ctx: SessionContext,
    ) -> Result<SessionContext, GuardflowError> {
        self.run_partial(ctx, &DAY_STAGES).await
    }

    /// Runs independent sessions with at most `concurrency` in flight.
    ///
    /// Results are returned in the order of `contexts`. One failing session
    /// does not affect the others.
    pub async fn run_many(
        &self,
        contexts: Vec<SessionContext>,
        concurrency: usize,
    ) -> Vec<Result<SessionContext, GuardflowError>> {
        let mut results: Vec<(usize, Result<SessionContext, GuardflowError>)> =
            stream::iter(contexts.into_iter().enumerate())
                .map(|(index, ctx)| async move { (index, self.run(ctx).await) })
                .buffer_unordered(concurrency.max(1))
                .collect()
                .await;
        results.sort_by_key(|(index, _)| *index);
        results.into_iter().map(|(_, result)| result).collect()
    }

    /// Reports the guard configuration and active defense layers.
    #[must_use]
    pub fn status(&self) -> GuardStatus {
        let mode = if !self.config.guard_enabled {
            "disabled"
        } else if self.config.trusted_bypass {
            "trusted-bypass"
        } else {
            "strict"
        };

        let mut defense_layers = Vec::new();
        if self.config.guard_enabled {
            defense_layers = self.classifier.layers();
            defense_layers.push("Two-pass output audit".to_string());
        }
        defense_layers.push("Hash-chained audit trail".to_string());

        GuardStatus {
            guard_enabled: self.config.guard_enabled,
            trusted_bypass_enabled: self.config.trusted_bypass,
            mode: mode.to_string(),
            defense_layers,
        }
    }

    fn all_stages(&self) -> Vec<usize> {
        (0..self.stages.len()).collect()
    }

    fn select(&self, names: &[&str]) -> Result<Vec<usize>, GuardflowError> {
        for name in names {
            if !self.stages.iter().any(|s| s.name == *name) {
                return Err(GuardflowError::UnknownStage {
                    name: (*name).to_string(),
                    known: self.stage_names().into_iter().map(String::from).collect(),
                });
            }
        }
        Ok(self
            .stages
            .iter()
            .enumerate()
            .filter(|(_, s)| names.contains(&s.name.as_str()))
            .map(|(index, _)| index)
            .collect())
    }

    async fn drive(
        &self,
        mut ctx: SessionContext,
        selection: Vec<usize>,
        cancel: Option<&CancellationToken>,
    ) -> Result<SessionContext, GuardflowError> {
        let full_run = selection.len() == self.stages.len();
        info!(
            pipeline = %self.name,
            session_id = %ctx.session_id(),
            subject_id = %ctx.subject_id(),
            stages = selection.len(),
            "Pipeline run started"
        );
        self.emit(&ctx, "pipeline.started", json!({"pipeline": self.name, "full_run": full_run}))
            .await;

        for index in selection {
            let def = &self.stages[index];
            let outcome = match self.executor.execute(def, &mut ctx, cancel).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    error!(
                        stage = %def.name,
                        session_id = %ctx.session_id(),
                        error = %err,
                        "Pipeline run failed"
                    );
                    return Err(err);
                }
            };

            match outcome {
                StageOutcome::Completed => {}
                StageOutcome::Blocked => {
                    let data = ctx.block_info().map_or(json!({}), |b| {
                        json!({"stage": b.stage, "categories": b.violations})
                    });
                    info!(
                        session_id = %ctx.session_id(),
                        stage = %def.name,
                        "Pipeline halted by guard"
                    );
                    self.emit(&ctx, "pipeline.blocked", data).await;
                    return Ok(ctx);
                }
                StageOutcome::Aborted => {
                    let data = json!({"stage": def.name, "reason": ctx.abort_reason()});
                    self.emit(&ctx, "pipeline.aborted", data).await;
                    return Ok(ctx);
                }
            }
        }

        ctx.mark_completed(full_run);
        info!(
            session_id = %ctx.session_id(),
            checks = ctx.trail().len(),
            "Pipeline run completed"
        );
        self.emit(&ctx, "pipeline.completed", json!({"checks": ctx.trail().len()}))
            .await;
        Ok(ctx)
    }

    async fn emit(&self, ctx: &SessionContext, event_type: &str, data: serde_json::Value) {
        let event =
            PipelineEvent::new(event_type, ctx.session_id(), ctx.subject_id()).with_data(data);
        self.sink.emit(event).await;
    }
}
