//! Guarded execution of a single stage.
//!
//! Each stage runs through the same fixed protocol:
//! 1. Input gate: skip, pass, or block on the untrusted text
//! 2. Stage logic
//! 3. Output gate: skip, or two-pass audit with redaction
//!
//! Every gate appends exactly one audit entry unless the run is cancelled
//! before the gate completes.

use super::StageDefinition;
use crate::audit::OutputAuditor;
use crate::cancellation::CancellationToken;
use crate::config::GuardConfig;
use crate::context::{BlockInfo, SessionContext};
use crate::core::{CheckKind, CheckStatus};
use crate::errors::GuardflowError;
use crate::events::{EventSink, PipelineEvent};
use crate::guard::{CheckOutcome, SafetyGuard};
use crate::observability::SpanTimer;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Skip reason when the stage input is trusted and bypass is enabled.
pub const REASON_TRUSTED_BYPASS: &str = "trusted-bypass";
/// Skip reason when guard checks are switched off.
pub const REASON_GUARD_DISABLED: &str = "guard-disabled";
/// Skip reason for stages with deterministic output.
pub const REASON_DETERMINISTIC: &str = "deterministic-stage";
/// Pass reason when the stage has no untrusted input.
pub const REASON_NO_INPUT: &str = "no untrusted input";
/// Pass reason when the classifier could not answer.
pub const REASON_INDETERMINATE: &str = "indeterminate";
/// Pass reason when a refusal names no concrete harm category.
pub const REASON_AMBIGUOUS: &str = "ambiguous flag ignored";

/// How a stage ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// Both gates completed; the run may continue.
    Completed,
    /// The input gate refused the session.
    Blocked,
    /// The run was cancelled.
    Aborted,
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

async fn race<F: Future>(cancel: Option<&CancellationToken>, fut: F) -> Option<F::Output> {
    match cancel {
        None => Some(fut.await),
        Some(token) => tokio::select! {
            biased;
            () = token.cancelled() => None,
            out = fut => Some(out),
        },
    }
}

/// Runs one stage under the guard protocol.
#[derive(Clone)]
pub struct StageExecutor {
    guard: SafetyGuard,
    auditor: OutputAuditor,
    config: Arc<GuardConfig>,
    sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for StageExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageExecutor")
            .field("guard", &self.guard)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl StageExecutor {
    /// Creates an executor.
    #[must_use]
    pub fn new(guard: SafetyGuard, config: Arc<GuardConfig>, sink: Arc<dyn EventSink>) -> Self {
        let auditor = OutputAuditor::new(guard.clone(), config.redaction_label.clone())
            .with_max_detail_chars(config.max_detail_chars);
        Self {
            guard,
            auditor,
            config,
            sink,
        }
    }

    /// Executes `def` against the session.
    ///
    /// # Errors
    ///
    /// Returns [`GuardflowError::StageExecution`] if the stage logic fails and
    /// [`GuardflowError::MalformedStageOutput`] if its artifact is missing or
    /// cannot be audited. Blocks and cancellations are not errors.
    pub async fn execute(
        &self,
        def: &StageDefinition,
        ctx: &mut SessionContext,
        cancel: Option<&CancellationToken>,
    ) -> Result<StageOutcome, GuardflowError> {
        if Self::cancelled(ctx, cancel) {
            return Ok(StageOutcome::Aborted);
        }
        // A blocked session never gains entries for stages that do not run.
        if ctx.is_blocked() {
            return Ok(StageOutcome::Blocked);
        }

        ctx.transition_to(def.phase);
        self.emit(ctx, "stage.started", &def.name, json!({"phase": def.phase}))
            .await;
        let timer = SpanTimer::start(&def.name);

        let user_text = (def.input)(&*ctx);
        match self.input_gate(def, ctx, user_text.as_deref(), cancel).await {
            StageOutcome::Completed => {}
            other => return Ok(other),
        }

        if Self::cancelled(ctx, cancel) {
            return Ok(StageOutcome::Aborted);
        }
        debug!(stage = %def.name, session_id = %ctx.session_id(), "Executing stage logic");
        def.runner
            .execute(ctx)
            .await
            .map_err(|source| GuardflowError::StageExecution {
                stage: def.name.clone(),
                source,
            })?;

        if Self::cancelled(ctx, cancel) {
            return Ok(StageOutcome::Aborted);
        }
        if !self.output_gate(def, ctx, user_text.as_deref().unwrap_or(""), cancel).await? {
            return Ok(StageOutcome::Aborted);
        }

        self.emit(
            ctx,
            "stage.completed",
            &def.name,
            json!({"duration_ms": timer.elapsed_ms()}),
        )
        .await;
        Ok(StageOutcome::Completed)
    }

    async fn input_gate(
        &self,
        def: &StageDefinition,
        ctx: &mut SessionContext,
        user_text: Option<&str>,
        cancel: Option<&CancellationToken>,
    ) -> StageOutcome {
        let skip_reason = if !self.config.guard_enabled {
            Some(REASON_GUARD_DISABLED)
        } else if self.config.trusted_bypass && def.trusted_input {
            Some(REASON_TRUSTED_BYPASS)
        } else {
            None
        };

        if let Some(reason) = skip_reason {
            let detail = json!({"reason": reason});
            self.record(ctx, &def.name, CheckKind::Input, CheckStatus::Skipped, detail)
                .await;
            return StageOutcome::Completed;
        }

        let Some(text) = user_text else {
            let detail = json!({"reason": REASON_NO_INPUT});
            self.record(ctx, &def.name, CheckKind::Input, CheckStatus::Passed, detail)
                .await;
            return StageOutcome::Completed;
        };

        let Some(outcome) = race(cancel, self.guard.check_input(&def.name, text)).await else {
            Self::cancelled(ctx, cancel);
            return StageOutcome::Aborted;
        };

        match outcome {
            CheckOutcome::Allowed(_) => {
                let detail = json!({"chars": text.chars().count()});
                self.record(ctx, &def.name, CheckKind::Input, CheckStatus::Passed, detail)
                    .await;
                StageOutcome::Completed
            }
            CheckOutcome::Blocked(verdict) if verdict.is_ambiguous() => {
                debug!(
                    stage = %def.name,
                    categories = ?verdict.violations,
                    "Input flag has no concrete category, ignoring"
                );
                let detail = json!({
                    "reason": REASON_AMBIGUOUS,
                    "categories": verdict.violations,
                });
                self.record(ctx, &def.name, CheckKind::Input, CheckStatus::Passed, detail)
                    .await;
                StageOutcome::Completed
            }
            CheckOutcome::Indeterminate { reason } => {
                let detail = json!({
                    "reason": REASON_INDETERMINATE,
                    "error": truncate(&reason, self.config.max_detail_chars),
                });
                self.record(ctx, &def.name, CheckKind::Input, CheckStatus::Passed, detail)
                    .await;
                StageOutcome::Completed
            }
            CheckOutcome::Blocked(verdict) => {
                let detail = json!({
                    "categories": verdict.violations,
                    "excerpt": truncate(text, self.config.max_detail_chars),
                });
                self.record(ctx, &def.name, CheckKind::Input, CheckStatus::Blocked, detail)
                    .await;
                warn!(
                    stage = %def.name,
                    session_id = %ctx.session_id(),
                    categories = ?verdict.violations,
                    "Input blocked, halting session"
                );
                ctx.mark_blocked(BlockInfo {
                    stage: def.name.clone(),
                    violations: verdict.violations,
                    sanitized_message: verdict.sanitized_message,
                });
                StageOutcome::Blocked
            }
        }
    }

    /// Returns false if cancelled while auditing.
    async fn output_gate(
        &self,
        def: &StageDefinition,
        ctx: &mut SessionContext,
        context_text: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<bool, GuardflowError> {
        let skip_reason = if !self.config.guard_enabled {
            Some(REASON_GUARD_DISABLED)
        } else if def.skip_output_check || self.config.skip_output_check.contains(&def.name) {
            Some(REASON_DETERMINISTIC)
        } else {
            None
        };

        if let Some(reason) = skip_reason {
            let detail = json!({"reason": reason});
            self.record(ctx, &def.name, CheckKind::Output, CheckStatus::Skipped, detail)
                .await;
            return Ok(true);
        }

        let artifact = ctx.artifact_mut(&def.output_artifact).ok_or_else(|| {
            GuardflowError::malformed(
                &def.name,
                format!("no artifact stored under '{}'", def.output_artifact),
            )
        })?;

        let audited = race(cancel, self.auditor.audit(&def.name, artifact, context_text)).await;
        let Some(report) = audited else {
            Self::cancelled(ctx, cancel);
            return Ok(false);
        };
        let report = report.map_err(|e| GuardflowError::malformed(&def.name, e.to_string()))?;

        self.record(ctx, &def.name, CheckKind::Output, report.status, report.detail)
            .await;
        Ok(true)
    }

    /// Marks the session aborted if cancellation was requested.
    fn cancelled(ctx: &mut SessionContext, cancel: Option<&CancellationToken>) -> bool {
        let Some(token) = cancel.filter(|t| t.is_cancelled()) else {
            return false;
        };
        let reason = token.reason().unwrap_or_else(|| "cancelled".to_string());
        info!(session_id = %ctx.session_id(), reason = %reason, "Run cancelled");
        ctx.mark_aborted(reason);
        true
    }

    async fn record(
        &self,
        ctx: &mut SessionContext,
        stage: &str,
        check: CheckKind,
        status: CheckStatus,
        detail: serde_json::Value,
    ) {
        let sequence = ctx
            .trail_mut()
            .append(stage, check, status, Some(detail.clone()))
            .sequence;
        info!(
            stage = %stage,
            check = %check,
            status = %status,
            sequence = sequence,
            session_id = %ctx.session_id(),
            "Guard check recorded"
        );
        self.emit(ctx, &format!("guard.{check}.{status}"), stage, detail)
            .await;
    }

    async fn emit(
        &self,
        ctx: &SessionContext,
        event_type: &str,
        stage: &str,
        data: serde_json::Value,
    ) {
        self.sink
            .emit(
                PipelineEvent::new(event_type, ctx.session_id(), ctx.subject_id())
                    .with_stage(stage)
                    .with_data(data),
            )
            .await;
    }
}
