//! Pipeline building and execution.
//!
//! This module provides:
//! - Stage definitions with per-stage guard policy
//! - Pipeline builder with validation
//! - The single-stage guarded executor
//! - The pipeline engine with partial, cancellable, and concurrent runs

mod builder;
mod definition;
mod engine;
mod executor;

#[cfg(test)]
mod integration_tests;

pub use builder::PipelineBuilder;
pub use definition::StageDefinition;
pub use engine::{GuardStatus, GuardedPipeline, DAY_STAGES, NIGHT_STAGES};
pub use executor::{
    StageExecutor, StageOutcome, REASON_AMBIGUOUS, REASON_DETERMINISTIC, REASON_GUARD_DISABLED,
    REASON_INDETERMINATE, REASON_NO_INPUT, REASON_TRUSTED_BYPASS,
};
