//! # Guardflow
//!
//! A guarded pipeline engine for clinical decision support.
//!
//! Every stage of a session runs behind the same safety protocol:
//!
//! - **Input gate**: user-originated free text is classified before the stage
//!   runs; a refusal halts the whole session
//! - **Output gate**: generated output is audited in two passes, redacting
//!   only the sections that fail
//! - **Audit trail**: each gate appends one entry to a hash-chained log that
//!   can be verified after serialization
//! - **Fail-open**: classifier timeouts and transport failures are recorded
//!   and the stage proceeds
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use guardflow::prelude::*;
//!
//! let classifier = Arc::new(PatternClassifier::builtin()?);
//! let pipeline = clinical::standard_pipeline(stages, classifier, GuardConfig::default())?;
//!
//! let ctx = SessionContext::new("P001", SessionInputs::new().with_symptoms(["cough", "fever"]));
//! let ctx = pipeline.run(ctx).await?;
//! for line in ctx.trail().summary() {
//!     println!("{line}");
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod audit;
pub mod cancellation;
pub mod clinical;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod guard;
pub mod observability;
pub mod pipeline;
pub mod policy;
pub mod stages;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::audit::{AuditEntry, AuditTrail, OutputAuditor};
    pub use crate::cancellation::CancellationToken;
    pub use crate::clinical::{self, ClinicalStages};
    pub use crate::config::GuardConfig;
    pub use crate::context::{
        BlockInfo, ClinicalReport, SessionContext, SessionInputs, StageArtifact,
    };
    pub use crate::core::{CheckKind, CheckStatus, RunStatus, WorkflowPhase};
    pub use crate::errors::{GuardflowError, PipelineValidationError};
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::guard::{
        CheckOutcome, Classifier, ClassifierChain, ClassifierError, PatternClassifier, Verdict,
    };
    pub use crate::pipeline::{GuardStatus, GuardedPipeline, PipelineBuilder, StageDefinition};
    pub use crate::stages::{FnStage, Stage, StageError};
    pub use std::sync::Arc;
}
