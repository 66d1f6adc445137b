//! Core domain enums for guardflow.
//!
//! - Workflow phases and run status
//! - Guard check kinds and outcomes

mod status;

pub use status::{CheckKind, CheckStatus, RunStatus, WorkflowPhase};
