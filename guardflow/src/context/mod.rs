//! Session state for pipeline execution.
//!
//! This module provides:
//! - The session context owned by one run
//! - Caller-supplied session inputs
//! - Tagged stage artifacts

mod artifact;
mod session;

pub use artifact::{
    ArtifactError, ClinicalReport, ReportSection, StageArtifact, REDACTED_SECTION_TITLE,
};
pub use session::{BlockInfo, SessionContext, SessionInputs};
