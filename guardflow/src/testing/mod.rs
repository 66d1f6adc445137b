//! Test doubles for guarded pipelines.
//!
//! This module provides:
//! - A scripted classifier with call counting and failure injection
//! - Recording and failing stages

mod classifier;
mod mocks;

pub use classifier::ScriptedClassifier;
pub use mocks::{FailingStage, RecordedExecution, RecordingStage};
