//! Workflow phase, run status, and guard check enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The phase a session is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPhase {
    /// Session created, no stage has run yet.
    Idle,
    /// Overnight monitoring analysis.
    Night,
    /// Overnight report synthesis.
    Rap1,
    /// Daytime consultation analysis.
    Day,
    /// Daytime report synthesis.
    Rap2,
    /// Every requested stage ran to completion.
    Completed,
}

impl Default for WorkflowPhase {
    fn default() -> Self {
        Self::Idle
    }
}

impl fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Night => write!(f, "night"),
            Self::Rap1 => write!(f, "rap1"),
            Self::Day => write!(f, "day"),
            Self::Rap2 => write!(f, "rap2"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// Terminal or in-progress status of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Stages are still executing.
    Running,
    /// All requested stages executed.
    Completed,
    /// An input gate refused the session.
    Blocked,
    /// The caller cancelled the run.
    Aborted,
}

impl Default for RunStatus {
    fn default() -> Self {
        Self::Running
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Blocked => write!(f, "blocked"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

impl RunStatus {
    /// Returns true if no further stage may run.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Which side of a stage a guard check covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    /// Untrusted text consumed by the stage.
    Input,
    /// Content produced by the stage.
    Output,
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Output => write!(f, "output"),
        }
    }
}

/// Outcome recorded for one guard check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    /// Content was checked (or had nothing to check) and is allowed.
    Passed,
    /// Input was refused; the pipeline halts.
    Blocked,
    /// Output was partially redacted; the pipeline continues.
    Filtered,
    /// The check did not run (trusted bypass, deterministic stage, disabled guard).
    Skipped,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::Blocked => write!(f, "blocked"),
            Self::Filtered => write!(f, "filtered"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}
