//! Classifier verdicts and the three-way check outcome.

use super::taxonomy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A classifier's allow/deny decision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// Whether the content may be used.
    pub allowed: bool,
    /// Violated categories. Empty when allowed.
    #[serde(default)]
    pub violations: BTreeSet<String>,
    /// Safe substitute to show when not allowed.
    #[serde(default)]
    pub sanitized_message: String,
    /// Diagnostic-only details.
    #[serde(default)]
    pub detail: BTreeMap<String, serde_json::Value>,
}

impl Verdict {
    /// Creates an allowing verdict.
    #[must_use]
    pub fn allow() -> Self {
        Self {
            allowed: true,
            ..Default::default()
        }
    }

    /// Creates a denying verdict.
    #[must_use]
    pub fn deny<I, S>(violations: I, sanitized_message: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: false,
            violations: violations.into_iter().map(Into::into).collect(),
            sanitized_message: sanitized_message.into(),
            detail: BTreeMap::new(),
        }
    }

    /// Adds a detail entry.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.detail.insert(key.into(), value);
        self
    }

    /// Returns the violations that belong to the concrete harm taxonomy.
    #[must_use]
    pub fn concrete_violations(&self) -> BTreeSet<String> {
        self.violations
            .iter()
            .filter(|v| taxonomy::is_concrete(v))
            .cloned()
            .collect()
    }

    /// Returns true if the verdict denies with only generic categories.
    #[must_use]
    pub fn is_ambiguous(&self) -> bool {
        !self.allowed && self.concrete_violations().is_empty()
    }
}

/// Result of one guard check once transport failures are folded in.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    /// The classifier allowed the content.
    Allowed(Verdict),
    /// The classifier refused the content.
    Blocked(Verdict),
    /// The classifier could not answer; the check fails open.
    Indeterminate {
        /// Timeout or transport failure description.
        reason: String,
    },
}

impl CheckOutcome {
    /// Builds an outcome from a classifier verdict.
    #[must_use]
    pub fn from_verdict(verdict: Verdict) -> Self {
        if verdict.allowed {
            Self::Allowed(verdict)
        } else {
            Self::Blocked(verdict)
        }
    }

    /// Returns true unless the classifier refused. Indeterminate fails open.
    #[must_use]
    pub fn permits(&self) -> bool {
        !matches!(self, Self::Blocked(_))
    }

    /// Returns the refusing verdict, if blocked.
    #[must_use]
    pub fn blocked_verdict(&self) -> Option<&Verdict> {
        match self {
            Self::Blocked(v) => Some(v),
            _ => None,
        }
    }
}
