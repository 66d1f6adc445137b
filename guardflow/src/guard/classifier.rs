//! Classifier boundary and the timeout-bounded guard around it.

use super::{CheckOutcome, Verdict};
use crate::core::CheckKind;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Failures reaching the external classifier.
#[derive(Debug, Clone, Error)]
pub enum ClassifierError {
    /// The call exceeded the configured timeout.
    #[error("classifier timed out after {seconds}s")]
    Timeout {
        /// The timeout that elapsed.
        seconds: f64,
    },

    /// The backend could not be reached or returned garbage.
    #[error("classifier transport failure: {0}")]
    Transport(String),

    /// The backend is not loaded.
    #[error("classifier unavailable: {0}")]
    Unavailable(String),
}

/// Abstract boundary to an external safety classifier.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Returns the classifier name used in status and audit details.
    fn name(&self) -> &str;

    /// Classifies untrusted user text.
    async fn check_input(&self, text: &str) -> Result<Verdict, ClassifierError>;

    /// Classifies generated text, with the originating user text as context.
    async fn check_output(
        &self,
        text: &str,
        context_text: &str,
    ) -> Result<Verdict, ClassifierError>;

    /// Describes the active defense layers.
    fn layers(&self) -> Vec<String> {
        vec![self.name().to_string()]
    }
}

/// Wraps a classifier with a timeout and folds failures into [`CheckOutcome`].
#[derive(Clone)]
pub struct SafetyGuard {
    classifier: Arc<dyn Classifier>,
    timeout: Duration,
}

impl std::fmt::Debug for SafetyGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafetyGuard")
            .field("classifier", &self.classifier.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl SafetyGuard {
    /// Creates a guard around a classifier.
    #[must_use]
    pub fn new(classifier: Arc<dyn Classifier>, timeout: Duration) -> Self {
        Self { classifier, timeout }
    }

    /// Returns the wrapped classifier.
    #[must_use]
    pub fn classifier(&self) -> &Arc<dyn Classifier> {
        &self.classifier
    }

    /// Returns the per-call timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Checks untrusted input.
    pub async fn check_input(&self, stage: &str, text: &str) -> CheckOutcome {
        let call = self.classifier.check_input(text);
        self.settle(stage, CheckKind::Input, tokio::time::timeout(self.timeout, call).await)
    }

    /// Checks generated output.
    pub async fn check_output(&self, stage: &str, text: &str, context_text: &str) -> CheckOutcome {
        let call = self.classifier.check_output(text, context_text);
        self.settle(stage, CheckKind::Output, tokio::time::timeout(self.timeout, call).await)
    }

    fn settle(
        &self,
        stage: &str,
        check: CheckKind,
        result: Result<Result<Verdict, ClassifierError>, tokio::time::error::Elapsed>,
    ) -> CheckOutcome {
        let error = match result {
            Ok(Ok(verdict)) => return CheckOutcome::from_verdict(verdict),
            Ok(Err(err)) => err,
            Err(_) => ClassifierError::Timeout {
                seconds: self.timeout.as_secs_f64(),
            },
        };

        warn!(
            stage = %stage,
            check = %check,
            classifier = %self.classifier.name(),
            error = %error,
            "Classifier indeterminate, failing open"
        );
        CheckOutcome::Indeterminate {
            reason: error.to_string(),
        }
    }
}
