//! Scripted classifier for tests.

use crate::core::CheckKind;
use crate::guard::{taxonomy, Classifier, ClassifierError, Verdict};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::time::Duration;

#[derive(Debug, Clone)]
struct Rule {
    needle: String,
    categories: BTreeSet<String>,
}

fn collect<I, S>(categories: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    categories.into_iter().map(Into::into).collect()
}

/// A classifier that denies text containing configured substrings.
///
/// Everything not matched by a rule is allowed. Calls are counted and the
/// classified texts kept so tests can assert exactly what reached the
/// classifier.
#[derive(Debug, Default)]
pub struct ScriptedClassifier {
    input_rules: Vec<Rule>,
    output_rules: Vec<Rule>,
    fail_inputs: bool,
    fail_outputs: bool,
    delay: Option<Duration>,
    inputs_seen: Mutex<Vec<String>>,
    outputs_seen: Mutex<Vec<String>>,
}

impl ScriptedClassifier {
    /// Creates a classifier that allows everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Denies input text containing `needle` with the given categories.
    #[must_use]
    pub fn deny_input_containing<I, S>(mut self, needle: impl Into<String>, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_rules.push(Rule {
            needle: needle.into(),
            categories: collect(categories),
        });
        self
    }

    /// Denies output text containing `needle` with the given categories.
    #[must_use]
    pub fn deny_output_containing<I, S>(mut self, needle: impl Into<String>, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_rules.push(Rule {
            needle: needle.into(),
            categories: collect(categories),
        });
        self
    }

    /// Makes every input check fail with a transport error.
    #[must_use]
    pub fn fail_inputs(mut self) -> Self {
        self.fail_inputs = true;
        self
    }

    /// Makes every output check fail with a transport error.
    #[must_use]
    pub fn fail_outputs(mut self) -> Self {
        self.fail_outputs = true;
        self
    }

    /// Sleeps before answering each call.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of input checks received.
    #[must_use]
    pub fn input_calls(&self) -> usize {
        self.inputs_seen.lock().len()
    }

    /// Number of output checks received.
    #[must_use]
    pub fn output_calls(&self) -> usize {
        self.outputs_seen.lock().len()
    }

    /// Texts received by input checks, in call order.
    #[must_use]
    pub fn inputs_seen(&self) -> Vec<String> {
        self.inputs_seen.lock().clone()
    }

    /// Texts received by output checks, in call order.
    #[must_use]
    pub fn outputs_seen(&self) -> Vec<String> {
        self.outputs_seen.lock().clone()
    }

    async fn answer(&self, text: &str, check: CheckKind) -> Result<Verdict, ClassifierError> {
        let (seen, rules, fail) = match check {
            CheckKind::Input => (&self.inputs_seen, &self.input_rules, self.fail_inputs),
            CheckKind::Output => (&self.outputs_seen, &self.output_rules, self.fail_outputs),
        };
        seen.lock().push(text.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(ClassifierError::Transport("scripted failure".to_string()));
        }

        let violations: BTreeSet<String> = rules
            .iter()
            .filter(|r| text.contains(&r.needle))
            .flat_map(|r| r.categories.iter().cloned())
            .collect();
        if violations.is_empty() {
            return Ok(Verdict::allow());
        }
        let refusal = taxonomy::refusal_for(&violations, check);
        Ok(Verdict::deny(violations, refusal))
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn check_input(&self, text: &str) -> Result<Verdict, ClassifierError> {
        self.answer(text, CheckKind::Input).await
    }

    async fn check_output(
        &self,
        text: &str,
        _context_text: &str,
    ) -> Result<Verdict, ClassifierError> {
        self.answer(text, CheckKind::Output).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rules_and_counts() {
        let classifier = ScriptedClassifier::new()
            .deny_input_containing("meth", ["O5"])
            .deny_output_containing("ssn", ["PII"]);

        assert!(classifier.check_input("cough").await.unwrap().allowed);
        let denied = classifier.check_input("cook meth").await.unwrap();
        assert!(denied.violations.contains("O5"));
        assert!(!classifier.check_output("ssn 123", "").await.unwrap().allowed);

        assert_eq!(classifier.input_calls(), 2);
        assert_eq!(classifier.output_calls(), 1);
        assert_eq!(classifier.inputs_seen(), vec!["cough".to_string(), "cook meth".to_string()]);
    }

    #[tokio::test]
    async fn test_failure_injection_still_counts() {
        let classifier = ScriptedClassifier::new().fail_outputs();
        assert!(classifier.check_output("x", "").await.is_err());
        assert!(classifier.check_input("x").await.is_ok());
        assert_eq!(classifier.output_calls(), 1);
    }
}
