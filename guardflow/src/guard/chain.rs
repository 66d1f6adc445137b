//! Ordered chain of check strategies.

use super::{Classifier, ClassifierError, Verdict};
use async_trait::async_trait;
use std::sync::Arc;

/// Runs classifiers in order; the first disallowing verdict wins.
///
/// A failing strategy does not stop the chain. Its error is returned only
/// when no later strategy disallows, so the caller still sees the check as
/// indeterminate.
#[derive(Clone, Default)]
pub struct ClassifierChain {
    strategies: Vec<Arc<dyn Classifier>>,
}

impl std::fmt::Debug for ClassifierChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassifierChain")
            .field(
                "strategies",
                &self.strategies.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ClassifierChain {
    /// Creates an empty chain, which allows everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a strategy.
    #[must_use]
    pub fn with(mut self, strategy: Arc<dyn Classifier>) -> Self {
        self.strategies.push(strategy);
        self
    }

    /// Returns the number of strategies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// Returns true if the chain has no strategies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    fn settle(
        results: impl Iterator<Item = (String, Result<Verdict, ClassifierError>)>,
    ) -> Result<Verdict, ClassifierError> {
        let mut first_error = None;
        for (name, result) in results {
            match result {
                Ok(verdict) if !verdict.allowed => {
                    return Ok(verdict.with_detail("strategy", serde_json::json!(name)));
                }
                Ok(_) => {}
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
        first_error.map_or_else(|| Ok(Verdict::allow()), Err)
    }
}

#[async_trait]
impl Classifier for ClassifierChain {
    fn name(&self) -> &str {
        "chain"
    }

    async fn check_input(&self, text: &str) -> Result<Verdict, ClassifierError> {
        let mut results = Vec::with_capacity(self.strategies.len());
        for strategy in &self.strategies {
            let result = strategy.check_input(text).await;
            let stop = matches!(&result, Ok(v) if !v.allowed);
            results.push((strategy.name().to_string(), result));
            if stop {
                break;
            }
        }
        Self::settle(results.into_iter())
    }

    async fn check_output(
        &self,
        text: &str,
        context_text: &str,
    ) -> Result<Verdict, ClassifierError> {
        let mut results = Vec::with_capacity(self.strategies.len());
        for strategy in &self.strategies {
            let result = strategy.check_output(text, context_text).await;
            let stop = matches!(&result, Ok(v) if !v.allowed);
            results.push((strategy.name().to_string(), result));
            if stop {
                break;
            }
        }
        Self::settle(results.into_iter())
    }

    fn layers(&self) -> Vec<String> {
        self.strategies.iter().flat_map(|s| s.layers()).collect()
    }
}
