//! Fast regex layer run ahead of the model classifier.

use super::{taxonomy, Classifier, ClassifierError, Verdict};
use crate::core::CheckKind;
use async_trait::async_trait;
use regex::Regex;
use std::collections::BTreeSet;

const BUILTIN: &[(&str, &[&str])] = &[
    (
        "O5",
        &[
            r"synthe[sz]i[sz]e?\s+(fentanyl|meth|drug|heroin|cocaine|mdma)",
            r"how\s+to\s+(make|create|cook|produce)\s+(drug|fentanyl|meth|heroin)",
            r"recipe\s+for\s+(fentanyl|meth|drug|heroin|cocaine)",
        ],
    ),
    (
        "O8",
        &[
            r"human\s+(trial|experiment).*(without|no)\s+(consent|ethic|irb)",
            r"bypass\s+(irb|ethics|medical\s+oversight)",
            r"perform\s+surgery\s+without\s+training",
            r"illegal\s+medical\s+recipe",
            r"unapproved\s+drugs?\s+on\s+humans?",
        ],
    ),
    (
        "PII",
        &[
            r"(give|show|extract|list)\s+(me\s+)?(patient|all)\s+(name|record|info|data|address)",
            r"social\s+security\s+number",
            r"(patient|medical)\s+(database|records)\s+of\s+all",
        ],
    ),
    (
        "INJECTION",
        &[
            r"ignore\s+(all\s+)?(previous|above)\s+instructions?",
            r"override\s+(your\s+)?safety",
            r"(you\s+are|pretend).*(developer|no\s+restriction|unrestrict)",
            r"disregard\s+(your\s+)?(system|safety)\s+prompt",
        ],
    ),
];

struct CategoryPatterns {
    category: String,
    patterns: Vec<Regex>,
}

/// Matches lowercased text against per-category regex patterns.
///
/// Output checks are allowed by default: generated text is left to the
/// model layer, which sees the originating request as context.
pub struct PatternClassifier {
    categories: Vec<CategoryPatterns>,
    check_outputs: bool,
}

impl std::fmt::Debug for PatternClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatternClassifier")
            .field(
                "categories",
                &self.categories.iter().map(|c| c.category.as_str()).collect::<Vec<_>>(),
            )
            .field("check_outputs", &self.check_outputs)
            .finish()
    }
}

impl PatternClassifier {
    /// Compiles the built-in clinical harm patterns.
    ///
    /// # Errors
    ///
    /// Returns an error if a pattern fails to compile.
    pub fn builtin() -> Result<Self, regex::Error> {
        Self::from_patterns(
            BUILTIN
                .iter()
                .map(|(category, patterns)| (*category, patterns.iter().copied())),
        )
    }

    /// Compiles custom category patterns.
    ///
    /// # Errors
    ///
    /// Returns an error if a pattern fails to compile.
    pub fn from_patterns<'a, I, P>(categories: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = (&'a str, P)>,
        P: IntoIterator<Item = &'a str>,
    {
        let categories = categories
            .into_iter()
            .map(|(category, patterns)| {
                Ok(CategoryPatterns {
                    category: category.to_string(),
                    patterns: patterns
                        .into_iter()
                        .map(Regex::new)
                        .collect::<Result<Vec<_>, _>>()?,
                })
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;

        Ok(Self {
            categories,
            check_outputs: false,
        })
    }

    /// Also applies the patterns to generated output.
    #[must_use]
    pub fn with_output_checks(mut self, enabled: bool) -> Self {
        self.check_outputs = enabled;
        self
    }

    /// Returns the categories whose patterns match `text`.
    #[must_use]
    pub fn matches(&self, text: &str) -> BTreeSet<String> {
        let lowered = text.to_lowercase();
        self.categories
            .iter()
            .filter(|c| c.patterns.iter().any(|p| p.is_match(&lowered)))
            .map(|c| c.category.clone())
            .collect()
    }

    fn classify(&self, text: &str, check: CheckKind) -> Verdict {
        let hits = self.matches(text);
        if hits.is_empty() {
            return Verdict::allow();
        }
        let refusal = taxonomy::refusal_for(&hits, check);
        Verdict::deny(hits, refusal).with_detail("layer", serde_json::json!("pattern"))
    }
}

#[async_trait]
impl Classifier for PatternClassifier {
    fn name(&self) -> &str {
        "pattern"
    }

    async fn check_input(&self, text: &str) -> Result<Verdict, ClassifierError> {
        Ok(self.classify(text, CheckKind::Input))
    }

    async fn check_output(
        &self,
        text: &str,
        _context_text: &str,
    ) -> Result<Verdict, ClassifierError> {
        if !self.check_outputs {
            return Ok(Verdict::allow());
        }
        Ok(self.classify(text, CheckKind::Output))
    }

    fn layers(&self) -> Vec<String> {
        vec!["Regex pattern matching".to_string()]
    }
}
