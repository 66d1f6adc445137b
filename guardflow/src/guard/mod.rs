//! Safety classification.
//!
//! This module provides:
//! - Verdicts and the three-way check outcome
//! - The async classifier boundary with a timeout-bounded wrapper
//! - A regex pattern layer and an ordered strategy chain
//! - Parsing of raw safety-model responses
//! - The harm taxonomy and refusal messages

mod chain;
mod classifier;
mod patterns;
mod response;
pub mod taxonomy;
mod verdict;

pub use chain::ClassifierChain;
pub use classifier::{Classifier, ClassifierError, SafetyGuard};
pub use patterns::PatternClassifier;
pub use response::{parse_guard_response, parse_guard_response_with_limit, DEFAULT_EXCERPT_CHARS};
pub use verdict::{CheckOutcome, Verdict};
