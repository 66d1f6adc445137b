//! Parsing of raw safety-model responses.
//!
//! The model answers `safe`, or `unsafe` followed by the violated category
//! codes (`O1`..`O8`). Anything else is treated as ambiguous and fails open.

use super::{taxonomy, Verdict};
use crate::core::CheckKind;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static CATEGORY_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"O\d").expect("valid category code regex"));

/// Characters of the classified text kept in verdict details.
pub const DEFAULT_EXCERPT_CHARS: usize = 200;

fn excerpt(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Converts a raw model response into a verdict.
///
/// `original` is the text that was classified; a truncated excerpt is kept in
/// the verdict detail along with the raw response.
#[must_use]
pub fn parse_guard_response(response: &str, original: &str, check: CheckKind) -> Verdict {
    parse_guard_response_with_limit(response, original, check, DEFAULT_EXCERPT_CHARS)
}

/// Same as [`parse_guard_response`] with an explicit excerpt length.
#[must_use]
pub fn parse_guard_response_with_limit(
    response: &str,
    original: &str,
    check: CheckKind,
    max_chars: usize,
) -> Verdict {
    let normalized = response.trim().to_lowercase();

    if normalized.starts_with("safe") {
        return Verdict::allow();
    }

    if normalized.starts_with("unsafe") {
        let mut categories: BTreeSet<String> = CATEGORY_CODE
            .find_iter(response)
            .map(|m| m.as_str().to_string())
            .collect();
        if categories.is_empty() {
            categories.insert(taxonomy::GENERIC_CATEGORY.to_string());
        }
        let refusal = taxonomy::refusal_for(&categories, check);
        return Verdict::deny(categories, refusal)
            .with_detail("raw_response", serde_json::json!(response.trim()))
            .with_detail("excerpt", serde_json::json!(excerpt(original, max_chars)));
    }

    Verdict::allow()
        .with_detail("ambiguous_response", serde_json::json!(response.trim()))
        .with_detail("excerpt", serde_json::json!(excerpt(original, max_chars)))
}
