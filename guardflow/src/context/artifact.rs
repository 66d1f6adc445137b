//! Stage artifacts: the tagged union of per-stage output shapes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when an artifact cannot be decomposed or rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArtifactError {
    /// A redaction targeted a section that does not exist.
    #[error("section {index} out of range ({len} sections)")]
    SectionOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of sections in the artifact.
        len: usize,
    },

    /// A structured artifact has no text-section interpretation.
    #[error("structured artifact of type {0} cannot be split into text sections")]
    Unsectionable(&'static str),
}

/// Heading given to a report section whose title and body were redacted.
pub const REDACTED_SECTION_TITLE: &str = "Redacted section";

/// A titled section of a generated clinical report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSection {
    /// Section heading.
    pub title: String,
    /// Section body.
    pub content: String,
}

impl ReportSection {
    /// Creates a new report section.
    #[must_use]
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }
}

/// A generated clinical report made of ordered sections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClinicalReport {
    /// Report title.
    pub title: String,
    /// Ordered report sections.
    #[serde(default)]
    pub sections: Vec<ReportSection>,
}

impl ClinicalReport {
    /// Creates an empty report with a title.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            sections: Vec::new(),
        }
    }

    /// Appends a section.
    #[must_use]
    pub fn with_section(mut self, title: impl Into<String>, content: impl Into<String>) -> Self {
        self.sections.push(ReportSection::new(title, content));
        self
    }

    /// Renders the report as markdown, one `##` heading per section.
    #[must_use]
    pub fn to_markdown(&self) -> String {
        let mut md = format!("# {}\n\n", self.title);
        for section in &self.sections {
            md.push_str(&format!("## {}\n\n{}\n\n---\n\n", section.title, section.content));
        }
        md
    }
}

/// Output produced by a stage, keyed by stage name in the session context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StageArtifact {
    /// Free text; sections are blank-line separated paragraphs.
    Text(String),
    /// An itemised list (events, differential diagnoses, recommendations).
    Findings(Vec<String>),
    /// A sectioned report.
    Report(ClinicalReport),
    /// Deterministic structured data.
    Structured(serde_json::Value),
}

impl StageArtifact {
    /// Returns the short kind name used in logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Findings(_) => "findings",
            Self::Report(_) => "report",
            Self::Structured(_) => "structured",
        }
    }

    /// Decomposes the artifact into the text sections the auditor classifies.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::Unsectionable`] for structured values that are
    /// not strings, string lists, or flat objects.
    pub fn sections(&self) -> Result<Vec<String>, ArtifactError> {
        match self {
            Self::Text(text) => Ok(paragraphs(text)),
            Self::Findings(items) => Ok(items.clone()),
            Self::Report(report) => Ok(report
                .sections
                .iter()
                .map(|s| format!("{}\n{}", s.title, s.content))
                .collect()),
            Self::Structured(value) => structured_sections(value),
        }
    }

    /// Replaces one section in place with `notice`.
    ///
    /// Section indexes match [`StageArtifact::sections`]. A report section is
    /// classified with its heading, so both are replaced: the heading becomes
    /// [`REDACTED_SECTION_TITLE`] and the body becomes `notice`.
    ///
    /// # Errors
    ///
    /// Returns an error when `index` is out of range or the artifact cannot be
    /// sectioned.
    pub fn redact(&mut self, index: usize, notice: &str) -> Result<(), ArtifactError> {
        match self {
            Self::Text(text) => {
                let mut parts = paragraphs(text);
                let len = parts.len();
                let slot = parts
                    .get_mut(index)
                    .ok_or(ArtifactError::SectionOutOfRange { index, len })?;
                *slot = notice.to_string();
                *text = parts.join("\n\n");
            }
            Self::Findings(items) => {
                let len = items.len();
                let slot = items
                    .get_mut(index)
                    .ok_or(ArtifactError::SectionOutOfRange { index, len })?;
                *slot = notice.to_string();
            }
            Self::Report(report) => {
                let len = report.sections.len();
                let section = report
                    .sections
                    .get_mut(index)
                    .ok_or(ArtifactError::SectionOutOfRange { index, len })?;
                section.title = REDACTED_SECTION_TITLE.to_string();
                section.content = notice.to_string();
            }
            Self::Structured(value) => redact_structured(value, index, notice)?,
        }
        Ok(())
    }
}

fn paragraphs(text: &str) -> Vec<String> {
    text.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

fn value_type(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

fn scalar_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn structured_sections(value: &serde_json::Value) -> Result<Vec<String>, ArtifactError> {
    match value {
        serde_json::Value::Null => Ok(Vec::new()),
        serde_json::Value::String(s) => Ok(vec![s.clone()]),
        serde_json::Value::Array(items) => items
            .iter()
            .map(|item| scalar_text(item).ok_or(ArtifactError::Unsectionable(value_type(item))))
            .collect(),
        serde_json::Value::Object(map) => map
            .iter()
            .map(|(key, item)| {
                scalar_text(item)
                    .map(|text| format!("{key}: {text}"))
                    .ok_or(ArtifactError::Unsectionable(value_type(item)))
            })
            .collect(),
        other => Err(ArtifactError::Unsectionable(value_type(other))),
    }
}

fn redact_structured(
    value: &mut serde_json::Value,
    index: usize,
    notice: &str,
) -> Result<(), ArtifactError> {
    let len = structured_sections(value)?.len();
    let out_of_range = ArtifactError::SectionOutOfRange { index, len };
    match value {
        serde_json::Value::String(s) if index == 0 => {
            *s = notice.to_string();
            Ok(())
        }
        serde_json::Value::Array(items) => {
            let slot = items.get_mut(index).ok_or(out_of_range)?;
            *slot = serde_json::json!(notice);
            Ok(())
        }
        serde_json::Value::Object(map) => {
            let slot = map.values_mut().nth(index).ok_or(out_of_range)?;
            *slot = serde_json::json!(notice);
            Ok(())
        }
        _ => Err(out_of_range),
    }
}
