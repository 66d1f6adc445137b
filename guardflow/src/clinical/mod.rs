//! Standard four-stage clinical pipeline.
//!
//! | stage  | untrusted input               | trusted | output audited |
//! |--------|-------------------------------|---------|----------------|
//! | night  | overnight patient responses   | no      | no             |
//! | rap1   | none                          | yes     | yes            |
//! | day    | complaint and symptom list    | no      | yes            |
//! | rap2   | none                          | yes     | yes            |
//!
//! The night stage applies deterministic thresholds to vitals, so its
//! structured output is not sent to the classifier.

use crate::config::GuardConfig;
use crate::context::{ClinicalReport, ReportSection, SessionContext, StageArtifact};
use crate::core::WorkflowPhase;
use crate::errors::{GuardflowError, PipelineValidationError};
use crate::guard::Classifier;
use crate::pipeline::{GuardedPipeline, PipelineBuilder, StageDefinition};
use crate::policy;
use crate::stages::Stage;
use std::sync::Arc;

/// Overnight monitoring stage name.
pub const NIGHT: &str = "night";
/// Overnight report stage name.
pub const RAP1: &str = "rap1";
/// Day consultation stage name.
pub const DAY: &str = "day";
/// Day report stage name.
pub const RAP2: &str = "rap2";

/// Caller-supplied business logic for the four clinical stages.
#[derive(Debug, Clone)]
pub struct ClinicalStages {
    /// Overnight monitoring analysis.
    pub night: Arc<dyn Stage>,
    /// Overnight report synthesis.
    pub rap1: Arc<dyn Stage>,
    /// Daytime consultation analysis.
    pub day: Arc<dyn Stage>,
    /// Daytime report synthesis.
    pub rap2: Arc<dyn Stage>,
}

/// Returns the four stage definitions in execution order.
#[must_use]
pub fn standard_stages(stages: ClinicalStages) -> Vec<StageDefinition> {
    vec![
        StageDefinition::new(NIGHT, WorkflowPhase::Night, stages.night)
            .with_input_fn(policy::night_input)
            .skip_output_check(),
        StageDefinition::new(RAP1, WorkflowPhase::Rap1, stages.rap1)
            .with_input_fn(policy::rap1_input)
            .trusted(),
        StageDefinition::new(DAY, WorkflowPhase::Day, stages.day).with_input_fn(policy::day_input),
        StageDefinition::new(RAP2, WorkflowPhase::Rap2, stages.rap2)
            .with_input_fn(policy::rap2_input)
            .trusted(),
    ]
}

/// Returns a builder preloaded with the four clinical stages.
///
/// # Errors
///
/// Returns an error if a stage definition is invalid.
pub fn standard_builder(
    stages: ClinicalStages,
) -> Result<PipelineBuilder, PipelineValidationError> {
    standard_stages(stages)
        .into_iter()
        .try_fold(PipelineBuilder::new("clinical"), PipelineBuilder::stage)
}

/// Builds the standard clinical pipeline.
///
/// # Errors
///
/// Returns an error if the configuration is invalid.
pub fn standard_pipeline(
    stages: ClinicalStages,
    classifier: Arc<dyn Classifier>,
    config: GuardConfig,
) -> Result<GuardedPipeline, GuardflowError> {
    standard_builder(stages)?
        .with_classifier(classifier)
        .with_config(config)
        .build()
}

fn report_sections(report: &mut ClinicalReport, heading: &str, artifact: Option<&StageArtifact>) {
    match artifact {
        Some(StageArtifact::Report(inner)) => {
            for section in &inner.sections {
                report.sections.push(ReportSection::new(
                    format!("{heading}: {}", section.title),
                    section.content.clone(),
                ));
            }
        }
        Some(other) => {
            let body = other.sections().map(|s| s.join("\n\n")).unwrap_or_default();
            report.sections.push(ReportSection::new(heading, body));
        }
        None => {}
    }
}

/// Assembles the audited overnight and day reports into one document.
///
/// A blocked session yields only the refusal message, regardless of any
/// artifacts produced before the block.
#[must_use]
pub fn session_report(ctx: &SessionContext) -> ClinicalReport {
    let mut report = ClinicalReport::new(format!("Clinical Session Report: {}", ctx.subject_id()));

    if let Some(block) = ctx.block_info() {
        return report.with_section("Request refused", block.sanitized_message.clone());
    }

    report_sections(&mut report, "Overnight", ctx.artifact(RAP1));
    report_sections(&mut report, "Consultation", ctx.artifact(RAP2));
    report.with_section("Audit trail", ctx.trail().summary().join("\n"))
}
