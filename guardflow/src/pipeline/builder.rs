//! Pipeline builder with validation.

use super::{GuardedPipeline, StageDefinition};
use crate::config::GuardConfig;
use crate::errors::{GuardflowError, PipelineValidationError, ValidationCode};
use crate::events::{EventSink, NoOpEventSink};
use crate::guard::Classifier;
use std::collections::HashSet;
use std::sync::Arc;

/// Builder for creating validated guarded pipelines.
#[derive(Clone)]
pub struct PipelineBuilder {
    name: String,
    stages: Vec<StageDefinition>,
    config: GuardConfig,
    classifier: Option<Arc<dyn Classifier>>,
    sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("name", &self.name)
            .field("stages", &self.stage_names())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PipelineBuilder {
    /// Creates a new pipeline builder with default configuration.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            config: GuardConfig::default(),
            classifier: None,
            sink: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the guard configuration.
    #[must_use]
    pub fn with_config(mut self, config: GuardConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the safety classifier.
    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Appends a stage. Stages run in the order they are added.
    ///
    /// # Errors
    ///
    /// Returns an error if the definition is invalid or its name is taken.
    pub fn stage(mut self, def: StageDefinition) -> Result<Self, PipelineValidationError> {
        def.validate()?;

        if self.stages.iter().any(|s| s.name == def.name) {
            return Err(PipelineValidationError::new(format!(
                "Duplicate stage name '{}'",
                def.name
            ))
            .with_stages(vec![def.name.clone()])
            .with_code(
                ValidationCode::new(
                    "PIPELINE-DUPLICATE-STAGE",
                    format!("Stage '{}' is defined twice", def.name),
                )
                .with_fix_hint("Stage names label audit entries and must be unique."),
            ));
        }

        self.stages.push(def);
        Ok(self)
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if there are no stages, no classifier, the
    /// configuration is invalid, or the configuration names an unknown stage.
    pub fn build(self) -> Result<GuardedPipeline, GuardflowError> {
        if self.stages.is_empty() {
            return Err(PipelineValidationError::new("Pipeline has no stages")
                .with_code(
                    ValidationCode::new("PIPELINE-EMPTY", "Cannot build an empty pipeline")
                        .with_fix_hint("Add at least one stage to the pipeline before building."),
                )
                .into());
        }

        let Some(classifier) = self.classifier else {
            return Err(PipelineValidationError::new("Pipeline has no classifier")
                .with_code(
                    ValidationCode::new("PIPELINE-NO-CLASSIFIER", "No safety classifier configured")
                        .with_fix_hint("Call with_classifier before build."),
                )
                .into());
        };

        self.config.validate()?;

        let known: HashSet<&str> = self.stages.iter().map(|s| s.name.as_str()).collect();
        if let Some(unknown) = self
            .config
            .skip_output_check
            .iter()
            .find(|name| !known.contains(name.as_str()))
        {
            return Err(PipelineValidationError::new(format!(
                "skip_output_check names unknown stage '{unknown}'"
            ))
            .with_stages(vec![unknown.clone()])
            .with_code(ValidationCode::new(
                "PIPELINE-UNKNOWN-SKIP",
                "Output-check override references a stage that does not exist",
            ))
            .into());
        }

        Ok(GuardedPipeline::new(
            self.name,
            self.stages,
            classifier,
            self.config,
            self.sink,
        ))
    }
}
