//! Guard configuration.
//!
//! Configuration can be built in code, parsed from JSON, or read from
//! `GUARDFLOW_*` environment variables. Missing JSON fields take their
//! defaults.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Environment variable enabling or disabling all guard checks.
pub const ENV_GUARD_ENABLED: &str = "GUARDFLOW_GUARD_ENABLED";
/// Environment variable enabling the trusted-input bypass.
pub const ENV_TRUSTED_BYPASS: &str = "GUARDFLOW_TRUSTED_BYPASS";
/// Environment variable setting the classifier timeout in seconds.
pub const ENV_CLASSIFIER_TIMEOUT: &str = "GUARDFLOW_CLASSIFIER_TIMEOUT_SECONDS";
/// Longest accepted classifier timeout, in seconds.
pub const MAX_CLASSIFIER_TIMEOUT_SECONDS: f64 = 3600.0;

/// Configuration loading and validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// The file path.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The JSON document is invalid.
    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// An environment variable holds an unparseable value.
    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv {
        /// The variable name.
        var: &'static str,
        /// The raw value.
        value: String,
    },

    /// A field is out of range.
    #[error("invalid config field {field}: {reason}")]
    Invalid {
        /// The offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Engine-wide guard settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Master switch for all input and output checks.
    #[serde(default = "default_guard_enabled")]
    pub guard_enabled: bool,

    /// Skip input checks on stages marked as trusted.
    #[serde(default)]
    pub trusted_bypass: bool,

    /// Upper bound for one classifier call.
    #[serde(default = "default_classifier_timeout_seconds")]
    pub classifier_timeout_seconds: f64,

    /// Stage names whose output check is always skipped.
    #[serde(default)]
    pub skip_output_check: BTreeSet<String>,

    /// Prefix of the notice that replaces a redacted section.
    #[serde(default = "default_redaction_label")]
    pub redaction_label: String,

    /// Characters of classified text or raw responses kept in audit details.
    #[serde(default = "default_max_detail_chars")]
    pub max_detail_chars: usize,
}

fn default_guard_enabled() -> bool {
    true
}

fn default_classifier_timeout_seconds() -> f64 {
    15.0
}

fn default_redaction_label() -> String {
    "[REDACTED BY SAFETY AUDIT]".to_string()
}

fn default_max_detail_chars() -> usize {
    200
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            guard_enabled: default_guard_enabled(),
            trusted_bypass: false,
            classifier_timeout_seconds: default_classifier_timeout_seconds(),
            skip_output_check: BTreeSet::new(),
            redaction_label: default_redaction_label(),
            max_detail_chars: default_max_detail_chars(),
        }
    }
}

impl GuardConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables all guard checks.
    #[must_use]
    pub fn with_guard_enabled(mut self, enabled: bool) -> Self {
        self.guard_enabled = enabled;
        self
    }

    /// Enables or disables the trusted-input bypass.
    #[must_use]
    pub fn with_trusted_bypass(mut self, enabled: bool) -> Self {
        self.trusted_bypass = enabled;
        self
    }

    /// Sets the classifier timeout.
    #[must_use]
    pub fn with_classifier_timeout(mut self, timeout: Duration) -> Self {
        self.classifier_timeout_seconds = timeout.as_secs_f64();
        self
    }

    /// Forces the output check of a stage to be skipped.
    #[must_use]
    pub fn with_skip_output_check(mut self, stage: impl Into<String>) -> Self {
        self.skip_output_check.insert(stage.into());
        self
    }

    /// Sets the redaction label.
    #[must_use]
    pub fn with_redaction_label(mut self, label: impl Into<String>) -> Self {
        self.redaction_label = label.into();
        self
    }

    /// Returns the classifier timeout as a duration.
    ///
    /// Values that fail [`Self::validate`] fall back to the default.
    #[must_use]
    pub fn classifier_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.classifier_timeout_seconds)
            .ok()
            .filter(|d| !d.is_zero())
            .unwrap_or_else(|| Duration::from_secs_f64(default_classifier_timeout_seconds()))
    }

    /// Parses and validates a JSON document.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or a field is out of range.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses, and validates a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is invalid.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Builds a configuration from defaults overridden by environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an unparseable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`GuardConfig::from_env`] with an explicit variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an unparseable value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_GUARD_ENABLED) {
            config.guard_enabled = parse_bool(ENV_GUARD_ENABLED, &value)?;
        }
        if let Some(value) = lookup(ENV_TRUSTED_BYPASS) {
            config.trusted_bypass = parse_bool(ENV_TRUSTED_BYPASS, &value)?;
        }
        if let Some(value) = lookup(ENV_CLASSIFIER_TIMEOUT) {
            config.classifier_timeout_seconds =
                value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                    var: ENV_CLASSIFIER_TIMEOUT,
                    value: value.clone(),
                })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks field ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a non-positive or non-finite
    /// timeout or an empty redaction label.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let timeout = self.classifier_timeout_seconds;
        if !timeout.is_finite() || timeout <= 0.0 || timeout > MAX_CLASSIFIER_TIMEOUT_SECONDS {
            return Err(ConfigError::Invalid {
                field: "classifier_timeout_seconds",
                reason: format!(
                    "must be in (0, {MAX_CLASSIFIER_TIMEOUT_SECONDS}], got {timeout}"
                ),
            });
        }
        if self.redaction_label.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "redaction_label",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnv {
            var,
            value: value.to_string(),
        }),
    }
}
