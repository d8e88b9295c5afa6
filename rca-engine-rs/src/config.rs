// rca-engine-rs/src/config.rs
// Engine tuning knobs. Defaults match the documented behaviour; every value
// can be overridden from the environment.

use std::path::PathBuf;
use std::time::Duration;

use config_rs::{env_opt, env_or};

use crate::error::ConfigError;
use crate::time_range::MAX_BUFFER_MINUTES;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Hard cap on gather/reason/reflect iterations.
    pub max_loops: u32,
    /// Scores strictly above this trigger clarification.
    pub ambiguity_threshold: f64,
    /// Lower edge of the "partial" band.
    pub partial_threshold: f64,
    pub default_buffer_minutes: i64,
    /// Maximum log records returned per gather.
    pub evidence_limit: usize,
    /// Maximum records serialised into a reasoning request.
    pub reasoning_excerpt_limit: usize,
    pub report_sample_lines: usize,
    pub log_timeout: Duration,
    pub metrics_timeout: Duration,
    pub reasoning_timeout: Duration,
    pub continuation_ttl: Duration,
    /// Replaces the built-in vocabulary when set.
    pub vocabulary_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_loops: 3,
            ambiguity_threshold: 0.7,
            partial_threshold: 0.4,
            default_buffer_minutes: 15,
            evidence_limit: 100,
            reasoning_excerpt_limit: 50,
            report_sample_lines: 5,
            log_timeout: Duration::from_secs(10),
            metrics_timeout: Duration::from_secs(5),
            reasoning_timeout: Duration::from_secs(60),
            continuation_ttl: Duration::from_secs(15 * 60),
            vocabulary_path: None,
        }
    }
}

impl EngineConfig {
    /// Construct configuration from `RCA_*` environment variables.
    ///
    /// Invalid individual values fall back to their defaults (and are logged
    /// by `config_rs`); the combined result is then validated.
    pub fn from_env() -> Result<Self, ConfigError> {
        let d = Self::default();
        let millis = |name: &str, default: Duration| {
            Duration::from_millis(env_or(name, default.as_millis() as u64))
        };

        let cfg = Self {
            max_loops: env_or("RCA_MAX_LOOPS", d.max_loops),
            ambiguity_threshold: env_or("RCA_AMBIGUITY_THRESHOLD", d.ambiguity_threshold),
            partial_threshold: env_or("RCA_PARTIAL_THRESHOLD", d.partial_threshold),
            default_buffer_minutes: env_or("RCA_DEFAULT_BUFFER_MINUTES", d.default_buffer_minutes),
            evidence_limit: env_or("RCA_EVIDENCE_LIMIT", d.evidence_limit),
            reasoning_excerpt_limit: env_or("RCA_REASONING_EXCERPT_LIMIT", d.reasoning_excerpt_limit),
            report_sample_lines: env_or("RCA_REPORT_SAMPLE_LINES", d.report_sample_lines),
            log_timeout: millis("RCA_LOG_TIMEOUT_MS", d.log_timeout),
            metrics_timeout: millis("RCA_METRICS_TIMEOUT_MS", d.metrics_timeout),
            reasoning_timeout: millis("RCA_REASONING_TIMEOUT_MS", d.reasoning_timeout),
            continuation_ttl: Duration::from_secs(env_or(
                "RCA_CONTINUATION_TTL_SECS",
                d.continuation_ttl.as_secs(),
            )),
            vocabulary_path: env_opt("RCA_VOCABULARY_PATH").map(PathBuf::from),
        };

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
            ConfigError::InvalidValue {
                field,
                reason: reason.into(),
            }
        }

        if self.max_loops == 0 {
            return Err(invalid("max_loops", "must be at least 1"));
        }
        for (field, value) in [
            ("ambiguity_threshold", self.ambiguity_threshold),
            ("partial_threshold", self.partial_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(field, format!("{} is outside [0, 1]", value)));
            }
        }
        if self.partial_threshold > self.ambiguity_threshold {
            return Err(invalid(
                "partial_threshold",
                "must not exceed ambiguity_threshold",
            ));
        }
        self.buffer()?;
        for (field, value) in [
            ("evidence_limit", self.evidence_limit),
            ("reasoning_excerpt_limit", self.reasoning_excerpt_limit),
            ("report_sample_lines", self.report_sample_lines),
        ] {
            if value == 0 {
                return Err(invalid(field, "must be at least 1"));
            }
        }
        Ok(())
    }

    /// Buffer applied around single instants, at most 30 days.
    pub fn buffer(&self) -> Result<chrono::Duration, ConfigError> {
        let minutes = self.default_buffer_minutes;
        if !(1..=MAX_BUFFER_MINUTES).contains(&minutes) {
            return Err(ConfigError::InvalidValue {
                field: "default_buffer_minutes",
                reason: format!("{} is outside [1, {}]", minutes, MAX_BUFFER_MINUTES),
            });
        }
        chrono::Duration::try_minutes(minutes).ok_or(ConfigError::InvalidValue {
            field: "default_buffer_minutes",
            reason: format!("{} minutes is not representable", minutes),
        })
    }
}
