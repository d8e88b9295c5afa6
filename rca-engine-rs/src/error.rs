// rca-engine-rs/src/error.rs
// Error types for the RCA engine and its collaborators.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::types::EvidenceSource;

/// Result type used by this crate.
pub type Result<T> = std::result::Result<T, RcaError>;

/// Errors the engine facade returns to its caller.
///
/// Everything that can go wrong *inside* an analysis is absorbed into the
/// report as a [`RecoverableCondition`]; only problems with the request
/// itself or with engine set-up surface here.
#[derive(Debug, thiserror::Error)]
pub enum RcaError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unknown or expired continuation token: {0}")]
    UnknownContinuation(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Configuration and vocabulary loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to read vocabulary file {path}: {source}")]
    VocabularyIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse vocabulary: {0}")]
    VocabularyParse(#[from] toml::de::Error),
}

/// Failure reported by a log store, metrics store or reasoning service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("backend returned status {status}: {message}")]
    Backend { status: u16, message: String },

    #[error("could not decode backend response: {0}")]
    Decode(String),
}

/// Non-fatal conditions encountered while running an analysis.
///
/// These never abort the pipeline; they are collected on the analysis state
/// and surfaced as notes in the final report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "condition", rename_all = "snake_case")]
pub enum RecoverableCondition {
    /// No criterion matched; the query proceeds as UNKNOWN with maximal ambiguity.
    ClassificationIndeterminate,
    /// A temporal hint was found but could not be parsed.
    TimeParseFailure { hint: String, reason: String },
    /// One evidence source failed or timed out.
    EvidenceSourceUnavailable { source: EvidenceSource, reason: String },
    /// The reasoning service answered but not in the expected structure.
    ReasoningMalformedOutput { iteration: u32 },
    /// The reasoning service errored or timed out.
    ReasoningServiceUnavailable { iteration: u32, reason: String },
    /// The loop hit its iteration cap without a confident hypothesis.
    LoopExhausted { attempts: u32 },
}

impl fmt::Display for RecoverableCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClassificationIndeterminate => {
                write!(f, "no component, environment, time or action could be identified in the query")
            }
            Self::TimeParseFailure { hint, reason } => {
                write!(f, "could not interpret time reference {:?} ({})", hint, reason)
            }
            Self::EvidenceSourceUnavailable { source, reason } => {
                write!(f, "{} was unavailable: {}", source, reason)
            }
            Self::ReasoningMalformedOutput { iteration } => {
                write!(f, "reasoning output in iteration {} was not well-formed", iteration)
            }
            Self::ReasoningServiceUnavailable { iteration, reason } => {
                write!(f, "reasoning service failed in iteration {}: {}", iteration, reason)
            }
            Self::LoopExhausted { attempts } => {
                write!(f, "analysis stopped after {} attempts without a confident conclusion", attempts)
            }
        }
    }
}
