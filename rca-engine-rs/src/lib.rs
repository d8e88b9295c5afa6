// rca-engine-rs/src/lib.rs
// Root-cause analysis orchestration engine.
//
// A query is scored for ambiguity and classified against a table-driven
// vocabulary. Ambiguous queries are answered with a clarification request
// and a continuation token; everything else runs a bounded
// gather/reason/reflect loop over injected log, metrics and reasoning
// collaborators, then a report is synthesized.
//
// Design notes:
// - Collaborators are traits, constructed once by the caller and passed in
//   through `Collaborators`. The engine never builds clients itself.
// - Failures inside an analysis are recorded as `RecoverableCondition`s and
//   surface as report notes. `RcaError` is reserved for bad requests,
//   unknown continuation tokens and configuration problems.

pub mod backends;
pub mod clarifier;
pub mod classifier;
pub mod config;
pub mod continuation;
pub mod engine;
pub mod error;
pub mod evidence;
pub mod reasoning;
pub mod reflection;
pub mod report;
pub mod state;
pub mod time_range;
pub mod types;
pub mod vocabulary;

#[cfg(test)]
mod tests;

pub use backends::{Collaborators, LogFilter, LogStore, MetricsStore, MetricsTarget, ReasoningService};
pub use clarifier::{ClarificationQuestion, ClarificationRequest, InteractiveClarifier};
pub use classifier::{Classification, QueryClassifier, TemporalHint};
pub use config::EngineConfig;
pub use continuation::{ContinuationStore, InMemoryContinuationStore, SuspendedAnalysis};
pub use engine::{AnalysisRequest, RcaEngine, RcaOutcome, MAX_QUERY_CHARS};
pub use error::{CollaboratorError, ConfigError, RcaError, RecoverableCondition, Result};
pub use evidence::EvidenceGatherer;
pub use reasoning::{DegradationCause, ReasoningCoordinator, ReasoningOutcome};
pub use reflection::{LoopPhase, ReflectionController, Termination};
pub use report::{RcaReport, ReportStatus, ReportSynthesizer};
pub use state::RcaState;
pub use time_range::{ResolvedWindow, WindowOrigin};
pub use types::*;
pub use vocabulary::Vocabulary;
