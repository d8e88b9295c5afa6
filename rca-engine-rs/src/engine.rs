// rca-engine-rs/src/engine.rs
// Request-level facade: classify, clarify or run the loop, synthesize.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::increment_counter;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn, Span};
use uuid::Uuid;

use crate::backends::Collaborators;
use crate::clarifier::{merge_answers, ClarificationRequest, InteractiveClarifier};
use crate::classifier::{Classification, QueryClassifier};
use crate::config::EngineConfig;
use crate::continuation::{ContinuationStore, InMemoryContinuationStore, SuspendedAnalysis};
use crate::error::{RcaError, RecoverableCondition, Result};
use crate::evidence::EvidenceGatherer;
use crate::reasoning::ReasoningCoordinator;
use crate::reflection::ReflectionController;
use crate::report::{RcaReport, ReportSynthesizer};
use crate::state::RcaState;
use crate::time_range::{self, WindowOrigin, MAX_BUFFER_MINUTES};
use crate::types::Query;
use crate::vocabulary::Vocabulary;

/// Longest query text accepted.
pub const MAX_QUERY_CHARS: usize = 4_000;

/// One call into the engine: a fresh query, or the answers to an earlier
/// clarification request identified by its token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub continuation_token: Option<String>,
    #[serde(default)]
    pub clarification_answers: BTreeMap<String, String>,
}

impl AnalysisRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn resume(token: impl Into<String>, answers: BTreeMap<String, String>) -> Self {
        Self {
            query: String::new(),
            continuation_token: Some(token.into()),
            clarification_answers: answers,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RcaOutcome {
    Report(RcaReport),
    Clarification {
        request: ClarificationRequest,
        continuation_token: String,
    },
}

/// The orchestration core. Cheap to share behind an `Arc`; holds no
/// per-request state.
pub struct RcaEngine {
    config: EngineConfig,
    classifier: QueryClassifier,
    clarifier: InteractiveClarifier,
    gatherer: EvidenceGatherer,
    reasoning: ReasoningCoordinator,
    reflection: ReflectionController,
    synthesizer: ReportSynthesizer,
    continuations: Arc<dyn ContinuationStore>,
}

impl RcaEngine {
    /// Assemble an engine from already-validated parts. An out-of-range
    /// buffer is clamped here; [`from_config`](Self::from_config) rejects it.
    pub fn new(config: EngineConfig, vocabulary: Vocabulary, collaborators: Collaborators) -> Self {
        let buffer = config.buffer().unwrap_or_else(|err| {
            warn!(error = %err, "clamping default buffer");
            chrono::Duration::minutes(config.default_buffer_minutes.clamp(1, MAX_BUFFER_MINUTES))
        });
        let vocabulary = Arc::new(vocabulary);
        let continuations: Arc<dyn ContinuationStore> =
            Arc::new(InMemoryContinuationStore::new(config.continuation_ttl));

        Self {
            classifier: QueryClassifier::new(vocabulary.clone()),
            clarifier: InteractiveClarifier::new(vocabulary, config.ambiguity_threshold),
            gatherer: EvidenceGatherer::new(
                collaborators.logs,
                collaborators.metrics,
                config.evidence_limit,
                config.log_timeout,
                config.metrics_timeout,
            ),
            reasoning: ReasoningCoordinator::new(
                collaborators.reasoning,
                config.reasoning_timeout,
                config.reasoning_excerpt_limit,
            ),
            reflection: ReflectionController::new(config.max_loops, buffer),
            synthesizer: ReportSynthesizer::new(config.report_sample_lines, config.default_buffer_minutes),
            continuations,
            config,
        }
    }

    /// Validate `config` and load the vocabulary it names (or the built-in one).
    pub fn from_config(config: EngineConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;
        let vocabulary = match &config.vocabulary_path {
            Some(path) => Vocabulary::load(path)?,
            None => Vocabulary::default(),
        };
        Ok(Self::new(config, vocabulary, collaborators))
    }

    /// Replace the default in-memory continuation store.
    pub fn with_continuation_store(mut self, store: Arc<dyn ContinuationStore>) -> Self {
        self.continuations = store;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn classifier(&self) -> &QueryClassifier {
        &self.classifier
    }

    pub async fn analyze(&self, request: AnalysisRequest) -> Result<RcaOutcome> {
        self.analyze_at(request, Utc::now()).await
    }

    /// Like [`analyze`](Self::analyze) with an explicit receive time.
    #[instrument(skip_all, fields(request_id = tracing::field::Empty, resumed = request.continuation_token.is_some()))]
    pub async fn analyze_at(&self, request: AnalysisRequest, now: DateTime<Utc>) -> Result<RcaOutcome> {
        increment_counter!("rca_requests_total");

        match request.continuation_token {
            Some(token) => self.resume(&token, &request.clarification_answers).await,
            None => {
                let text = validate_query(&request.query)?;
                let request_id = Uuid::new_v4();
                Span::current().record("request_id", tracing::field::display(request_id));

                let query = Query::new(text, now);
                let classification = self.classifier.classify(&query.text);

                if self.clarifier.should_clarify(&classification.assessment) {
                    return Ok(self.suspend(request_id, query, classification, now).await);
                }
                Ok(RcaOutcome::Report(self.run(request_id, query, classification, false).await))
            }
        }
    }

    async fn suspend(
        &self,
        request_id: Uuid,
        query: Query,
        classification: Classification,
        now: DateTime<Utc>,
    ) -> RcaOutcome {
        let request = self
            .clarifier
            .build_request(&classification.assessment, &classification.resource);
        let asked = request.criteria();

        let token = self
            .continuations
            .suspend(SuspendedAnalysis {
                request_id,
                query,
                classification,
                asked,
                suspended_at: now,
            })
            .await;

        increment_counter!("rca_clarifications_total");
        info!(
            %request_id,
            score = request.ambiguity_score,
            questions = request.questions.len(),
            "clarification requested"
        );

        RcaOutcome::Clarification {
            request,
            continuation_token: token,
        }
    }

    async fn resume(&self, token: &str, answers: &BTreeMap<String, String>) -> Result<RcaOutcome> {
        let unknown = || RcaError::UnknownContinuation(token.to_string());

        // Rejected answers leave the token usable for a corrected retry.
        let pending = self.continuations.peek(token).await.ok_or_else(unknown)?;
        let merged = merge_answers(&pending.query.text, answers);
        validate_query(&merged)?;

        let suspended = self.continuations.resume(token).await.ok_or_else(unknown)?;
        Span::current().record("request_id", tracing::field::display(suspended.request_id));

        let query = Query::new(merged, suspended.query.received_at);
        let classification = self.classifier.classify(&query.text);

        info!(
            request_id = %suspended.request_id,
            asked = suspended.asked.len(),
            answered = answers.len(),
            score = classification.assessment.score(),
            "resuming after clarification"
        );

        // A resumed analysis is never clarified twice.
        Ok(RcaOutcome::Report(
            self.run(suspended.request_id, query, classification, true).await,
        ))
    }

    async fn run(&self, request_id: Uuid, query: Query, classification: Classification, resumed: bool) -> RcaReport {
        let band = classification
            .assessment
            .band(self.config.partial_threshold, self.config.ambiguity_threshold);
        let window = time_range::resolve(
            classification.temporal_hint.as_ref(),
            query.received_at,
            self.config.default_buffer_minutes,
        );

        let indeterminate = classification.assessment.satisfied_count() == 0;
        let fallback = match &window.origin {
            WindowOrigin::Fallback { hint, reason } => Some(RecoverableCondition::TimeParseFailure {
                hint: hint.clone(),
                reason: reason.clone(),
            }),
            _ => None,
        };

        let mut state = RcaState::new(request_id, query, classification, band, window, self.config.max_loops);
        state.resumed = resumed;
        if indeterminate {
            state.record(RecoverableCondition::ClassificationIndeterminate);
        }
        if let Some(condition) = fallback {
            state.record(condition);
        }

        self.reflection.run(&mut state, &self.gatherer, &self.reasoning).await;
        self.synthesizer.synthesize(&state)
    }
}

fn validate_query(text: &str) -> Result<&str> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(RcaError::InvalidRequest("query must not be empty".to_string()));
    }
    if trimmed.chars().count() > MAX_QUERY_CHARS {
        return Err(RcaError::InvalidRequest(format!(
            "query exceeds {} characters",
            MAX_QUERY_CHARS
        )));
    }
    Ok(trimmed)
}
