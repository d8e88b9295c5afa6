// rca-engine-rs/src/state.rs
// Per-request analysis state. Owned by one analysis, never shared.

use tracing::{info, warn};
use uuid::Uuid;

use crate::classifier::Classification;
use crate::error::RecoverableCondition;
use crate::reasoning::{DegradationCause, ReasoningOutcome};
use crate::reflection::{LoopPhase, Termination};
use crate::time_range::ResolvedWindow;
use crate::types::{AmbiguityBand, EvidenceBundle, Hypothesis, Query, TimeWindow};

#[derive(Debug, Clone)]
pub struct RcaState {
    pub request_id: Uuid,
    pub query: Query,
    pub classification: Classification,
    pub band: AmbiguityBand,
    /// True when this analysis continues a clarification round.
    pub resumed: bool,
    pub window: ResolvedWindow,
    /// Window used by the most recent gather; wider than `window` after the first iteration.
    pub searched_window: TimeWindow,
    /// Union of everything gathered so far.
    pub evidence: EvidenceBundle,
    /// One hypothesis per completed reasoning step, oldest first.
    pub hypotheses: Vec<Hypothesis>,
    pub last_degradation: Option<DegradationCause>,
    pub loop_count: u32,
    pub max_loops: u32,
    pub phase: LoopPhase,
    pub termination: Option<Termination>,
    pub conditions: Vec<RecoverableCondition>,
}

impl RcaState {
    pub fn new(
        request_id: Uuid,
        query: Query,
        classification: Classification,
        band: AmbiguityBand,
        window: ResolvedWindow,
        max_loops: u32,
    ) -> Self {
        let searched_window = window.window;
        Self {
            request_id,
            query,
            classification,
            band,
            resumed: false,
            window,
            searched_window,
            evidence: EvidenceBundle::default(),
            hypotheses: Vec::new(),
            last_degradation: None,
            loop_count: 0,
            max_loops,
            phase: LoopPhase::Gather,
            termination: None,
            conditions: Vec::new(),
        }
    }

    pub fn latest_hypothesis(&self) -> Option<&Hypothesis> {
        self.hypotheses.last()
    }

    /// The most recent hypothesis that parsed cleanly.
    pub fn latest_well_formed(&self) -> Option<&Hypothesis> {
        self.hypotheses.iter().rev().find(|h| h.well_formed)
    }

    /// Record a reasoning outcome, noting degradation as a recoverable condition.
    pub fn push_outcome(&mut self, outcome: ReasoningOutcome) {
        let iteration = self.loop_count + 1;
        match outcome {
            ReasoningOutcome::WellFormed(hypothesis) => {
                self.last_degradation = None;
                self.hypotheses.push(hypothesis);
            }
            ReasoningOutcome::Degraded { hypothesis, cause } => {
                let condition = match &cause {
                    DegradationCause::MalformedOutput => RecoverableCondition::ReasoningMalformedOutput { iteration },
                    DegradationCause::ServiceUnavailable(reason) => {
                        RecoverableCondition::ReasoningServiceUnavailable {
                            iteration,
                            reason: reason.clone(),
                        }
                    }
                    DegradationCause::Timeout => RecoverableCondition::ReasoningServiceUnavailable {
                        iteration,
                        reason: "timed out".to_string(),
                    },
                };
                self.record(condition);
                self.last_degradation = Some(cause);
                self.hypotheses.push(hypothesis);
            }
        }
    }

    /// Log and keep a recoverable condition for the report.
    pub fn record(&mut self, condition: RecoverableCondition) {
        match &condition {
            RecoverableCondition::LoopExhausted { .. } | RecoverableCondition::ClassificationIndeterminate => {
                info!(request_id = %self.request_id, %condition, "analysis condition")
            }
            _ => warn!(request_id = %self.request_id, %condition, "recoverable condition"),
        }
        self.conditions.push(condition);
    }
}
