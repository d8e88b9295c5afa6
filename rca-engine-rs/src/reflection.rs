// rca-engine-rs/src/reflection.rs
// The bounded gather/reason/reflect loop.

use metrics::{histogram, increment_counter};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::backends::LogFilter;
use crate::error::RecoverableCondition;
use crate::evidence::EvidenceGatherer;
use crate::reasoning::{ReasoningCoordinator, ReasoningInput};
use crate::state::RcaState;
use crate::types::TimeWindow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoopPhase {
    Gather,
    Reason,
    Reflect,
    Synthesize,
}

/// Why the loop reached `Synthesize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// A well-formed hypothesis no longer needed more evidence.
    Resolved,
    /// The iteration cap was hit while more evidence was still wanted.
    Exhausted,
    /// The cap was hit, the last reasoning call failed outright and no
    /// well-formed hypothesis was ever produced.
    Unavailable,
}

#[derive(Debug, Clone)]
pub struct ReflectionController {
    max_loops: u32,
    buffer: chrono::Duration,
}

impl ReflectionController {
    pub fn new(max_loops: u32, buffer: chrono::Duration) -> Self {
        Self {
            max_loops: max_loops.max(1),
            buffer,
        }
    }

    pub fn max_loops(&self) -> u32 {
        self.max_loops
    }

    /// The REFLECT transition. Increments `loop_count` exactly once and
    /// returns the next phase; sets `termination` when that phase is
    /// `Synthesize`.
    pub fn reflect(&self, state: &mut RcaState) -> LoopPhase {
        state.loop_count += 1;
        let cap = self.max_loops.min(state.max_loops.max(1));

        let needs_more = state
            .latest_hypothesis()
            .map_or(true, |h| h.needs_more_evidence);

        if needs_more && state.loop_count < cap {
            debug!(loop_count = state.loop_count, "more evidence requested");
            return LoopPhase::Gather;
        }

        let termination = if !needs_more {
            Termination::Resolved
        } else {
            let failed_outright = state
                .last_degradation
                .as_ref()
                .map_or(false, |cause| cause.is_unavailable());
            if failed_outright && state.latest_well_formed().is_none() {
                Termination::Unavailable
            } else {
                Termination::Exhausted
            }
        };

        if termination != Termination::Resolved {
            increment_counter!("rca_loops_exhausted_total");
            state.record(RecoverableCondition::LoopExhausted {
                attempts: state.loop_count,
            });
        }
        state.termination = Some(termination);
        LoopPhase::Synthesize
    }

    /// Drive the state machine from `Gather` to `Synthesize`.
    #[instrument(skip_all, fields(request_id = %state.request_id, max_loops = self.max_loops))]
    pub async fn run(&self, state: &mut RcaState, gatherer: &EvidenceGatherer, reasoning: &ReasoningCoordinator) {
        state.phase = LoopPhase::Gather;

        loop {
            match state.phase {
                LoopPhase::Gather => {
                    let (filter, window) = self.next_search(state);
                    let bundle = gatherer
                        .gather_with_filter(&filter, &state.classification.resource, &window)
                        .await;
                    for failure in &bundle.failures {
                        state.record(RecoverableCondition::EvidenceSourceUnavailable {
                            source: failure.source,
                            reason: failure.reason.clone(),
                        });
                    }
                    state.searched_window = window;
                    state.evidence.absorb(bundle);
                    state.phase = LoopPhase::Reason;
                }
                LoopPhase::Reason => {
                    let outcome = reasoning
                        .reason(ReasoningInput {
                            query: &state.query.text,
                            resource: &state.classification.resource,
                            window: &state.searched_window,
                            evidence: &state.evidence,
                            prior: &state.hypotheses,
                        })
                        .await;
                    state.push_outcome(outcome);
                    state.phase = LoopPhase::Reflect;
                }
                LoopPhase::Reflect => {
                    let next = self.reflect(state);
                    state.phase = next;
                }
                LoopPhase::Synthesize => break,
            }
        }

        histogram!("rca_loop_iterations", state.loop_count as f64);
        info!(
            loop_count = state.loop_count,
            termination = ?state.termination,
            logs = state.evidence.logs.len(),
            "reflection loop finished"
        );
    }

    /// Filter and window for the next gather. Gather `n` (0-based) widens
    /// the resolved window by `n` buffers on each side and searches for the
    /// latest hypothesis's affected component as well.
    fn next_search(&self, state: &RcaState) -> (LogFilter, TimeWindow) {
        let mut filter = LogFilter::from_classification(&state.classification);
        let base = state.window.window;
        if state.loop_count == 0 {
            return (filter, base);
        }

        if let Some(component) = state
            .latest_well_formed()
            .map(|h| h.affected_component.as_str())
            .filter(|c| !c.trim().is_empty())
        {
            filter = filter.with_term(component);
        }
        let steps = i32::try_from(state.loop_count).unwrap_or(i32::MAX);
        let widened = base.widened(self.buffer.checked_mul(steps).unwrap_or(chrono::Duration::MAX));
        (filter, widened)
    }
}
