// rca-engine-rs/src/report.rs
// Final report assembly and plain-text rendering.

use std::fmt::Write as _;

use serde::Serialize;
use uuid::Uuid;

use crate::error::RecoverableCondition;
use crate::reflection::Termination;
use crate::state::RcaState;
use crate::time_range::WindowOrigin;
use crate::types::{AmbiguityBand, Hypothesis, LogRecord};

const SEVERE_LEVELS: &[&str] = &["emerg", "alert", "crit", "critical", "fatal", "error", "err", "warn", "warning"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Resolved,
    Incomplete,
    Failed,
}

/// Immutable result of one analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RcaReport {
    pub request_id: Uuid,
    pub query: String,
    pub status: ReportStatus,
    pub root_cause: String,
    pub affected_component: Option<String>,
    pub evidence_excerpt: Vec<String>,
    pub metrics_summary: Option<String>,
    pub remediation: String,
    pub citations: Vec<String>,
    pub notes: Vec<String>,
    pub confidence_caveat: Option<String>,
    pub iterations: u32,
}

impl RcaReport {
    /// Deterministic text form returned to callers.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Root cause: {}", self.root_cause);
        if let Some(component) = &self.affected_component {
            let _ = writeln!(out, "Affected component: {}", component);
        }

        out.push_str("\nEvidence:\n");
        if self.evidence_excerpt.is_empty() {
            out.push_str("  (no log records found)\n");
        }
        for line in &self.evidence_excerpt {
            let _ = writeln!(out, "  {}", line);
        }
        if let Some(metrics) = &self.metrics_summary {
            let _ = writeln!(out, "  metrics: {}", metrics);
        }

        let _ = writeln!(out, "\nRemediation: {}", self.remediation);

        if !self.citations.is_empty() {
            out.push_str("\nCitations:\n");
            for citation in &self.citations {
                let _ = writeln!(out, "  - {}", citation);
            }
        }
        if !self.notes.is_empty() {
            out.push_str("\nNotes:\n");
            for note in &self.notes {
                let _ = writeln!(out, "  - {}", note);
            }
        }
        if let Some(caveat) = &self.confidence_caveat {
            let _ = writeln!(out, "\nCaveat: {}", caveat);
        }
        let _ = write!(out, "\nIterations: {}", self.iterations);
        out
    }
}

#[derive(Debug, Clone)]
pub struct ReportSynthesizer {
    sample_lines: usize,
    buffer_minutes: i64,
}

impl ReportSynthesizer {
    pub fn new(sample_lines: usize, buffer_minutes: i64) -> Self {
        Self {
            sample_lines,
            buffer_minutes,
        }
    }

    pub fn synthesize(&self, state: &RcaState) -> RcaReport {
        let termination = state.termination.unwrap_or(Termination::Exhausted);
        let status = match termination {
            Termination::Resolved => ReportStatus::Resolved,
            Termination::Exhausted => ReportStatus::Incomplete,
            Termination::Unavailable => ReportStatus::Failed,
        };

        let (root_cause, affected_component, remediation, citations) = match termination {
            Termination::Unavailable => (
                format!("Analysis could not be completed: {}", unavailable_reason(state)),
                None,
                "Retry the analysis once the reasoning service is reachable; the evidence collected so far is listed above."
                    .to_string(),
                Vec::new(),
            ),
            _ => describe(state.latest_well_formed().or_else(|| state.latest_hypothesis())),
        };

        let confidence_caveat = match termination {
            Termination::Resolved => None,
            Termination::Exhausted => Some(format!(
                "Analysis is incomplete after {} attempts; more evidence was still requested, so treat this root cause as provisional.",
                state.loop_count
            )),
            Termination::Unavailable => Some(format!(
                "Analysis could not be completed after {} attempts because the reasoning service was unavailable.",
                state.loop_count
            )),
        };

        RcaReport {
            request_id: state.request_id,
            query: state.query.text.clone(),
            status,
            root_cause,
            affected_component,
            evidence_excerpt: select_samples(&state.evidence.logs, self.sample_lines)
                .into_iter()
                .map(LogRecord::render_line)
                .collect(),
            metrics_summary: state
                .evidence
                .metrics
                .as_ref()
                .filter(|m| !m.is_empty())
                .map(|m| m.render()),
            remediation,
            citations,
            notes: self.notes(state),
            confidence_caveat,
            iterations: state.loop_count,
        }
    }

    fn notes(&self, state: &RcaState) -> Vec<String> {
        let mut notes = Vec::new();

        match &state.window.origin {
            WindowOrigin::Default => notes.push(format!(
                "No time range was given; analysed {} (±{} minutes around the request time).",
                state.window.window, self.buffer_minutes
            )),
            WindowOrigin::Fallback { hint, reason } => notes.push(format!(
                "Could not interpret time reference {:?} ({}); analysed {} instead.",
                hint, reason, state.window.window
            )),
            WindowOrigin::Explicit | WindowOrigin::Relative => {}
        }
        if state.searched_window != state.window.window {
            notes.push(format!(
                "The search window was widened to {} on later iterations.",
                state.searched_window
            ));
        }

        let missing = state.classification.assessment.missing();
        if !missing.is_empty() && (state.band != AmbiguityBand::Clear || state.resumed) {
            let names: Vec<&str> = missing.iter().map(|c| c.key()).collect();
            notes.push(format!(
                "The query did not specify: {}. Results may be less precise.",
                names.join(", ")
            ));
        }
        if state.classification.resource.is_unknown() {
            notes.push("No specific resource was identified; logs were searched by keyword only.".to_string());
        }

        let mut seen = Vec::new();
        for failure in &state.evidence.failures {
            if seen.contains(&failure.source) {
                continue;
            }
            seen.push(failure.source);
            notes.push(format!(
                "Evidence is partial: the {} was unavailable ({}).",
                failure.source, failure.reason
            ));
        }

        for condition in &state.conditions {
            if let RecoverableCondition::ReasoningMalformedOutput { .. }
            | RecoverableCondition::ReasoningServiceUnavailable { .. } = condition
            {
                notes.push(format!("{}.", capitalize(&condition.to_string())));
            }
        }
        notes
    }
}

fn describe(hypothesis: Option<&Hypothesis>) -> (String, Option<String>, String, Vec<String>) {
    let Some(h) = hypothesis else {
        return (
            "No root cause could be determined.".to_string(),
            None,
            "Provide a more specific query or widen the time range.".to_string(),
            Vec::new(),
        );
    };

    let root_cause = if h.root_cause.trim().is_empty() {
        "No root cause could be determined.".to_string()
    } else {
        h.root_cause.clone()
    };
    let remediation = if h.remediation.trim().is_empty() {
        "No remediation could be proposed from the available evidence.".to_string()
    } else {
        h.remediation.clone()
    };
    let component = Some(h.affected_component.clone()).filter(|c| !c.trim().is_empty());
    (root_cause, component, remediation, h.supporting_evidence.clone())
}

fn unavailable_reason(state: &RcaState) -> String {
    state
        .conditions
        .iter()
        .rev()
        .find_map(|c| match c {
            RecoverableCondition::ReasoningServiceUnavailable { reason, .. } => {
                Some(format!("the reasoning service was unavailable ({})", reason))
            }
            _ => None,
        })
        .unwrap_or_else(|| "the reasoning service was unavailable".to_string())
}

fn is_severe(record: &LogRecord) -> bool {
    record
        .level
        .as_deref()
        .map(|l| SEVERE_LEVELS.contains(&l.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Up to `limit` records, most recent severe ones first, topped up with the
/// most recent others, returned time-ascending.
fn select_samples(logs: &[LogRecord], limit: usize) -> Vec<&LogRecord> {
    let mut picked: Vec<(usize, &LogRecord)> = logs
        .iter()
        .enumerate()
        .rev()
        .filter(|(_, r)| is_severe(r))
        .take(limit)
        .collect();
    if picked.len() < limit {
        let remaining = limit - picked.len();
        picked.extend(
            logs.iter()
                .enumerate()
                .rev()
                .filter(|(_, r)| !is_severe(r))
                .take(remaining),
        );
    }
    picked.sort_by_key(|(i, _)| *i);
    picked.into_iter().map(|(_, r)| r).collect()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
