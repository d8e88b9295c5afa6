// rca-engine-rs/src/reasoning.rs
// Builds reasoning requests from accumulated evidence and turns the raw
// response into a hypothesis, well-formed or degraded.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use metrics::increment_counter;
use serde::Deserialize;
use tokio::time::timeout;
use tracing::{instrument, warn};

use crate::backends::ReasoningService;
use crate::types::{EvidenceBundle, Hypothesis, ResourceClassification, TimeWindow};

/// Characters of raw output kept as the root cause of a degraded hypothesis.
pub const DEGRADED_EXCERPT_CHARS: usize = 200;

const SYSTEM_INSTRUCTIONS: &str = "You are a site reliability engineer performing root-cause analysis.

Analyse the incident question, the log records and the metrics below.

Your goals are to:
1. Identify the most likely root cause supported by the evidence
2. Cite the specific log lines or metric values that support it
3. Name the affected component
4. Propose a concrete remediation
5. Set needs_more_evidence to true if the evidence is insufficient to be confident

Respond with a single JSON object and nothing else, using exactly these fields:
{\"root_cause\": string, \"supporting_evidence\": [string], \"affected_component\": string, \"remediation\": string, \"needs_more_evidence\": boolean}";

/// Why a hypothesis is degraded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DegradationCause {
    /// The service answered, but not with the expected structure.
    MalformedOutput,
    /// The service returned an error.
    ServiceUnavailable(String),
    /// The call exceeded the reasoning timeout.
    Timeout,
}

impl DegradationCause {
    pub fn label(&self) -> &'static str {
        match self {
            Self::MalformedOutput => "malformed_output",
            Self::ServiceUnavailable(_) => "service_unavailable",
            Self::Timeout => "timeout",
        }
    }

    /// True when the service produced no usable answer at all.
    pub fn is_unavailable(&self) -> bool {
        !matches!(self, Self::MalformedOutput)
    }
}

/// Result of one reasoning call. Callers must handle both arms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReasoningOutcome {
    WellFormed(Hypothesis),
    Degraded {
        hypothesis: Hypothesis,
        cause: DegradationCause,
    },
}

impl ReasoningOutcome {
    pub fn hypothesis(&self) -> &Hypothesis {
        match self {
            Self::WellFormed(h) | Self::Degraded { hypothesis: h, .. } => h,
        }
    }

    pub fn into_hypothesis(self) -> Hypothesis {
        match self {
            Self::WellFormed(h) | Self::Degraded { hypothesis: h, .. } => h,
        }
    }

    pub fn is_well_formed(&self) -> bool {
        matches!(self, Self::WellFormed(_))
    }
}

/// Inputs to one reasoning iteration.
#[derive(Debug, Clone, Copy)]
pub struct ReasoningInput<'a> {
    pub query: &'a str,
    pub resource: &'a ResourceClassification,
    pub window: &'a TimeWindow,
    pub evidence: &'a EvidenceBundle,
    pub prior: &'a [Hypothesis],
}

#[derive(Debug, Deserialize)]
struct RawHypothesis {
    root_cause: String,
    #[serde(default)]
    supporting_evidence: Vec<String>,
    affected_component: String,
    remediation: String,
    needs_more_evidence: bool,
}

#[derive(Clone)]
pub struct ReasoningCoordinator {
    service: Arc<dyn ReasoningService>,
    timeout: Duration,
    excerpt_limit: usize,
}

impl ReasoningCoordinator {
    pub fn new(service: Arc<dyn ReasoningService>, timeout: Duration, excerpt_limit: usize) -> Self {
        Self {
            service,
            timeout,
            excerpt_limit,
        }
    }

    /// Run one reasoning call. Never fails: errors and timeouts come back as
    /// a degraded hypothesis that asks for more evidence.
    #[instrument(skip_all, fields(prior = input.prior.len(), logs = input.evidence.logs.len()))]
    pub async fn reason(&self, input: ReasoningInput<'_>) -> ReasoningOutcome {
        let request = build_request(&input, self.excerpt_limit);

        let outcome = match timeout(self.timeout, self.service.infer(&request)).await {
            Ok(Ok(raw)) => match parse_hypothesis(&raw) {
                Ok(hypothesis) => ReasoningOutcome::WellFormed(hypothesis),
                Err(reason) => {
                    warn!(%reason, "reasoning output was not well-formed");
                    ReasoningOutcome::Degraded {
                        hypothesis: degraded_hypothesis(&raw),
                        cause: DegradationCause::MalformedOutput,
                    }
                }
            },
            Ok(Err(e)) => {
                warn!(error = %e, "reasoning service failed");
                ReasoningOutcome::Degraded {
                    hypothesis: degraded_hypothesis(""),
                    cause: DegradationCause::ServiceUnavailable(e.to_string()),
                }
            }
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "reasoning service timed out");
                ReasoningOutcome::Degraded {
                    hypothesis: degraded_hypothesis(""),
                    cause: DegradationCause::Timeout,
                }
            }
        };

        if let ReasoningOutcome::Degraded { cause, .. } = &outcome {
            increment_counter!("rca_reasoning_degraded_total", "cause" => cause.label());
        }
        outcome
    }
}

/// Serialise the question, classification, window, the most recent
/// `excerpt_limit` records, metrics and prior hypotheses into one request.
pub fn build_request(input: &ReasoningInput<'_>, excerpt_limit: usize) -> String {
    let mut out = String::with_capacity(4096);
    out.push_str(SYSTEM_INSTRUCTIONS);
    out.push_str("\n\n");

    let _ = writeln!(out, "QUESTION: {}", input.query);
    let _ = writeln!(out, "RESOURCE: {}", input.resource.describe());
    let _ = writeln!(out, "WINDOW: {}", input.window);

    let records = input.evidence.recent_logs(excerpt_limit);
    let _ = writeln!(
        out,
        "\nLOG RECORDS ({} of {} collected, oldest first):",
        records.len(),
        input.evidence.logs.len()
    );
    if records.is_empty() {
        out.push_str("  (none)\n");
    }
    for record in records {
        let _ = writeln!(out, "  {}", record.render_line());
    }

    out.push_str("\nMETRICS:\n");
    match &input.evidence.metrics {
        Some(snapshot) if !snapshot.is_empty() => {
            let _ = writeln!(out, "  {}", snapshot.render());
        }
        _ => out.push_str("  (none)\n"),
    }

    if !input.evidence.failures.is_empty() {
        out.push_str("\nUNAVAILABLE SOURCES:\n");
        for failure in &input.evidence.failures {
            let _ = writeln!(out, "  {}: {}", failure.source, failure.reason);
        }
    }

    if !input.prior.is_empty() {
        out.push_str("\nPREVIOUS HYPOTHESES:\n");
        for (i, h) in input.prior.iter().enumerate() {
            let _ = writeln!(
                out,
                "  {}. {} (component: {}, needed more evidence: {})",
                i + 1,
                h.root_cause,
                h.affected_component,
                h.needs_more_evidence
            );
        }
    }

    out
}

/// Parse a structured hypothesis out of raw model output. Tolerates code
/// fences and prose around the JSON object.
pub fn parse_hypothesis(raw: &str) -> Result<Hypothesis, String> {
    let start = raw.find('{').ok_or("no JSON object in response")?;
    let end = raw.rfind('}').ok_or("no JSON object in response")?;
    if end < start {
        return Err("no JSON object in response".to_string());
    }

    let parsed: RawHypothesis =
        serde_json::from_str(&raw[start..=end]).map_err(|e| format!("invalid hypothesis JSON: {}", e))?;

    if parsed.root_cause.trim().is_empty() {
        return Err("root_cause is empty".to_string());
    }

    Ok(Hypothesis {
        root_cause: parsed.root_cause.trim().to_string(),
        supporting_evidence: parsed.supporting_evidence,
        affected_component: parsed.affected_component.trim().to_string(),
        remediation: parsed.remediation.trim().to_string(),
        needs_more_evidence: parsed.needs_more_evidence,
        well_formed: true,
    })
}

/// Hypothesis used when no structured answer is available. Always asks for
/// more evidence.
pub fn degraded_hypothesis(raw: &str) -> Hypothesis {
    let excerpt: String = raw.trim().chars().take(DEGRADED_EXCERPT_CHARS).collect();
    Hypothesis {
        root_cause: excerpt,
        supporting_evidence: Vec::new(),
        affected_component: String::new(),
        remediation: String::new(),
        needs_more_evidence: true,
        well_formed: false,
    }
}
