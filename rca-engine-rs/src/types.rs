// rca-engine-rs/src/types.rs
// Shared data model for the RCA pipeline.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A natural-language RCA question as accepted from the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    pub received_at: DateTime<Utc>,
}

impl Query {
    pub fn new(text: impl Into<String>, received_at: DateTime<Utc>) -> Self {
        Self {
            text: text.into(),
            received_at,
        }
    }
}

/// The four disambiguating criteria a query is scored against.
///
/// Declaration order is the order clarification questions are asked in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    Component,
    Environment,
    Time,
    Action,
}

impl Criterion {
    pub const ALL: [Criterion; 4] = [
        Criterion::Component,
        Criterion::Environment,
        Criterion::Time,
        Criterion::Action,
    ];

    /// Key used for clarification answers.
    pub fn key(&self) -> &'static str {
        match self {
            Criterion::Component => "component",
            Criterion::Environment => "environment",
            Criterion::Time => "time",
            Criterion::Action => "action",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Criterion::ALL
            .into_iter()
            .find(|c| c.key().eq_ignore_ascii_case(key.trim()))
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Where a score falls relative to the configured thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityBand {
    Clear,
    Partial,
    Ambiguous,
}

/// Per-criterion confidences plus the derived ambiguity score.
///
/// The score is always `1 - mean(confidences)` clipped to `[0, 1]`; it is
/// never set independently of the signals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AmbiguityAssessment {
    pub component: f64,
    pub environment: f64,
    pub temporal: f64,
    pub action: f64,
    score: f64,
}

impl AmbiguityAssessment {
    pub fn from_signals(component: f64, environment: f64, temporal: f64, action: f64) -> Self {
        let clip = |v: f64| if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) };
        let (component, environment, temporal, action) =
            (clip(component), clip(environment), clip(temporal), clip(action));
        let mean = (component + environment + temporal + action) / 4.0;
        Self {
            component,
            environment,
            temporal,
            action,
            score: (1.0 - mean).clamp(0.0, 1.0),
        }
    }

    /// Assessment with no criterion satisfied (score 1.0).
    pub fn indeterminate() -> Self {
        Self::from_signals(0.0, 0.0, 0.0, 0.0)
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn confidence(&self, criterion: Criterion) -> f64 {
        match criterion {
            Criterion::Component => self.component,
            Criterion::Environment => self.environment,
            Criterion::Time => self.temporal,
            Criterion::Action => self.action,
        }
    }

    pub fn is_present(&self, criterion: Criterion) -> bool {
        self.confidence(criterion) > 0.0
    }

    /// Criteria with no supporting signal, in question order.
    pub fn missing(&self) -> Vec<Criterion> {
        Criterion::ALL
            .into_iter()
            .filter(|c| !self.is_present(*c))
            .collect()
    }

    pub fn satisfied_count(&self) -> usize {
        Criterion::ALL.len() - self.missing().len()
    }

    pub fn band(&self, partial_threshold: f64, ambiguity_threshold: f64) -> AmbiguityBand {
        if self.score > ambiguity_threshold {
            AmbiguityBand::Ambiguous
        } else if self.score >= partial_threshold {
            AmbiguityBand::Partial
        } else {
            AmbiguityBand::Clear
        }
    }
}

/// Resource category a query is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceKind {
    Kubernetes,
    OsLevel,
    NetworkElement,
    Unknown,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ResourceKind::Kubernetes => "KUBERNETES",
            ResourceKind::OsLevel => "OS_LEVEL",
            ResourceKind::NetworkElement => "NETWORK_ELEMENT",
            ResourceKind::Unknown => "UNKNOWN",
        };
        f.write_str(label)
    }
}

/// Result of resource detection. `Unknown` is a valid terminal classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceClassification {
    pub kind: ResourceKind,
    /// Device or subtype tag, e.g. `pod`, `process`, `olt`, `bgp-peer`.
    pub subtype: String,
    pub identifier: Option<String>,
    pub namespace: Option<String>,
}

impl ResourceClassification {
    pub fn unknown() -> Self {
        Self {
            kind: ResourceKind::Unknown,
            subtype: "unknown".to_string(),
            identifier: None,
            namespace: None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.kind == ResourceKind::Unknown
    }

    /// True when the classification names a pod or service we can fetch metrics for.
    pub fn has_workload_identifier(&self) -> bool {
        self.kind == ResourceKind::Kubernetes
            && self.identifier.is_some()
            && matches!(self.subtype.as_str(), "pod" | "service" | "deployment")
    }

    pub fn describe(&self) -> String {
        let mut out = format!("{}/{}", self.kind, self.subtype);
        if let Some(id) = &self.identifier {
            out.push_str(&format!(" {}", id));
        }
        if let Some(ns) = &self.namespace {
            out.push_str(&format!(" (namespace {})", ns));
        }
        out
    }
}

/// Closed UTC interval. `end >= start` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeWindow {
    /// Build a window, swapping the bounds if they arrive reversed.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        if end < start {
            Self { start: end, end: start }
        } else {
            Self { start, end }
        }
    }

    /// `[instant - buffer, instant + buffer]`.
    pub fn around(instant: DateTime<Utc>, buffer: Duration) -> Self {
        let buffer = buffer.abs();
        Self::new(saturating_sub(instant, buffer), saturating_add(instant, buffer))
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant <= self.end
    }

    /// Extend both edges outwards by `extra`.
    pub fn widened(&self, extra: Duration) -> Self {
        let extra = extra.abs();
        Self::new(saturating_sub(self.start, extra), saturating_add(self.end, extra))
    }
}

fn saturating_sub(instant: DateTime<Utc>, d: Duration) -> DateTime<Utc> {
    instant.checked_sub_signed(d).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn saturating_add(instant: DateTime<Utc>, d: Duration) -> DateTime<Utc> {
    instant.checked_add_signed(d).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to {}",
            self.start.format("%Y-%m-%dT%H:%M:%SZ"),
            self.end.format("%Y-%m-%dT%H:%M:%SZ")
        )
    }
}

/// One log line returned by the log store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    /// Emitting pod, host or device.
    pub source: String,
    #[serde(default)]
    pub level: Option<String>,
    pub message: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl LogRecord {
    pub fn render_line(&self) -> String {
        match &self.level {
            Some(level) => format!(
                "{} [{}] {}: {}",
                self.timestamp.format("%Y-%m-%dT%H:%M:%SZ"),
                level,
                self.source,
                self.message
            ),
            None => format!(
                "{} {}: {}",
                self.timestamp.format("%Y-%m-%dT%H:%M:%SZ"),
                self.source,
                self.message
            ),
        }
    }
}

/// Point-in-time metric values for one workload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub identifier: String,
    pub namespace: Option<String>,
    pub captured_at: DateTime<Utc>,
    /// Metric name to value, e.g. `cpu_usage_cores`.
    pub samples: BTreeMap<String, f64>,
}

impl MetricSnapshot {
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn render(&self) -> String {
        let values = self
            .samples
            .iter()
            .map(|(k, v)| format!("{}={:.3}", k, v))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{} @ {}: {}", self.identifier, self.captured_at.format("%Y-%m-%dT%H:%M:%SZ"), values)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceSource {
    LogStore,
    MetricsStore,
}

impl fmt::Display for EvidenceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvidenceSource::LogStore => f.write_str("log store"),
            EvidenceSource::MetricsStore => f.write_str("metrics store"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub source: EvidenceSource,
    pub reason: String,
}

/// Logs (time-ascending, bounded) plus an optional metrics snapshot.
///
/// `partial` is set whenever any source failed or timed out; `failures`
/// says which.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceBundle {
    pub logs: Vec<LogRecord>,
    pub metrics: Option<MetricSnapshot>,
    pub partial: bool,
    pub failures: Vec<SourceFailure>,
}

impl EvidenceBundle {
    pub fn is_empty(&self) -> bool {
        self.logs.is_empty() && self.metrics.as_ref().map_or(true, |m| m.is_empty())
    }

    pub fn record_failure(&mut self, source: EvidenceSource, reason: impl Into<String>) {
        self.partial = true;
        self.failures.push(SourceFailure {
            source,
            reason: reason.into(),
        });
    }

    pub fn source_failed(&self, source: EvidenceSource) -> bool {
        self.failures.iter().any(|f| f.source == source)
    }

    /// Fold a newer bundle into this one: logs are unioned without
    /// duplicates and kept time-ascending, the newest non-empty metrics
    /// snapshot wins, and failures accumulate.
    pub fn absorb(&mut self, newer: EvidenceBundle) {
        for record in newer.logs {
            let duplicate = self.logs.iter().any(|existing| {
                existing.timestamp == record.timestamp
                    && existing.source == record.source
                    && existing.message == record.message
            });
            if !duplicate {
                self.logs.push(record);
            }
        }
        self.logs.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

        if let Some(snapshot) = newer.metrics {
            if !snapshot.is_empty() || self.metrics.is_none() {
                self.metrics = Some(snapshot);
            }
        }

        self.partial |= newer.partial;
        self.failures.extend(newer.failures);
    }

    /// The most recent `limit` records, still time-ascending.
    pub fn recent_logs(&self, limit: usize) -> &[LogRecord] {
        let skip = self.logs.len().saturating_sub(limit);
        &self.logs[skip..]
    }
}

/// A root-cause hypothesis produced by one reasoning iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hypothesis {
    pub root_cause: String,
    pub supporting_evidence: Vec<String>,
    pub affected_component: String,
    pub remediation: String,
    pub needs_more_evidence: bool,
    /// False when the reasoning output could not be parsed into this structure.
    pub well_formed: bool,
}
