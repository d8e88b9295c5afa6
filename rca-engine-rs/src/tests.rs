use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use mockall::{mock, predicate};
use tokio_test::assert_ok;

use crate::backends::{Collaborators, LogFilter, LogStore, MetricsStore, MetricsTarget, ReasoningService};
use crate::classifier::QueryClassifier;
use crate::config::EngineConfig;
use crate::engine::{AnalysisRequest, RcaEngine, RcaOutcome};
use crate::error::{CollaboratorError, RcaError};
use crate::evidence::EvidenceGatherer;
use crate::reasoning::{DegradationCause, ReasoningCoordinator, ReasoningInput, ReasoningOutcome};
use crate::report::ReportStatus;
use crate::types::{
    EvidenceBundle, EvidenceSource, LogRecord, MetricSnapshot, ResourceClassification, TimeWindow,
};
use crate::vocabulary::Vocabulary;

mock! {
    pub Logs {}

    #[async_trait]
    impl LogStore for Logs {
        async fn search(
            &self,
            filter: &LogFilter,
            window: &TimeWindow,
            limit: usize,
        ) -> Result<Vec<LogRecord>, CollaboratorError>;
    }
}

mock! {
    pub Metrics {}

    #[async_trait]
    impl MetricsStore for Metrics {
        async fn fetch(
            &self,
            target: &MetricsTarget,
            window: &TimeWindow,
        ) -> Result<MetricSnapshot, CollaboratorError>;
    }
}

mock! {
    pub Reasoner {}

    #[async_trait]
    impl ReasoningService for Reasoner {
        async fn infer(&self, request: &str) -> Result<String, CollaboratorError>;
    }
}

/// Log store that never answers within any sensible timeout.
struct StalledLogs;

#[async_trait]
impl LogStore for StalledLogs {
    async fn search(&self, _: &LogFilter, _: &TimeWindow, _: usize) -> Result<Vec<LogRecord>, CollaboratorError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Vec::new())
    }
}

/// Log store that answers after a fixed delay.
struct SlowLogs(Duration);

#[async_trait]
impl LogStore for SlowLogs {
    async fn search(&self, _: &LogFilter, _: &TimeWindow, _: usize) -> Result<Vec<LogRecord>, CollaboratorError> {
        tokio::time::sleep(self.0).await;
        Ok(vec![record(31, "OOMKilled")])
    }
}

struct SlowMetrics(Duration);

#[async_trait]
impl MetricsStore for SlowMetrics {
    async fn fetch(&self, _: &MetricsTarget, _: &TimeWindow) -> Result<MetricSnapshot, CollaboratorError> {
        tokio::time::sleep(self.0).await;
        Ok(snapshot())
    }
}

struct StalledReasoner;

#[async_trait]
impl ReasoningService for StalledReasoner {
    async fn infer(&self, _: &str) -> Result<String, CollaboratorError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(String::new())
    }
}

const RESOLVED: &str = r#"{"root_cause":"payment-service exceeded its memory limit and was OOMKilled","supporting_evidence":["OOMKilled"],"affected_component":"payment-service","remediation":"Raise the memory limit and profile the heap","needs_more_evidence":false}"#;

fn record(minute: u32, message: &str) -> LogRecord {
    LogRecord {
        timestamp: Utc.with_ymd_and_hms(2026, 1, 23, 14, minute, 0).unwrap(),
        source: "payment-service-7d9f8c6b5-x2k4q".to_string(),
        level: Some("ERROR".to_string()),
        message: message.to_string(),
        labels: BTreeMap::new(),
    }
}

fn snapshot() -> MetricSnapshot {
    MetricSnapshot {
        identifier: "payment-service".to_string(),
        namespace: Some("prod".to_string()),
        captured_at: Utc.with_ymd_and_hms(2026, 1, 23, 14, 45, 0).unwrap(),
        samples: BTreeMap::from([("memory_working_set_bytes".to_string(), 5.1e8)]),
    }
}

fn window() -> TimeWindow {
    TimeWindow::new(
        Utc.with_ymd_and_hms(2026, 1, 23, 14, 15, 0).unwrap(),
        Utc.with_ymd_and_hms(2026, 1, 23, 14, 45, 0).unwrap(),
    )
}

fn classify(text: &str) -> crate::classifier::Classification {
    QueryClassifier::new(Arc::new(Vocabulary::default())).classify(text)
}

fn gatherer(logs: Arc<dyn LogStore>, metrics: Arc<dyn MetricsStore>) -> EvidenceGatherer {
    EvidenceGatherer::new(logs, metrics, 100, Duration::from_millis(50), Duration::from_millis(50))
}

fn engine(logs: impl LogStore + 'static, metrics: impl MetricsStore + 'static, reasoner: impl ReasoningService + 'static) -> RcaEngine {
    RcaEngine::new(
        EngineConfig::default(),
        Vocabulary::default(),
        Collaborators::new(Arc::new(logs), Arc::new(metrics), Arc::new(reasoner)),
    )
}

#[tokio::test]
async fn test_gather_queries_both_sources_for_workloads() {
    let mut logs = MockLogs::new();
    logs.expect_search()
        .withf(|filter, _, limit| {
            filter.identifier.as_deref() == Some("payment-service")
                && filter.namespace.as_deref() == Some("prod")
                && *limit == 100
        })
        .times(1)
        .returning(|_, _, _| Ok(vec![record(40, "late"), record(20, "early")]));

    let mut metrics = MockMetrics::new();
    metrics
        .expect_fetch()
        .with(
            predicate::eq(MetricsTarget {
                identifier: "payment-service".to_string(),
                namespace: Some("prod".to_string()),
            }),
            predicate::always(),
        )
        .times(1)
        .returning(|_, _| Ok(snapshot()));

    let bundle = gatherer(Arc::new(logs), Arc::new(metrics))
        .gather(&classify("Why did payment-service crash in prod?"), &window())
        .await;

    assert!(!bundle.partial);
    assert_eq!(bundle.logs.len(), 2);
    assert_eq!(bundle.logs[0].message, "early");
    assert!(bundle.metrics.is_some());
}

#[tokio::test]
async fn test_gather_skips_metrics_without_workload() {
    let mut logs = MockLogs::new();
    logs.expect_search().times(1).returning(|_, _, _| Ok(vec![record(30, "link down")]));
    let mut metrics = MockMetrics::new();
    metrics.expect_fetch().times(0);

    let bundle = gatherer(Arc::new(logs), Arc::new(metrics))
        .gather(&classify("olt-3 flapping in prod"), &window())
        .await;

    assert_eq!(bundle.logs.len(), 1);
    assert!(bundle.metrics.is_none());
    assert!(!bundle.partial);
}

#[tokio::test]
async fn test_gather_survives_log_timeout() {
    let mut metrics = MockMetrics::new();
    metrics.expect_fetch().times(1).returning(|_, _| Ok(snapshot()));

    let bundle = gatherer(Arc::new(StalledLogs), Arc::new(metrics))
        .gather(&classify("Why did payment-service crash in prod?"), &window())
        .await;

    assert!(bundle.logs.is_empty());
    assert!(bundle.metrics.is_some());
    assert!(bundle.partial);
    assert!(bundle.source_failed(EvidenceSource::LogStore));
    assert!(!bundle.is_empty());
}

#[tokio::test]
async fn test_gather_survives_metrics_error() {
    let mut logs = MockLogs::new();
    logs.expect_search().returning(|_, _, _| Ok(vec![record(31, "OOMKilled")]));
    let mut metrics = MockMetrics::new();
    metrics
        .expect_fetch()
        .returning(|_, _| Err(CollaboratorError::Backend { status: 503, message: "busy".to_string() }));

    let bundle = gatherer(Arc::new(logs), Arc::new(metrics))
        .gather(&classify("Why did payment-service crash in prod?"), &window())
        .await;

    assert_eq!(bundle.logs.len(), 1);
    assert!(bundle.partial);
    assert!(bundle.source_failed(EvidenceSource::MetricsStore));
    assert!(bundle.failures[0].reason.contains("503"));
}

#[tokio::test]
async fn test_gather_queries_sources_concurrently() {
    let delay = Duration::from_millis(300);
    let gatherer = EvidenceGatherer::new(
        Arc::new(SlowLogs(delay)),
        Arc::new(SlowMetrics(delay)),
        100,
        Duration::from_millis(400),
        Duration::from_millis(400),
    );

    let started = std::time::Instant::now();
    let bundle = gatherer
        .gather(&classify("Why did payment-service crash in prod?"), &window())
        .await;
    let elapsed = started.elapsed();

    assert_eq!(bundle.logs.len(), 1);
    assert!(bundle.metrics.is_some());
    assert!(!bundle.partial);
    // Sequential calls would take at least 600ms.
    assert!(elapsed < delay * 2, "gather took {:?}", elapsed);
}

#[tokio::test]
async fn test_reasoning_request_carries_bounded_excerpt() {
    let mut reasoner = MockReasoner::new();
    reasoner
        .expect_infer()
        .withf(|request: &str| {
            request.contains("QUESTION: Why did payment-service crash in prod?")
                && request.contains("LOG RECORDS (50 of 60 collected")
                && request.contains("msg 59")
                && !request.contains("msg 9\n")
        })
        .times(1)
        .returning(|_| Ok(RESOLVED.to_string()));

    let evidence = EvidenceBundle {
        logs: (0..60).map(|i| record((i % 60) as u32, &format!("msg {}", i))).collect(),
        ..Default::default()
    };
    let resource = ResourceClassification::unknown();
    let coordinator = ReasoningCoordinator::new(Arc::new(reasoner), Duration::from_secs(1), 50);
    let outcome = coordinator
        .reason(ReasoningInput {
            query: "Why did payment-service crash in prod?",
            resource: &resource,
            window: &window(),
            evidence: &evidence,
            prior: &[],
        })
        .await;

    assert!(outcome.is_well_formed());
    assert!(!outcome.hypothesis().needs_more_evidence);
}

#[tokio::test]
async fn test_reasoning_failures_degrade() {
    let resource = ResourceClassification::unknown();
    let evidence = EvidenceBundle::default();
    let searched = window();
    let input = ReasoningInput {
        query: "q",
        resource: &resource,
        window: &searched,
        evidence: &evidence,
        prior: &[],
    };

    let mut malformed = MockReasoner::new();
    malformed.expect_infer().returning(|_| Ok("I think the pod ran out of memory.".to_string()));
    let outcome = ReasoningCoordinator::new(Arc::new(malformed), Duration::from_secs(1), 50)
        .reason(input)
        .await;
    match &outcome {
        ReasoningOutcome::Degraded { hypothesis, cause } => {
            assert_eq!(*cause, DegradationCause::MalformedOutput);
            assert_eq!(hypothesis.root_cause, "I think the pod ran out of memory.");
            assert!(hypothesis.needs_more_evidence);
            assert!(!hypothesis.well_formed);
        }
        other => panic!("expected degraded outcome, got {:?}", other),
    }

    let mut failing = MockReasoner::new();
    failing
        .expect_infer()
        .returning(|_| Err(CollaboratorError::Unavailable("connection refused".to_string())));
    let outcome = ReasoningCoordinator::new(Arc::new(failing), Duration::from_secs(1), 50)
        .reason(input)
        .await;
    assert!(matches!(
        outcome,
        ReasoningOutcome::Degraded { cause: DegradationCause::ServiceUnavailable(_), .. }
    ));

    let outcome = ReasoningCoordinator::new(Arc::new(StalledReasoner), Duration::from_millis(20), 50)
        .reason(input)
        .await;
    assert!(matches!(
        outcome,
        ReasoningOutcome::Degraded { cause: DegradationCause::Timeout, .. }
    ));
}

#[tokio::test]
async fn test_engine_resolves_partial_query_in_one_iteration() {
    let mut logs = MockLogs::new();
    logs.expect_search()
        .times(1)
        .returning(|_, _, _| Ok(vec![record(31, "container payment killed: OOMKilled")]));
    let mut metrics = MockMetrics::new();
    metrics.expect_fetch().times(1).returning(|_, _| Ok(snapshot()));
    let mut reasoner = MockReasoner::new();
    reasoner.expect_infer().times(1).returning(|_| Ok(RESOLVED.to_string()));

    let now = Utc.with_ymd_and_hms(2026, 1, 23, 14, 40, 0).unwrap();
    let outcome = assert_ok!(
        engine(logs, metrics, reasoner)
            .analyze_at(AnalysisRequest::new("Why did payment-service crash in prod?"), now)
            .await
    );

    let RcaOutcome::Report(report) = outcome else {
        panic!("expected a report");
    };
    assert_eq!(report.status, ReportStatus::Resolved);
    assert_eq!(report.iterations, 1);
    assert_eq!(report.affected_component.as_deref(), Some("payment-service"));
    assert!(report
        .notes
        .iter()
        .any(|n| n.contains("2026-01-23T14:25:00Z to 2026-01-23T14:55:00Z")));
}

#[tokio::test]
async fn test_engine_never_calls_backends_before_clarification() {
    let mut logs = MockLogs::new();
    logs.expect_search().times(0);
    let mut metrics = MockMetrics::new();
    metrics.expect_fetch().times(0);
    let mut reasoner = MockReasoner::new();
    reasoner.expect_infer().times(0);

    let outcome = assert_ok!(
        engine(logs, metrics, reasoner)
            .analyze(AnalysisRequest::new("Service degradation"))
            .await
    );

    match outcome {
        RcaOutcome::Clarification { request, continuation_token } => {
            assert_eq!(request.questions.len(), 4);
            assert!(!continuation_token.is_empty());
        }
        other => panic!("expected clarification, got {:?}", other),
    }
}

#[tokio::test]
async fn test_engine_rejects_bad_requests() {
    let engine = engine(MockLogs::new(), MockMetrics::new(), MockReasoner::new());

    assert!(matches!(
        engine.analyze(AnalysisRequest::new("   ")).await,
        Err(RcaError::InvalidRequest(_))
    ));
    assert!(matches!(
        engine.analyze(AnalysisRequest::new("x".repeat(5_000))).await,
        Err(RcaError::InvalidRequest(_))
    ));
    assert!(matches!(
        engine
            .analyze(AnalysisRequest::resume("no-such-token", BTreeMap::new()))
            .await,
        Err(RcaError::UnknownContinuation(_))
    ));
}
