// End-to-end scenarios against scripted collaborators.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use rca_engine::time_range;
use rca_engine::{
    AnalysisRequest, CollaboratorError, Collaborators, EngineConfig, LogFilter, LogRecord, LogStore,
    MetricSnapshot, MetricsStore, MetricsTarget, QueryClassifier, RcaEngine, RcaOutcome, RcaReport,
    ReasoningService, ReportStatus, TimeWindow, Vocabulary,
};

#[derive(Default)]
struct FakeLogs {
    records: Vec<LogRecord>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    windows: Mutex<Vec<TimeWindow>>,
}

#[async_trait]
impl LogStore for FakeLogs {
    async fn search(&self, _: &LogFilter, window: &TimeWindow, limit: usize) -> Result<Vec<LogRecord>, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.windows.lock().unwrap().push(*window);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.records.iter().take(limit).cloned().collect())
    }
}

struct FakeMetrics {
    fail: bool,
}

#[async_trait]
impl MetricsStore for FakeMetrics {
    async fn fetch(&self, target: &MetricsTarget, window: &TimeWindow) -> Result<MetricSnapshot, CollaboratorError> {
        if self.fail {
            return Err(CollaboratorError::Unavailable("prometheus down".to_string()));
        }
        Ok(MetricSnapshot {
            identifier: target.identifier.clone(),
            namespace: target.namespace.clone(),
            captured_at: window.end(),
            samples: BTreeMap::from([
                ("cpu_usage_cores".to_string(), 0.4),
                ("container_restarts".to_string(), 3.0),
            ]),
        })
    }
}

/// Answers each call with the next scripted response; repeats the last one.
struct ScriptedReasoner {
    script: Mutex<VecDeque<Result<String, CollaboratorError>>>,
    last: Mutex<Option<Result<String, CollaboratorError>>>,
    calls: AtomicUsize,
}

impl ScriptedReasoner {
    fn new(script: Vec<Result<String, CollaboratorError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ReasoningService for ScriptedReasoner {
    async fn infer(&self, _: &str) -> Result<String, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        match next {
            Some(response) => {
                *last = Some(response.clone());
                response
            }
            None => last
                .clone()
                .unwrap_or_else(|| Err(CollaboratorError::Unavailable("script empty".to_string()))),
        }
    }
}

fn hypothesis_json(needs_more: bool) -> Result<String, CollaboratorError> {
    Ok(format!(
        r#"{{"root_cause":"payment-service pods were OOMKilled","supporting_evidence":["OOMKilled"],"affected_component":"payment-service","remediation":"Raise the memory limit","needs_more_evidence":{}}}"#,
        needs_more
    ))
}

fn record(minute: u32, message: &str) -> LogRecord {
    LogRecord {
        timestamp: Utc.with_ymd_and_hms(2026, 1, 23, 14, minute, 0).unwrap(),
        source: "payment-service-7d9f8c6b5-x2k4q".to_string(),
        level: Some("ERROR".to_string()),
        message: message.to_string(),
        labels: BTreeMap::new(),
    }
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 23, 14, 40, 0).unwrap()
}

fn build(logs: Arc<FakeLogs>, metrics: FakeMetrics, reasoner: Arc<ScriptedReasoner>, config: EngineConfig) -> RcaEngine {
    RcaEngine::new(
        config,
        Vocabulary::default(),
        Collaborators::new(logs, Arc::new(metrics), reasoner),
    )
}

fn expect_report(outcome: RcaOutcome) -> RcaReport {
    match outcome {
        RcaOutcome::Report(report) => report,
        other => panic!("expected a report, got {:?}", other),
    }
}

#[tokio::test]
async fn test_partial_query_uses_default_window() {
    let logs = Arc::new(FakeLogs {
        records: vec![record(31, "OOMKilled"), record(32, "Back-off restarting failed container")],
        ..Default::default()
    });
    let reasoner = Arc::new(ScriptedReasoner::new(vec![hypothesis_json(false)]));
    let engine = build(logs.clone(), FakeMetrics { fail: false }, reasoner, EngineConfig::default());

    let classification = engine.classifier().classify("Why did payment-service crash in prod?");
    let score = classification.assessment.score();
    assert!((0.4..=0.7).contains(&score));

    let report = expect_report(
        engine
            .analyze_at(AnalysisRequest::new("Why did payment-service crash in prod?"), now())
            .await
            .unwrap(),
    );

    assert_eq!(report.status, ReportStatus::Resolved);
    assert_eq!(
        logs.windows.lock().unwrap()[0],
        TimeWindow::new(
            Utc.with_ymd_and_hms(2026, 1, 23, 14, 25, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 1, 23, 14, 55, 0).unwrap(),
        )
    );
    assert!(report.notes.iter().any(|n| n.contains("No time range was given")));
    assert!(report.render().contains("OOMKilled"));
}

#[tokio::test]
async fn test_vague_query_asks_four_questions_then_resumes() {
    let logs = Arc::new(FakeLogs {
        records: vec![record(31, "upstream request timeout")],
        ..Default::default()
    });
    let reasoner = Arc::new(ScriptedReasoner::new(vec![hypothesis_json(false)]));
    let engine = build(logs.clone(), FakeMetrics { fail: false }, reasoner.clone(), EngineConfig::default());

    let outcome = engine
        .analyze_at(AnalysisRequest::new("Service degradation"), now())
        .await
        .unwrap();
    let token = match outcome {
        RcaOutcome::Clarification { request, continuation_token } => {
            assert!(request.ambiguity_score > 0.7);
            assert_eq!(request.questions.len(), 4);
            continuation_token
        }
        other => panic!("expected clarification, got {:?}", other),
    };
    assert_eq!(logs.calls.load(Ordering::SeqCst), 0);
    assert_eq!(reasoner.calls.load(Ordering::SeqCst), 0);

    let answers = BTreeMap::from([
        ("component".to_string(), "checkout-service".to_string()),
        ("environment".to_string(), "prod".to_string()),
        ("time".to_string(), "last 30 minutes".to_string()),
        ("action".to_string(), "timeout".to_string()),
    ]);
    let report = expect_report(
        engine
            .analyze_at(AnalysisRequest::resume(token.clone(), answers.clone()), now())
            .await
            .unwrap(),
    );
    assert_eq!(report.status, ReportStatus::Resolved);
    assert!(report.query.starts_with("Service degradation checkout-service"));
    assert_eq!(logs.calls.load(Ordering::SeqCst), 1);

    // Tokens are single-use.
    let again = engine
        .analyze_at(AnalysisRequest::resume(token, answers), now())
        .await;
    assert!(matches!(again, Err(rca_engine::RcaError::UnknownContinuation(_))));
}

#[tokio::test]
async fn test_rejected_resume_keeps_token_usable() {
    let logs = Arc::new(FakeLogs {
        records: vec![record(31, "OOMKilled")],
        ..Default::default()
    });
    let reasoner = Arc::new(ScriptedReasoner::new(vec![hypothesis_json(false)]));
    let engine = build(logs.clone(), FakeMetrics { fail: false }, reasoner, EngineConfig::default());

    let token = match engine.analyze_at(AnalysisRequest::new("Service degradation"), now()).await.unwrap() {
        RcaOutcome::Clarification { continuation_token, .. } => continuation_token,
        other => panic!("expected clarification, got {:?}", other),
    };

    let oversized = BTreeMap::from([("component".to_string(), "x".repeat(rca_engine::MAX_QUERY_CHARS + 100))]);
    let rejected = engine
        .analyze_at(AnalysisRequest::resume(token.clone(), oversized), now())
        .await;
    assert!(matches!(rejected, Err(rca_engine::RcaError::InvalidRequest(_))));
    assert_eq!(logs.calls.load(Ordering::SeqCst), 0);

    let corrected = BTreeMap::from([
        ("component".to_string(), "payment-service".to_string()),
        ("environment".to_string(), "prod".to_string()),
    ]);
    let report = expect_report(
        engine
            .analyze_at(AnalysisRequest::resume(token.clone(), corrected.clone()), now())
            .await
            .unwrap(),
    );
    assert_eq!(report.status, ReportStatus::Resolved);
    assert!(report.query.starts_with("Service degradation payment-service"));

    let again = engine
        .analyze_at(AnalysisRequest::resume(token, corrected), now())
        .await;
    assert!(matches!(again, Err(rca_engine::RcaError::UnknownContinuation(_))));
}

#[tokio::test]
async fn test_resumed_query_is_not_clarified_twice() {
    let logs = Arc::new(FakeLogs::default());
    let reasoner = Arc::new(ScriptedReasoner::new(vec![hypothesis_json(false)]));
    let engine = build(logs, FakeMetrics { fail: false }, reasoner, EngineConfig::default());

    let token = match engine.analyze_at(AnalysisRequest::new("Service degradation"), now()).await.unwrap() {
        RcaOutcome::Clarification { continuation_token, .. } => continuation_token,
        other => panic!("expected clarification, got {:?}", other),
    };

    let report = expect_report(
        engine
            .analyze_at(AnalysisRequest::resume(token, BTreeMap::new()), now())
            .await
            .unwrap(),
    );
    assert!(report
        .notes
        .iter()
        .any(|n| n.contains("did not specify: component, environment, time, action")));
}

#[test]
fn test_absolute_time_window() {
    let classifier = QueryClassifier::new(Arc::new(Vocabulary::default()));
    let c = classifier.classify("Node-7 high CPU at 2026-01-23 14:30");
    let resolved = time_range::resolve(c.temporal_hint.as_ref(), Utc::now(), 15);
    assert_eq!(
        resolved.window.to_string(),
        "2026-01-23T14:15:00Z to 2026-01-23T14:45:00Z"
    );
}

#[tokio::test]
async fn test_log_timeout_still_produces_hypothesis() {
    let logs = Arc::new(FakeLogs {
        records: vec![record(31, "never seen")],
        delay: Some(Duration::from_secs(30)),
        ..Default::default()
    });
    let reasoner = Arc::new(ScriptedReasoner::new(vec![hypothesis_json(false)]));
    let config = EngineConfig {
        log_timeout: Duration::from_millis(50),
        ..Default::default()
    };
    let engine = build(logs, FakeMetrics { fail: false }, reasoner.clone(), config);

    let report = expect_report(
        engine
            .analyze_at(AnalysisRequest::new("Why did payment-service crash in prod?"), now())
            .await
            .unwrap(),
    );

    assert_eq!(reasoner.calls.load(Ordering::SeqCst), 1);
    assert_eq!(report.status, ReportStatus::Resolved);
    assert!(report.evidence_excerpt.is_empty());
    assert!(report.metrics_summary.as_deref().unwrap().contains("container_restarts"));
    assert!(report.notes.iter().any(|n| n.contains("log store was unavailable")));
}

#[tokio::test]
async fn test_loop_exhaustion_is_caveated() {
    let logs = Arc::new(FakeLogs {
        records: vec![record(31, "OOMKilled")],
        ..Default::default()
    });
    let reasoner = Arc::new(ScriptedReasoner::new(vec![
        hypothesis_json(true),
        hypothesis_json(true),
        hypothesis_json(true),
    ]));
    let engine = build(logs.clone(), FakeMetrics { fail: false }, reasoner.clone(), EngineConfig::default());

    let report = expect_report(
        engine
            .analyze_at(AnalysisRequest::new("Why did payment-service crash in prod?"), now())
            .await
            .unwrap(),
    );

    assert_eq!(report.status, ReportStatus::Incomplete);
    assert_eq!(report.iterations, 3);
    assert_eq!(reasoner.calls.load(Ordering::SeqCst), 3);
    assert_eq!(logs.calls.load(Ordering::SeqCst), 3);
    assert!(report
        .confidence_caveat
        .as_deref()
        .unwrap()
        .contains("incomplete after 3 attempts"));

    // Each gather after the first looks further out.
    let windows = logs.windows.lock().unwrap();
    assert!(windows[1].duration() > windows[0].duration());
    assert!(windows[2].duration() > windows[1].duration());
}

#[tokio::test]
async fn test_loop_count_never_exceeds_cap() {
    for max_loops in 1..=4 {
        let reasoner = Arc::new(ScriptedReasoner::new(vec![Ok("not json at all".to_string())]));
        let config = EngineConfig {
            max_loops,
            ..Default::default()
        };
        let engine = build(Arc::new(FakeLogs::default()), FakeMetrics { fail: false }, reasoner.clone(), config);

        let report = expect_report(
            engine
                .analyze_at(AnalysisRequest::new("Why did payment-service crash in prod?"), now())
                .await
                .unwrap(),
        );
        assert_eq!(report.iterations, max_loops);
        assert_eq!(reasoner.calls.load(Ordering::SeqCst), max_loops as usize);
        assert_eq!(report.status, ReportStatus::Incomplete);
    }
}

#[tokio::test]
async fn test_unavailable_reasoning_yields_failure_report() {
    let reasoner = Arc::new(ScriptedReasoner::new(vec![Err(CollaboratorError::Unavailable(
        "connection refused".to_string(),
    ))]));
    let engine = build(
        Arc::new(FakeLogs::default()),
        FakeMetrics { fail: false },
        reasoner,
        EngineConfig::default(),
    );

    let report = expect_report(
        engine
            .analyze_at(AnalysisRequest::new("Why did payment-service crash in prod?"), now())
            .await
            .unwrap(),
    );
    assert_eq!(report.status, ReportStatus::Failed);
    assert!(report.render().contains("Analysis could not be completed"));
}

#[tokio::test]
async fn test_one_failed_source_leaves_partial_but_nonempty_evidence() {
    let logs = Arc::new(FakeLogs {
        records: vec![record(31, "OOMKilled")],
        ..Default::default()
    });
    let reasoner = Arc::new(ScriptedReasoner::new(vec![hypothesis_json(false)]));
    let engine = build(logs, FakeMetrics { fail: true }, reasoner, EngineConfig::default());

    let report = expect_report(
        engine
            .analyze_at(AnalysisRequest::new("Why did payment-service crash in prod?"), now())
            .await
            .unwrap(),
    );
    assert_eq!(report.evidence_excerpt.len(), 1);
    assert!(report.metrics_summary.is_none());
    assert!(report.notes.iter().any(|n| n.contains("metrics store was unavailable")));
}

#[tokio::test]
async fn test_identical_inputs_give_identical_reports() {
    let mut rendered = Vec::new();
    for _ in 0..2 {
        let logs = Arc::new(FakeLogs {
            records: vec![record(31, "OOMKilled")],
            ..Default::default()
        });
        let reasoner = Arc::new(ScriptedReasoner::new(vec![hypothesis_json(false)]));
        let engine = build(logs, FakeMetrics { fail: false }, reasoner, EngineConfig::default());
        let report = expect_report(
            engine
                .analyze_at(AnalysisRequest::new("Why did payment-service crash in prod?"), now())
                .await
                .unwrap(),
        );
        rendered.push(report.render());
    }
    assert_eq!(rendered[0], rendered[1]);
}
