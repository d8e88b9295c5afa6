// rca-engine-rs/src/evidence.rs
// Concurrent, failure-tolerant retrieval of logs and metrics.

use std::sync::Arc;
use std::time::Duration;

use metrics::increment_counter;
use tokio::time::timeout;
use tracing::{instrument, warn};

use crate::backends::{LogFilter, LogStore, MetricsStore, MetricsTarget};
use crate::classifier::Classification;
use crate::error::CollaboratorError;
use crate::types::{EvidenceBundle, EvidenceSource, ResourceClassification, TimeWindow};

/// Fetches one evidence bundle per call. Holds only shared, immutable
/// collaborator handles, so one gatherer serves every request.
#[derive(Clone)]
pub struct EvidenceGatherer {
    logs: Arc<dyn LogStore>,
    metrics: Arc<dyn MetricsStore>,
    limit: usize,
    log_timeout: Duration,
    metrics_timeout: Duration,
}

impl EvidenceGatherer {
    pub fn new(
        logs: Arc<dyn LogStore>,
        metrics: Arc<dyn MetricsStore>,
        limit: usize,
        log_timeout: Duration,
        metrics_timeout: Duration,
    ) -> Self {
        Self {
            logs,
            metrics,
            limit,
            log_timeout,
            metrics_timeout,
        }
    }

    /// Gather with the filter implied by the classification.
    pub async fn gather(&self, classification: &Classification, window: &TimeWindow) -> EvidenceBundle {
        let filter = LogFilter::from_classification(classification);
        self.gather_with_filter(&filter, &classification.resource, window).await
    }

    /// Query the log store and, for known workloads, the metrics store
    /// concurrently. A failed or timed-out source leaves its part of the
    /// bundle empty and marks the bundle partial; this never fails.
    #[instrument(skip_all, fields(window = %window, resource = %resource.describe()))]
    pub async fn gather_with_filter(
        &self,
        filter: &LogFilter,
        resource: &ResourceClassification,
        window: &TimeWindow,
    ) -> EvidenceBundle {
        let target = metrics_target(resource);

        let log_call = timeout(self.log_timeout, self.logs.search(filter, window, self.limit));
        let metrics_call = async {
            match &target {
                Some(target) => Some(timeout(self.metrics_timeout, self.metrics.fetch(target, window)).await),
                None => None,
            }
        };

        let (log_result, metrics_result) = tokio::join!(log_call, metrics_call);

        let mut bundle = EvidenceBundle::default();

        match flatten(log_result, self.log_timeout) {
            Ok(mut records) => {
                records.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
                records.truncate(self.limit);
                bundle.logs = records;
            }
            Err(e) => record_source_failure(&mut bundle, EvidenceSource::LogStore, &e),
        }

        if let Some(result) = metrics_result {
            match flatten(result, self.metrics_timeout) {
                Ok(snapshot) => bundle.metrics = Some(snapshot),
                Err(e) => record_source_failure(&mut bundle, EvidenceSource::MetricsStore, &e),
            }
        }

        tracing::debug!(
            logs = bundle.logs.len(),
            metrics = bundle.metrics.is_some(),
            partial = bundle.partial,
            "evidence gathered"
        );
        bundle
    }
}

/// Metrics are only fetched for workloads with a concrete identifier.
fn metrics_target(resource: &ResourceClassification) -> Option<MetricsTarget> {
    if !resource.has_workload_identifier() {
        return None;
    }
    resource.identifier.as_ref().map(|identifier| MetricsTarget {
        identifier: identifier.clone(),
        namespace: resource.namespace.clone(),
    })
}

fn flatten<T>(
    result: Result<Result<T, CollaboratorError>, tokio::time::error::Elapsed>,
    limit: Duration,
) -> Result<T, CollaboratorError> {
    match result {
        Ok(inner) => inner,
        Err(_) => Err(CollaboratorError::Timeout(limit)),
    }
}

fn record_source_failure(bundle: &mut EvidenceBundle, source: EvidenceSource, error: &CollaboratorError) {
    warn!(%source, error = %error, "evidence source unavailable");
    let label = match source {
        EvidenceSource::LogStore => "log_store",
        EvidenceSource::MetricsStore => "metrics_store",
    };
    increment_counter!("rca_evidence_source_failures_total", "source" => label);
    bundle.record_failure(source, error.to_string());
}
