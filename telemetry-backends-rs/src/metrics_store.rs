// telemetry-backends-rs/src/metrics_store.rs
// Prometheus implementation of `MetricsStore`: a handful of instant
// queries evaluated at the end of the analysis window.

use std::collections::BTreeMap;

use async_trait::async_trait;
use rca_engine::{CollaboratorError, MetricSnapshot, MetricsStore, MetricsTarget, TimeWindow};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::MetricsStoreConfig;
use crate::error::{check_status, transport_error};

/// Sample names reported in the snapshot.
pub const CPU_USAGE: &str = "cpu_usage_cores";
pub const MEMORY_WORKING_SET: &str = "memory_working_set_bytes";
pub const CONTAINER_RESTARTS: &str = "container_restarts";

pub struct PrometheusMetricsStore {
    client: Client,
    config: MetricsStoreConfig,
}

impl PrometheusMetricsStore {
    pub fn new(config: MetricsStoreConfig) -> Result<Self, CollaboratorError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(transport_error)?;
        Ok(Self { client, config })
    }

    async fn instant_query(&self, promql: &str, at: i64) -> Result<Option<f64>, CollaboratorError> {
        let url = format!("{}/api/v1/query", self.config.url);
        let time = at.to_string();
        let response = self
            .client
            .get(url)
            .query(&[("query", promql), ("time", time.as_str())])
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;
        let body: QueryResponse = response
            .json()
            .await
            .map_err(|e| CollaboratorError::Decode(e.to_string()))?;
        body.first_value()
    }
}

#[async_trait]
impl MetricsStore for PrometheusMetricsStore {
    async fn fetch(
        &self,
        target: &MetricsTarget,
        window: &TimeWindow,
    ) -> Result<MetricSnapshot, CollaboratorError> {
        let queries = build_queries(target, &self.config.rate_window);
        let at = window.end().timestamp();

        let (cpu, memory, restarts) = tokio::join!(
            self.instant_query(&queries[0].1, at),
            self.instant_query(&queries[1].1, at),
            self.instant_query(&queries[2].1, at),
        );

        let mut samples = BTreeMap::new();
        let mut first_error = None;
        for ((name, _), result) in queries.iter().zip([cpu, memory, restarts]) {
            match result {
                Ok(Some(value)) => {
                    samples.insert(name.to_string(), value);
                }
                Ok(None) => debug!(metric = *name, "no series returned"),
                Err(err) => {
                    warn!(metric = *name, error = %err, "metric query failed");
                    first_error.get_or_insert(err);
                }
            }
        }

        // Partial answers are still useful; only a total failure is an error.
        if samples.is_empty() {
            if let Some(err) = first_error {
                return Err(err);
            }
        }

        Ok(MetricSnapshot {
            identifier: target.identifier.clone(),
            namespace: target.namespace.clone(),
            captured_at: window.end(),
            samples,
        })
    }
}

/// PromQL for each reported sample, keyed by sample name.
pub fn build_queries(target: &MetricsTarget, rate_window: &str) -> [(&'static str, String); 3] {
    let selector = pod_selector(target);
    [
        (
            CPU_USAGE,
            format!(
                "sum(rate(container_cpu_usage_seconds_total{{{}}}[{}]))",
                selector, rate_window
            ),
        ),
        (
            MEMORY_WORKING_SET,
            format!("sum(container_memory_working_set_bytes{{{},container!=\"\"}})", selector),
        ),
        (
            CONTAINER_RESTARTS,
            format!("sum(kube_pod_container_status_restarts_total{{{}}})", selector),
        ),
    ]
}

fn pod_selector(target: &MetricsTarget) -> String {
    let pod = format!("pod=~\"{}(-.*)?\"", escape_label(&regex::escape(&target.identifier)));
    match &target.namespace {
        Some(namespace) => format!("namespace=\"{}\",{}", escape_label(namespace), pod),
        None => pod,
    }
}

fn escape_label(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(default)]
    result: Vec<VectorSample>,
}

#[derive(Debug, Deserialize)]
struct VectorSample {
    /// `[unix_seconds, "value"]`
    value: (Value, String),
}

impl QueryResponse {
    fn first_value(self) -> Result<Option<f64>, CollaboratorError> {
        if self.status != "success" {
            return Err(CollaboratorError::Backend {
                status: 200,
                message: self.error.unwrap_or_else(|| format!("query status {}", self.status)),
            });
        }
        let Some(sample) = self.data.and_then(|d| d.result.into_iter().next()) else {
            return Ok(None);
        };
        sample
            .value
            .1
            .parse::<f64>()
            .map(|v| v.is_finite().then_some(v))
            .map_err(|e| CollaboratorError::Decode(format!("sample value: {}", e)))
    }
}
