// telemetry-backends-rs/src/lib.rs
// Concrete collaborators for the RCA engine: an OpenSearch log store, a
// Prometheus metrics store and an OpenAI-compatible reasoning client.

pub mod config;
pub mod error;
pub mod llm_client;
pub mod log_store;
pub mod metrics_store;


use std::sync::Arc;

use rca_engine::{CollaboratorError, Collaborators};

pub use config::{LlmConfig, LogFieldMap, LogStoreConfig, MetricsStoreConfig};
pub use error::LlmError;
pub use llm_client::LlmClient;
pub use log_store::OpenSearchLogStore;
pub use metrics_store::PrometheusMetricsStore;

/// Build all three collaborators once, for injection into `RcaEngine`.
pub fn build_collaborators(
    logs: LogStoreConfig,
    metrics: MetricsStoreConfig,
    llm: LlmConfig,
) -> Result<Collaborators, CollaboratorError> {
    Ok(Collaborators::new(
        Arc::new(OpenSearchLogStore::new(logs)?),
        Arc::new(PrometheusMetricsStore::new(metrics)?),
        Arc::new(LlmClient::new(llm)?),
    ))
}

/// [`build_collaborators`] with every setting read from the environment.
pub fn collaborators_from_env() -> Result<Collaborators, CollaboratorError> {
    build_collaborators(
        LogStoreConfig::from_env(),
        MetricsStoreConfig::from_env(),
        LlmConfig::from_env(),
    )
}
