// rca-engine-rs/src/backends.rs
// Collaborator contracts the engine depends on, and the handle bundle
// the caller constructs once and injects.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::classifier::Classification;
use crate::error::CollaboratorError;
use crate::types::{LogRecord, MetricSnapshot, ResourceKind, TimeWindow};

/// Backend-neutral log selection. Each log store translates this into its
/// own query language; the time window and limit are passed separately.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LogFilter {
    pub namespace: Option<String>,
    pub identifier: Option<String>,
    pub kind: Option<ResourceKind>,
    /// Device or workload subtype, e.g. `pod`, `olt`.
    pub device_type: Option<String>,
    /// Full-text terms; a record matches if it contains any of them.
    pub terms: Vec<String>,
}

impl LogFilter {
    pub fn from_classification(classification: &Classification) -> Self {
        let resource = &classification.resource;
        Self {
            namespace: resource.namespace.clone(),
            identifier: resource.identifier.clone(),
            kind: (!resource.is_unknown()).then_some(resource.kind),
            device_type: (!resource.is_unknown()).then(|| resource.subtype.clone()),
            terms: classification.salient_terms.clone(),
        }
    }

    /// Add a search term unless it is already present.
    pub fn with_term(mut self, term: &str) -> Self {
        let term = term.trim().to_ascii_lowercase();
        if !term.is_empty() && !self.terms.contains(&term) {
            self.terms.push(term);
        }
        self
    }
}

/// The workload a metrics snapshot is requested for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsTarget {
    pub identifier: String,
    pub namespace: Option<String>,
}

#[async_trait]
pub trait LogStore: Send + Sync {
    /// Records matching `filter` inside `window`, at most `limit` of them.
    async fn search(
        &self,
        filter: &LogFilter,
        window: &TimeWindow,
        limit: usize,
    ) -> Result<Vec<LogRecord>, CollaboratorError>;
}

#[async_trait]
pub trait MetricsStore: Send + Sync {
    async fn fetch(
        &self,
        target: &MetricsTarget,
        window: &TimeWindow,
    ) -> Result<MetricSnapshot, CollaboratorError>;
}

#[async_trait]
pub trait ReasoningService: Send + Sync {
    /// Send a free-text request, get the raw free-text response back.
    async fn infer(&self, request: &str) -> Result<String, CollaboratorError>;
}

/// Process-wide collaborator handles. Built once at start-up, shared
/// read-only by every in-flight analysis.
#[derive(Clone)]
pub struct Collaborators {
    pub logs: Arc<dyn LogStore>,
    pub metrics: Arc<dyn MetricsStore>,
    pub reasoning: Arc<dyn ReasoningService>,
}

impl Collaborators {
    pub fn new(
        logs: Arc<dyn LogStore>,
        metrics: Arc<dyn MetricsStore>,
        reasoning: Arc<dyn ReasoningService>,
    ) -> Self {
        Self {
            logs,
            metrics,
            reasoning,
        }
    }
}
