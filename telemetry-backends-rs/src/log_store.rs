// telemetry-backends-rs/src/log_store.rs
// OpenSearch / Elasticsearch implementation of `LogStore`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rca_engine::{CollaboratorError, LogFilter, LogRecord, LogStore, ResourceKind, TimeWindow};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::{LogFieldMap, LogStoreConfig};
use crate::error::{check_status, transport_error};

pub struct OpenSearchLogStore {
    client: Client,
    config: LogStoreConfig,
}

impl OpenSearchLogStore {
    pub fn new(config: LogStoreConfig) -> Result<Self, CollaboratorError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(transport_error)?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &LogStoreConfig {
        &self.config
    }

    fn search_url(&self) -> String {
        format!("{}/{}/_search", self.config.url, self.config.index)
    }
}

#[async_trait]
impl LogStore for OpenSearchLogStore {
    async fn search(
        &self,
        filter: &LogFilter,
        window: &TimeWindow,
        limit: usize,
    ) -> Result<Vec<LogRecord>, CollaboratorError> {
        let body = build_query(&self.config.fields, filter, window, limit);
        debug!(url = %self.search_url(), limit, "searching log store");

        let mut request = self.client.post(self.search_url()).json(&body);
        if let Some(user) = &self.config.username {
            request = request.basic_auth(user, self.config.password.as_deref());
        }

        let response = request.send().await.map_err(transport_error)?;
        let response = check_status(response).await?;
        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| CollaboratorError::Decode(e.to_string()))?;

        let mut records = parse_hits(&self.config.fields, parsed);
        records.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        records.truncate(limit);
        Ok(records)
    }
}

/// Translate a `LogFilter` into a `bool` query body.
///
/// The window and namespace are hard filters. A known identifier is a hard
/// filter too and the salient terms only influence scoring; without an
/// identifier at least one term has to match.
pub fn build_query(fields: &LogFieldMap, filter: &LogFilter, window: &TimeWindow, limit: usize) -> Value {
    let mut must_filter = vec![json!({
        "range": {
            fields.timestamp.as_str(): {
                "gte": window.start().to_rfc3339(),
                "lte": window.end().to_rfc3339(),
                "format": "strict_date_optional_time"
            }
        }
    })];

    if let Some(namespace) = &filter.namespace {
        must_filter.push(json!({ "term": { fields.namespace.as_str(): namespace } }));
    }

    if let Some(identifier) = &filter.identifier {
        must_filter.push(identifier_clause(fields, filter.kind, identifier));
    }

    if filter.kind == Some(ResourceKind::NetworkElement) {
        if let Some(device_type) = &filter.device_type {
            must_filter.push(json!({ "term": { fields.device_type.as_str(): device_type } }));
        }
    }

    let mut bool_query = serde_json::Map::new();
    bool_query.insert("filter".to_string(), Value::Array(must_filter));

    if !filter.terms.is_empty() {
        let text_match = json!({
            "multi_match": {
                "query": filter.terms.join(" "),
                "fields": [fields.message.as_str(), "log"],
                "operator": "or"
            }
        });
        if filter.identifier.is_some() {
            bool_query.insert("should".to_string(), json!([text_match]));
        } else {
            bool_query.insert("must".to_string(), json!([text_match]));
        }
    }

    json!({
        "size": limit,
        "sort": [{ fields.timestamp.as_str(): { "order": "asc" } }],
        "query": { "bool": Value::Object(bool_query) }
    })
}

fn identifier_clause(fields: &LogFieldMap, kind: Option<ResourceKind>, identifier: &str) -> Value {
    match kind {
        Some(ResourceKind::NetworkElement) => json!({ "term": { fields.device.as_str(): identifier } }),
        Some(ResourceKind::OsLevel) => json!({ "term": { fields.host.as_str(): identifier } }),
        // Pods carry generated suffixes, so a service name matches by prefix.
        _ => json!({
            "bool": {
                "should": [
                    { "term": { fields.app.as_str(): identifier } },
                    { "prefix": { fields.pod.as_str(): identifier } },
                    { "term": { fields.host.as_str(): identifier } },
                    { "term": { fields.device.as_str(): identifier } }
                ],
                "minimum_should_match": 1
            }
        }),
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: Hits,
}

#[derive(Debug, Deserialize)]
struct Hits {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_source", default)]
    source: Value,
}

fn parse_hits(fields: &LogFieldMap, response: SearchResponse) -> Vec<LogRecord> {
    response
        .hits
        .hits
        .into_iter()
        .filter_map(|hit| parse_document(fields, &hit.source))
        .collect()
}

/// Documents without a readable timestamp or message are dropped.
fn parse_document(fields: &LogFieldMap, doc: &Value) -> Option<LogRecord> {
    let timestamp = lookup_str(doc, &fields.timestamp)
        .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
        .map(|t| t.with_timezone(&Utc))?;
    let message = lookup_str(doc, &fields.message).or_else(|| lookup_str(doc, "log"))?;

    let source = [&fields.pod, &fields.host, &fields.device]
        .iter()
        .find_map(|field| lookup_str(doc, field))
        .or_else(|| lookup_str(doc, "source"))
        .unwrap_or_else(|| "unknown".to_string());

    let level = lookup_str(doc, &fields.level)
        .or_else(|| lookup_str(doc, "log.level"))
        .or_else(|| lookup_str(doc, "severity"));

    let mut labels = BTreeMap::new();
    if let Some(namespace) = lookup_str(doc, &fields.namespace) {
        labels.insert("namespace".to_string(), namespace);
    }
    if let Some(container) = lookup_str(doc, "kubernetes.container_name") {
        labels.insert("container".to_string(), container);
    }
    if let Some(device_type) = lookup_str(doc, &fields.device_type) {
        labels.insert("device_type".to_string(), device_type);
    }

    Some(LogRecord {
        timestamp,
        source,
        level,
        message,
        labels,
    })
}

/// Resolve a dotted field name against either nested objects or a flat
/// key that itself contains dots.
fn lookup_str(doc: &Value, path: &str) -> Option<String> {
    if let Some(value) = doc.get(path) {
        return scalar_to_string(value);
    }
    let mut current = doc;
    for part in path.split('.') {
        current = current.get(part)?;
    }
    scalar_to_string(current)
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn window() -> TimeWindow {
        TimeWindow::new(
            Utc.with_ymd_and_hms(2026, 1, 23, 14, 15, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 1, 23, 14, 45, 0).unwrap(),
        )
    }

    fn k8s_filter() -> LogFilter {
        LogFilter {
            namespace: Some("prod".to_string()),
            identifier: Some("payment-service".to_string()),
            kind: Some(ResourceKind::Kubernetes),
            device_type: Some("service".to_string()),
            terms: vec!["oomkilled".to_string(), "payment".to_string()],
        }
    }

    #[test]
    fn test_query_carries_window_namespace_and_identifier() {
        let body = build_query(&LogFieldMap::default(), &k8s_filter(), &window(), 100);

        assert_eq!(body["size"], 100);
        assert_eq!(body["sort"][0]["@timestamp"]["order"], "asc");

        let filters = body["query"]["bool"]["filter"].as_array().unwrap();
        assert_eq!(filters.len(), 3);
        assert_eq!(filters[0]["range"]["@timestamp"]["gte"], "2026-01-23T14:15:00+00:00");
        assert_eq!(filters[1]["term"]["kubernetes.namespace_name"], "prod");
        assert_eq!(
            filters[2]["bool"]["should"][1]["prefix"]["kubernetes.pod_name"],
            "payment-service"
        );

        // Identifier known: terms only score.
        assert_eq!(body["query"]["bool"]["should"][0]["multi_match"]["query"], "oomkilled payment");
        assert!(body["query"]["bool"].get("must").is_none());
    }

    #[test]
    fn test_terms_required_without_identifier() {
        let filter = LogFilter {
            terms: vec!["timeout".to_string()],
            ..LogFilter::default()
        };
        let body = build_query(&LogFieldMap::default(), &filter, &window(), 10);

        assert_eq!(body["query"]["bool"]["filter"].as_array().unwrap().len(), 1);
        assert_eq!(body["query"]["bool"]["must"][0]["multi_match"]["query"], "timeout");
    }

    #[test]
    fn test_network_element_filters_on_device() {
        let filter = LogFilter {
            identifier: Some("olt-3".to_string()),
            kind: Some(ResourceKind::NetworkElement),
            device_type: Some("olt".to_string()),
            ..LogFilter::default()
        };
        let body = build_query(&LogFieldMap::default(), &filter, &window(), 10);
        let filters = body["query"]["bool"]["filter"].as_array().unwrap();

        assert_eq!(filters[1]["term"]["device.name"], "olt-3");
        assert_eq!(filters[2]["term"]["device.type"], "olt");
    }

    #[test]
    fn test_parse_nested_and_flat_documents() {
        let fields = LogFieldMap::default();
        let nested = json!({
            "@timestamp": "2026-01-23T14:31:02Z",
            "message": "Container killed: OOMKilled",
            "level": "error",
            "kubernetes": { "pod_name": "payment-service-7d9f", "namespace_name": "prod" }
        });
        let record = parse_document(&fields, &nested).unwrap();
        assert_eq!(record.source, "payment-service-7d9f");
        assert_eq!(record.level.as_deref(), Some("error"));
        assert_eq!(record.labels.get("namespace").map(String::as_str), Some("prod"));

        let flat = json!({
            "@timestamp": "2026-01-23T14:31:02.120+00:00",
            "log": "link down",
            "device.name": "olt-3",
            "device.type": "olt"
        });
        let record = parse_document(&fields, &flat).unwrap();
        assert_eq!(record.source, "olt-3");
        assert_eq!(record.message, "link down");
        assert_eq!(record.labels.get("device_type").map(String::as_str), Some("olt"));
    }

    #[test]
    fn test_documents_without_timestamp_are_dropped() {
        let fields = LogFieldMap::default();
        assert!(parse_document(&fields, &json!({ "message": "no time" })).is_none());
        assert!(parse_document(&fields, &json!({ "@timestamp": "yesterday", "message": "x" })).is_none());
    }
}
