// rca-engine-rs/src/vocabulary.rs
// Table-driven vocabulary the classifier matches queries against.
//
// The built-in table covers common Kubernetes workloads, host-level terms and
// access/core network devices. Deployments replace it with a TOML file via
// RCA_VOCABULARY_PATH; see `Vocabulary::from_toml_str` for the format.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::ResourceKind;

/// A named component (service, database, queue...) known to the deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentEntry {
    pub name: String,
    pub kind: ResourceKind,
    pub subtype: String,
}

/// A device or resource-type keyword, e.g. `olt`, `node`, `pod`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceKeyword {
    pub keyword: String,
    pub kind: ResourceKind,
    pub subtype: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vocabulary {
    /// Category precedence when a query matches several; earlier wins.
    #[serde(default = "default_priority")]
    pub category_priority: Vec<ResourceKind>,
    #[serde(default)]
    pub components: Vec<ComponentEntry>,
    #[serde(default)]
    pub device_keywords: Vec<DeviceKeyword>,
    /// Environment / namespace tokens.
    #[serde(default)]
    pub environments: Vec<String>,
    /// Specific failure signatures; these fully satisfy the action criterion.
    #[serde(default)]
    pub error_signatures: Vec<String>,
    /// Generic symptom words; these only weakly satisfy the action criterion.
    #[serde(default)]
    pub symptoms: Vec<String>,
    /// Words dropped when extracting salient search terms.
    #[serde(default)]
    pub stop_words: Vec<String>,
}

fn default_priority() -> Vec<ResourceKind> {
    vec![
        ResourceKind::NetworkElement,
        ResourceKind::OsLevel,
        ResourceKind::Kubernetes,
    ]
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn components(kind: ResourceKind, subtype: &str, names: &[&str]) -> Vec<ComponentEntry> {
    names
        .iter()
        .map(|name| ComponentEntry {
            name: name.to_string(),
            kind,
            subtype: subtype.to_string(),
        })
        .collect()
}

fn keywords(kind: ResourceKind, pairs: &[(&str, &str)]) -> Vec<DeviceKeyword> {
    pairs
        .iter()
        .map(|(keyword, subtype)| DeviceKeyword {
            keyword: keyword.to_string(),
            kind,
            subtype: subtype.to_string(),
        })
        .collect()
}

impl Default for Vocabulary {
    fn default() -> Self {
        let mut component_table = components(
            ResourceKind::Kubernetes,
            "service",
            &[
                "payment-service",
                "checkout-service",
                "order-service",
                "inventory-service",
                "auth-service",
                "user-service",
                "notification-service",
                "api-gateway",
                "frontend",
            ],
        );
        component_table.extend(components(
            ResourceKind::Kubernetes,
            "statefulset",
            &["redis", "postgres", "kafka", "rabbitmq", "elasticsearch"],
        ));
        component_table.extend(components(
            ResourceKind::OsLevel,
            "process",
            &["kubelet", "containerd", "dockerd", "sshd", "chronyd"],
        ));

        let mut keyword_table = keywords(
            ResourceKind::NetworkElement,
            &[
                ("olt", "olt"),
                ("onu", "onu"),
                ("ont", "ont"),
                ("bgp", "bgp-peer"),
                ("ospf", "ospf-neighbor"),
                ("router", "router"),
                ("switch", "switch"),
                ("bng", "bng"),
                ("firewall", "firewall"),
            ],
        );
        keyword_table.extend(keywords(
            ResourceKind::OsLevel,
            &[
                ("node", "node"),
                ("host", "host"),
                ("server", "host"),
                ("vm", "vm"),
                ("process", "process"),
                ("systemd", "systemd-unit"),
                ("kernel", "kernel"),
                ("disk", "disk"),
            ],
        ));
        keyword_table.extend(keywords(
            ResourceKind::Kubernetes,
            &[
                ("pod", "pod"),
                ("deployment", "deployment"),
                ("container", "container"),
                ("statefulset", "statefulset"),
                ("daemonset", "daemonset"),
                ("ingress", "ingress"),
            ],
        ));

        Self {
            category_priority: default_priority(),
            components: component_table,
            device_keywords: keyword_table,
            environments: strings(&[
                "prod",
                "production",
                "staging",
                "stage",
                "preprod",
                "uat",
                "qa",
                "dev",
                "development",
                "kube-system",
            ]),
            error_signatures: strings(&[
                "oom",
                "oomkilled",
                "out of memory",
                "memory leak",
                "crashloopbackoff",
                "crash loop",
                "timeout",
                "timeouts",
                "timed out",
                "flap",
                "flapping",
                "flaps",
                "high cpu",
                "cpu spike",
                "cpu throttling",
                "high memory",
                "high latency",
                "latency spike",
                "disk full",
                "disk pressure",
                "packet loss",
                "link down",
                "connection refused",
                "connection reset",
                "evicted",
                "5xx",
                "500",
                "502",
                "503",
                "504",
                "segfault",
                "kernel panic",
                "los",
                "dying gasp",
            ]),
            symptoms: strings(&[
                "crash",
                "crashed",
                "crashing",
                "crashes",
                "down",
                "fail",
                "failed",
                "failing",
                "failure",
                "error",
                "errors",
                "slow",
                "restart",
                "restarted",
                "restarting",
                "hang",
                "hung",
                "stuck",
                "unreachable",
                "unavailable",
                "broken",
            ]),
            stop_words: strings(&[
                "a", "an", "the", "why", "what", "when", "where", "how", "who", "did", "does",
                "do", "is", "are", "was", "were", "be", "been", "has", "have", "had", "it", "its",
                "this", "that", "these", "those", "in", "on", "at", "to", "of", "for", "from",
                "and", "or", "with", "by", "my", "our", "we", "i", "after", "before", "during",
                "since", "last", "past", "ago", "minutes", "minute", "hours", "hour", "days",
                "day", "yesterday", "today", "please", "can", "you", "there", "happened", "going",
                "on", "about", "around",
            ]),
        }
    }
}

impl Vocabulary {
    /// Parse a TOML vocabulary.
    ///
    /// ```toml
    /// category_priority = ["NETWORK_ELEMENT", "OS_LEVEL", "KUBERNETES"]
    /// environments = ["prod", "staging"]
    /// error_signatures = ["oom", "flap"]
    /// symptoms = ["crash"]
    ///
    /// [[components]]
    /// name = "payment-service"
    /// kind = "KUBERNETES"
    /// subtype = "service"
    ///
    /// [[device_keywords]]
    /// keyword = "olt"
    /// kind = "NETWORK_ELEMENT"
    /// subtype = "olt"
    /// ```
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let mut vocab: Vocabulary = toml::from_str(raw)?;
        vocab.normalize();
        Ok(vocab)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::VocabularyIo {
            path: path.display().to_string(),
            source,
        })?;
        let vocab = Self::from_toml_str(&raw)?;
        tracing::info!(
            path = %path.display(),
            components = vocab.components.len(),
            device_keywords = vocab.device_keywords.len(),
            "loaded vocabulary"
        );
        Ok(vocab)
    }

    /// Lowercase every matchable entry so the classifier can compare
    /// against normalised query text.
    fn normalize(&mut self) {
        for c in &mut self.components {
            c.name = c.name.trim().to_ascii_lowercase();
        }
        for k in &mut self.device_keywords {
            k.keyword = k.keyword.trim().to_ascii_lowercase();
        }
        for list in [
            &mut self.environments,
            &mut self.error_signatures,
            &mut self.symptoms,
            &mut self.stop_words,
        ] {
            for item in list.iter_mut() {
                *item = item.trim().to_ascii_lowercase();
            }
            list.retain(|item| !item.is_empty());
        }
        self.category_priority.retain(|k| *k != ResourceKind::Unknown);
        if self.category_priority.is_empty() {
            self.category_priority = default_priority();
        }
    }

    /// Position of `kind` in the precedence list; unlisted kinds rank last.
    pub fn priority_of(&self, kind: ResourceKind) -> usize {
        self.category_priority
            .iter()
            .position(|k| *k == kind)
            .unwrap_or(self.category_priority.len())
    }

    pub fn is_stop_word(&self, word: &str) -> bool {
        self.stop_words.iter().any(|w| w == word)
    }

    /// Example values offered alongside a clarification question.
    pub fn component_examples(&self, limit: usize) -> Vec<String> {
        let mut examples: Vec<String> = Vec::new();
        for kind in &self.category_priority {
            let named = self
                .components
                .iter()
                .filter(|c| c.kind == *kind)
                .map(|c| c.name.clone());
            let devices = self
                .device_keywords
                .iter()
                .filter(|k| k.kind == *kind)
                .map(|k| format!("{}-1", k.keyword));
            if let Some(first) = named.chain(devices).next() {
                examples.push(first);
            }
        }
        examples.extend(self.components.iter().map(|c| c.name.clone()));
        dedup_truncate(examples, limit)
    }

    pub fn environment_examples(&self, limit: usize) -> Vec<String> {
        dedup_truncate(self.environments.clone(), limit)
    }

    pub fn action_examples(&self, limit: usize) -> Vec<String> {
        dedup_truncate(self.error_signatures.clone(), limit)
    }
}

fn dedup_truncate(items: Vec<String>, limit: usize) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(limit);
    for item in items {
        if out.len() == limit {
            break;
        }
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}
