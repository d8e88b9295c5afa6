// rca-engine-rs/src/classifier.rs
// Query classification: ambiguity scoring, resource detection and temporal
// hint extraction. Pure function of the query text and the vocabulary.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::types::{AmbiguityAssessment, ResourceClassification, ResourceKind};
use crate::vocabulary::Vocabulary;

/// Exact vocabulary hit on a whole token.
pub const CONFIDENCE_EXACT: f64 = 1.0;
/// Vocabulary entry found inside a longer token, or a device keyword with an identifier.
pub const CONFIDENCE_SUBSTRING: f64 = 0.75;
/// Only a generic shape (Kubernetes-looking name, bare device type) matched.
pub const CONFIDENCE_PATTERN: f64 = 0.5;
/// Relative phrases ("last 2 hours") pin the window less precisely than timestamps.
pub const CONFIDENCE_RELATIVE_TIME: f64 = 0.75;
/// Generic symptom words ("crash", "down") say something broke but not how.
pub const CONFIDENCE_SYMPTOM: f64 = 0.25;

const MAX_SALIENT_TERMS: usize = 8;

static ABSOLUTE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b\d{4}-\d{2}-\d{2}(?:[T ]\d{1,2}:\d{2}(?::\d{2})?(?:\.\d+)?(?:\s?(?:Z|UTC|[+-]\d{2}:?\d{2}))?)?",
    )
    .expect("absolute timestamp pattern is valid")
});

static EPOCH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:\d{13}|\d{10})\b").expect("epoch pattern is valid"));

static RELATIVE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:(?:last|past|previous)\s+(?:\d+\s*)?(?:minutes?|mins?|hours?|hrs?|days?|weeks?)|\d+\s*(?:minutes?|mins?|hours?|hrs?|days?)\s+ago|an?\s+hour\s+ago|yesterday|today)\b",
    )
    .expect("relative time pattern is valid")
});

static TIME_OF_DAY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:[01]?\d|2[0-3]):[0-5]\d(?::[0-5]\d)?\b").expect("time-of-day pattern is valid")
});

static POD_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z][a-z0-9-]*-(?:[a-z0-9]{8,10}-[a-z0-9]{5}|[a-z0-9]{5}|\d+)$")
        .expect("pod name pattern is valid")
});

static SERVICE_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z][a-z0-9]*(?:-[a-z0-9]+)*-(?:service|svc|api|worker|server|app)$")
        .expect("service name pattern is valid")
});

static REGION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z]{2}-[a-z]+-\d{1,2}$").expect("region pattern is valid")
});

/// A time reference found in the query, kept as the matched text so the
/// resolver can decide whether it actually parses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum TemporalHint {
    /// Calendar date with optional time, e.g. `2026-01-23 14:30`.
    Absolute(String),
    /// Bare Unix epoch seconds or milliseconds.
    Epoch(String),
    /// `last 30 minutes`, `2 hours ago`, `yesterday`.
    Relative(String),
    /// Clock time without a date, e.g. `14:30`.
    TimeOfDay(String),
}

impl TemporalHint {
    pub fn text(&self) -> &str {
        match self {
            Self::Absolute(t) | Self::Epoch(t) | Self::Relative(t) | Self::TimeOfDay(t) => t,
        }
    }

    fn confidence(&self) -> f64 {
        match self {
            Self::Relative(_) => CONFIDENCE_RELATIVE_TIME,
            _ => CONFIDENCE_EXACT,
        }
    }
}

/// Everything the classifier extracts from one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub assessment: AmbiguityAssessment,
    pub resource: ResourceClassification,
    pub temporal_hint: Option<TemporalHint>,
    /// Lowercased search terms for full-text matching.
    pub salient_terms: Vec<String>,
    /// Error signatures and symptoms found in the query.
    pub action_terms: Vec<String>,
}

#[derive(Debug, Clone)]
struct Candidate {
    kind: ResourceKind,
    subtype: String,
    identifier: Option<String>,
    confidence: f64,
    position: usize,
}

#[derive(Debug, Clone)]
struct Token {
    original: String,
    lower: String,
}

/// Stateless classifier over a shared vocabulary.
#[derive(Debug, Clone)]
pub struct QueryClassifier {
    vocab: Arc<Vocabulary>,
}

impl QueryClassifier {
    pub fn new(vocab: Arc<Vocabulary>) -> Self {
        Self { vocab }
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }

    /// Classify a query. Never fails: a query with no recognisable signal
    /// yields an UNKNOWN resource and an ambiguity score of 1.0.
    pub fn classify(&self, query: &str) -> Classification {
        let tokens = tokenize(query);

        let candidates = self.component_candidates(&tokens);
        let component_confidence = candidates
            .iter()
            .map(|c| c.confidence)
            .fold(0.0_f64, f64::max);

        let (environment_confidence, namespace) = self.detect_environment(&tokens);
        let temporal_hint = detect_temporal_hint(query);
        let temporal_confidence = temporal_hint.as_ref().map_or(0.0, TemporalHint::confidence);
        let (action_confidence, action_terms) = self.detect_action(&tokens);

        let assessment = AmbiguityAssessment::from_signals(
            component_confidence,
            environment_confidence,
            temporal_confidence,
            action_confidence,
        );

        let mut resource = self.select_resource(candidates);
        if resource.kind == ResourceKind::Kubernetes || namespace.is_some() {
            resource.namespace = namespace;
        }

        let salient_terms = self.salient_terms(&tokens, &resource);

        tracing::debug!(
            score = assessment.score(),
            resource = %resource.describe(),
            temporal = ?temporal_hint,
            "classified query"
        );

        Classification {
            assessment,
            resource,
            temporal_hint,
            salient_terms,
            action_terms,
        }
    }

    fn component_candidates(&self, tokens: &[Token]) -> Vec<Candidate> {
        let mut out = Vec::new();

        for (i, token) in tokens.iter().enumerate() {
            for entry in &self.vocab.components {
                if token.lower == entry.name {
                    out.push(Candidate {
                        kind: entry.kind,
                        subtype: entry.subtype.clone(),
                        identifier: Some(entry.name.clone()),
                        confidence: CONFIDENCE_EXACT,
                        position: i,
                    });
                } else if entry.name.len() >= 3 && token.lower.contains(&entry.name) {
                    out.push(Candidate {
                        kind: entry.kind,
                        subtype: entry.subtype.clone(),
                        identifier: Some(token.original.clone()),
                        confidence: CONFIDENCE_SUBSTRING,
                        position: i,
                    });
                }
            }

            for keyword in &self.vocab.device_keywords {
                if token.lower == keyword.keyword {
                    // Bare device type; an identifier may follow ("node 7", "pod web-0").
                    let next = tokens
                        .get(i + 1)
                        .filter(|t| looks_like_identifier(&t.lower) && !self.vocab.is_stop_word(&t.lower));
                    out.push(Candidate {
                        kind: keyword.kind,
                        subtype: keyword.subtype.clone(),
                        identifier: next.map(|t| t.original.clone()),
                        confidence: if next.is_some() {
                            CONFIDENCE_SUBSTRING
                        } else {
                            CONFIDENCE_PATTERN
                        },
                        position: i,
                    });
                } else if segment_matches(&token.lower, &keyword.keyword) {
                    out.push(Candidate {
                        kind: keyword.kind,
                        subtype: keyword.subtype.clone(),
                        identifier: Some(token.original.clone()),
                        confidence: CONFIDENCE_SUBSTRING,
                        position: i,
                    });
                }
            }
        }

        if out.is_empty() {
            // Nothing from the vocabulary; accept Kubernetes-shaped names as a last resort.
            for (i, token) in tokens.iter().enumerate() {
                let subtype = if SERVICE_NAME_RE.is_match(&token.lower) {
                    "service"
                } else if POD_NAME_RE.is_match(&token.lower) {
                    "pod"
                } else {
                    continue;
                };
                out.push(Candidate {
                    kind: ResourceKind::Kubernetes,
                    subtype: subtype.to_string(),
                    identifier: Some(token.lower.clone()),
                    confidence: CONFIDENCE_PATTERN,
                    position: i,
                });
            }
        }

        out
    }

    fn select_resource(&self, candidates: Vec<Candidate>) -> ResourceClassification {
        let best = candidates.into_iter().min_by(|a, b| {
            self.vocab
                .priority_of(a.kind)
                .cmp(&self.vocab.priority_of(b.kind))
                .then_with(|| b.confidence.total_cmp(&a.confidence))
                .then_with(|| a.position.cmp(&b.position))
        });

        match best {
            Some(c) => ResourceClassification {
                kind: c.kind,
                subtype: c.subtype,
                identifier: c.identifier,
                namespace: None,
            },
            None => ResourceClassification::unknown(),
        }
    }

    fn detect_environment(&self, tokens: &[Token]) -> (f64, Option<String>) {
        for (i, token) in tokens.iter().enumerate() {
            if let Some(ns) = token
                .lower
                .strip_prefix("namespace=")
                .or_else(|| token.lower.strip_prefix("ns="))
                .filter(|ns| !ns.is_empty())
            {
                return (CONFIDENCE_EXACT, Some(ns.to_string()));
            }
            if token.lower == "namespace" || token.lower == "ns" {
                if let Some(next) = tokens.get(i + 1) {
                    return (CONFIDENCE_EXACT, Some(next.lower.clone()));
                }
            }
            if self.vocab.environments.iter().any(|env| *env == token.lower) {
                return (CONFIDENCE_EXACT, Some(token.lower.clone()));
            }
        }

        // Cloud regions count as location context but are not namespaces.
        if tokens.iter().any(|t| REGION_RE.is_match(&t.lower)) {
            return (CONFIDENCE_EXACT, None);
        }

        (0.0, None)
    }

    fn detect_action(&self, tokens: &[Token]) -> (f64, Vec<String>) {
        let normalized = format!(
            " {} ",
            tokens
                .iter()
                .map(|t| t.lower.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        );
        let contains = |phrase: &str| normalized.contains(&format!(" {} ", phrase));

        let mut terms: Vec<String> = self
            .vocab
            .error_signatures
            .iter()
            .filter(|p| contains(p.as_str()))
            .cloned()
            .collect();
        let confidence = if !terms.is_empty() {
            CONFIDENCE_EXACT
        } else {
            terms = self
                .vocab
                .symptoms
                .iter()
                .filter(|p| contains(p.as_str()))
                .cloned()
                .collect();
            if terms.is_empty() {
                0.0
            } else {
                CONFIDENCE_SYMPTOM
            }
        };

        (confidence, terms)
    }

    fn salient_terms(&self, tokens: &[Token], resource: &ResourceClassification) -> Vec<String> {
        let mut terms: Vec<String> = Vec::new();
        let namespace = resource.namespace.as_deref();

        for token in tokens {
            let word = token.lower.as_str();
            let temporal = ABSOLUTE_RE.is_match(word)
                || TIME_OF_DAY_RE.is_match(word)
                || word.chars().all(|c| c.is_ascii_digit());
            if word.len() < 3
                || temporal
                || self.vocab.is_stop_word(word)
                || Some(word) == namespace
                || terms.iter().any(|t| t == word)
            {
                continue;
            }
            terms.push(word.to_string());
            if terms.len() == MAX_SALIENT_TERMS {
                break;
            }
        }
        terms
    }
}

fn tokenize(query: &str) -> Vec<Token> {
    query
        .split(|c: char| c.is_whitespace() || ",;()[]{}\"'`".contains(c))
        .map(|raw| raw.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|t| !t.is_empty())
        .map(|t| Token {
            original: t.to_string(),
            lower: t.to_ascii_lowercase(),
        })
        .collect()
}

/// True when `keyword` is one of the `-`/`_`/`.` separated segments of
/// `token`, optionally followed directly by digits (`olt3`, `edge-router-1`).
fn segment_matches(token: &str, keyword: &str) -> bool {
    token.split(['-', '_', '.', '/']).any(|seg| {
        seg == keyword
            || (seg.len() > keyword.len()
                && seg.starts_with(keyword)
                && seg[keyword.len()..].chars().all(|c| c.is_ascii_digit()))
    })
}

fn looks_like_identifier(word: &str) -> bool {
    !word.contains(':')
        && !ABSOLUTE_RE.is_match(word)
        && (word.chars().any(|c| c.is_ascii_digit()) || word.contains('-'))
}

/// Pick the most specific time reference in the query: absolute timestamps,
/// then epochs, then relative phrases, then bare clock times.
pub fn detect_temporal_hint(query: &str) -> Option<TemporalHint> {
    if let Some(m) = ABSOLUTE_RE.find(query) {
        return Some(TemporalHint::Absolute(m.as_str().trim().to_string()));
    }
    if let Some(m) = EPOCH_RE.find(query) {
        return Some(TemporalHint::Epoch(m.as_str().to_string()));
    }
    if let Some(m) = RELATIVE_RE.find(query) {
        return Some(TemporalHint::Relative(m.as_str().to_string()));
    }
    TIME_OF_DAY_RE
        .find(query)
        .map(|m| TemporalHint::TimeOfDay(m.as_str().to_string()))
}
