// rca-engine-rs/src/continuation.rs
// Suspended analyses awaiting clarification, keyed by an opaque token.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::classifier::Classification;
use crate::types::{Criterion, Query};

/// What is kept between the clarification response and the follow-up call.
#[derive(Debug, Clone, PartialEq)]
pub struct SuspendedAnalysis {
    pub request_id: Uuid,
    pub query: Query,
    pub classification: Classification,
    pub asked: Vec<Criterion>,
    pub suspended_at: DateTime<Utc>,
}

/// Storage for suspended analyses.
///
/// Tokens are single-use: `resume` hands the state back at most once.
#[async_trait]
pub trait ContinuationStore: Send + Sync {
    /// Store `state` and return the token that resumes it.
    async fn suspend(&self, state: SuspendedAnalysis) -> String;

    /// Return a copy of the state for `token` without consuming it.
    async fn peek(&self, token: &str) -> Option<SuspendedAnalysis>;

    /// Remove and return the state for `token`, or `None` if it is unknown
    /// or expired.
    async fn resume(&self, token: &str) -> Option<SuspendedAnalysis>;
}

struct Entry {
    stored_at: Instant,
    state: SuspendedAnalysis,
}

/// Process-local store with a fixed time-to-live.
pub struct InMemoryContinuationStore {
    entries: DashMap<String, Entry>,
    ttl: Duration,
}

impl InMemoryContinuationStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn purge_expired(&self) {
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.stored_at.elapsed() <= ttl);
        let purged = before.saturating_sub(self.entries.len());
        if purged > 0 {
            tracing::debug!(purged, "dropped expired continuations");
        }
    }
}

#[async_trait]
impl ContinuationStore for InMemoryContinuationStore {
    async fn suspend(&self, state: SuspendedAnalysis) -> String {
        self.purge_expired();

        let token = Uuid::new_v4().to_string();
        self.entries.insert(
            token.clone(),
            Entry {
                stored_at: Instant::now(),
                state,
            },
        );
        token
    }

    async fn peek(&self, token: &str) -> Option<SuspendedAnalysis> {
        let entry = self.entries.get(token)?;
        if entry.stored_at.elapsed() > self.ttl {
            return None;
        }
        Some(entry.state.clone())
    }

    async fn resume(&self, token: &str) -> Option<SuspendedAnalysis> {
        let (_, entry) = self.entries.remove(token)?;
        if entry.stored_at.elapsed() > self.ttl {
            tracing::info!(token, "continuation expired");
            return None;
        }
        Some(entry.state)
    }
}
