//! Job store: active jobs plus a bounded set of finished ones.
//!
//! Both maps live under one lock so moving a job between them and pruning
//! are atomic for readers. A finished job carries its own results, so
//! dropping it removes status and results together.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::job::{JobId, PredictionJob};

struct FinishedEntry {
    job: Arc<PredictionJob>,
    ended_at: DateTime<Utc>,
}

#[derive(Default)]
struct StoreInner {
    active: HashMap<JobId, Arc<PredictionJob>>,
    finished: HashMap<JobId, FinishedEntry>,
}

/// Counts after a retention pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct CleanupReport {
    pub active_jobs: usize,
    pub finished_jobs: usize,
    pub removed: usize,
}

pub struct JobStore {
    inner: RwLock<StoreInner>,
    max_finished: usize,
}

impl JobStore {
    pub fn new(max_finished: usize) -> Self {
        Self { inner: RwLock::new(StoreInner::default()), max_finished }
    }

    pub async fn insert(&self, job: Arc<PredictionJob>) {
        self.inner.write().await.active.insert(job.id.clone(), job);
    }

    /// Look a job up in either set.
    pub async fn get(&self, id: &str) -> Option<Arc<PredictionJob>> {
        let inner = self.inner.read().await;
        inner
            .active
            .get(id)
            .cloned()
            .or_else(|| inner.finished.get(id).map(|e| Arc::clone(&e.job)))
    }

    /// Move a job to the finished set and enforce the capacity bound.
    ///
    /// Retiring an already-finished job refreshes nothing and returns 0.
    pub async fn retire(&self, id: &str, ended_at: DateTime<Utc>) -> usize {
        let mut inner = self.inner.write().await;
        let Some(job) = inner.active.remove(id) else {
            return 0;
        };
        inner.finished.insert(id.to_string(), FinishedEntry { job, ended_at });
        Self::prune_locked(&mut inner, self.max_finished, None)
    }

    /// Drop finished jobs beyond the capacity bound and, when `max_age` is
    /// given, those that ended longer ago than that.
    pub async fn prune(&self, max_age: Option<Duration>, now: DateTime<Utc>) -> CleanupReport {
        let mut inner = self.inner.write().await;
        let cutoff = max_age.map(|age| now - age);
        let removed = Self::prune_locked(&mut inner, self.max_finished, cutoff);
        CleanupReport {
            active_jobs: inner.active.len(),
            finished_jobs: inner.finished.len(),
            removed,
        }
    }

    fn prune_locked(inner: &mut StoreInner, max_finished: usize, cutoff: Option<DateTime<Utc>>) -> usize {
        let before = inner.finished.len();

        if let Some(cutoff) = cutoff {
            inner.finished.retain(|_, e| e.ended_at >= cutoff);
        }

        if inner.finished.len() > max_finished {
            let mut by_end: Vec<(DateTime<Utc>, JobId)> = inner
                .finished
                .iter()
                .map(|(id, e)| (e.ended_at, id.clone()))
                .collect();
            // Newest first; ties broken by id for determinism.
            by_end.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
            for (_, id) in by_end.into_iter().skip(max_finished) {
                inner.finished.remove(&id);
            }
        }

        let removed = before - inner.finished.len();
        if removed > 0 {
            debug!(removed, kept = inner.finished.len(), "Pruned finished jobs");
        }
        removed
    }

    /// All jobs, active first.
    pub async fn all(&self) -> Vec<Arc<PredictionJob>> {
        let inner = self.inner.read().await;
        inner
            .active
            .values()
            .cloned()
            .chain(inner.finished.values().map(|e| Arc::clone(&e.job)))
            .collect()
    }

    pub async fn counts(&self) -> (usize, usize) {
        let inner = self.inner.read().await;
        (inner.active.len(), inner.finished.len())
    }
}
